//! Coordinator - seeds the commander's order, runs the lieutenants and
//! collects their decisions

use crate::config::SimulationConfig;
use crate::error::{ProtocolError, SimulationError};
use crate::policy::{CorruptionPolicy, EvenRecipientFlip, TraitorSelector};
use crate::relay::{Peers, RelayEngine};
use crate::types::{Decision, LieutenantReport, RelayMessage, RelayStats, RoundOutcome};
use crate::vote;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Runs OM(m) rounds for one configuration
pub struct Coordinator {
    config: SimulationConfig,
    corruption: Arc<dyn CorruptionPolicy>,
}

impl Coordinator {
    /// Create a coordinator using the even-recipient corruption policy
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            corruption: Arc::new(EvenRecipientFlip),
        }
    }

    /// Replace the corruption policy traitors follow
    pub fn with_corruption(mut self, policy: impl CorruptionPolicy + 'static) -> Self {
        self.corruption = Arc::new(policy);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run one round.
    ///
    /// The configuration is validated before traitors are chosen or any
    /// lieutenant is spawned. The round fails as a whole if a single
    /// lieutenant fails.
    pub async fn run(
        &self,
        traitors: &mut dyn TraitorSelector,
    ) -> Result<RoundOutcome, SimulationError> {
        self.config.validate()?;
        let config = &self.config;

        tracing::info!(
            "Starting OM({}) with {} generals, commander orders {}",
            config.recursion_bound,
            config.num_participants,
            config.initial_order
        );

        let commander_traitor = traitors.commander_is_traitor();
        if commander_traitor {
            tracing::info!("The commander is a traitor!");
        }

        let (peers, inboxes) = Peers::new(config.num_lieutenants(), config.inbox_capacity());
        let peers = Arc::new(peers);

        for id in config.lieutenants() {
            let order = if commander_traitor {
                self.corruption.corrupt(config.initial_order, id)
            } else {
                config.initial_order
            };
            peers
                .deliver(id, RelayMessage::from_commander(order).to_bytes())
                .map_err(|source| SimulationError::Protocol {
                    lieutenant: id,
                    source,
                })?;
        }

        let mut actors = JoinSet::new();
        for (id, inbox) in config.lieutenants().zip(inboxes) {
            let is_traitor = traitors.lieutenant_is_traitor(id);
            if is_traitor {
                tracing::info!("Lieutenant {} is a traitor!", id);
            }
            let engine = RelayEngine::new(
                id,
                is_traitor,
                inbox,
                Arc::clone(&peers),
                Arc::clone(&self.corruption),
                config,
            );
            actors.spawn(engine.run());
        }
        drop(peers);

        let mut reports = Vec::with_capacity(config.num_lieutenants());
        while let Some(joined) = actors.join_next().await {
            match joined {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    actors.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    actors.abort_all();
                    return Err(SimulationError::ActorFailed(e.to_string()));
                }
            }
        }

        self.tally(commander_traitor, reports)
    }

    fn tally(
        &self,
        commander_traitor: bool,
        mut reports: Vec<LieutenantReport>,
    ) -> Result<RoundOutcome, SimulationError> {
        reports.sort_by_key(|r| r.lieutenant);

        let mut stats = RelayStats::default();
        let mut decisions = Vec::with_capacity(reports.len());
        for report in &reports {
            let order = vote::decide(&report.log, self.config.recursion_bound).ok_or(
                SimulationError::Protocol {
                    lieutenant: report.lieutenant,
                    source: ProtocolError::MissingCommanderHop,
                },
            )?;
            tracing::info!("Lieutenant {} votes {}", report.lieutenant, order);

            stats.messages_received += report.stats.messages_received;
            stats.messages_relayed += report.stats.messages_relayed;
            stats.messages_corrupted += report.stats.messages_corrupted;
            decisions.push(Decision {
                lieutenant: report.lieutenant,
                is_traitor: report.is_traitor,
                order,
            });
        }

        let outcome = RoundOutcome {
            recursion_bound: self.config.recursion_bound,
            num_participants: self.config.num_participants,
            commander_order: self.config.initial_order,
            commander_traitor,
            decisions,
            stats,
            reports,
        };

        if outcome.loyal_agreement().is_none() {
            tracing::warn!(
                "Loyal lieutenants disagree (traitors: commander={}, lieutenants={:?})",
                commander_traitor,
                outcome.traitors()
            );
        }

        Ok(outcome)
    }
}
