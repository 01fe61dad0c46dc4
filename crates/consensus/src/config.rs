//! Round configuration

use crate::error::ConfigError;
use crate::types::{Order, ParticipantId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest inbox a configuration may require
pub const MAX_INBOX_CAPACITY: usize = 1 << 20;

/// Default quiescence window, as in the classic simulation
pub const DEFAULT_QUIESCENCE_MS: u64 = 2000;

/// How a lieutenant decides that relay traffic has settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettleStrategy {
    /// Stop once no message arrived within the quiescence window.
    /// A heuristic: a slow peer can be cut off.
    #[default]
    Quiescence,
    /// Stop after the exact number of messages the protocol delivers to every
    /// lieutenant. The quiescence window only guards against a stalled peer.
    ExpectedCount,
}

/// Parameters of one OM(m) round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// The OM(m) parameter m
    pub recursion_bound: usize,
    /// Total participants, commander included
    pub num_participants: usize,
    /// What the commander orders
    pub initial_order: Order,
    pub settle: SettleStrategy,
    /// Idle time after the last message before a lieutenant settles
    pub quiescence: Duration,
    /// Idle time before the first message
    pub initial_timeout: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            recursion_bound: 1,
            num_participants: 4,
            initial_order: Order::Affirm,
            settle: SettleStrategy::default(),
            quiescence: Duration::from_millis(DEFAULT_QUIESCENCE_MS),
            initial_timeout: Duration::from_millis(DEFAULT_QUIESCENCE_MS),
        }
    }
}

impl SimulationConfig {
    /// Number of lieutenant actors
    pub fn num_lieutenants(&self) -> usize {
        self.num_participants.saturating_sub(1)
    }

    /// Longest path a relayed message may carry
    pub fn max_path_len(&self) -> usize {
        self.recursion_bound + 1
    }

    /// Lieutenant ids, in order
    pub fn lieutenants(&self) -> impl Iterator<Item = ParticipantId> {
        let last = self.num_participants.min(usize::from(ParticipantId::MAX) + 1);
        (1..last).map(|id| id as ParticipantId)
    }

    /// Check the resilience bound and resource limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_participants < 2 {
            return Err(ConfigError::TooFewParticipants(self.num_participants));
        }
        if self.num_participants > usize::from(ParticipantId::MAX) + 1 {
            return Err(ConfigError::TooManyParticipants(self.num_participants));
        }
        if self.recursion_bound >= self.num_participants - 1 {
            return Err(ConfigError::RecursionBoundTooLarge {
                bound: self.recursion_bound,
                participants: self.num_participants,
            });
        }
        if expected_messages(self.num_participants, self.recursion_bound).is_none() {
            return Err(ConfigError::InboxCapacityExceeded {
                max: MAX_INBOX_CAPACITY,
            });
        }
        Ok(())
    }

    /// Messages every lieutenant receives in a full round, which is also the
    /// inbox capacity that keeps sends from ever blocking
    pub fn inbox_capacity(&self) -> usize {
        expected_messages(self.num_participants, self.recursion_bound)
            .unwrap_or(MAX_INBOX_CAPACITY)
    }
}

/// Messages delivered to one lieutenant: the commander's, plus one per
/// ordered selection of k distinct other lieutenants for k in 1..=m.
///
/// `None` once the count passes [`MAX_INBOX_CAPACITY`].
pub fn expected_messages(num_participants: usize, recursion_bound: usize) -> Option<usize> {
    let others = num_participants.checked_sub(2)?;
    let mut total: usize = 1;
    let mut arrangements: usize = 1;
    for k in 0..recursion_bound {
        arrangements = arrangements.checked_mul(others.checked_sub(k)?)?;
        total = total.checked_add(arrangements)?;
        if total > MAX_INBOX_CAPACITY {
            return None;
        }
    }
    Some(total)
}

/// Builder for SimulationConfig
pub struct SimulationConfigBuilder {
    config: SimulationConfig,
}

impl SimulationConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SimulationConfig::default(),
        }
    }

    pub fn recursion_bound(mut self, bound: usize) -> Self {
        self.config.recursion_bound = bound;
        self
    }

    pub fn num_participants(mut self, n: usize) -> Self {
        self.config.num_participants = n;
        self
    }

    pub fn initial_order(mut self, order: Order) -> Self {
        self.config.initial_order = order;
        self
    }

    pub fn settle(mut self, settle: SettleStrategy) -> Self {
        self.config.settle = settle;
        self
    }

    pub fn quiescence(mut self, window: Duration) -> Self {
        self.config.quiescence = window;
        self
    }

    pub fn initial_timeout(mut self, window: Duration) -> Self {
        self.config.initial_timeout = window;
        self
    }

    /// Validate and return the config
    pub fn build(self) -> Result<SimulationConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SimulationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
