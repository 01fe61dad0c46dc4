//! Simulator Configuration

use anyhow::{Context, Result};
use om_consensus::{
    policy::DEFAULT_TRAITOR_PROBABILITY, FixedTraitors, Order, ParticipantId, RandomTraitors,
    SettleStrategy, SimulationConfig, SimulationConfigBuilder, TraitorSelector,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Simulator configuration, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// The OM(m) recursion bound m
    pub recursion_bound: usize,
    /// Generals, commander included
    pub num_participants: usize,
    /// Commander's order
    pub order: Order,
    /// How lieutenants decide traffic has settled
    pub settle: SettleStrategy,
    /// Quiescence window in milliseconds
    pub quiescence_ms: u64,
    /// Wait for the first message in milliseconds
    pub initial_timeout_ms: u64,
    /// Chance of each general being a traitor when drawn at random
    pub traitor_probability: f64,
    /// Seed for reproducible traitor draws
    pub seed: Option<u64>,
    /// Fixed traitor assignment: is the commander a traitor
    pub commander_traitor: bool,
    /// Fixed traitor assignment: traitorous lieutenants
    pub traitors: Option<Vec<ParticipantId>>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            recursion_bound: 1,
            num_participants: 4,
            order: Order::Affirm,
            settle: SettleStrategy::Quiescence,
            quiescence_ms: om_consensus::config::DEFAULT_QUIESCENCE_MS,
            initial_timeout_ms: om_consensus::config::DEFAULT_QUIESCENCE_MS,
            traitor_probability: DEFAULT_TRAITOR_PROBABILITY,
            seed: None,
            commander_traitor: false,
            traitors: None,
        }
    }
}

impl SimulatorConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Validated round parameters
    pub fn simulation(&self) -> Result<SimulationConfig> {
        let config = SimulationConfigBuilder::new()
            .recursion_bound(self.recursion_bound)
            .num_participants(self.num_participants)
            .initial_order(self.order)
            .settle(self.settle)
            .quiescence(Duration::from_millis(self.quiescence_ms))
            .initial_timeout(Duration::from_millis(self.initial_timeout_ms))
            .build()?;
        Ok(config)
    }

    /// Fixed assignment if one was given, random draws otherwise
    pub fn traitor_selector(&self) -> Result<Box<dyn TraitorSelector>> {
        if self.commander_traitor || self.traitors.is_some() {
            let fixed = FixedTraitors::new(
                self.commander_traitor,
                self.traitors.iter().flatten().copied(),
            );
            fixed.check_ids(self.num_participants)?;
            return Ok(Box::new(fixed));
        }

        let random = match self.seed {
            Some(seed) => RandomTraitors::seeded(seed, self.traitor_probability)?,
            None => RandomTraitors::new(self.traitor_probability)?,
        };
        Ok(Box::new(random))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "recursion_bound": 2, "num_participants": 7, "order": "R", "settle": "expected-count", "traitors": [3] }}"#
        )
        .unwrap();

        let config = SimulatorConfig::load(file.path()).unwrap();
        assert_eq!(config.recursion_bound, 2);
        assert_eq!(config.num_participants, 7);
        assert_eq!(config.order, Order::Retreat);
        assert_eq!(config.settle, SettleStrategy::ExpectedCount);
        assert_eq!(config.traitors, Some(vec![3]));
        assert_eq!(config.quiescence_ms, 2000);
    }

    #[test]
    fn test_load_rejects_bad_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "order": "X" }}"#).unwrap();
        assert!(SimulatorConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_simulation_validates_bound() {
        let config = SimulatorConfig {
            recursion_bound: 5,
            num_participants: 6,
            ..Default::default()
        };
        let err = config.simulation().unwrap_err();
        assert!(err.to_string().contains("recursion bound 5"));
    }

    #[test]
    fn test_fixed_traitors_checked() {
        let config = SimulatorConfig {
            num_participants: 4,
            traitors: Some(vec![4]),
            ..Default::default()
        };
        assert!(config.traitor_selector().is_err());

        let config = SimulatorConfig {
            commander_traitor: true,
            ..Default::default()
        };
        let mut selector = config.traitor_selector().unwrap();
        assert!(selector.commander_is_traitor());
        assert!(!selector.lieutenant_is_traitor(1));
    }

    #[test]
    fn test_random_traitors_need_valid_probability() {
        let config = SimulatorConfig {
            traitor_probability: 2.0,
            ..Default::default()
        };
        assert!(config.traitor_selector().is_err());
    }
}
