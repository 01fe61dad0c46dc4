//! OM(m) - Oral Messages consensus for the Byzantine Generals Problem
//!
//! Architecture:
//! - The coordinator seeds the commander's order into every lieutenant's inbox
//! - One relay actor per lieutenant floods the order along unvisited paths,
//!   up to the recursion bound m, with traitors corrupting what they pass on
//! - Once traffic settles each lieutenant's log is folded into a decision by
//!   recursive majority vote over the relay tree

pub mod config;
pub mod coordinator;
pub mod error;
pub mod path;
pub mod policy;
pub mod relay;
pub mod types;
pub mod vote;

pub use config::{SettleStrategy, SimulationConfig, SimulationConfigBuilder};
pub use coordinator::Coordinator;
pub use error::{ConfigError, ProtocolError, SimulationError};
pub use path::{Path, PathToken};
pub use policy::{
    CorruptionPolicy, EvenRecipientFlip, FixedTraitors, FlipAll, NoTraitors, RandomTraitors,
    TraitorSelector,
};
pub use relay::{Peers, RelayEngine};
pub use types::*;
pub use vote::{decide, get_vote, VoteTree};
