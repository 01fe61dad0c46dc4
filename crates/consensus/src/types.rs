//! Core types for orders, relay messages and round results

use crate::error::{ConfigError, ProtocolError};
use crate::path::{self, Path, PathToken};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Participant identifier. The commander is always 0, lieutenants are 1..N-1.
pub type ParticipantId = u16;

/// Id reserved for the commander
pub const COMMANDER: ParticipantId = 0;

/// The order a general can give or relay
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum Order {
    #[serde(rename = "A")]
    Affirm,
    #[serde(rename = "R")]
    Retreat,
}

impl Order {
    /// The opposite order
    pub fn flipped(self) -> Self {
        match self {
            Order::Affirm => Order::Retreat,
            Order::Retreat => Order::Affirm,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Affirm => f.write_str("A"),
            Order::Retreat => f.write_str("R"),
        }
    }
}

impl FromStr for Order {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" | "AFFIRM" | "ATTACK" => Ok(Order::Affirm),
            "R" | "RETREAT" => Ok(Order::Retreat),
            _ => Err(ConfigError::InvalidOrder(s.to_string())),
        }
    }
}

/// An order together with the path it travelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayMessage {
    pub order: Order,
    pub path: Path,
}

/// Wire layout of a relay message: the order and the encoded path token
#[derive(BorshSerialize, BorshDeserialize)]
struct RelayFrame {
    order: Order,
    token: PathToken,
}

impl RelayMessage {
    /// The commander's order as delivered to a lieutenant
    pub fn from_commander(order: Order) -> Self {
        Self {
            order,
            path: Path::commander(),
        }
    }

    /// The message `relayer` sends on, carrying `order`
    pub fn relayed(&self, order: Order, relayer: ParticipantId) -> Self {
        Self {
            order,
            path: self.path.extended(relayer),
        }
    }

    /// Serialize for delivery to an inbox
    pub fn to_bytes(&self) -> Vec<u8> {
        let frame = RelayFrame {
            order: self.order,
            token: path::encode(&self.path),
        };
        borsh::to_vec(&frame).expect("RelayMessage serialization should not fail")
    }

    /// Deserialize a frame taken from an inbox
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let frame: RelayFrame =
            borsh::from_slice(data).map_err(|e| ProtocolError::Frame(e.to_string()))?;
        Ok(Self {
            order: frame.order,
            path: path::decode(&frame.token)?,
        })
    }
}

/// Every message one lieutenant received, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReceivedLog(Vec<RelayMessage>);

impl ReceivedLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, msg: RelayMessage) {
        self.0.push(msg);
    }

    pub fn messages(&self) -> &[RelayMessage] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The message received directly from the commander
    pub fn commander_message(&self) -> Option<&RelayMessage> {
        self.0.iter().find(|m| m.path.len() == 1)
    }
}

impl From<Vec<RelayMessage>> for ReceivedLog {
    fn from(messages: Vec<RelayMessage>) -> Self {
        Self(messages)
    }
}

/// Relay counters for one lieutenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub messages_received: u64,
    pub messages_relayed: u64,
    pub messages_corrupted: u64,
}

/// What a lieutenant actor hands back once it has settled
#[derive(Debug, Clone)]
pub struct LieutenantReport {
    pub lieutenant: ParticipantId,
    pub is_traitor: bool,
    pub log: ReceivedLog,
    pub stats: RelayStats,
}

/// Final decision of one lieutenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub lieutenant: ParticipantId,
    pub is_traitor: bool,
    pub order: Order,
}

/// Result of one simulation round
#[derive(Debug, Clone, Serialize)]
pub struct RoundOutcome {
    pub recursion_bound: usize,
    pub num_participants: usize,
    pub commander_order: Order,
    pub commander_traitor: bool,
    /// Sorted by lieutenant id
    pub decisions: Vec<Decision>,
    pub stats: RelayStats,
    /// Settled lieutenant reports, sorted by lieutenant id
    #[serde(skip)]
    pub reports: Vec<LieutenantReport>,
}

impl RoundOutcome {
    /// Ids of the traitorous lieutenants
    pub fn traitors(&self) -> Vec<ParticipantId> {
        self.decisions
            .iter()
            .filter(|d| d.is_traitor)
            .map(|d| d.lieutenant)
            .collect()
    }

    pub fn decision(&self, lieutenant: ParticipantId) -> Option<Order> {
        self.decisions
            .iter()
            .find(|d| d.lieutenant == lieutenant)
            .map(|d| d.order)
    }

    /// The order every loyal lieutenant decided on, if they agree
    pub fn loyal_agreement(&self) -> Option<Order> {
        let mut loyal = self.decisions.iter().filter(|d| !d.is_traitor);
        let first = loyal.next()?.order;
        loyal.all(|d| d.order == first).then_some(first)
    }

    /// With a loyal commander, every loyal lieutenant must follow its order
    pub fn validity_holds(&self) -> bool {
        self.commander_traitor
            || self
                .decisions
                .iter()
                .filter(|d| !d.is_traitor)
                .all(|d| d.order == self.commander_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_parse_and_display() {
        assert_eq!("A".parse::<Order>().unwrap(), Order::Affirm);
        assert_eq!("r".parse::<Order>().unwrap(), Order::Retreat);
        assert_eq!("retreat".parse::<Order>().unwrap(), Order::Retreat);
        assert_eq!(
            "X".parse::<Order>(),
            Err(ConfigError::InvalidOrder("X".to_string()))
        );
        assert_eq!(Order::Affirm.to_string(), "A");
        assert_eq!(Order::Affirm.flipped(), Order::Retreat);
    }

    #[test]
    fn test_frame_round_trip() {
        let msg = RelayMessage::from_commander(Order::Retreat)
            .relayed(Order::Affirm, 3)
            .relayed(Order::Affirm, 12);
        let decoded = RelayMessage::from_bytes(&msg.to_bytes()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.path.hops(), &[0, 3, 12]);
    }

    #[test]
    fn test_garbled_frame() {
        let mut bytes = RelayMessage::from_commander(Order::Affirm).to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            RelayMessage::from_bytes(&bytes),
            Err(ProtocolError::Frame(_))
        ));
    }

    #[test]
    fn test_odd_token_in_frame() {
        // order tag, then a 3-byte token
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 1]);
        assert_eq!(
            RelayMessage::from_bytes(&bytes),
            Err(ProtocolError::MalformedToken { len: 3 })
        );
    }

    fn outcome(commander_traitor: bool, decisions: &[(u16, bool, Order)]) -> RoundOutcome {
        RoundOutcome {
            recursion_bound: 1,
            num_participants: decisions.len() + 1,
            commander_order: Order::Affirm,
            commander_traitor,
            decisions: decisions
                .iter()
                .map(|&(lieutenant, is_traitor, order)| Decision {
                    lieutenant,
                    is_traitor,
                    order,
                })
                .collect(),
            stats: RelayStats::default(),
            reports: Vec::new(),
        }
    }

    #[test]
    fn test_loyal_agreement_ignores_traitors() {
        let o = outcome(
            false,
            &[
                (1, false, Order::Affirm),
                (2, true, Order::Retreat),
                (3, false, Order::Affirm),
            ],
        );
        assert_eq!(o.loyal_agreement(), Some(Order::Affirm));
        assert!(o.validity_holds());
        assert_eq!(o.traitors(), vec![2]);
    }

    #[test]
    fn test_disagreement() {
        let o = outcome(
            false,
            &[(1, false, Order::Affirm), (2, false, Order::Retreat)],
        );
        assert_eq!(o.loyal_agreement(), None);
        assert!(!o.validity_holds());
    }
}
