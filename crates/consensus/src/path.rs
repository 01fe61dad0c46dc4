//! Relay paths and their compact token encoding
//!
//! A path lists the participants a message has passed through, commander
//! first. On the wire each hop is the borsh encoding of its `u16` id, so the
//! token of a relayed message is always its parent's token plus two bytes.

use crate::error::ProtocolError;
use crate::types::{ParticipantId, COMMANDER};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::Serialize;
use std::fmt;

/// Bytes per encoded hop
const HOP_WIDTH: usize = std::mem::size_of::<ParticipantId>();

/// Ordered sequence of participant ids, originator first
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Path(Vec<ParticipantId>);

impl Path {
    /// Path of a message straight from the commander
    pub fn commander() -> Self {
        Self(vec![COMMANDER])
    }

    pub fn from_hops(hops: Vec<ParticipantId>) -> Self {
        Self(hops)
    }

    pub fn hops(&self) -> &[ParticipantId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.0.contains(&id)
    }

    /// This path with `hop` appended
    pub fn extended(&self, hop: ParticipantId) -> Self {
        let mut hops = Vec::with_capacity(self.0.len() + 1);
        hops.extend_from_slice(&self.0);
        hops.push(hop);
        Self(hops)
    }

    /// This path without its last hop, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) if !rest.is_empty() => Some(Self(rest.to_vec())),
            _ => None,
        }
    }

    /// Check the structural invariants of a path received by `receiver`.
    ///
    /// A well-formed path starts at the commander, names only participants in
    /// `[0, num_participants)`, never repeats a hop, is at most `max_len`
    /// long and does not already pass through the receiver.
    pub fn validate(
        &self,
        receiver: ParticipantId,
        num_participants: usize,
        max_len: usize,
    ) -> Result<(), ProtocolError> {
        if self.0.first() != Some(&COMMANDER) {
            return Err(ProtocolError::MissingCommanderHop);
        }
        if self.0.len() > max_len {
            return Err(ProtocolError::PathTooLong {
                len: self.0.len(),
                max: max_len,
            });
        }
        for (i, &hop) in self.0.iter().enumerate() {
            if usize::from(hop) >= num_participants {
                return Err(ProtocolError::UnknownParticipant(hop));
            }
            if self.0[..i].contains(&hop) {
                return Err(ProtocolError::RepeatedHop(hop));
            }
        }
        if self.contains(receiver) {
            return Err(ProtocolError::ReturnedToSender(receiver));
        }
        Ok(())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, hop) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", hop)?;
        }
        f.write_str("]")
    }
}

/// Compact wire form of a [`Path`]
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PathToken(Vec<u8>);

impl PathToken {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Token of the path extended by `hop`
    pub fn extended(&self, hop: ParticipantId) -> Self {
        let mut bytes = Vec::with_capacity(self.0.len() + HOP_WIDTH);
        bytes.extend_from_slice(&self.0);
        push_hop(&mut bytes, hop);
        Self(bytes)
    }
}

fn push_hop(bytes: &mut Vec<u8>, hop: ParticipantId) {
    BorshSerialize::serialize(&hop, bytes).expect("writing a hop into a Vec should not fail");
}

/// Encode a path into its token
pub fn encode(path: &Path) -> PathToken {
    let mut bytes = Vec::with_capacity(path.len() * HOP_WIDTH);
    for &hop in path.hops() {
        push_hop(&mut bytes, hop);
    }
    PathToken(bytes)
}

/// Decode a token back into the path it was encoded from
pub fn decode(token: &PathToken) -> Result<Path, ProtocolError> {
    let len = token.0.len();
    if len % HOP_WIDTH != 0 {
        return Err(ProtocolError::MalformedToken { len });
    }

    let mut rest = token.0.as_slice();
    let mut hops = Vec::with_capacity(len / HOP_WIDTH);
    while !rest.is_empty() {
        let hop = <ParticipantId as BorshDeserialize>::deserialize(&mut rest)
            .map_err(|_| ProtocolError::MalformedToken { len })?;
        hops.push(hop);
    }
    Ok(Path(hops))
}
