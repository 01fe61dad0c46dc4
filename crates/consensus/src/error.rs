//! Consensus errors

use crate::types::ParticipantId;
use thiserror::Error;

/// Invalid simulation parameters, detected before any actor starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("recursion bound {bound} must be less than num_participants - 1 (num_participants = {participants})")]
    RecursionBoundTooLarge { bound: usize, participants: usize },

    #[error("at least 2 participants are required, got {0}")]
    TooFewParticipants(usize),

    #[error("participant ids are 16-bit, {0} participants do not fit")]
    TooManyParticipants(usize),

    #[error("worst-case inbox size exceeds {max} messages for this bound and participant count")]
    InboxCapacityExceeded { max: usize },

    #[error("traitor probability must lie in [0, 1], got {0}")]
    InvalidTraitorProbability(f64),

    #[error("invalid order {0:?}, expected A or R")]
    InvalidOrder(String),

    #[error("lieutenant {id} does not exist (valid ids are 1..={max})")]
    UnknownLieutenant { id: ParticipantId, max: usize },
}

/// A relay frame or path a lieutenant cannot reason about. Fatal for the round.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed path token ({len} bytes)")]
    MalformedToken { len: usize },

    #[error("undecodable relay frame: {0}")]
    Frame(String),

    #[error("path does not start at the commander")]
    MissingCommanderHop,

    #[error("participant {0} appears twice in path")]
    RepeatedHop(ParticipantId),

    #[error("path of length {len} exceeds the recursion limit of {max}")]
    PathTooLong { len: usize, max: usize },

    #[error("path names unknown participant {0}")]
    UnknownParticipant(ParticipantId),

    #[error("message relayed back to lieutenant {0}, which is already on its path")]
    ReturnedToSender(ParticipantId),

    #[error("inbox of lieutenant {0} is full")]
    InboxFull(ParticipantId),
}

/// Errors surfaced by a simulation round
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("lieutenant {lieutenant}: {source}")]
    Protocol {
        lieutenant: ParticipantId,
        #[source]
        source: ProtocolError,
    },

    #[error("lieutenant actor failed: {0}")]
    ActorFailed(String),
}
