//! Traitor selection and corruption policies
//!
//! Who lies, and how, is injected into the coordinator so rounds can be
//! reproduced in tests. Randomness stays at the edge in [`RandomTraitors`].

use crate::error::ConfigError;
use crate::types::{Order, ParticipantId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

/// Default chance that any single general is a traitor
pub const DEFAULT_TRAITOR_PROBABILITY: f64 = 1.0 / 3.0;

/// Decides which generals are traitors for a round
pub trait TraitorSelector {
    fn commander_is_traitor(&mut self) -> bool;
    fn lieutenant_is_traitor(&mut self, id: ParticipantId) -> bool;
}

/// How a traitor alters the order it passes on
pub trait CorruptionPolicy: Send + Sync {
    /// Order a traitor sends to `recipient` in place of `order`
    fn corrupt(&self, order: Order, recipient: ParticipantId) -> Order;
}

/// Everyone is loyal
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTraitors;

impl TraitorSelector for NoTraitors {
    fn commander_is_traitor(&mut self) -> bool {
        false
    }

    fn lieutenant_is_traitor(&mut self, _id: ParticipantId) -> bool {
        false
    }
}

/// An explicit traitor assignment
#[derive(Debug, Clone, Default)]
pub struct FixedTraitors {
    commander: bool,
    lieutenants: BTreeSet<ParticipantId>,
}

impl FixedTraitors {
    pub fn new(commander: bool, lieutenants: impl IntoIterator<Item = ParticipantId>) -> Self {
        Self {
            commander,
            lieutenants: lieutenants.into_iter().collect(),
        }
    }

    /// Reject ids that are not lieutenants of a round with `num_participants`
    pub fn check_ids(&self, num_participants: usize) -> Result<(), ConfigError> {
        let max = num_participants.saturating_sub(1);
        match self
            .lieutenants
            .iter()
            .find(|&&id| id == 0 || usize::from(id) > max)
        {
            Some(&id) => Err(ConfigError::UnknownLieutenant { id, max }),
            None => Ok(()),
        }
    }
}

impl TraitorSelector for FixedTraitors {
    fn commander_is_traitor(&mut self) -> bool {
        self.commander
    }

    fn lieutenant_is_traitor(&mut self, id: ParticipantId) -> bool {
        self.lieutenants.contains(&id)
    }
}

/// Each general turns traitor independently with a fixed probability
#[derive(Debug, Clone)]
pub struct RandomTraitors {
    rng: StdRng,
    probability: f64,
}

impl RandomTraitors {
    pub fn new(probability: f64) -> Result<Self, ConfigError> {
        Self::with_rng(StdRng::from_entropy(), probability)
    }

    /// Reproducible selection from a fixed seed
    pub fn seeded(seed: u64, probability: f64) -> Result<Self, ConfigError> {
        Self::with_rng(StdRng::seed_from_u64(seed), probability)
    }

    fn with_rng(rng: StdRng, probability: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::InvalidTraitorProbability(probability));
        }
        Ok(Self { rng, probability })
    }
}

impl TraitorSelector for RandomTraitors {
    fn commander_is_traitor(&mut self) -> bool {
        self.rng.gen_bool(self.probability)
    }

    fn lieutenant_is_traitor(&mut self, _id: ParticipantId) -> bool {
        self.rng.gen_bool(self.probability)
    }
}

/// Lie only to even-numbered recipients
#[derive(Debug, Clone, Copy, Default)]
pub struct EvenRecipientFlip;

impl CorruptionPolicy for EvenRecipientFlip {
    fn corrupt(&self, order: Order, recipient: ParticipantId) -> Order {
        if recipient % 2 == 0 {
            order.flipped()
        } else {
            order
        }
    }
}

/// Lie to everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct FlipAll;

impl CorruptionPolicy for FlipAll {
    fn corrupt(&self, order: Order, _recipient: ParticipantId) -> Order {
        order.flipped()
    }
}
