// Event Catalog - registry of event kinds and emission weights
// Draws are weighted and depend on the injected RNG state, so a seeded
// run reproduces the same kind sequence.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The seven user lifecycle activities this system simulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Signup,
    DemographicUpdate,
    ApplicationOpen,
    ApplicationReject,
    ApplicationApprove,
    Deposit,
    Withdraw,
}

impl EventKind {
    /// Stable wire name, used as the `event` tag in every payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Signup => "user sign up",
            EventKind::DemographicUpdate => "user update demographic",
            EventKind::ApplicationOpen => "user application open",
            EventKind::ApplicationReject => "user application reject",
            EventKind::ApplicationApprove => "user application approve",
            EventKind::Deposit => "user deposit",
            EventKind::Withdraw => "user withdraw",
        }
    }

    /// All kinds, in catalog order.
    pub const ALL: [EventKind; 7] = [
        EventKind::Signup,
        EventKind::DemographicUpdate,
        EventKind::ApplicationOpen,
        EventKind::ApplicationReject,
        EventKind::ApplicationApprove,
        EventKind::Deposit,
        EventKind::Withdraw,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default relative emission weights, in catalog order.
pub const DEFAULT_WEIGHTS: [u32; 7] = [35, 2, 17, 5, 13, 20, 8];

/// Fixed ordered registry of (kind, weight) pairs.
///
/// `pick` draws one kind with probability proportional to its weight.
/// There are no error conditions; the catalog always returns a kind.
pub struct EventCatalog {
    entries: Vec<(EventKind, u32)>,
    index: WeightedIndex<u32>,
}

impl EventCatalog {
    /// Catalog with the default weights.
    pub fn new() -> Self {
        let entries = EventKind::ALL
            .iter()
            .copied()
            .zip(DEFAULT_WEIGHTS.iter().copied())
            .collect();
        Self::with_weights(entries)
    }

    /// Catalog with custom weights. A zero weight disables a kind;
    /// at least one weight must be positive.
    pub fn with_weights(entries: Vec<(EventKind, u32)>) -> Self {
        let index = WeightedIndex::new(entries.iter().map(|(_, w)| *w))
            .expect("catalog weights must contain at least one positive entry");
        EventCatalog { entries, index }
    }

    /// Draw one event kind, weighted.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> EventKind {
        self.entries[self.index.sample(rng)].0
    }

    /// The registered (kind, weight) pairs, in order.
    pub fn entries(&self) -> &[(EventKind, u32)] {
        &self.entries
    }
}

impl Default for EventCatalog {
    fn default() -> Self {
        Self::new()
    }
}
