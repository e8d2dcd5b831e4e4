//! Configuration for a world.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for a [`World`](crate::World).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Name given to the root entity.
    pub root_name: String,

    /// Upper bound on commit rounds within one `apply()`.
    ///
    /// Each round drains what the previous round's callbacks staged. `None`
    /// lets a commit run until nothing is left to drain.
    pub max_commit_rounds: Option<u32>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            root_name: "root".to_string(),
            max_commit_rounds: None,
        }
    }
}

impl WorldConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the root entity name.
    #[must_use]
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    /// Builder method to bound commit rounds.
    #[must_use]
    pub fn with_max_commit_rounds(mut self, limit: u32) -> Self {
        self.max_commit_rounds = Some(limit);
        self
    }

    /// Builder method to let commits run unbounded.
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.max_commit_rounds = None;
        self
    }
}
