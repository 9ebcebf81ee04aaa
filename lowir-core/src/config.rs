use std::env;

/// Set to anything but `0` or the empty string to turn off deduplication.
pub const DISABLE_CSE_ENV: &str = "LOWIR_DISABLE_CSE";

/// Construction-time options of a [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Fold structurally equal nodes into one on insert.
    pub cse: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { cse: true }
    }
}

impl GraphConfig {
    /// Defaults, overridden by the environment.
    pub fn from_env() -> Self {
        let disabled = env::var(DISABLE_CSE_ENV).is_ok_and(|v| !v.is_empty() && v != "0");
        Self { cse: !disabled }
    }

    pub fn with_cse(mut self, cse: bool) -> Self {
        self.cse = cse;
        self
    }
}
