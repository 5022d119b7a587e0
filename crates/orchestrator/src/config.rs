use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::catalog::DiscoveryScope;
use crate::sequencer::TieBreak;

pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 300_000;

/// What a unit run does when its catalog turns out to be empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyCatalogPolicy {
    /// Log a warning and succeed without running anything.
    #[default]
    Warn,
    /// Fail the unit run.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Registration sources to scan; empty scans all of them.
    pub scope: DiscoveryScope,
    /// Per-attempt limit of the one-shot discovery call.
    pub discovery_timeout_ms: u64,
    pub tie_break: TieBreak,
    pub empty_catalog: EmptyCatalogPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scope: DiscoveryScope::all(),
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            tie_break: TieBreak::default(),
            empty_catalog: EmptyCatalogPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: DiscoveryScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_empty_catalog(mut self, policy: EmptyCatalogPolicy) -> Self {
        self.empty_catalog = policy;
        self
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}
