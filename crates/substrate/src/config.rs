use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const DEFAULT_TASK_QUEUE: &str = "migration";
pub const DEFAULT_TARGET_HOST: &str = "localhost:7233";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:.migrator/history.db";

/// Connection and retry settings of the substrate.
///
/// `task_queue`, `target_host`, `namespace` and `build_id` identify the worker
/// towards a remote substrate. The local substrate only logs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    pub task_queue: String,
    pub target_host: String,
    pub namespace: String,
    pub build_id: Option<String>,
    pub database_url: String,
    pub retry: RetryPolicy,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
            target_host: DEFAULT_TARGET_HOST.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            build_id: None,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl SubstrateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = task_queue.into();
        self
    }

    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }

    pub fn with_database_url(mut self, database_url: impl Into<String>) -> Self {
        self.database_url = database_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
