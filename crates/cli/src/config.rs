use anyhow::{Context, Result};
use orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use substrate::SubstrateConfig;

pub const MIGRATOR_DIR: &str = ".migrator";
pub const CONFIG_FILE: &str = "config.toml";
pub const DATA_DIR: &str = "data";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub orchestrator: OrchestratorConfig,
    pub substrate: SubstrateConfig,
}

impl WorkerConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator::TieBreak;
    use substrate::RetryPolicy;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config, WorkerConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MIGRATOR_DIR).join(CONFIG_FILE);

        let mut config = WorkerConfig::default();
        config.orchestrator = config.orchestrator.with_tie_break(TieBreak::Reject);
        config.substrate = config.substrate.with_retry(RetryPolicy::immediate(5));
        config.save(&path).await.unwrap();

        assert_eq!(WorkerConfig::load(&path).await.unwrap(), config);
    }

    #[test]
    fn test_partial_toml() {
        let config: WorkerConfig = toml::from_str(
            r#"
            [orchestrator]
            scope = ["samples"]
            empty_catalog = "fail"

            [substrate]
            task_queue = "upgrades"

            [substrate.retry]
            maximum_attempts = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.scope.sources(), ["samples".to_string()]);
        assert_eq!(config.substrate.task_queue, "upgrades");
        assert_eq!(config.substrate.namespace, "default");
        assert_eq!(config.substrate.retry.maximum_attempts, Some(10));
        assert_eq!(config.substrate.retry.initial_interval_ms, 1000);
    }
}
