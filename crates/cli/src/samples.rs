//! Demonstration migrations registered by the worker.
//!
//! Both operate on `settings.json` inside the worker's data directory and are
//! safe to run more than once.

use async_trait::async_trait;
use migrator_core::{ensure_not_cancelled, Migration, MigrationFault};
use orchestrator::{Registry, StaticSource};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const SOURCE_NAME: &str = "samples";
const SETTINGS_FILE: &str = "settings.json";

/// Version 1: create the settings document.
pub struct CreateSettings {
    data_dir: PathBuf,
}

/// Version 2: add the `telemetry` flag to the settings document.
pub struct AddTelemetryFlag {
    data_dir: PathBuf,
}

#[async_trait]
impl Migration for CreateSettings {
    async fn execute(&self, cancellation: &CancellationToken) -> Result<(), MigrationFault> {
        ensure_not_cancelled(cancellation)?;
        let path = self.data_dir.join(SETTINGS_FILE);
        if read_settings(&path).await?.is_some() {
            tracing::info!(path = %path.display(), "Settings already exist");
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| MigrationFault::failed(format!("cannot create data dir: {e}")))?;
        write_settings(&path, &json!({ "schema": 1 })).await
    }
}

#[async_trait]
impl Migration for AddTelemetryFlag {
    async fn execute(&self, cancellation: &CancellationToken) -> Result<(), MigrationFault> {
        ensure_not_cancelled(cancellation)?;
        let path = self.data_dir.join(SETTINGS_FILE);
        let Some(mut settings) = read_settings(&path).await? else {
            return Err(MigrationFault::failed("settings.json does not exist"));
        };

        let object = settings
            .as_object_mut()
            .ok_or_else(|| MigrationFault::failed("settings.json is not an object"))?;
        object.entry("telemetry").or_insert(Value::Bool(false));
        object.insert("schema".to_string(), json!(2));
        write_settings(&path, &settings).await
    }
}

async fn read_settings(path: &Path) -> Result<Option<Value>, MigrationFault> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| MigrationFault::failed(format!("invalid {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MigrationFault::failed(format!("cannot read {}: {e}", path.display()))),
    }
}

async fn write_settings(path: &Path, settings: &Value) -> Result<(), MigrationFault> {
    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| MigrationFault::failed(e.to_string()))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| MigrationFault::failed(format!("cannot write {}: {e}", path.display())))
}

/// Registry holding the sample migrations, operating on `data_dir`.
pub fn registry(data_dir: &Path) -> Registry {
    let create_dir = data_dir.to_path_buf();
    let telemetry_dir = data_dir.to_path_buf();

    Registry::new().with_source(
        StaticSource::new(SOURCE_NAME)
            .migration(
                "samples::AddTelemetryFlag",
                2,
                Arc::new(move || -> Box<dyn Migration> {
                    Box::new(AddTelemetryFlag {
                        data_dir: telemetry_dir.clone(),
                    })
                }),
            )
            .migration(
                "samples::CreateSettings",
                1,
                Arc::new(move || -> Box<dyn Migration> {
                    Box::new(CreateSettings {
                        data_dir: create_dir.clone(),
                    })
                }),
            ),
    )
}
