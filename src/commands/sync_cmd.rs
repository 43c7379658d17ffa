//! Sync CLI commands: a single run against the configured server.

use clap::{Args, Subcommand};
use fhir_sync_core::{DataSourceError, LocalChangeStore, SyncJob, SyncState};
use futures::StreamExt;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{init_db, SqliteStore};
use crate::remote::HttpDataSource;

/// Synchronize with the FHIR server once
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and local state
    Status,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(config).await,
            Some(SyncSubcommand::Status) => self.status(config).await,
        }
    }

    async fn sync(&self, config: &Config) -> Result<(), SyncCommandError> {
        let (job, _store) = build_job(config).await?;
        let mut states = job.subscribe();

        println!("Syncing with {}...", server_url(config)?);
        println!();

        job.run();
        let mut last = SyncState::Nothing;
        while let Some(state) = states.next().await {
            print_state(&state);
            if state.is_terminal() {
                last = state;
                break;
            }
        }
        job.close();

        println!();
        match last {
            SyncState::Error { exceptions, .. } => Err(SyncCommandError::Failed(exceptions.len())),
            _ => {
                println!("Sync complete.");
                Ok(())
            }
        }
    }

    async fn status(&self, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        if !config.sync.is_configured() {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"https://fhir.example.org/baseR4\"");
            println!("    params:");
            println!("      Patient: {{}}");
            println!();
            println!("Or set environment variable:");
            println!("  FHIRSYNC_SERVER_URL");
            return Ok(());
        }

        println!("Server:  {}", server_url(config)?);
        println!("Poll:    every {} ms", config.sync.poll_period_ms);
        println!();

        let store = SqliteStore::new(init_db(&config.database_path.value).await?);
        let pending = store
            .get_all_local_changes()
            .await
            .map_err(|e| SyncCommandError::Store(e.to_string()))?;
        println!("Pending local changes: {}", pending.len());
        println!();

        if config.sync.params.is_empty() {
            println!("No resource types configured for download.");
        }
        for (resource_type, params) in config.sync.params.iter() {
            let count = store.count_resources(resource_type).await?;
            println!(
                "  {:<20} {:>6} stored  ({} param{})",
                resource_type.as_str(),
                count,
                params.len(),
                if params.len() == 1 { "" } else { "s" }
            );
        }

        Ok(())
    }
}

fn server_url(config: &Config) -> Result<&str, SyncCommandError> {
    config
        .sync
        .server_url
        .as_deref()
        .ok_or(SyncCommandError::NotConfigured)
}

/// Wires the configured store and server into a new job on the current
/// runtime.
pub(crate) async fn build_job(
    config: &Config,
) -> Result<(SyncJob, Arc<SqliteStore>), SyncCommandError> {
    let data_source = Arc::new(HttpDataSource::new(server_url(config)?)?);
    let store = Arc::new(SqliteStore::new(
        init_db(&config.database_path.value).await?,
    ));

    let job = SyncJob::new(
        tokio::runtime::Handle::current(),
        store.clone(),
        data_source,
        config.sync.params.clone(),
    );
    Ok((job, store))
}

pub(crate) fn print_state(state: &SyncState) {
    match state {
        SyncState::Nothing => {}
        SyncState::Started => println!("  … started"),
        SyncState::InProgress => println!("  … in progress"),
        SyncState::Success {
            last_sync_timestamp,
        } => println!("  ✓ success ({})", last_sync_timestamp.to_rfc3339()),
        SyncState::Error {
            last_sync_timestamp,
            exceptions,
        } => {
            println!("  ✗ failed ({})", last_sync_timestamp.to_rfc3339());
            for ex in exceptions {
                println!("      - {}", ex);
            }
        }
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    NotConfigured,
    Database(sqlx::Error),
    Store(String),
    DataSource(DataSourceError),
    /// The pass finished with this many failures
    Failed(usize),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::NotConfigured => write!(
                f,
                "Sync not configured. Add sync.server_url to config or set FHIRSYNC_SERVER_URL."
            ),
            SyncCommandError::Database(e) => write!(f, "Database error: {}", e),
            SyncCommandError::Store(e) => write!(f, "Local store error: {}", e),
            SyncCommandError::DataSource(e) => write!(f, "{}", e),
            SyncCommandError::Failed(n) => write!(
                f,
                "Sync finished with {} failure{}",
                n,
                if *n == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Database(e) => Some(e),
            SyncCommandError::DataSource(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for SyncCommandError {
    fn from(e: sqlx::Error) -> Self {
        SyncCommandError::Database(e)
    }
}

impl From<DataSourceError> for SyncCommandError {
    fn from(e: DataSourceError) -> Self {
        SyncCommandError::DataSource(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, ConfigValue, SyncConfig};
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path, server_url: Option<&str>) -> Config {
        Config {
            database_path: ConfigValue::new(dir.join("sync.db"), ConfigSource::Default),
            config_file: None,
            sync: SyncConfig {
                server_url: server_url.map(str::to_string),
                ..SyncConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn test_build_job_requires_server() {
        let temp_dir = tempdir().unwrap();
        let config = config_in(temp_dir.path(), None);

        assert!(matches!(
            build_job(&config).await,
            Err(SyncCommandError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_build_job_starts_idle() {
        let temp_dir = tempdir().unwrap();
        let config = config_in(temp_dir.path(), Some("http://127.0.0.1:1/fhir"));

        let (job, _store) = build_job(&config).await.unwrap();
        assert_eq!(job.state().name(), "nothing");
        job.close();
        assert!(job.is_closed());
    }

    #[tokio::test]
    async fn test_job_syncs_sqlite_store_against_http_server() {
        use axum::routing::{get, put};
        use axum::{Json, Router};
        use fhir_sync_core::{LocalChange, LocalChangeType, ParamMap, ResourceType, SyncParams};
        use serde_json::json;

        let app = Router::new()
            .route(
                "/Patient",
                get(|| async {
                    Json(json!({
                        "resourceType": "Bundle",
                        "type": "searchset",
                        "entry": [
                            {"resource": {"resourceType": "Patient", "id": "a",
                                          "meta": {"lastUpdated": "2021-05-01T00:00:00Z"}}},
                            {"resource": {"resourceType": "Patient", "id": "b"}}
                        ]
                    }))
                }),
            )
            .route("/Patient/{id}", put(|| async { "{}" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let temp_dir = tempdir().unwrap();
        let mut config = config_in(temp_dir.path(), Some(&format!("http://{}", addr)));
        let patient = ResourceType::new("Patient").unwrap();
        config.sync.params = SyncParams::new().with(patient.clone(), ParamMap::new());

        let (job, store) = build_job(&config).await.unwrap();
        store
            .add_local_change(
                &LocalChange::new(patient.clone(), "new", LocalChangeType::Insert)
                    .with_payload("{}"),
            )
            .await
            .unwrap();

        let mut states = job.subscribe();
        job.run();
        let mut seen = Vec::new();
        while let Some(state) = states.next().await {
            let done = state.is_terminal();
            seen.push(state);
            if done {
                break;
            }
        }
        job.close();

        let names: Vec<&str> = seen.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["nothing", "started", "in_progress", "success"]);
        assert_eq!(store.count_resources(&patient).await.unwrap(), 2);
        assert!(store.get_all_local_changes().await.unwrap().is_empty());
        assert_eq!(
            store.last_updated(&patient).await.unwrap().as_deref(),
            Some("2021-05-01T00:00:00.000000Z")
        );
    }

    #[test]
    fn test_failed_error_message() {
        assert_eq!(
            SyncCommandError::Failed(2).to_string(),
            "Sync finished with 2 failures"
        );
    }
}
