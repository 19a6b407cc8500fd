//! Configuration loading for Jobflow.
//!
//! Reads `config.toml` from the data directory (`~/.jobflow/` in production)
//! and deserializes it into [`JobflowConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use jobflow_types::config::JobflowConfig;

use crate::sqlite::pool::database_url_for;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "JOBFLOW_DATA_DIR";

/// Resolve the data directory.
///
/// `JOBFLOW_DATA_DIR` wins, then `~/.jobflow`, then `./.jobflow`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".jobflow");
    }
    PathBuf::from(".jobflow")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: returns [`JobflowConfig::default()`].
/// - Unreadable or unparseable file: logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> JobflowConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return JobflowConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return JobflowConfig::default();
        }
    };

    match toml::from_str::<JobflowConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            JobflowConfig::default()
        }
    }
}

/// The database URL to connect to: the configured one, else `{data_dir}/jobflow.db`.
pub fn database_url(config: &JobflowConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| database_url_for(data_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_types::config::QueueBackend;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert!(config.database_url.is_none());
        assert_eq!(config.orchestrator.poll_interval_secs, 5);
        assert_eq!(config.queue.backend, QueueBackend::Memory);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
database_url = "sqlite:///var/lib/jobflow/jobs.db"

[orchestrator]
poll_interval_secs = 1
max_retries = 2

[queue]
backend = "sqlite"
visibility_timeout_secs = 60

[tools]
request_timeout_secs = 15
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(
            config.database_url.as_deref(),
            Some("sqlite:///var/lib/jobflow/jobs.db")
        );
        assert_eq!(config.orchestrator.poll_interval_secs, 1);
        assert_eq!(config.orchestrator.max_retries, 2);
        assert_eq!(config.queue.backend, QueueBackend::Sqlite);
        assert_eq!(config.queue.visibility_timeout_secs, 60);
        assert_eq!(config.tools.request_timeout_secs, 15);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.orchestrator.max_retries, 3);
    }

    #[test]
    fn database_url_prefers_configured_value() {
        let dir = Path::new("/data");
        let mut config = JobflowConfig::default();
        assert_eq!(database_url(&config, dir), "sqlite:///data/jobflow.db?mode=rwc");

        config.database_url = Some("sqlite://elsewhere.db".to_string());
        assert_eq!(database_url(&config, dir), "sqlite://elsewhere.db");
    }
}
