use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name of the raw loan-application table inside `data_dir`.
pub const APPLICATION_FILE: &str = "application.parquet";
/// File name of the raw credit-bureau history table inside `data_dir`.
pub const BUREAU_FILE: &str = "bureau.parquet";
/// File name of the integrated master feature table inside `data_dir`.
pub const MASTER_TABLE_FILE: &str = "master_table.parquet";
/// Held-out feature rows persisted by training for the evaluator.
pub const X_TEST_FILE: &str = "x_test.parquet";
/// Held-out labels persisted by training for the evaluator.
pub const Y_TEST_FILE: &str = "y_test.parquet";
/// Serialized trained-pipeline artifact inside `artifacts_dir`.
pub const MODEL_FILE: &str = "model.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .unwrap_or_else(|_| "artifacts".to_string())
                .into(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
        };

        if config.data_dir.as_os_str().is_empty() {
            anyhow::bail!("DATA_DIR cannot be empty");
        }
        if config.artifacts_dir.as_os_str().is_empty() {
            anyhow::bail!("ARTIFACTS_DIR cannot be empty");
        }

        // Log successful configuration load
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Data dir: {}", config.data_dir.display());
        tracing::debug!("Artifacts dir: {}", config.artifacts_dir.display());
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Build a config rooted at explicit directories, used by tests and tools
    /// that should not depend on process environment.
    pub fn with_dirs(data_dir: impl AsRef<Path>, artifacts_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            artifacts_dir: artifacts_dir.as_ref().to_path_buf(),
            port: 8000,
        }
    }

    pub fn application_path(&self) -> PathBuf {
        self.data_dir.join(APPLICATION_FILE)
    }

    pub fn bureau_path(&self) -> PathBuf {
        self.data_dir.join(BUREAU_FILE)
    }

    pub fn master_table_path(&self) -> PathBuf {
        self.data_dir.join(MASTER_TABLE_FILE)
    }

    pub fn x_test_path(&self) -> PathBuf {
        self.data_dir.join(X_TEST_FILE)
    }

    pub fn y_test_path(&self) -> PathBuf {
        self.data_dir.join(Y_TEST_FILE)
    }

    pub fn model_path(&self) -> PathBuf {
        self.artifacts_dir.join(MODEL_FILE)
    }
}
