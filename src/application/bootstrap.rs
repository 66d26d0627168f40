use crate::infrastructure::config::{TrackerConfig, ensure_default_configs, load_configs};
use crate::infrastructure::error::TrackerError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATABASE_FILE: &str = "tracker.sqlite";

#[derive(Debug, Clone)]
pub struct BootstrapResult {
    pub config: TrackerConfig,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
}

/// Lays out `config/`, `state/` and `logs/` under the root, writes default
/// configs that are missing and applies the schema. Safe to run repeatedly.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, TrackerError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_configs(&config_dir)?;
    initialize_database(&database_path)?;

    tracing::debug!(root = %workspace_root.display(), "workspace bootstrapped");
    Ok(BootstrapResult {
        config,
        logs_dir,
        database_path,
    })
}
