use crate::infrastructure::config::{ensure_default_configs, load_client_settings, ClientSettings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: ClientSettings,
}

/// Lays out `config/`, `state/` and `logs/` under the workspace root and
/// resolves the client settings.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("pomotrack.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let settings = load_client_settings(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
        settings,
    })
}

/// `$POMOTRACK_HOME`, else `<data dir>/pomotrack`, else the current directory.
pub fn default_workspace_root() -> Result<PathBuf, InfraError> {
    if let Some(home) = std::env::var_os("POMOTRACK_HOME").filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .filter(|value| !value.is_empty())
                .map(|home| PathBuf::from(home).join(".local").join("share"))
        });
    match data_home {
        Some(dir) => Ok(dir.join("pomotrack")),
        None => Ok(std::env::current_dir()?),
    }
}
