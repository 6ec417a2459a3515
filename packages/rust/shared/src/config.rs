//! Application configuration for spritevault.
//!
//! User config lives at `~/.spritevault/spritevault.toml`. Keys missing from
//! the file fall back to the defaults below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpriteVaultError};
use crate::types::{Category, CategoryCells, FolderTree};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "spritevault.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".spritevault";

/// Default database file name inside the config directory.
const DATABASE_FILE_NAME: &str = "spritevault.db";

// ---------------------------------------------------------------------------
// Config structs (matching spritevault.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote tree store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Review workflow settings.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Listing output settings.
    #[serde(default)]
    pub listings: ListingsConfig,

    /// `[categories.<name>]` staging/published folder pairs.
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryCells>,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// API root of the Drive-compatible store.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Items requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Folder receiving superseded revisions. Required before any publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_folder: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token_env: default_access_token_env(),
            page_size: default_page_size(),
            archive_folder: None,
        }
    }
}

fn default_base_url() -> String {
    "https://www.googleapis.com".into()
}
fn default_access_token_env() -> String {
    "SPRITEVAULT_DRIVE_TOKEN".into()
}
fn default_page_size() -> u32 {
    100
}

/// `[workflow]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// How long a ballot stays open.
    #[serde(default = "default_voting_window")]
    pub voting_window_secs: u64,

    /// Database path (catalog, submissions, ballots). Defaults under the config dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Sleep between sweeps of `watch`.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            voting_window_secs: default_voting_window(),
            database: None,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_voting_window() -> u64 {
    86_400
}
fn default_poll_interval() -> u64 {
    60
}

/// `[listings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingsConfig {
    /// Maximum characters per delivered chunk.
    #[serde(default = "default_chunk_len")]
    pub chunk_len: usize,

    /// Items last modified before this instant count as still to do.
    #[serde(default = "default_todo_cutoff")]
    pub todo_cutoff: String,
}

impl Default for ListingsConfig {
    fn default() -> Self {
        Self {
            chunk_len: default_chunk_len(),
            todo_cutoff: default_todo_cutoff(),
        }
    }
}

fn default_chunk_len() -> usize {
    1900
}
fn default_todo_cutoff() -> String {
    "2024-12-20T00:00:00Z".into()
}

impl ListingsConfig {
    /// Parse the configured to-do cutoff.
    pub fn todo_cutoff(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.todo_cutoff)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                SpriteVaultError::config(format!(
                    "invalid listings.todo_cutoff '{}': {e}",
                    self.todo_cutoff
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Folder tree (runtime, validated from config)
// ---------------------------------------------------------------------------

/// Build the validated stage x category folder tree from config.
pub fn folder_tree(config: &AppConfig) -> Result<FolderTree> {
    let archive = config
        .store
        .archive_folder
        .clone()
        .ok_or_else(|| SpriteVaultError::config("store.archive_folder is not set"))?;

    let cells = config
        .categories
        .iter()
        .map(|(name, cells)| (Category::new(name.as_str()), cells.clone()))
        .collect();

    FolderTree::new(archive, cells)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.spritevault/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SpriteVaultError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.spritevault/spritevault.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path: explicit config value, else the config dir default.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.workflow.database {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join(DATABASE_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SpriteVaultError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SpriteVaultError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SpriteVaultError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SpriteVaultError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SpriteVaultError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the store bearer token from the env var named in config.
pub fn access_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.store.access_token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SpriteVaultError::config(format!(
            "store access token not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;

    const SAMPLE: &str = r#"
[store]
archive_folder = "arch-0"
page_size = 50

[workflow]
voting_window_secs = 600

[categories.item]
staging = "tmp-item"
published = "perm-item"

[categories.block]
staging = "tmp-block"
published = "perm-block"
"#;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("SPRITEVAULT_DRIVE_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.workflow.voting_window_secs, 86_400);
        assert_eq!(parsed.listings.chunk_len, 1900);
        assert_eq!(parsed.store.page_size, 100);
    }

    #[test]
    fn config_with_categories() {
        let config: AppConfig = toml::from_str(SAMPLE).expect("parse");
        assert_eq!(config.categories.len(), 2);
        assert_eq!(config.store.page_size, 50);
        assert_eq!(config.workflow.voting_window_secs, 600);

        let tree = folder_tree(&config).expect("valid tree");
        let block = tree.category("block").unwrap();
        assert_eq!(tree.cell(Stage::Published, &block).unwrap(), "perm-block");
        assert_eq!(tree.archive(), "arch-0");
        assert_eq!(tree.categories().count(), 2);
    }

    #[test]
    fn missing_keys_use_defaults() {
        let config: AppConfig = toml::from_str("[store]\npage_size = 7\n").expect("parse");
        assert_eq!(config.store.page_size, 7);
        assert_eq!(config.workflow.voting_window_secs, default_voting_window());
        assert!(config.categories.is_empty());
    }

    #[test]
    fn folder_tree_requires_archive() {
        let mut config: AppConfig = toml::from_str(SAMPLE).unwrap();
        config.store.archive_folder = None;
        let err = folder_tree(&config).unwrap_err();
        assert!(err.to_string().contains("archive_folder"));
    }

    #[test]
    fn category_missing_stage_fails_to_parse() {
        let toml_str = r#"
[categories.gui]
staging = "tmp-gui"
"#;
        assert!(toml::from_str::<AppConfig>(toml_str).is_err());
    }

    #[test]
    fn todo_cutoff_parsing() {
        let listings = ListingsConfig::default();
        let cutoff = listings.todo_cutoff().expect("default cutoff parses");
        assert_eq!(cutoff.to_rfc3339(), "2024-12-20T00:00:00+00:00");

        let bad = ListingsConfig {
            todo_cutoff: "yesterday".into(),
            ..ListingsConfig::default()
        };
        assert!(bad.todo_cutoff().is_err());
    }

    #[test]
    fn explicit_database_path_wins() {
        let mut config = AppConfig::default();
        config.workflow.database = Some("/tmp/sv.db".into());
        assert_eq!(database_path(&config).unwrap(), PathBuf::from("/tmp/sv.db"));
    }

    #[test]
    fn access_token_missing() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.store.access_token_env = "SV_TEST_NONEXISTENT_TOKEN_12345".into();
        let result = access_token(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("access token not found"));
    }
}
