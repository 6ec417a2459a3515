//! Shared types, error model, and configuration for spritevault.
//!
//! This crate is the foundation depended on by all other spritevault crates.
//! It provides:
//! - [`SpriteVaultError`] — the unified error type
//! - Domain types ([`RemoteItem`], [`FolderTree`], [`AttributionRecord`], [`Submission`])
//! - Configuration ([`AppConfig`], config loading, folder tree validation)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ListingsConfig, StoreConfig, WorkflowConfig, access_token, config_dir,
    config_file_path, database_path, folder_tree, init_config, load_config, load_config_from,
};
pub use error::{Result, SpriteVaultError};
pub use types::{
    AttributionRecord, Ballot, CatalogFilter, Category, CategoryCells, FolderTree, RemoteItem,
    SearchMatch, Stage, Submission, SubmissionState, Vote, validate_sprite_name,
};
