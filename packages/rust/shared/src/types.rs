//! Core domain types for spritevault.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpriteVaultError};

// ---------------------------------------------------------------------------
// RemoteItem
// ---------------------------------------------------------------------------

/// Snapshot of one item in the remote tree store.
///
/// The store is the source of truth; a snapshot may be stale by the time the
/// next call acts on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Store-assigned identifier.
    pub id: String,
    /// File or folder name.
    pub name: String,
    /// Identifiers of the folders this item lives in.
    pub parents: Vec<String>,
    /// Last modification instant reported by the store.
    pub modified_at: DateTime<Utc>,
    /// Whether the item is a folder.
    pub is_folder: bool,
    /// Whether the item sits in the store's trash.
    #[serde(default)]
    pub trashed: bool,
}

impl RemoteItem {
    /// The parent a relocation removes the item from.
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}

/// A search hit: the item plus the folder it was found in.
///
/// Several matches may share a name when the same file exists in two
/// subfolders; callers treat that as a conflict signal, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub item: RemoteItem,
    /// Identifier of the folder the item was listed under.
    pub folder_id: String,
    /// Slash-joined folder names from the search root (empty for the root).
    pub folder_path: String,
}

// ---------------------------------------------------------------------------
// Folder tree
// ---------------------------------------------------------------------------

/// The two lifecycle stages every category has a folder for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Not-yet-approved submissions.
    Staging,
    /// Approved, live assets.
    Published,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Staging => f.write_str("staging"),
            Self::Published => f.write_str("published"),
        }
    }
}

/// An asset category name (`item`, `block`, `gui`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(pub String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Folder identifiers for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCells {
    pub staging: String,
    pub published: String,
}

/// The fixed {stage} x {category} namespace plus the shared archive folder.
///
/// Built from configuration by [`crate::config::folder_tree`]; the category set is
/// never discovered at runtime.
#[derive(Debug, Clone)]
pub struct FolderTree {
    archive: String,
    cells: BTreeMap<Category, CategoryCells>,
}

impl FolderTree {
    /// Build a tree, rejecting empty identifiers and an empty category set.
    pub fn new(archive: String, cells: BTreeMap<Category, CategoryCells>) -> Result<Self> {
        if archive.trim().is_empty() {
            return Err(SpriteVaultError::config("archive folder is not set"));
        }
        if cells.is_empty() {
            return Err(SpriteVaultError::config("no categories configured"));
        }
        for (category, cell) in &cells {
            if cell.staging.trim().is_empty() || cell.published.trim().is_empty() {
                return Err(SpriteVaultError::config(format!(
                    "category '{category}' must have both a staging and a published folder"
                )));
            }
        }
        Ok(Self { archive, cells })
    }

    /// Folder that receives every superseded revision.
    pub fn archive(&self) -> &str {
        &self.archive
    }

    /// Folder identifier for `category` at `stage`.
    pub fn cell(&self, stage: Stage, category: &Category) -> Result<&str> {
        let cells = self
            .cells
            .get(category)
            .ok_or_else(|| SpriteVaultError::UnknownCategory(category.to_string()))?;
        Ok(match stage {
            Stage::Staging => &cells.staging,
            Stage::Published => &cells.published,
        })
    }

    /// Configured categories in name order.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.cells.keys()
    }

    /// Resolve a user-supplied category name.
    pub fn category(&self, name: &str) -> Result<Category> {
        let category = Category::new(name);
        if self.cells.contains_key(&category) {
            Ok(category)
        } else {
            Err(SpriteVaultError::UnknownCategory(name.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Attribution catalog
// ---------------------------------------------------------------------------

/// Who created a published sprite. Keyed by (category, sprite name);
/// a later approval for the same key overwrites the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub sprite_name: String,
    pub creator_id: String,
    pub creator_name: String,
    pub category: Category,
}

/// Optional filters for catalog queries; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub sprite_name: Option<String>,
    pub creator_name: Option<String>,
    pub creator_id: Option<String>,
    pub category: Option<Category>,
}

// ---------------------------------------------------------------------------
// Ballot
// ---------------------------------------------------------------------------

/// One tally snapshot of an approve/reject vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ballot {
    pub approve: u32,
    pub reject: u32,
}

/// A single voter's choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Approve,
    Reject,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl std::str::FromStr for Vote {
    type Err = SpriteVaultError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approve" | "yes" => Ok(Self::Approve),
            "reject" | "no" => Ok(Self::Reject),
            other => Err(SpriteVaultError::validation(format!(
                "unknown vote '{other}': expected approve or reject"
            ))),
        }
    }
}

impl Ballot {
    /// Strictly more approvals than rejections promotes; ties reject.
    pub fn approved(&self) -> bool {
        self.approve > self.reject
    }
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// Lifecycle of one submission through review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Submitted,
    StagedUploadAttempted,
    StagedUploadFailed,
    PollOpen,
    PollClosed,
    Promoted,
    Rejected,
    /// Promotion failed after staging succeeded; needs an operator.
    Inconsistent,
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::StagedUploadAttempted => "staged_upload_attempted",
            Self::StagedUploadFailed => "staged_upload_failed",
            Self::PollOpen => "poll_open",
            Self::PollClosed => "poll_closed",
            Self::Promoted => "promoted",
            Self::Rejected => "rejected",
            Self::Inconsistent => "inconsistent",
        }
    }

    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::StagedUploadFailed | Self::Promoted | Self::Rejected | Self::Inconsistent
        )
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubmissionState {
    type Err = SpriteVaultError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "submitted" => Self::Submitted,
            "staged_upload_attempted" => Self::StagedUploadAttempted,
            "staged_upload_failed" => Self::StagedUploadFailed,
            "poll_open" => Self::PollOpen,
            "poll_closed" => Self::PollClosed,
            "promoted" => Self::Promoted,
            "rejected" => Self::Rejected,
            "inconsistent" => Self::Inconsistent,
            other => {
                return Err(SpriteVaultError::validation(format!(
                    "unknown submission state '{other}'"
                )));
            }
        })
    }
}

/// Persisted workflow record for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// UUID v7 submission identifier.
    pub id: String,
    pub sprite_name: String,
    pub category: Category,
    pub submitter_id: String,
    pub submitter_name: String,
    /// SHA-256 of the submitted bytes, hex encoded.
    pub content_hash: String,
    pub state: SubmissionState,
    /// Item created in the staging cell, once staged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ballot_id: Option<String>,
    /// When the voting window ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_closes_at: Option<DateTime<Utc>>,
    /// Human-readable reason for a failure state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reject names that are not a bare file name.
pub fn validate_sprite_name(name: &str) -> Result<()> {
    static FORBIDDEN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[/\\\x00-\x1f\x7f]").expect("valid regex"));

    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(SpriteVaultError::validation(format!(
            "'{name}' is not a valid sprite file name"
        )));
    }
    if trimmed != name || FORBIDDEN.is_match(name) {
        return Err(SpriteVaultError::validation(format!(
            "sprite file name '{}' contains forbidden characters",
            name.escape_debug()
        )));
    }
    Ok(())
}
