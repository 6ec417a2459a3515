//! Archive-then-upload publishing into a folder subtree.
//!
//! Every publish replaces an existing revision: all copies of the file name
//! found anywhere under the target folder are moved to the archive folder
//! first, and the new bytes are uploaded into the target folder only if at
//! least one of those moves succeeded. A name with no existing copy is not
//! uploaded at all.

use tracing::{info, instrument, warn};

use spritevault_shared::{Result, SpriteVaultError, validate_sprite_name};
use spritevault_store::RemoteTree;

use crate::search::search;

/// A copy that could not be moved to the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationFailure {
    pub item_id: String,
    pub folder_path: String,
    pub reason: String,
}

/// Result of one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The new revision was uploaded. `failures` lists copies that stayed
    /// in place; a non-empty list is a partial relocation failure.
    Published {
        item_id: String,
        archived: Vec<String>,
        failures: Vec<RelocationFailure>,
    },
    /// No existing copy under the target folder; nothing was uploaded.
    NotFound,
    /// Copies existed but none could be archived; nothing was uploaded.
    RelocationFailed { failures: Vec<RelocationFailure> },
}

impl PublishOutcome {
    /// Identifier of the uploaded item, if the upload happened.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::Published { item_id, .. } => Some(item_id),
            _ => None,
        }
    }

    /// Whether some, but not all, existing copies stayed in place.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Published { failures, .. } if !failures.is_empty())
    }

    /// One-line summary for notifications and logs.
    pub fn describe(&self, file_name: &str) -> String {
        match self {
            Self::Published {
                archived, failures, ..
            } if failures.is_empty() => {
                format!("{file_name} uploaded, {} previous cop(ies) archived", archived.len())
            }
            Self::Published {
                archived, failures, ..
            } => format!(
                "{file_name} uploaded, {} archived, {} could not be archived",
                archived.len(),
                failures.len()
            ),
            Self::NotFound => format!("no existing copy of {file_name} to replace"),
            Self::RelocationFailed { failures } => format!(
                "none of the {} existing copies of {file_name} could be archived",
                failures.len()
            ),
        }
    }
}

/// Confirm the archive folder is reachable and is a folder.
pub async fn check_archive<T: RemoteTree>(tree: &T, archive_folder: &str) -> Result<()> {
    let unreachable = |reason: String| SpriteVaultError::ArchiveUnreachable {
        folder: archive_folder.to_string(),
        reason,
    };

    if archive_folder.trim().is_empty() {
        return Err(unreachable("archive folder is not configured".into()));
    }
    let item = tree
        .get_item(archive_folder)
        .await
        .map_err(|e| unreachable(e.to_string()))?;
    if !item.is_folder {
        return Err(unreachable(format!("'{}' is not a folder", item.name)));
    }
    Ok(())
}

/// Replace `file_name` under `target_folder` with `bytes`.
///
/// Fails before any mutation if the archive folder is unreachable. When the
/// search of the target subtree was incomplete and found nothing, the
/// outcome is unknown and a store error is returned instead of `NotFound`.
#[instrument(skip_all, fields(file = %file_name, target = %target_folder))]
pub async fn publish<T: RemoteTree>(
    tree: &T,
    archive_folder: &str,
    bytes: &[u8],
    file_name: &str,
    target_folder: &str,
) -> Result<PublishOutcome> {
    validate_sprite_name(file_name)?;
    check_archive(tree, archive_folder).await?;

    // Collect first: moving items mid-walk would shift the listing pages.
    let (matches, skipped) = search(tree, target_folder, Some(file_name)).collect().await;

    if matches.is_empty() {
        if skipped > 0 {
            return Err(SpriteVaultError::StoreUnavailable(format!(
                "search for {file_name} skipped {skipped} unreadable folder(s)"
            )));
        }
        info!("no existing copy, not uploading");
        return Ok(PublishOutcome::NotFound);
    }
    if matches.len() > 1 {
        info!(copies = matches.len(), "archiving several copies of the same name");
    }

    let mut archived = Vec::new();
    let mut failures = Vec::new();
    for found in matches {
        let from = found
            .item
            .first_parent()
            .unwrap_or(found.folder_id.as_str())
            .to_string();
        match tree.move_item(&found.item.id, &from, archive_folder).await {
            Ok(()) => archived.push(found.item.id),
            Err(e) => {
                // Another publish may have moved it first.
                warn!(item_id = %found.item.id, path = %found.folder_path, error = %e, "relocation failed");
                failures.push(RelocationFailure {
                    item_id: found.item.id,
                    folder_path: found.folder_path,
                    reason: e.to_string(),
                });
            }
        }
    }

    if archived.is_empty() {
        warn!(failed = failures.len(), "no copy archived, not uploading");
        return Ok(PublishOutcome::RelocationFailed { failures });
    }

    let item_id = tree.create_item(target_folder, file_name, bytes).await?;
    info!(%item_id, archived = archived.len(), failed = failures.len(), "published");

    Ok(PublishOutcome::Published {
        item_id,
        archived,
        failures,
    })
}
