//! Read-only views over the published tree and the attribution catalog.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use spritevault_shared::{
    CatalogFilter, Category, FolderTree, Result, SearchMatch, Stage, validate_sprite_name,
};
use spritevault_store::RemoteTree;

use crate::chunk::{ChunkMode, chunk};
use crate::ports::Catalog;
use crate::search::search;

/// A published sprite and its content.
#[derive(Debug, Clone)]
pub struct FetchedSprite {
    pub found: SearchMatch,
    pub bytes: Vec<u8>,
}

/// Read the first published copy of `name` in `category`.
///
/// Returns `None` when the category has no such sprite.
pub async fn fetch<T: RemoteTree>(
    tree: &T,
    folders: &FolderTree,
    category: &Category,
    name: &str,
) -> Result<Option<FetchedSprite>> {
    validate_sprite_name(name)?;
    let published = folders.cell(Stage::Published, category)?;

    let mut walk = search(tree, published, Some(name));
    let Some(found) = walk.next().await else {
        info!(%category, name, "sprite not found");
        return Ok(None);
    };
    let bytes = tree.read_item(&found.item.id).await?;
    Ok(Some(FetchedSprite { found, bytes }))
}

/// Names of published sprites last modified before `cutoff`, sorted and
/// chunked one name per line.
pub async fn todo_list<T: RemoteTree>(
    tree: &T,
    folders: &FolderTree,
    category: &Category,
    cutoff: DateTime<Utc>,
    chunk_len: usize,
) -> Result<Vec<String>> {
    let published = folders.cell(Stage::Published, category)?;
    let (matches, skipped) = search(tree, published, None).collect().await;
    if skipped > 0 {
        warn!(%category, skipped, "to-do list is missing unreadable folders");
    }

    let mut names: Vec<String> = matches
        .into_iter()
        .filter(|m| m.item.modified_at < cutoff)
        .map(|m| m.item.name)
        .collect();
    names.sort();

    Ok(chunk(&names.join("\n"), chunk_len, ChunkMode::Line))
}

/// Credit lines for every catalog record matching `filter`, sorted and
/// chunked one record per line. No match yields no chunks.
pub async fn credits_list<C: Catalog>(
    catalog: &C,
    filter: &CatalogFilter,
    chunk_len: usize,
) -> Result<Vec<String>> {
    let mut lines: Vec<String> = catalog
        .query(filter)
        .await?
        .into_iter()
        .map(|r| format!("{} in {} created by: {}", r.sprite_name, r.category, r.creator_name))
        .collect();
    lines.sort();

    Ok(chunk(&lines.join("\n"), chunk_len, ChunkMode::Line))
}
