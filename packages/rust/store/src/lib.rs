//! Remote tree store access.
//!
//! This crate provides:
//! - [`RemoteTree`] — the capability the core needs from a hierarchical blob store
//! - [`DriveClient`] — an HTTP implementation for Drive v3 compatible APIs
//! - [`MemoryTree`] — an in-memory tree with pagination and fault injection

pub mod drive;
pub mod memory;

use std::future::Future;

use spritevault_shared::{RemoteItem, Result};

pub use drive::DriveClient;
pub use memory::MemoryTree;

/// Which kinds of children a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    /// Files and folders alike.
    #[default]
    Any,
    /// Everything that is not a folder.
    Files,
    /// Folders only.
    Folders,
}

impl KindFilter {
    /// Whether an item of this folder-ness passes the filter.
    pub fn accepts(&self, is_folder: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Files => !is_folder,
            Self::Folders => is_folder,
        }
    }
}

/// Filter applied by the store when listing a folder. Trashed items are
/// always excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildQuery {
    /// Exact name match, when set.
    pub name: Option<String>,
    pub kind: KindFilter,
}

impl ChildQuery {
    /// Non-folder children, optionally restricted to an exact name.
    pub fn files(name: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
            kind: KindFilter::Files,
        }
    }

    /// Folder children.
    pub fn folders() -> Self {
        Self {
            name: None,
            kind: KindFilter::Folders,
        }
    }

    /// Whether `item` satisfies this query.
    pub fn matches(&self, item: &RemoteItem) -> bool {
        !item.trashed
            && self.kind.accepts(item.is_folder)
            && self.name.as_deref().is_none_or(|n| n == item.name)
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct ChildPage {
    pub items: Vec<RemoteItem>,
    /// Continuation token; `None` when this was the last page.
    pub next_page_token: Option<String>,
}

/// Operations the core consumes from the remote tree store.
///
/// Every call is a suspension point; implementations must not cache
/// snapshots across calls.
pub trait RemoteTree: Send + Sync {
    /// List one page of a folder's non-trashed children.
    fn list_children(
        &self,
        folder_id: &str,
        query: &ChildQuery,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<ChildPage>> + Send;

    /// Fetch a single item's metadata.
    fn get_item(&self, item_id: &str) -> impl Future<Output = Result<RemoteItem>> + Send;

    /// Move an item from one parent folder to another.
    fn move_item(
        &self,
        item_id: &str,
        from_parent: &str,
        to_parent: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Create a file under `parent_id`, returning the new item identifier.
    fn create_item(
        &self,
        parent_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> impl Future<Output = Result<String>> + Send;

    /// Read an item's content.
    fn read_item(&self, item_id: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}
