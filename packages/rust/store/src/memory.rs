//! In-memory [`RemoteTree`] used by tests.
//!
//! Listings are paginated with a configurable page size and children come back
//! in creation order. Individual folders, items and operations can be told to
//! fail so callers can exercise their partial-failure paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use spritevault_shared::{RemoteItem, Result, SpriteVaultError};

use crate::{ChildPage, ChildQuery, RemoteTree};

/// Default number of children per listing page.
const DEFAULT_PAGE_SIZE: usize = 100;

struct StoredItem {
    item: RemoteItem,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    items: BTreeMap<String, StoredItem>,
    next_id: u64,
    failing_lists: HashSet<String>,
    failing_gets: HashSet<String>,
    failing_moves: HashSet<String>,
    failing_reads: HashSet<String>,
    fail_creates: bool,
    list_calls: usize,
    created: Vec<String>,
}

impl Inner {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem-{:06}", self.next_id)
    }

    fn folder(&self, id: &str) -> Result<&RemoteItem> {
        match self.items.get(id) {
            Some(stored) if stored.item.is_folder && !stored.item.trashed => Ok(&stored.item),
            _ => Err(SpriteVaultError::StoreUnavailable(format!(
                "folder '{id}' not found"
            ))),
        }
    }

    fn insert(
        &mut self,
        parent: Option<&str>,
        name: &str,
        is_folder: bool,
        bytes: Vec<u8>,
        modified_at: DateTime<Utc>,
    ) -> String {
        let id = self.allocate_id();
        let item = RemoteItem {
            id: id.clone(),
            name: name.to_string(),
            parents: parent.map(|p| vec![p.to_string()]).unwrap_or_default(),
            modified_at,
            is_folder,
            trashed: false,
        };
        self.items.insert(id.clone(), StoredItem { item, bytes });
        id
    }
}

/// Thread-safe in-memory tree store.
pub struct MemoryTree {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a tree whose listings return at most `page_size` items per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// Add a folder under `parent` (or a root folder), returning its id.
    pub fn add_folder(&self, parent: Option<&str>, name: &str) -> String {
        self.lock().insert(parent, name, true, Vec::new(), Utc::now())
    }

    /// Add a file under `parent`, returning its id.
    pub fn add_file(&self, parent: &str, name: &str, bytes: &[u8]) -> String {
        self.add_file_modified(parent, name, bytes, Utc::now())
    }

    /// Add a file with an explicit last-modified instant.
    pub fn add_file_modified(
        &self,
        parent: &str,
        name: &str,
        bytes: &[u8],
        modified_at: DateTime<Utc>,
    ) -> String {
        self.lock()
            .insert(Some(parent), name, false, bytes.to_vec(), modified_at)
    }

    /// Move an item to the trash.
    pub fn trash(&self, item_id: &str) {
        if let Some(stored) = self.lock().items.get_mut(item_id) {
            stored.item.trashed = true;
        }
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    /// Every listing of `folder_id` fails.
    pub fn fail_listing(&self, folder_id: &str) {
        self.lock().failing_lists.insert(folder_id.to_string());
    }

    /// Every metadata lookup of `item_id` fails.
    pub fn fail_get(&self, item_id: &str) {
        self.lock().failing_gets.insert(item_id.to_string());
    }

    /// Every move of `item_id` fails.
    pub fn fail_move(&self, item_id: &str) {
        self.lock().failing_moves.insert(item_id.to_string());
    }

    /// Every read of `item_id` fails.
    pub fn fail_read(&self, item_id: &str) {
        self.lock().failing_reads.insert(item_id.to_string());
    }

    /// All uploads fail.
    pub fn fail_creates(&self) {
        self.lock().fail_creates = true;
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Snapshot of an item, trashed or not.
    pub fn item(&self, item_id: &str) -> Option<RemoteItem> {
        self.lock().items.get(item_id).map(|s| s.item.clone())
    }

    /// Content of an item.
    pub fn bytes(&self, item_id: &str) -> Option<Vec<u8>> {
        self.lock().items.get(item_id).map(|s| s.bytes.clone())
    }

    /// Non-trashed direct children of a folder, in creation order.
    pub fn children(&self, folder_id: &str) -> Vec<RemoteItem> {
        self.lock()
            .items
            .values()
            .filter(|s| !s.item.trashed && s.item.parents.iter().any(|p| p == folder_id))
            .map(|s| s.item.clone())
            .collect()
    }

    /// Identifiers created through [`RemoteTree::create_item`], in order.
    pub fn created(&self) -> Vec<String> {
        self.lock().created.clone()
    }

    /// Number of `list_children` calls served.
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }
}

impl RemoteTree for MemoryTree {
    async fn list_children(
        &self,
        folder_id: &str,
        query: &ChildQuery,
        page_token: Option<&str>,
    ) -> Result<ChildPage> {
        let mut inner = self.lock();
        inner.list_calls += 1;

        if inner.failing_lists.contains(folder_id) {
            return Err(SpriteVaultError::StoreUnavailable(format!(
                "listing '{folder_id}' failed"
            )));
        }
        inner.folder(folder_id)?;

        let offset = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                SpriteVaultError::StoreUnavailable(format!("invalid page token '{token}'"))
            })?,
            None => 0,
        };

        let matching: Vec<RemoteItem> = inner
            .items
            .values()
            .filter(|s| s.item.parents.iter().any(|p| p == folder_id))
            .filter(|s| query.matches(&s.item))
            .map(|s| s.item.clone())
            .collect();

        let end = (offset + self.page_size).min(matching.len());
        let items = matching.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        debug!(folder_id, offset, returned = items.len(), "memory listing");
        Ok(ChildPage {
            items,
            next_page_token,
        })
    }

    async fn get_item(&self, item_id: &str) -> Result<RemoteItem> {
        let inner = self.lock();
        if inner.failing_gets.contains(item_id) {
            return Err(SpriteVaultError::StoreUnavailable(format!(
                "lookup of '{item_id}' failed"
            )));
        }
        inner
            .items
            .get(item_id)
            .filter(|s| !s.item.trashed)
            .map(|s| s.item.clone())
            .ok_or_else(|| SpriteVaultError::StoreUnavailable(format!("item '{item_id}' not found")))
    }

    async fn move_item(&self, item_id: &str, from_parent: &str, to_parent: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.failing_moves.contains(item_id) {
            return Err(SpriteVaultError::StoreUnavailable(format!(
                "move of '{item_id}' failed"
            )));
        }
        inner.folder(to_parent)?;

        let stored = inner
            .items
            .get_mut(item_id)
            .ok_or_else(|| SpriteVaultError::StoreUnavailable(format!("item '{item_id}' not found")))?;

        let Some(pos) = stored.item.parents.iter().position(|p| p == from_parent) else {
            return Err(SpriteVaultError::StoreUnavailable(format!(
                "item '{item_id}' is not in folder '{from_parent}'"
            )));
        };
        stored.item.parents.remove(pos);
        if !stored.item.parents.iter().any(|p| p == to_parent) {
            stored.item.parents.push(to_parent.to_string());
        }
        Ok(())
    }

    async fn create_item(&self, parent_id: &str, name: &str, bytes: &[u8]) -> Result<String> {
        let mut inner = self.lock();
        if inner.fail_creates {
            return Err(SpriteVaultError::StoreUnavailable(format!(
                "upload of '{name}' failed"
            )));
        }
        inner.folder(parent_id)?;
        let id = inner.insert(Some(parent_id), name, false, bytes.to_vec(), Utc::now());
        inner.created.push(id.clone());
        Ok(id)
    }

    async fn read_item(&self, item_id: &str) -> Result<Vec<u8>> {
        let inner = self.lock();
        if inner.failing_reads.contains(item_id) {
            return Err(SpriteVaultError::StoreUnavailable(format!(
                "read of '{item_id}' failed"
            )));
        }
        inner
            .items
            .get(item_id)
            .filter(|s| !s.item.is_folder)
            .map(|s| s.bytes.clone())
            .ok_or_else(|| SpriteVaultError::StoreUnavailable(format!("item '{item_id}' not found")))
    }
}
