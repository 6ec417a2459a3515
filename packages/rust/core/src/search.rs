//! Paginated, recursive search of a remote folder subtree.
//!
//! [`TreeWalk`] keeps an explicit stack of folders still to visit. A folder's
//! direct matches are paged through and yielded before any of its subfolders
//! is opened, and subfolders are then visited depth-first in listing order.
//! A folder whose listing fails is logged and skipped along with everything
//! beneath it; sibling subtrees are unaffected.

use std::collections::VecDeque;

use tracing::{debug, instrument, warn};

use spritevault_shared::SearchMatch;
use spritevault_store::{ChildQuery, RemoteTree};

/// A folder queued for a visit.
#[derive(Debug, Clone)]
struct PendingFolder {
    id: String,
    /// Slash-joined names from the search root.
    path: String,
}

/// The folder whose direct matches are being paged through.
#[derive(Debug)]
struct OpenFolder {
    folder: PendingFolder,
    page_token: Option<String>,
    files_done: bool,
}

/// Lazy, single-pass walk over a folder subtree.
///
/// Each walk re-reads the store; nothing is cached between walks.
pub struct TreeWalk<'a, T: RemoteTree> {
    tree: &'a T,
    root: String,
    query: ChildQuery,
    stack: Vec<PendingFolder>,
    open: Option<OpenFolder>,
    ready: VecDeque<SearchMatch>,
    skipped: usize,
}

/// Start a walk of `root`'s subtree.
///
/// With `name` set only exact, non-folder name matches are returned; without
/// it every non-folder item is. Trashed items are never returned.
pub fn search<'a, T: RemoteTree>(tree: &'a T, root: &str, name: Option<&str>) -> TreeWalk<'a, T> {
    TreeWalk {
        tree,
        root: root.to_string(),
        query: ChildQuery::files(name),
        stack: vec![PendingFolder {
            id: root.to_string(),
            path: String::new(),
        }],
        open: None,
        ready: VecDeque::new(),
        skipped: 0,
    }
}

impl<T: RemoteTree> TreeWalk<'_, T> {
    /// Next match, or `None` once the subtree is exhausted.
    pub async fn next(&mut self) -> Option<SearchMatch> {
        loop {
            if let Some(found) = self.ready.pop_front() {
                return Some(found);
            }

            let Some(open) = self.open.as_mut() else {
                let folder = self.stack.pop()?;
                debug!(folder_id = %folder.id, path = %folder.path, "entering folder");
                self.open = Some(OpenFolder {
                    folder,
                    page_token: None,
                    files_done: false,
                });
                continue;
            };

            if !open.files_done {
                let listing = self
                    .tree
                    .list_children(&open.folder.id, &self.query, open.page_token.as_deref())
                    .await;
                match listing {
                    Ok(page) => {
                        self.ready.extend(page.items.into_iter().map(|item| SearchMatch {
                            item,
                            folder_id: open.folder.id.clone(),
                            folder_path: open.folder.path.clone(),
                        }));
                        open.files_done = page.next_page_token.is_none();
                        open.page_token = page.next_page_token;
                    }
                    Err(e) => {
                        warn!(folder_id = %open.folder.id, error = %e, "listing failed, skipping subtree");
                        self.skipped += 1;
                        self.open = None;
                    }
                }
                continue;
            }

            if let Some(open) = self.open.take() {
                self.descend(open.folder).await;
            }
        }
    }

    /// Queue every subfolder of `parent` so the first listed is visited first.
    async fn descend(&mut self, parent: PendingFolder) {
        let query = ChildQuery::folders();
        let mut children = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            match self
                .tree
                .list_children(&parent.id, &query, page_token.as_deref())
                .await
            {
                Ok(page) => {
                    children.extend(page.items);
                    match page.next_page_token {
                        Some(token) => page_token = Some(token),
                        None => break,
                    }
                }
                Err(e) => {
                    warn!(folder_id = %parent.id, error = %e, "subfolder listing failed, skipping descendants");
                    self.skipped += 1;
                    return;
                }
            }
        }

        for child in children.into_iter().rev() {
            let path = if parent.path.is_empty() {
                child.name
            } else {
                format!("{}/{}", parent.path, child.name)
            };
            self.stack.push(PendingFolder { id: child.id, path });
        }
    }

    /// Number of folders whose subtree was skipped after a listing failure.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Drain the walk into a vector.
    #[instrument(skip_all, fields(root = %self.root, name = ?self.query.name))]
    pub async fn collect(mut self) -> (Vec<SearchMatch>, usize) {
        let mut matches = Vec::new();
        while let Some(found) = self.next().await {
            matches.push(found);
        }
        (matches, self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spritevault_store::MemoryTree;

    fn names(matches: &[SearchMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.item.name.as_str()).collect()
    }

    /// root: a.png, b.png, [tools: pick.png, [deep: c.png]], [blocks: d.png]
    fn sample_tree(page_size: usize) -> (MemoryTree, String) {
        let tree = MemoryTree::with_page_size(page_size);
        let root = tree.add_folder(None, "item");
        tree.add_file(&root, "a.png", b"a");
        let tools = tree.add_folder(Some(&root), "tools");
        tree.add_file(&tools, "pick.png", b"p");
        let deep = tree.add_folder(Some(&tools), "deep");
        tree.add_file(&deep, "c.png", b"c");
        let blocks = tree.add_folder(Some(&root), "blocks");
        tree.add_file(&blocks, "d.png", b"d");
        tree.add_file(&root, "b.png", b"b");
        (tree, root)
    }

    #[tokio::test]
    async fn direct_matches_before_descendants() {
        let (tree, root) = sample_tree(100);
        let (matches, skipped) = search(&tree, &root, None).collect().await;
        assert_eq!(skipped, 0);
        assert_eq!(names(&matches), vec!["a.png", "b.png", "pick.png", "c.png", "d.png"]);
        assert_eq!(matches[3].folder_path, "tools/deep");
        assert_eq!(matches[0].folder_path, "");
    }

    #[tokio::test]
    async fn every_item_exactly_once_across_pages() {
        let tree = MemoryTree::with_page_size(3);
        let root = tree.add_folder(None, "block");
        let sub = tree.add_folder(Some(&root), "sub");
        for i in 0..10 {
            tree.add_file(&root, &format!("r{i}.png"), b"x");
            tree.add_file(&sub, &format!("s{i}.png"), b"x");
        }
        for i in 0..4 {
            tree.add_folder(Some(&root), &format!("empty{i}"));
        }

        let (matches, _) = search(&tree, &root, None).collect().await;
        assert_eq!(matches.len(), 20);
        let mut ids: Vec<_> = matches.iter().map(|m| m.item.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn excludes_trashed_and_folders() {
        let (tree, root) = sample_tree(2);
        let gone = tree.add_file(&root, "gone.png", b"g");
        tree.trash(&gone);
        let (matches, _) = search(&tree, &root, None).collect().await;
        assert!(matches.iter().all(|m| !m.item.trashed && !m.item.is_folder));
        assert!(!names(&matches).contains(&"gone.png"));
    }

    #[tokio::test]
    async fn name_filter_is_exact_and_keeps_duplicates() {
        let (tree, root) = sample_tree(100);
        let blocks = tree
            .children(&root)
            .into_iter()
            .find(|i| i.name == "blocks")
            .expect("blocks folder");
        tree.add_file(&blocks.id, "a.png", b"dup");
        tree.add_file(&root, "a.png.bak", b"bak");

        let (matches, _) = search(&tree, &root, Some("a.png")).collect().await;
        assert_eq!(names(&matches), vec!["a.png", "a.png"]);
        assert_eq!(matches[1].folder_path, "blocks");
    }

    #[tokio::test]
    async fn failed_subtree_does_not_abort_siblings() {
        let (tree, root) = sample_tree(100);
        let tools = tree
            .children(&root)
            .into_iter()
            .find(|i| i.name == "tools")
            .expect("tools folder");
        tree.fail_listing(&tools.id);

        let (matches, skipped) = search(&tree, &root, None).collect().await;
        assert_eq!(skipped, 1);
        assert_eq!(names(&matches), vec!["a.png", "b.png", "d.png"]);
    }

    #[tokio::test]
    async fn yields_first_page_before_fetching_more() {
        let (tree, root) = sample_tree(1);
        let mut walk = search(&tree, &root, None);
        let first = walk.next().await.expect("first match");
        assert_eq!(first.item.name, "a.png");
        assert_eq!(tree.list_calls(), 1);
    }
}
