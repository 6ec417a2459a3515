//! Domain logic for spritevault.
//!
//! This crate ties the remote tree, the catalog and the ballot box together:
//! recursive search, archive-then-upload publishing, the review workflow,
//! and the chunked listings delivered to users.

pub mod chunk;
pub mod listing;
pub mod ports;
pub mod publish;
pub mod search;
pub mod workflow;

pub use chunk::{ChunkMode, chunk};
pub use listing::{FetchedSprite, credits_list, fetch, todo_list};
pub use ports::{BallotBox, BallotHandle, Catalog, LogNotifier, Notifier};
pub use publish::{PublishOutcome, RelocationFailure, check_archive, publish};
pub use search::{TreeWalk, search};
pub use workflow::{ApprovalWorkflow, SubmitRequest, content_hash};
