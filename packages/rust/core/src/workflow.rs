//! Submission review: staging upload, timed vote, promotion or rejection.
//!
//! Every transition is written to the submissions table before the next step
//! starts, so the voting window is a durable timer rather than an in-memory
//! task. [`ApprovalWorkflow::resume_due`] closes every poll whose window has
//! elapsed and can be re-triggered after a restart;
//! [`ApprovalWorkflow::wait_and_close`] is the single long suspension for
//! callers that want to block on one submission.
//!
//! Several processes may settle the same submission (`submit --wait` next to
//! a `watch` loop). Each transition is a compare-and-set on the stored state,
//! so only the first settler proceeds and the others return the stored record.
//!
//! ```text
//! Submitted -> StagedUploadAttempted -> StagedUploadFailed
//!                                    -> PollOpen -> PollClosed -> Promoted
//!                                                              -> Rejected
//!                                                              -> Inconsistent
//! ```

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use spritevault_shared::{
    AttributionRecord, Ballot, Category, FolderTree, Result, SpriteVaultError, Stage, Submission,
    SubmissionState, Vote, validate_sprite_name,
};
use spritevault_storage::Storage;
use spritevault_store::RemoteTree;

use crate::ports::{BallotBox, Catalog, Notifier};
use crate::publish::{PublishOutcome, publish};
use crate::search::search;

/// A `PollClosed` submission untouched this long is taken to be abandoned by
/// an interrupted run and may be settled again.
const SETTLE_LEASE_MINUTES: i64 = 15;

/// A new sprite submitted for review.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub category: Category,
    pub sprite_name: String,
    pub bytes: Vec<u8>,
    pub submitter_id: String,
    pub submitter_name: String,
}

/// Drives submissions through review.
pub struct ApprovalWorkflow<'a, T, C, B, N> {
    tree: &'a T,
    folders: &'a FolderTree,
    records: &'a Storage,
    catalog: &'a C,
    ballots: &'a B,
    notifier: &'a N,
    voting_window: Duration,
}

impl<'a, T, C, B, N> ApprovalWorkflow<'a, T, C, B, N>
where
    T: RemoteTree,
    C: Catalog,
    B: BallotBox,
    N: Notifier,
{
    pub fn new(
        tree: &'a T,
        folders: &'a FolderTree,
        records: &'a Storage,
        catalog: &'a C,
        ballots: &'a B,
        notifier: &'a N,
        voting_window: Duration,
    ) -> Self {
        Self {
            tree,
            folders,
            records,
            catalog,
            ballots,
            notifier,
            voting_window,
        }
    }

    /// Stage a submission and open its ballot.
    ///
    /// Returns the persisted submission in `PollOpen` on success. A staging
    /// failure is not an error: the submission comes back in the terminal
    /// `StagedUploadFailed` state with the reason in `detail`.
    #[instrument(skip_all, fields(sprite = %request.sprite_name, category = %request.category))]
    pub async fn submit(&self, request: SubmitRequest) -> Result<Submission> {
        validate_sprite_name(&request.sprite_name)?;
        let staging = self.folders.cell(Stage::Staging, &request.category)?;
        let published = self.folders.cell(Stage::Published, &request.category)?;

        let now = Utc::now();
        let mut submission = Submission {
            id: Uuid::now_v7().to_string(),
            sprite_name: request.sprite_name,
            category: request.category,
            submitter_id: request.submitter_id,
            submitter_name: request.submitter_name,
            content_hash: content_hash(&request.bytes),
            state: SubmissionState::Submitted,
            staged_item_id: None,
            ballot_id: None,
            poll_closes_at: None,
            detail: None,
            created_at: now,
            updated_at: now,
        };
        self.records.insert_submission(&submission).await?;
        info!(submission = %submission.id, hash = %submission.content_hash, "submission recorded");

        if !self
            .transition(&mut submission, SubmissionState::StagedUploadAttempted, None)
            .await?
        {
            return self.settled_elsewhere(&submission.id).await;
        }

        let staged = match publish(
            self.tree,
            self.folders.archive(),
            &request.bytes,
            &submission.sprite_name,
            staging,
        )
        .await
        {
            Ok(PublishOutcome::Published {
                item_id, failures, ..
            }) => {
                if !failures.is_empty() {
                    warn!(failed = failures.len(), "some staged copies were not archived");
                }
                item_id
            }
            Ok(outcome) => {
                let reason = outcome.describe(&submission.sprite_name);
                return self.fail_staging(submission, reason).await;
            }
            Err(e) => return self.fail_staging(submission, e.to_string()).await,
        };
        submission.staged_item_id = Some(staged);

        let previous = self.published_copy(published, &submission.sprite_name).await;
        let ballot = match self
            .ballots
            .open_ballot(
                &submission.id,
                &submission.sprite_name,
                previous.as_deref(),
                self.voting_window,
            )
            .await
        {
            Ok(ballot) => ballot,
            Err(e) => {
                let reason = format!("staged but the ballot could not be opened: {e}");
                return self.mark_inconsistent(submission, reason).await;
            }
        };

        submission.ballot_id = Some(ballot.id);
        submission.poll_closes_at = Some(ballot.closes_at);
        if !self
            .transition(&mut submission, SubmissionState::PollOpen, None)
            .await?
        {
            return self.settled_elsewhere(&submission.id).await;
        }

        let message = format!(
            "{} is up for review until {}",
            submission.sprite_name, ballot.closes_at
        );
        self.notifier.notify(&submission, &message).await;
        Ok(submission)
    }

    /// Record a vote on an open submission.
    pub async fn vote(&self, submission_id: &str, voter_id: &str, vote: Vote) -> Result<()> {
        let submission = self.status(submission_id).await?;
        if submission.state != SubmissionState::PollOpen {
            return Err(SpriteVaultError::validation(format!(
                "submission {submission_id} is {}, not open for votes",
                submission.state
            )));
        }
        let ballot_id = submission.ballot_id.as_deref().ok_or_else(|| {
            SpriteVaultError::Storage(format!("submission {submission_id} has no ballot"))
        })?;
        self.ballots.cast_vote(ballot_id, voter_id, vote).await
    }

    /// Current persisted state of a submission.
    pub async fn status(&self, submission_id: &str) -> Result<Submission> {
        self.records
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| SpriteVaultError::SubmissionNotFound(submission_id.to_string()))
    }

    /// Tally and settle one submission whose window has elapsed at `now`.
    ///
    /// Submissions already past the vote are returned unchanged, as are
    /// submissions another run is settling right now. A submission left in
    /// `PollClosed` by an interrupted run is re-tallied and settled once its
    /// settle lease has run out.
    #[instrument(skip_all, fields(submission = %submission_id))]
    pub async fn close_poll(&self, submission_id: &str, now: DateTime<Utc>) -> Result<Submission> {
        let mut submission = self.status(submission_id).await?;

        match submission.state {
            SubmissionState::PollOpen => {
                match submission.poll_closes_at {
                    Some(closes_at) if now < closes_at => {
                        return Err(SpriteVaultError::validation(format!(
                            "poll for {submission_id} is open until {closes_at}"
                        )));
                    }
                    _ => {}
                }
                if !self
                    .transition(&mut submission, SubmissionState::PollClosed, None)
                    .await?
                {
                    return self.settled_elsewhere(submission_id).await;
                }
            }
            SubmissionState::PollClosed => {
                let seen = submission.updated_at;
                let claimed_at = Utc::now();
                if claimed_at - seen < Duration::minutes(SETTLE_LEASE_MINUTES) {
                    info!(since = %seen, "poll is being settled by another run");
                    return Ok(submission);
                }
                if !self
                    .records
                    .claim_submission(submission_id, SubmissionState::PollClosed, &seen, &claimed_at)
                    .await?
                {
                    return self.settled_elsewhere(submission_id).await;
                }
                submission.updated_at = claimed_at;
                info!("settling a poll closed by an interrupted run");
            }
            _ => return Ok(submission),
        }

        let Some(ballot_id) = submission.ballot_id.clone() else {
            return self
                .mark_inconsistent(submission, "poll has no ballot".into())
                .await;
        };
        let ballot = self.ballots.tally(&ballot_id).await?;
        info!(approve = ballot.approve, reject = ballot.reject, "poll closed");

        if !ballot.approved() {
            if !self
                .transition(&mut submission, SubmissionState::Rejected, Some(tally_line(&ballot)))
                .await?
            {
                return self.settled_elsewhere(submission_id).await;
            }
            let message = format!("{} was not approved ({})", submission.sprite_name, tally_line(&ballot));
            self.notifier.notify(&submission, &message).await;
            return Ok(submission);
        }

        self.promote(submission, &ballot).await
    }

    /// Close every open poll whose window has elapsed by `now`, and settle
    /// any poll an interrupted run left closed. One failure does not stop
    /// the sweep.
    pub async fn resume_due(&self, now: DateTime<Utc>) -> Result<Vec<Submission>> {
        let mut pending = self
            .records
            .submissions_in_state(SubmissionState::PollClosed)
            .await?;
        pending.extend(self.records.due_submissions(now).await?);

        let mut settled = Vec::new();
        for submission in pending {
            match self.close_poll(&submission.id, now).await {
                Ok(done) if done.state.is_terminal() => settled.push(done),
                Ok(_) => {}
                Err(e) => warn!(submission = %submission.id, error = %e, "could not close poll"),
            }
        }
        info!(settled = settled.len(), "resume sweep finished");
        Ok(settled)
    }

    /// Sleep until the submission's voting window ends, then close it.
    pub async fn wait_and_close(&self, submission_id: &str) -> Result<Submission> {
        let submission = self.status(submission_id).await?;
        let mut now = Utc::now();
        if submission.state == SubmissionState::PollOpen {
            if let Some(closes_at) = submission.poll_closes_at {
                if let Ok(remaining) = (closes_at - now).to_std() {
                    info!(submission = %submission_id, until = %closes_at, "waiting for vote to end");
                    tokio::time::sleep(remaining).await;
                }
                now = Utc::now().max(closes_at);
            }
        }
        self.close_poll(submission_id, now).await
    }

    async fn promote(&self, mut submission: Submission, ballot: &Ballot) -> Result<Submission> {
        let published = self.folders.cell(Stage::Published, &submission.category)?;

        let Some(staged) = submission.staged_item_id.clone() else {
            return self
                .mark_inconsistent(submission, "approved but nothing was staged".into())
                .await;
        };
        let bytes = match self.tree.read_item(&staged).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let reason = format!("staged item {staged} unreadable: {e}");
                return self.mark_inconsistent(submission, reason).await;
            }
        };

        let outcome = match publish(
            self.tree,
            self.folders.archive(),
            &bytes,
            &submission.sprite_name,
            published,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = format!("published upload failed: {e}");
                return self.mark_inconsistent(submission, reason).await;
            }
        };
        if outcome.item_id().is_none() {
            let reason = format!("published upload refused: {}", outcome.describe(&submission.sprite_name));
            return self.mark_inconsistent(submission, reason).await;
        }

        let record = AttributionRecord {
            sprite_name: submission.sprite_name.clone(),
            creator_id: submission.submitter_id.clone(),
            creator_name: submission.submitter_name.clone(),
            category: submission.category.clone(),
        };
        if let Err(e) = self.catalog.put(&record).await {
            let reason = format!("published but attribution not recorded: {e}");
            return self.mark_inconsistent(submission, reason).await;
        }

        let detail = format!("{}; {}", tally_line(ballot), outcome.describe(&submission.sprite_name));
        if !self
            .transition(&mut submission, SubmissionState::Promoted, Some(detail))
            .await?
        {
            return self.settled_elsewhere(&submission.id).await;
        }
        let message = format!("{} was approved and published", submission.sprite_name);
        self.notifier.notify(&submission, &message).await;
        Ok(submission)
    }

    /// First published copy of `name`, shown to reviewers for comparison.
    async fn published_copy(&self, published: &str, name: &str) -> Option<String> {
        let mut walk = search(self.tree, published, Some(name));
        walk.next().await.map(|found| found.item.id)
    }

    async fn fail_staging(&self, mut submission: Submission, reason: String) -> Result<Submission> {
        warn!(submission = %submission.id, %reason, "staging failed");
        if !self
            .transition(&mut submission, SubmissionState::StagedUploadFailed, Some(reason.clone()))
            .await?
        {
            return self.settled_elsewhere(&submission.id).await;
        }
        let message = format!("{} could not be staged: {reason}", submission.sprite_name);
        self.notifier.notify(&submission, &message).await;
        Ok(submission)
    }

    async fn mark_inconsistent(&self, mut submission: Submission, reason: String) -> Result<Submission> {
        let error = SpriteVaultError::WorkflowInconsistency {
            submission: submission.id.clone(),
            reason: reason.clone(),
        };
        if !self
            .transition(&mut submission, SubmissionState::Inconsistent, Some(reason.clone()))
            .await?
        {
            return self.settled_elsewhere(&submission.id).await;
        }
        warn!(submission = %submission.id, %reason, "workflow inconsistent");
        self.notifier.escalate(&submission, &error).await;
        Ok(submission)
    }

    /// Stored record of a submission another run moved first.
    async fn settled_elsewhere(&self, submission_id: &str) -> Result<Submission> {
        let stored = self.status(submission_id).await?;
        info!(submission = %submission_id, state = %stored.state, "already moved by another run");
        Ok(stored)
    }

    /// Move `submission` to `state` if the stored state still matches.
    /// Returns `false` when another run got there first.
    async fn transition(
        &self,
        submission: &mut Submission,
        state: SubmissionState,
        detail: Option<String>,
    ) -> Result<bool> {
        let expected = submission.state;
        info!(submission = %submission.id, from = %expected, to = %state, "transition");
        submission.state = state;
        if detail.is_some() {
            submission.detail = detail;
        }
        submission.updated_at = Utc::now();
        self.records.update_submission(submission, expected).await
    }
}

/// Hex-encoded SHA-256 of the submitted bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn tally_line(ballot: &Ballot) -> String {
    format!("approve {} / reject {}", ballot.approve, ballot.reject)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;
    use crate::ports::LogNotifier;
    use spritevault_shared::{CatalogFilter, CategoryCells, RemoteItem};
    use spritevault_store::{ChildPage, ChildQuery, MemoryTree};

    struct Env {
        tree: MemoryTree,
        folders: FolderTree,
        storage: Storage,
        staging: String,
        published: String,
        archive: String,
    }

    async fn env() -> Env {
        let tree = MemoryTree::new();
        let archive = tree.add_folder(None, "archive");
        let staging = tree.add_folder(None, "staging-item");
        let published = tree.add_folder(None, "published-item");
        let mut cells = BTreeMap::new();
        cells.insert(
            Category::new("item"),
            CategoryCells {
                staging: staging.clone(),
                published: published.clone(),
            },
        );
        let folders = FolderTree::new(archive.clone(), cells).unwrap();
        let db = std::env::temp_dir().join(format!("sv_wf_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&db).await.unwrap();
        Env {
            tree,
            folders,
            storage,
            staging,
            published,
            archive,
        }
    }

    /// Records every message so tests can assert on delivery.
    #[derive(Default)]
    struct RecordingNotifier {
        notes: Mutex<Vec<String>>,
        escalations: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&self, _submission: &Submission, message: &str) {
            self.notes.lock().unwrap().push(message.to_string());
        }

        async fn escalate(&self, _submission: &Submission, error: &SpriteVaultError) {
            self.escalations.lock().unwrap().push(error.to_string());
        }
    }

    /// A catalog whose writes always fail.
    struct BrokenCatalog;

    impl Catalog for BrokenCatalog {
        async fn put(&self, _record: &AttributionRecord) -> Result<()> {
            Err(SpriteVaultError::Storage("catalog offline".into()))
        }

        async fn query(&self, _filter: &CatalogFilter) -> Result<Vec<AttributionRecord>> {
            Ok(Vec::new())
        }
    }

    /// Yields before every store call so concurrent settlers interleave.
    struct YieldingTree<'a>(&'a MemoryTree);

    impl RemoteTree for YieldingTree<'_> {
        async fn list_children(
            &self,
            folder_id: &str,
            query: &ChildQuery,
            page_token: Option<&str>,
        ) -> Result<ChildPage> {
            tokio::task::yield_now().await;
            self.0.list_children(folder_id, query, page_token).await
        }

        async fn get_item(&self, item_id: &str) -> Result<RemoteItem> {
            tokio::task::yield_now().await;
            self.0.get_item(item_id).await
        }

        async fn move_item(&self, item_id: &str, from_parent: &str, to_parent: &str) -> Result<()> {
            tokio::task::yield_now().await;
            self.0.move_item(item_id, from_parent, to_parent).await
        }

        async fn create_item(&self, parent_id: &str, name: &str, bytes: &[u8]) -> Result<String> {
            tokio::task::yield_now().await;
            self.0.create_item(parent_id, name, bytes).await
        }

        async fn read_item(&self, item_id: &str) -> Result<Vec<u8>> {
            tokio::task::yield_now().await;
            self.0.read_item(item_id).await
        }
    }

    fn workflow<'a, C: Catalog, N: Notifier>(
        e: &'a Env,
        catalog: &'a C,
        notifier: &'a N,
        window: Duration,
    ) -> ApprovalWorkflow<'a, MemoryTree, C, Storage, N> {
        ApprovalWorkflow::new(&e.tree, &e.folders, &e.storage, catalog, &e.storage, notifier, window)
    }

    fn request(name: &str, submitter: &str) -> SubmitRequest {
        SubmitRequest {
            category: Category::new("item"),
            sprite_name: name.into(),
            bytes: b"new pixels".to_vec(),
            submitter_id: format!("id-{submitter}"),
            submitter_name: submitter.into(),
        }
    }

    async fn vote_n<N: Notifier>(
        wf: &ApprovalWorkflow<'_, MemoryTree, Storage, Storage, N>,
        id: &str,
        approve: u32,
        reject: u32,
    ) {
        for i in 0..approve {
            wf.vote(id, &format!("yes-{i}"), Vote::Approve).await.unwrap();
        }
        for i in 0..reject {
            wf.vote(id, &format!("no-{i}"), Vote::Reject).await.unwrap();
        }
    }

    fn after_window(submission: &Submission) -> DateTime<Utc> {
        submission.poll_closes_at.unwrap() + Duration::seconds(1)
    }

    #[tokio::test]
    async fn approved_submission_is_promoted_and_credited() {
        let e = env().await;
        e.tree.add_file(&e.staging, "sword.png", b"old staged");
        let old_published = e.tree.add_file(&e.published, "sword.png", b"old live");
        let notifier = RecordingNotifier::default();
        let wf = workflow(&e, &e.storage, &notifier, Duration::hours(24));

        let sub = wf.submit(request("sword.png", "alex")).await.unwrap();
        assert_eq!(sub.state, SubmissionState::PollOpen);
        assert_eq!(sub.content_hash, content_hash(b"new pixels"));
        let ballot = e.storage.get_ballot(sub.ballot_id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(ballot.previous_item_id.as_deref(), Some(old_published.as_str()));

        vote_n(&wf, &sub.id, 3, 1).await;
        let done = wf.close_poll(&sub.id, after_window(&sub)).await.unwrap();
        assert_eq!(done.state, SubmissionState::Promoted);

        let live = e.tree.children(&e.published);
        assert_eq!(live.len(), 1);
        assert_eq!(e.tree.bytes(&live[0].id).unwrap(), b"new pixels");
        assert_eq!(e.tree.item(&old_published).unwrap().parents, vec![e.archive.clone()]);

        let credits = e.storage.query_attributions(&CatalogFilter::default()).await.unwrap();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].creator_name, "alex");
        assert!(notifier.notes.lock().unwrap().last().unwrap().contains("approved"));
    }

    #[tokio::test]
    async fn tie_and_empty_votes_reject() {
        for (approve, reject) in [(1, 1), (0, 0), (0, 2)] {
            let e = env().await;
            e.tree.add_file(&e.staging, "sword.png", b"old staged");
            e.tree.add_file(&e.published, "sword.png", b"old live");
            let wf = workflow(&e, &e.storage, &LogNotifier, Duration::hours(24));

            let sub = wf.submit(request("sword.png", "alex")).await.unwrap();
            vote_n(&wf, &sub.id, approve, reject).await;
            let done = wf.close_poll(&sub.id, after_window(&sub)).await.unwrap();
            assert_eq!(done.state, SubmissionState::Rejected, "{approve}/{reject}");

            // No promotion side effects.
            assert_eq!(e.tree.children(&e.published).len(), 1);
            assert!(e.storage.query_attributions(&CatalogFilter::default()).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn nothing_to_replace_fails_staging() {
        let e = env().await;
        let notifier = RecordingNotifier::default();
        let wf = workflow(&e, &e.storage, &notifier, Duration::hours(24));

        let sub = wf.submit(request("brand_new.png", "alex")).await.unwrap();
        assert_eq!(sub.state, SubmissionState::StagedUploadFailed);
        assert!(sub.detail.as_deref().unwrap().contains("no existing copy"));
        assert!(sub.ballot_id.is_none());
        assert!(e.tree.created().is_empty());
        assert_eq!(notifier.notes.lock().unwrap().len(), 1);

        let stored = wf.status(&sub.id).await.unwrap();
        assert_eq!(stored.state, SubmissionState::StagedUploadFailed);
    }

    #[tokio::test]
    async fn missing_published_copy_is_inconsistent_not_rejected() {
        let e = env().await;
        e.tree.add_file(&e.staging, "sword.png", b"old staged");
        let notifier = RecordingNotifier::default();
        let wf = workflow(&e, &e.storage, &notifier, Duration::hours(24));

        let sub = wf.submit(request("sword.png", "alex")).await.unwrap();
        vote_n(&wf, &sub.id, 2, 0).await;
        let done = wf.close_poll(&sub.id, after_window(&sub)).await.unwrap();

        assert_eq!(done.state, SubmissionState::Inconsistent);
        assert_eq!(notifier.escalations.lock().unwrap().len(), 1);
        assert!(e.storage.query_attributions(&CatalogFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn catalog_failure_after_promotion_is_escalated() {
        let e = env().await;
        e.tree.add_file(&e.staging, "sword.png", b"old staged");
        e.tree.add_file(&e.published, "sword.png", b"old live");
        let notifier = RecordingNotifier::default();
        let wf = workflow(&e, &BrokenCatalog, &notifier, Duration::hours(24));

        let sub = wf.submit(request("sword.png", "alex")).await.unwrap();
        wf.vote(&sub.id, "v1", Vote::Approve).await.unwrap();
        let done = wf.close_poll(&sub.id, after_window(&sub)).await.unwrap();
        assert_eq!(done.state, SubmissionState::Inconsistent);
        assert!(done.detail.unwrap().contains("attribution"));
        assert!(notifier.escalations.lock().unwrap()[0].contains("catalog offline"));
    }

    #[tokio::test]
    async fn poll_cannot_close_early() {
        let e = env().await;
        e.tree.add_file(&e.staging, "sword.png", b"old staged");
        let wf = workflow(&e, &e.storage, &LogNotifier, Duration::hours(24));
        let sub = wf.submit(request("sword.png", "alex")).await.unwrap();
        let err = wf.close_poll(&sub.id, Utc::now()).await.unwrap_err();
        assert!(err.to_string().contains("open until"));
    }

    #[tokio::test]
    async fn resume_due_settles_only_elapsed_polls() {
        let e = env().await;
        e.tree.add_file(&e.staging, "sword.png", b"s");
        e.tree.add_file(&e.published, "sword.png", b"p");
        e.tree.add_file(&e.staging, "pick.png", b"s");
        let wf = workflow(&e, &e.storage, &LogNotifier, Duration::hours(1));
        let short = wf.submit(request("sword.png", "alex")).await.unwrap();
        let sweep_at = after_window(&short);

        let long_wf = workflow(&e, &e.storage, &LogNotifier, Duration::hours(48));
        let long = long_wf.submit(request("pick.png", "sam")).await.unwrap();

        // A fresh workflow value stands in for a restarted process.
        let restarted = workflow(&e, &e.storage, &LogNotifier, Duration::hours(1));
        let settled = restarted.resume_due(sweep_at).await.unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].id, short.id);
        assert_eq!(settled[0].state, SubmissionState::Rejected);
        assert_eq!(restarted.status(&long.id).await.unwrap().state, SubmissionState::PollOpen);
    }

    #[tokio::test]
    async fn votes_after_settlement_are_refused() {
        let e = env().await;
        e.tree.add_file(&e.staging, "sword.png", b"s");
        let wf = workflow(&e, &e.storage, &LogNotifier, Duration::hours(1));
        let sub = wf.submit(request("sword.png", "alex")).await.unwrap();
        wf.close_poll(&sub.id, after_window(&sub)).await.unwrap();
        assert!(wf.vote(&sub.id, "late", Vote::Approve).await.is_err());
        assert!(matches!(
            wf.status("missing").await.unwrap_err(),
            SpriteVaultError::SubmissionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn wait_and_close_returns_after_short_window() {
        let e = env().await;
        e.tree.add_file(&e.staging, "sword.png", b"s");
        let wf = workflow(&e, &e.storage, &LogNotifier, Duration::milliseconds(50));
        let sub = wf.submit(request("sword.png", "alex")).await.unwrap();
        let done = wf.wait_and_close(&sub.id).await.unwrap();
        assert_eq!(done.state, SubmissionState::Rejected);
    }

    #[tokio::test]
    async fn unknown_category_is_refused_before_recording() {
        let e = env().await;
        let wf = workflow(&e, &e.storage, &LogNotifier, Duration::hours(1));
        let mut req = request("sword.png", "alex");
        req.category = Category::new("gui");
        let err = wf.submit(req).await.unwrap_err();
        assert!(matches!(err, SpriteVaultError::UnknownCategory(_)));
    }

    #[tokio::test]
    async fn staging_upload_failure_after_archiving_fails_staging() {
        let e = env().await;
        let old = e.tree.add_file(&e.staging, "sword.png", b"old staged");
        e.tree.fail_creates();
        let notifier = RecordingNotifier::default();
        let wf = workflow(&e, &e.storage, &notifier, Duration::hours(1));

        let sub = wf.submit(request("sword.png", "alex")).await.unwrap();
        assert_eq!(sub.state, SubmissionState::StagedUploadFailed);
        assert!(sub.detail.as_deref().unwrap().contains("upload of 'sword.png' failed"));
        assert!(sub.ballot_id.is_none());
        assert_eq!(e.tree.item(&old).unwrap().parents, vec![e.archive.clone()]);
        assert!(notifier.escalations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_settlers_promote_once() {
        let e = env().await;
        e.tree.add_file(&e.staging, "sword.png", b"old staged");
        e.tree.add_file(&e.published, "sword.png", b"old live");
        let notifier = RecordingNotifier::default();
        let tree = YieldingTree(&e.tree);
        let wf = ApprovalWorkflow::new(
            &tree,
            &e.folders,
            &e.storage,
            &e.storage,
            &e.storage,
            &notifier,
            Duration::hours(1),
        );

        let sub = wf.submit(request("sword.png", "alex")).await.unwrap();
        wf.vote(&sub.id, "v1", Vote::Approve).await.unwrap();

        let at = after_window(&sub);
        let (a, b) = tokio::join!(wf.close_poll(&sub.id, at), wf.close_poll(&sub.id, at));
        let states = [a.unwrap().state, b.unwrap().state];
        assert!(states.contains(&SubmissionState::Promoted), "{states:?}");
        assert!(!states.contains(&SubmissionState::Inconsistent), "{states:?}");

        assert_eq!(wf.status(&sub.id).await.unwrap().state, SubmissionState::Promoted);
        assert!(notifier.escalations.lock().unwrap().is_empty());
        let live = e.tree.children(&e.published);
        assert_eq!(live.len(), 1);
        assert_eq!(e.tree.bytes(&live[0].id).unwrap(), b"new pixels");
        assert_eq!(
            e.storage.query_attributions(&CatalogFilter::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn only_abandoned_closed_polls_are_resettled() {
        let e = env().await;
        for name in ["sword.png", "pick.png"] {
            e.tree.add_file(&e.staging, name, b"s");
            e.tree.add_file(&e.published, name, b"p");
        }
        let wf = workflow(&e, &e.storage, &LogNotifier, Duration::hours(1));
        let abandoned = wf.submit(request("sword.png", "alex")).await.unwrap();
        let busy = wf.submit(request("pick.png", "sam")).await.unwrap();
        wf.vote(&abandoned.id, "v1", Vote::Approve).await.unwrap();

        // One run crashed mid-settle an hour ago; another is settling now.
        for (sub, touched) in [
            (&abandoned, Utc::now() - Duration::hours(1)),
            (&busy, Utc::now()),
        ] {
            let mut closed = wf.status(&sub.id).await.unwrap();
            closed.state = SubmissionState::PollClosed;
            closed.updated_at = touched;
            assert!(e.storage.update_submission(&closed, SubmissionState::PollOpen).await.unwrap());
        }

        let settled = wf.resume_due(after_window(&busy)).await.unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].id, abandoned.id);
        assert_eq!(settled[0].state, SubmissionState::Promoted);

        let untouched = wf.close_poll(&busy.id, after_window(&busy)).await.unwrap();
        assert_eq!(untouched.state, SubmissionState::PollClosed);
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
