//! Capabilities the workflow and listings consume besides the remote tree.
//!
//! [`Storage`] implements [`Catalog`] and [`BallotBox`]; [`LogNotifier`] is
//! the default [`Notifier`] and renders everything through `tracing`.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use spritevault_shared::{
    AttributionRecord, Ballot, CatalogFilter, Result, SpriteVaultError, Submission, Vote,
};
use spritevault_storage::Storage;

/// Creator attribution records.
pub trait Catalog: Send + Sync {
    /// Write a record, replacing any previous one with the same key.
    fn put(&self, record: &AttributionRecord) -> impl Future<Output = Result<()>> + Send;

    /// Records matching every set field of `filter`.
    fn query(
        &self,
        filter: &CatalogFilter,
    ) -> impl Future<Output = Result<Vec<AttributionRecord>>> + Send;
}

/// An opened approve/reject ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotHandle {
    pub id: String,
    pub closes_at: DateTime<Utc>,
}

/// Timed approve/reject votes.
pub trait BallotBox: Send + Sync {
    /// Open a ballot on `subject` that accepts votes for `window`.
    fn open_ballot(
        &self,
        submission_id: &str,
        subject: &str,
        previous_item_id: Option<&str>,
        window: Duration,
    ) -> impl Future<Output = Result<BallotHandle>> + Send;

    /// Record one voter's choice; a later vote by the same voter replaces it.
    fn cast_vote(
        &self,
        ballot_id: &str,
        voter_id: &str,
        vote: Vote,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Count the votes at this instant.
    fn tally(&self, ballot_id: &str) -> impl Future<Output = Result<Ballot>> + Send;
}

/// Delivery of workflow messages to submitters and operators.
pub trait Notifier: Send + Sync {
    /// Tell the submitter about a state change.
    fn notify(&self, submission: &Submission, message: &str) -> impl Future<Output = ()> + Send;

    /// Raise a problem that needs an operator.
    fn escalate(
        &self,
        submission: &Submission,
        error: &SpriteVaultError,
    ) -> impl Future<Output = ()> + Send;
}

impl Catalog for Storage {
    async fn put(&self, record: &AttributionRecord) -> Result<()> {
        self.put_attribution(record).await
    }

    async fn query(&self, filter: &CatalogFilter) -> Result<Vec<AttributionRecord>> {
        self.query_attributions(filter).await
    }
}

impl BallotBox for Storage {
    async fn open_ballot(
        &self,
        submission_id: &str,
        subject: &str,
        previous_item_id: Option<&str>,
        window: Duration,
    ) -> Result<BallotHandle> {
        let closes_at = Utc::now() + window;
        let id = self
            .insert_ballot(submission_id, subject, previous_item_id, closes_at)
            .await?;
        Ok(BallotHandle { id, closes_at })
    }

    async fn cast_vote(&self, ballot_id: &str, voter_id: &str, vote: Vote) -> Result<()> {
        Storage::cast_vote(self, ballot_id, voter_id, vote).await
    }

    async fn tally(&self, ballot_id: &str) -> Result<Ballot> {
        self.tally_ballot(ballot_id).await
    }
}

/// Notifier that only logs.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, submission: &Submission, message: &str) {
        info!(
            submission = %submission.id,
            submitter = %submission.submitter_name,
            state = %submission.state,
            "{message}"
        );
    }

    async fn escalate(&self, submission: &Submission, error: &SpriteVaultError) {
        error!(
            submission = %submission.id,
            sprite = %submission.sprite_name,
            category = %submission.category,
            %error,
            "operator attention required"
        );
    }
}
