//! libSQL storage layer.
//!
//! The [`Storage`] struct wraps a local libSQL database holding:
//! - the attribution catalog (who created each published sprite)
//! - persisted review submissions, so a restart never loses a pending vote
//! - ballots and the votes cast on them
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that
//! lexicographic comparison in SQL matches chronological order.

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use spritevault_shared::{
    AttributionRecord, Ballot, CatalogFilter, Category, Result, SpriteVaultError, Submission,
    SubmissionState, Vote,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// A persisted ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotRecord {
    pub id: String,
    pub submission_id: String,
    /// What is being voted on (the sprite file name).
    pub subject: String,
    /// Currently published copy reviewers compare against, if any.
    pub previous_item_id: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

fn db_err(e: libsql::Error) -> SpriteVaultError {
    SpriteVaultError::Storage(e.to_string())
}

/// Format a timestamp in the fixed-width form used by every table.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SpriteVaultError::Storage(format!("invalid date '{s}': {e}")))
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SpriteVaultError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SpriteVaultError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Attribution catalog
    // -----------------------------------------------------------------------

    /// Write an attribution, replacing any previous row for the same
    /// category and sprite name.
    pub async fn put_attribution(&self, record: &AttributionRecord) -> Result<()> {
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO attributions (category, sprite_name, creator_id, creator_name, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(category, sprite_name) DO UPDATE SET
                   creator_id = excluded.creator_id,
                   creator_name = excluded.creator_name,
                   updated_at = excluded.updated_at",
                params![
                    record.category.as_str(),
                    record.sprite_name.as_str(),
                    record.creator_id.as_str(),
                    record.creator_name.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Query attributions; unset filter fields match every row.
    pub async fn query_attributions(&self, filter: &CatalogFilter) -> Result<Vec<AttributionRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT category, sprite_name, creator_id, creator_name FROM attributions
                 WHERE (?1 IS NULL OR sprite_name = ?1)
                   AND (?2 IS NULL OR creator_name = ?2)
                   AND (?3 IS NULL OR creator_id = ?3)
                   AND (?4 IS NULL OR category = ?4)
                 ORDER BY sprite_name, category",
                params![
                    filter.sprite_name.as_deref(),
                    filter.creator_name.as_deref(),
                    filter.creator_id.as_deref(),
                    filter.category.as_ref().map(Category::as_str),
                ],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(AttributionRecord {
                category: Category::new(row.get::<String>(0).map_err(db_err)?),
                sprite_name: row.get::<String>(1).map_err(db_err)?,
                creator_id: row.get::<String>(2).map_err(db_err)?,
                creator_name: row.get::<String>(3).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Submissions
    // -----------------------------------------------------------------------

    /// Insert a new submission record.
    pub async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO submissions (id, sprite_name, category, submitter_id, submitter_name,
                   content_hash, state, staged_item_id, ballot_id, poll_closes_at, detail,
                   created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    submission.id.as_str(),
                    submission.sprite_name.as_str(),
                    submission.category.as_str(),
                    submission.submitter_id.as_str(),
                    submission.submitter_name.as_str(),
                    submission.content_hash.as_str(),
                    submission.state.as_str(),
                    submission.staged_item_id.as_deref(),
                    submission.ballot_id.as_deref(),
                    submission.poll_closes_at.as_ref().map(ts),
                    submission.detail.as_deref(),
                    ts(&submission.created_at),
                    ts(&submission.updated_at),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Persist the mutable fields of a submission (state, links, detail) if
    /// its stored state is still `expected`.
    ///
    /// Returns `false` when another writer moved the submission first; the
    /// stored row is left untouched.
    pub async fn update_submission(
        &self,
        submission: &Submission,
        expected: SubmissionState,
    ) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE submissions SET state = ?1, staged_item_id = ?2, ballot_id = ?3,
                   poll_closes_at = ?4, detail = ?5, updated_at = ?6
                 WHERE id = ?7 AND state = ?8",
                params![
                    submission.state.as_str(),
                    submission.staged_item_id.as_deref(),
                    submission.ballot_id.as_deref(),
                    submission.poll_closes_at.as_ref().map(ts),
                    submission.detail.as_deref(),
                    ts(&submission.updated_at),
                    submission.id.as_str(),
                    expected.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return self.ensure_submission(&submission.id).await.map(|()| false);
        }
        Ok(true)
    }

    /// Take over a submission whose last write was at `seen`, stamping it
    /// with `at`. Only one caller can win for a given `seen`.
    pub async fn claim_submission(
        &self,
        id: &str,
        state: SubmissionState,
        seen: &DateTime<Utc>,
        at: &DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE submissions SET updated_at = ?1
                 WHERE id = ?2 AND state = ?3 AND updated_at = ?4",
                params![ts(at), id, state.as_str(), ts(seen)],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return self.ensure_submission(id).await.map(|()| false);
        }
        Ok(true)
    }

    async fn ensure_submission(&self, id: &str) -> Result<()> {
        match self.get_submission(id).await? {
            Some(_) => Ok(()),
            None => Err(SpriteVaultError::SubmissionNotFound(id.to_string())),
        }
    }

    /// Get a submission by ID.
    pub async fn get_submission(&self, id: &str) -> Result<Option<Submission>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_submission(&row)?)),
            None => Ok(None),
        }
    }

    /// Submissions whose voting window has elapsed by `now`, oldest deadline first.
    pub async fn due_submissions(&self, now: DateTime<Utc>) -> Result<Vec<Submission>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions
                     WHERE state = ?1 AND poll_closes_at IS NOT NULL AND poll_closes_at <= ?2
                     ORDER BY poll_closes_at"
                ),
                params![SubmissionState::PollOpen.as_str(), ts(&now)],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_submission(&row)?);
        }
        Ok(results)
    }

    /// All submissions in `state`, newest first.
    pub async fn submissions_in_state(&self, state: SubmissionState) -> Result<Vec<Submission>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE state = ?1
                     ORDER BY created_at DESC"
                ),
                params![state.as_str()],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_submission(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Ballots
    // -----------------------------------------------------------------------

    /// Open a ballot for a submission. Returns the generated ballot ID.
    pub async fn insert_ballot(
        &self,
        submission_id: &str,
        subject: &str,
        previous_item_id: Option<&str>,
        closes_at: DateTime<Utc>,
    ) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO ballots (id, submission_id, subject, previous_item_id, opened_at, closes_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    submission_id,
                    subject,
                    previous_item_id,
                    now.as_str(),
                    ts(&closes_at),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Get a ballot by ID.
    pub async fn get_ballot(&self, id: &str) -> Result<Option<BallotRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, submission_id, subject, previous_item_id, opened_at, closes_at
                 FROM ballots WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(None);
        };
        Ok(Some(BallotRecord {
            id: row.get::<String>(0).map_err(db_err)?,
            submission_id: row.get::<String>(1).map_err(db_err)?,
            subject: row.get::<String>(2).map_err(db_err)?,
            previous_item_id: row.get::<String>(3).ok(),
            opened_at: parse_ts(&row.get::<String>(4).map_err(db_err)?)?,
            closes_at: parse_ts(&row.get::<String>(5).map_err(db_err)?)?,
        }))
    }

    /// Record `voter_id`'s choice, replacing an earlier vote by the same voter.
    /// Votes arriving after the ballot closed are refused.
    pub async fn cast_vote(&self, ballot_id: &str, voter_id: &str, vote: Vote) -> Result<()> {
        let ballot = self
            .get_ballot(ballot_id)
            .await?
            .ok_or_else(|| SpriteVaultError::validation(format!("ballot '{ballot_id}' not found")))?;

        let now = Utc::now();
        if now >= ballot.closes_at {
            return Err(SpriteVaultError::validation(format!(
                "ballot '{ballot_id}' closed at {}",
                ballot.closes_at
            )));
        }

        self.conn
            .execute(
                "INSERT INTO votes (ballot_id, voter_id, choice, cast_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(ballot_id, voter_id) DO UPDATE SET
                   choice = excluded.choice,
                   cast_at = excluded.cast_at",
                params![ballot_id, voter_id, vote.as_str(), ts(&now)],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Count both voter sets in one query.
    pub async fn tally_ballot(&self, ballot_id: &str) -> Result<Ballot> {
        let mut rows = self
            .conn
            .query(
                "SELECT
                   COALESCE(SUM(CASE WHEN choice = 'approve' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN choice = 'reject' THEN 1 ELSE 0 END), 0)
                 FROM votes WHERE ballot_id = ?1",
                params![ballot_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Ballot {
                approve: row.get::<u32>(0).map_err(db_err)?,
                reject: row.get::<u32>(1).map_err(db_err)?,
            }),
            None => Ok(Ballot::default()),
        }
    }
}

/// Column list matching [`row_to_submission`].
const SUBMISSION_COLUMNS: &str = "id, sprite_name, category, submitter_id, submitter_name, \
     content_hash, state, staged_item_id, ballot_id, poll_closes_at, detail, created_at, updated_at";

/// Convert a database row to a [`Submission`].
fn row_to_submission(row: &libsql::Row) -> Result<Submission> {
    let state: String = row.get(6).map_err(db_err)?;
    Ok(Submission {
        id: row.get::<String>(0).map_err(db_err)?,
        sprite_name: row.get::<String>(1).map_err(db_err)?,
        category: Category::new(row.get::<String>(2).map_err(db_err)?),
        submitter_id: row.get::<String>(3).map_err(db_err)?,
        submitter_name: row.get::<String>(4).map_err(db_err)?,
        content_hash: row.get::<String>(5).map_err(db_err)?,
        state: state.parse()?,
        staged_item_id: row.get::<String>(7).ok(),
        ballot_id: row.get::<String>(8).ok(),
        poll_closes_at: match row.get::<String>(9).ok() {
            Some(s) => Some(parse_ts(&s)?),
            None => None,
        },
        detail: row.get::<String>(10).ok(),
        created_at: parse_ts(&row.get::<String>(11).map_err(db_err)?)?,
        updated_at: parse_ts(&row.get::<String>(12).map_err(db_err)?)?,
    })
}
