//! SQL migration definitions for the spritevault database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: attributions catalog",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Who created each published sprite (last write wins per category + name)
CREATE TABLE IF NOT EXISTS attributions (
    category     TEXT NOT NULL,
    sprite_name  TEXT NOT NULL,
    creator_id   TEXT NOT NULL,
    creator_name TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (category, sprite_name)
);

CREATE INDEX IF NOT EXISTS idx_attributions_creator_id ON attributions(creator_id);
CREATE INDEX IF NOT EXISTS idx_attributions_creator_name ON attributions(creator_name);

INSERT OR IGNORE INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Durable review workflow: submissions, ballots, votes",
            sql: r#"
-- One row per submission, updated on every state transition
CREATE TABLE IF NOT EXISTS submissions (
    id             TEXT PRIMARY KEY,
    sprite_name    TEXT NOT NULL,
    category       TEXT NOT NULL,
    submitter_id   TEXT NOT NULL,
    submitter_name TEXT NOT NULL,
    content_hash   TEXT NOT NULL,
    state          TEXT NOT NULL,
    staged_item_id TEXT,
    ballot_id      TEXT,
    poll_closes_at TEXT,
    detail         TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_submissions_state_due ON submissions(state, poll_closes_at);

-- Approve/reject ballots
CREATE TABLE IF NOT EXISTS ballots (
    id               TEXT PRIMARY KEY,
    submission_id    TEXT NOT NULL,
    subject          TEXT NOT NULL,
    previous_item_id TEXT,
    opened_at        TEXT NOT NULL,
    closes_at        TEXT NOT NULL
);

-- One vote per voter per ballot; re-voting replaces the choice
CREATE TABLE IF NOT EXISTS votes (
    ballot_id TEXT NOT NULL REFERENCES ballots(id) ON DELETE CASCADE,
    voter_id  TEXT NOT NULL,
    choice    TEXT NOT NULL CHECK (choice IN ('approve', 'reject')),
    cast_at   TEXT NOT NULL,
    PRIMARY KEY (ballot_id, voter_id)
);

INSERT OR IGNORE INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
