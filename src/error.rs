//! Structured errors for the ingestion pipeline.
//!
//! Database plumbing errors travel as `anyhow::Error` with context; the enums
//! here are the cases a caller may want to tell apart, and they are carried
//! inside `anyhow::Error` so they can be recovered with `downcast_ref`.

use thiserror::Error;

/// Problems with user-supplied player rows. Always raised before any write.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("line {line}: column `{column}` is not an integer: {value:?}")]
    InvalidNumber {
        line: u64,
        column: &'static str,
        value: String,
    },

    #[error("line {line}: player_name is empty")]
    BlankPlayer { line: u64 },

    #[error("player `{0}` appears more than once")]
    DuplicatePlayer(String),

    #[error("no player rows to ingest")]
    Empty,

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),
}

/// Existing database objects that do not match the expected layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error(
        "column {table}.{column} has declared type {declared:?}, expected {expected} affinity"
    )]
    ColumnConflict {
        table: String,
        column: String,
        declared: String,
        expected: &'static str,
    },

    #[error("{table} has no `{column}` column")]
    MissingColumn { table: String, column: String },

    #[error("{table} holds {count} duplicate (match_id, player_name) groups")]
    DuplicateRows { table: String, count: i64 },

    #[error("`{0}` exists but is not a table")]
    NotATable(String),

    #[error("`{0}` exists but is not a view; run migrate-legacy first")]
    NotAView(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchIdError {
    #[error("invalid match identifier {0:?}: expected YYYYMMDD or YYYYMMDD_HHMMSS")]
    Format(String),

    #[error("invalid match date {0:?}: expected YYYYMMDD")]
    Date(String),
}
