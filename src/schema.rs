use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::SchemaError;
use crate::match_id::MatchId;
use crate::record::METRIC_COLUMNS;
use crate::team::Team;

/// Version recorded in `db_version` once [`ensure_schema`] has run.
pub const SCHEMA_VERSION: &str = "1.3";

pub const MATCH_GROUPS_TABLE: &str = "match_groups";
pub const VERSION_TABLE: &str = "db_version";

pub(crate) const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite column affinity, resolved from a declared type the way SQLite does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

impl Affinity {
    pub fn of(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Affinity::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Affinity::Text
        } else if upper.is_empty() || upper.contains("BLOB") {
            Affinity::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Affinity::Real
        } else {
            Affinity::Numeric
        }
    }

    fn name(self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Text => "TEXT",
            Affinity::Blob => "BLOB",
            Affinity::Real => "REAL",
            Affinity::Numeric => "NUMERIC",
        }
    }
}

/// What to do when an existing table lacks a column.
#[derive(Debug, Clone, Copy)]
enum OnMissing {
    /// Row key; legacy tables without it still work.
    Skip,
    /// The table is unusable without it.
    Fail,
    /// `ALTER TABLE ADD COLUMN` with this declaration.
    Add(&'static str),
}

#[derive(Debug, Clone)]
struct ColumnSpec {
    name: &'static str,
    create: String,
    affinity: Affinity,
    on_missing: OnMissing,
}

impl ColumnSpec {
    fn new(name: &'static str, create: &str, affinity: Affinity, on_missing: OnMissing) -> Self {
        Self {
            name,
            create: create.to_string(),
            affinity,
            on_missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// What a call to [`ensure_schema`] changed.
#[derive(Debug, Clone, Default)]
pub struct SchemaReport {
    pub version: String,
    pub created_tables: Vec<String>,
    pub added_columns: Vec<(String, String)>,
    pub backfilled_match_ids: usize,
    pub normalized_rows: usize,
}

impl SchemaReport {
    pub fn is_noop(&self) -> bool {
        self.created_tables.is_empty()
            && self.added_columns.is_empty()
            && self.backfilled_match_ids == 0
            && self.normalized_rows == 0
    }
}

/// Opens the database file, creating parent directories, and brings the
/// schema up to date.
pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("set journal mode")?;
    // A locked database fails the current operation instead of waiting.
    conn.busy_timeout(Duration::ZERO)
        .context("set busy timeout")?;
    let report = ensure_schema(&mut conn)?;
    if !report.is_noop() {
        tracing::info!(
            created = ?report.created_tables,
            added = ?report.added_columns,
            backfilled = report.backfilled_match_ids,
            normalized = report.normalized_rows,
            "schema upgraded to {}",
            report.version
        );
    }
    Ok(conn)
}

/// Creates missing tables, adds missing columns and indexes, and records the
/// schema version. Safe to run on every startup; never drops data.
pub fn ensure_schema(conn: &mut Connection) -> Result<SchemaReport> {
    let tx = conn.transaction().context("begin schema transaction")?;
    let mut report = SchemaReport {
        version: SCHEMA_VERSION.to_string(),
        ..SchemaReport::default()
    };

    for team in Team::ALL {
        let table = team.master_table();
        ensure_table(&tx, table, &master_columns(), &mut report)?;
        reconcile_master_ids(&tx, table, &mut report)?;
        ensure_master_indexes(&tx, team)?;
    }

    ensure_table(&tx, MATCH_GROUPS_TABLE, &match_group_columns(), &mut report)?;
    tx.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_match_date ON match_groups(match_date);
        CREATE INDEX IF NOT EXISTS idx_created_at ON match_groups(created_at);
        "#,
    )
    .context("create match_groups indexes")?;

    ensure_table(&tx, VERSION_TABLE, &version_columns(), &mut report)?;
    tx.execute(
        "INSERT INTO db_version (version, updated_at) VALUES (?1, ?2)
         ON CONFLICT(version) DO NOTHING",
        params![SCHEMA_VERSION, now_timestamp()],
    )
    .context("record schema version")?;

    tx.commit().context("commit schema transaction")?;
    Ok(report)
}

/// Rewrites dashed `YYYY-MM-DD` dates and identifiers to their compact form
/// and fills in `match_id` for rows that were written without one. Runs on
/// every call; rows with a NULL `match_id` can appear after the column
/// exists.
fn reconcile_master_ids(conn: &Connection, table: &str, report: &mut SchemaReport) -> Result<()> {
    let quoted = quote_ident(table);
    let dashed_date = "'[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]'";
    let dashed_id = "'[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]*'";

    let dates = conn
        .execute(
            &format!(
                "UPDATE {quoted}
                 SET match_date = substr(match_date, 1, 4) || substr(match_date, 6, 2) || substr(match_date, 9, 2)
                 WHERE match_date GLOB {dashed_date}"
            ),
            [],
        )
        .with_context(|| format!("normalize {table}.match_date"))?;
    let ids = conn
        .execute(
            &format!(
                "UPDATE {quoted}
                 SET match_id = substr(match_id, 1, 4) || substr(match_id, 6, 2) || substr(match_id, 9)
                 WHERE match_id GLOB {dashed_id}"
            ),
            [],
        )
        .with_context(|| format!("normalize {table}.match_id"))?;
    let backfilled = conn
        .execute(
            &format!(
                "UPDATE {quoted} SET match_id = match_date || '_000000'
                 WHERE match_id IS NULL AND match_date IS NOT NULL"
            ),
            [],
        )
        .with_context(|| format!("backfill {table}.match_id"))?;

    if dates + ids + backfilled > 0 {
        tracing::info!(table, dates, ids, backfilled, "reconciled stored match identifiers");
    }
    report.normalized_rows += dates + ids;
    report.backfilled_match_ids += backfilled;
    Ok(())
}

fn master_columns() -> Vec<ColumnSpec> {
    let mut cols = vec![
        ColumnSpec::new(
            "id",
            "INTEGER PRIMARY KEY AUTOINCREMENT",
            Affinity::Integer,
            OnMissing::Skip,
        ),
        ColumnSpec::new("match_date", "TEXT NOT NULL", Affinity::Text, OnMissing::Fail),
        ColumnSpec::new("match_id", "TEXT", Affinity::Text, OnMissing::Add("TEXT")),
        ColumnSpec::new("player_name", "TEXT NOT NULL", Affinity::Text, OnMissing::Fail),
    ];
    for metric in METRIC_COLUMNS {
        cols.push(ColumnSpec::new(
            metric,
            "INTEGER NOT NULL DEFAULT 0",
            Affinity::Integer,
            OnMissing::Add("INTEGER NOT NULL DEFAULT 0"),
        ));
    }
    cols
}

fn match_group_columns() -> Vec<ColumnSpec> {
    let int = |name| {
        ColumnSpec::new(
            name,
            "INTEGER NOT NULL DEFAULT 0",
            Affinity::Integer,
            OnMissing::Add("INTEGER NOT NULL DEFAULT 0"),
        )
    };
    let real = |name| {
        ColumnSpec::new(
            name,
            "REAL NOT NULL DEFAULT 0",
            Affinity::Real,
            OnMissing::Add("REAL NOT NULL DEFAULT 0"),
        )
    };
    vec![
        ColumnSpec::new(
            "id",
            "INTEGER PRIMARY KEY AUTOINCREMENT",
            Affinity::Integer,
            OnMissing::Skip,
        ),
        ColumnSpec::new(
            "match_date",
            "TEXT NOT NULL UNIQUE",
            Affinity::Text,
            OnMissing::Fail,
        ),
        int("yb_player_count"),
        int("enemy_player_count"),
        int("yb_match_count"),
        int("enemy_match_count"),
        int("yb_total_defeated"),
        int("enemy_total_defeated"),
        real("yb_avg_damage"),
        real("enemy_avg_damage"),
        int("has_yb_data"),
        int("has_enemy_data"),
        // ADD COLUMN cannot take a CURRENT_TIMESTAMP default.
        ColumnSpec::new(
            "created_at",
            "TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
            Affinity::Numeric,
            OnMissing::Add("TIMESTAMP"),
        ),
        ColumnSpec::new(
            "updated_at",
            "TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
            Affinity::Numeric,
            OnMissing::Add("TIMESTAMP"),
        ),
    ]
}

fn version_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("version", "TEXT PRIMARY KEY", Affinity::Text, OnMissing::Fail),
        ColumnSpec::new(
            "updated_at",
            "TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
            Affinity::Numeric,
            OnMissing::Add("TIMESTAMP"),
        ),
    ]
}

/// Creates `table` from `spec` or reconciles an existing one.
fn ensure_table(
    conn: &Connection,
    table: &str,
    spec: &[ColumnSpec],
    report: &mut SchemaReport,
) -> Result<()> {
    match object_type(conn, table)?.as_deref() {
        None => {
            let cols = spec
                .iter()
                .map(|c| format!("{} {}", c.name, c.create))
                .collect::<Vec<_>>()
                .join(",\n    ");
            conn.execute_batch(&format!("CREATE TABLE {} (\n    {cols}\n);", quote_ident(table)))
                .with_context(|| format!("create table {table}"))?;
            tracing::debug!(table, "created table");
            report.created_tables.push(table.to_string());
            return Ok(());
        }
        Some("table") => {}
        Some(_) => return Err(SchemaError::NotATable(table.to_string()).into()),
    }

    let existing = table_columns(conn, table)?;
    for col in spec {
        match existing.iter().find(|c| c.name.eq_ignore_ascii_case(col.name)) {
            Some(found) => {
                let actual = Affinity::of(&found.declared_type);
                if actual != col.affinity {
                    return Err(SchemaError::ColumnConflict {
                        table: table.to_string(),
                        column: col.name.to_string(),
                        declared: found.declared_type.clone(),
                        expected: col.affinity.name(),
                    }
                    .into());
                }
            }
            None => match col.on_missing {
                OnMissing::Skip => {}
                OnMissing::Fail => {
                    return Err(SchemaError::MissingColumn {
                        table: table.to_string(),
                        column: col.name.to_string(),
                    }
                    .into());
                }
                OnMissing::Add(decl) => {
                    conn.execute_batch(&format!(
                        "ALTER TABLE {} ADD COLUMN {} {decl};",
                        quote_ident(table),
                        col.name
                    ))
                    .with_context(|| format!("add column {table}.{}", col.name))?;
                    tracing::info!(table, column = col.name, "added column");
                    report
                        .added_columns
                        .push((table.to_string(), col.name.to_string()));
                }
            },
        }
    }
    Ok(())
}

fn ensure_master_indexes(conn: &Connection, team: Team) -> Result<()> {
    let table = team.master_table();
    let prefix = team.index_prefix();
    conn.execute_batch(&format!(
        r#"
        CREATE INDEX IF NOT EXISTS {prefix}_match_date ON {table}(match_date);
        CREATE INDEX IF NOT EXISTS {prefix}_match_id ON {table}(match_id);
        CREATE INDEX IF NOT EXISTS {prefix}_player_name ON {table}(player_name);
        "#
    ))
    .with_context(|| format!("create {table} indexes"))?;

    let unique = format!("{prefix}_match_player");
    if object_type(conn, &unique)?.is_some() {
        return Ok(());
    }
    let dupes: i64 = conn
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM (
                    SELECT 1 FROM {table} GROUP BY match_id, player_name HAVING COUNT(*) > 1
                 )"
            ),
            [],
            |row| row.get(0),
        )
        .with_context(|| format!("count duplicate rows in {table}"))?;
    if dupes > 0 {
        return Err(SchemaError::DuplicateRows {
            table: table.to_string(),
            count: dupes,
        }
        .into());
    }
    conn.execute_batch(&format!(
        "CREATE UNIQUE INDEX {unique} ON {table}(match_id, player_name);"
    ))
    .with_context(|| format!("create unique index on {table}"))?;
    Ok(())
}

/// Drops and recreates the dated snapshot table for one team's match.
pub fn create_snapshot_table(conn: &Connection, team: Team, id: &MatchId) -> Result<String> {
    let table = team.snapshot_table(id);
    let metrics = METRIC_COLUMNS
        .iter()
        .map(|m| format!("{m} INTEGER NOT NULL"))
        .collect::<Vec<_>>()
        .join(",\n    ");
    let quoted = quote_ident(&table);
    conn.execute_batch(&format!(
        r#"
        DROP TABLE IF EXISTS {quoted};
        CREATE TABLE {quoted} (
            player_name TEXT NOT NULL,
            {metrics},
            match_date TEXT NOT NULL,
            match_id TEXT NOT NULL,
            team TEXT NOT NULL
        );
        "#
    ))
    .with_context(|| format!("create snapshot table {table}"))?;
    Ok(table)
}

/// Columns of `table` as reported by `PRAGMA table_info`.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn
        .prepare(r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1)"#)
        .context("prepare table_info query")?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                declared_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                primary_key: row.get::<_, i64>(3)? != 0,
            })
        })
        .with_context(|| format!("query columns of {table}"))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode table_info row")?);
    }
    Ok(out)
}

/// `"table"`, `"view"`, `"index"` or `None` for an unknown name.
pub fn object_type(conn: &Connection, name: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT type FROM sqlite_master WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("look up {name} in sqlite_master"))
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FMT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_follows_sqlite_rules() {
        assert_eq!(Affinity::of("INTEGER"), Affinity::Integer);
        assert_eq!(Affinity::of("bigint"), Affinity::Integer);
        assert_eq!(Affinity::of("VARCHAR(20)"), Affinity::Text);
        assert_eq!(Affinity::of(""), Affinity::Blob);
        assert_eq!(Affinity::of("DOUBLE PRECISION"), Affinity::Real);
        assert_eq!(Affinity::of("TIMESTAMP"), Affinity::Numeric);
        // "POINT" contains "INT".
        assert_eq!(Affinity::of("FLOATING POINT"), Affinity::Integer);
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("yb_stats_20260101"), "\"yb_stats_20260101\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
