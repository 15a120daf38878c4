//! Read-side helpers used by the CLI and by downstream reporting.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::match_groups::{self, MatchGroup};
use crate::match_id::{MatchId, format_match_date};
use crate::record::{METRIC_COLUMNS, PlayerRecord};
use crate::schema::{object_type, quote_ident, table_columns};
use crate::team::Team;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterRow {
    pub match_id: Option<String>,
    #[serde(flatten)]
    pub record: PlayerRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchDetail {
    pub match_date: String,
    pub group: Option<MatchGroup>,
    pub yb: Option<Vec<MasterRow>>,
    pub enemy: Option<Vec<MasterRow>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub kind: String,
    pub rows: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub name: String,
    pub rows: i64,
    pub columns: Vec<String>,
}

/// Everything stored for one match date. `team = None` loads both sides.
pub fn match_by_date(conn: &Connection, date: NaiveDate, team: Option<Team>) -> Result<MatchDetail> {
    let wants = |t: Team| team.is_none_or(|only| only == t);
    let yb = if wants(Team::Yb) {
        Some(master_rows_for_date(conn, Team::Yb, date)?)
    } else {
        None
    };
    let enemy = if wants(Team::Enemy) {
        Some(master_rows_for_date(conn, Team::Enemy, date)?)
    } else {
        None
    };
    Ok(MatchDetail {
        match_date: format_match_date(date),
        group: match_groups::match_group(conn, date)?,
        yb,
        enemy,
    })
}

pub fn master_rows_for_date(conn: &Connection, team: Team, date: NaiveDate) -> Result<Vec<MasterRow>> {
    let master = team.master_table();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT match_id, player_name, {} FROM {master}
             WHERE match_date = ?1
             ORDER BY match_id, player_name",
            METRIC_COLUMNS.join(", ")
        ))
        .with_context(|| format!("prepare {master} date query"))?;
    let rows = stmt
        .query_map(params![format_match_date(date)], |row| {
            Ok(MasterRow {
                match_id: row.get("match_id")?,
                record: PlayerRecord::from_row(row)?,
            })
        })
        .with_context(|| format!("query {master} by date"))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode master row")?);
    }
    Ok(out)
}

/// Rows of one dated snapshot table, in insertion order.
pub fn read_snapshot(conn: &Connection, team: Team, id: &MatchId) -> Result<Vec<PlayerRecord>> {
    let table = team.snapshot_table(id);
    if object_type(conn, &table)?.as_deref() != Some("table") {
        return Err(anyhow!("no snapshot table {table}"));
    }
    let mut stmt = conn
        .prepare(&format!(
            "SELECT player_name, {} FROM {} ORDER BY rowid",
            METRIC_COLUMNS.join(", "),
            quote_ident(&table)
        ))
        .with_context(|| format!("prepare read of {table}"))?;
    let rows = stmt
        .query_map([], PlayerRecord::from_row)
        .with_context(|| format!("query {table}"))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode snapshot row")?);
    }
    Ok(out)
}

/// Tables and views with their row counts, sorted by name.
pub fn list_tables(conn: &Connection) -> Result<Vec<TableSummary>> {
    let mut stmt = conn
        .prepare(
            "SELECT name, type FROM sqlite_master
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .context("prepare table listing")?;
    let objects = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .context("list tables")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("decode table listing")?;

    let mut out = Vec::with_capacity(objects.len());
    for (name, kind) in objects {
        let rows = count_rows(conn, &name)?;
        out.push(TableSummary { name, kind, rows });
    }
    Ok(out)
}

pub fn table_stats(conn: &Connection, table: &str) -> Result<TableStats> {
    if object_type(conn, table)?.is_none() {
        return Err(anyhow!("no table or view named {table}"));
    }
    Ok(TableStats {
        name: table.to_string(),
        rows: count_rows(conn, table)?,
        columns: table_columns(conn, table)?
            .into_iter()
            .map(|c| c.name)
            .collect(),
    })
}

pub fn schema_version(conn: &Connection) -> Result<Option<String>> {
    if object_type(conn, "db_version")?.is_none() {
        return Ok(None);
    }
    conn.query_row("SELECT MAX(version) FROM db_version", [], |row| row.get(0))
        .optional()
        .map(Option::flatten)
        .context("read schema version")
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )
    .with_context(|| format!("count rows of {table}"))
}
