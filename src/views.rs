//! Per-team "latest match" views over the master tables.

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::error::SchemaError;
use crate::match_id::MatchId;
use crate::record::{METRIC_COLUMNS, PlayerRecord};
use crate::schema::{object_type, quote_ident};
use crate::team::Team;

/// Distinct match identifiers stored in a team's master table, oldest first.
///
/// Rows whose identifier does not parse are skipped with a warning rather
/// than taking part in the ordering.
pub fn match_ids(conn: &Connection, team: Team) -> Result<Vec<MatchId>> {
    let table = team.master_table();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT DISTINCT match_id FROM {table} WHERE match_id IS NOT NULL"
        ))
        .with_context(|| format!("prepare match id query for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .with_context(|| format!("query match ids from {table}"))?;

    let mut out = Vec::new();
    for row in rows {
        let raw = row.context("decode match id")?;
        match MatchId::parse(&raw) {
            Ok(id) => out.push(id),
            Err(err) => tracing::warn!(table, %err, "skipping unparseable match id"),
        }
    }
    out.sort();
    Ok(out)
}

pub fn latest_match_id(conn: &Connection, team: Team) -> Result<Option<MatchId>> {
    Ok(match_ids(conn, team)?.into_iter().max())
}

/// Drops and recreates the team's latest view so it selects the master rows
/// of the greatest match identifier. With an empty master table the view is
/// created but yields no rows.
pub fn refresh_latest_view(conn: &Connection, team: Team) -> Result<Option<MatchId>> {
    let view = team.latest_view();
    match object_type(conn, view)?.as_deref() {
        None | Some("view") => {}
        Some(_) => return Err(SchemaError::NotAView(view.to_string()).into()),
    }

    let latest = latest_match_id(conn, team)?;
    // The key is produced by MatchId, so it is digits and '_' only.
    let filter = match &latest {
        Some(id) => format!("match_id = '{}'", id.key()),
        None => "0".to_string(),
    };
    conn.execute_batch(&format!(
        r#"
        DROP VIEW IF EXISTS {view_q};
        CREATE VIEW {view_q} AS
        SELECT player_name, {cols}
        FROM {master}
        WHERE {filter};
        "#,
        view_q = quote_ident(view),
        cols = METRIC_COLUMNS.join(", "),
        master = team.master_table(),
    ))
    .with_context(|| format!("recreate view {view}"))?;

    match &latest {
        Some(id) => tracing::debug!(view, latest = %id, "refreshed latest view"),
        None => tracing::debug!(view, "refreshed latest view over empty master table"),
    }
    Ok(latest)
}

/// Reads the rows currently exposed by the team's latest view.
pub fn read_latest(conn: &Connection, team: Team) -> Result<Vec<PlayerRecord>> {
    let view = team.latest_view();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT player_name, {} FROM {} ORDER BY player_name",
            METRIC_COLUMNS.join(", "),
            quote_ident(view)
        ))
        .with_context(|| format!("prepare read of {view}"))?;
    let rows = stmt
        .query_map(params![], PlayerRecord::from_row)
        .with_context(|| format!("query {view}"))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode view row")?);
    }
    Ok(out)
}
