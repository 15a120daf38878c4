//! One-off conversion of databases that predate match history, where
//! `yb_stats` / `enemy_stats` were plain tables holding a single match.

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, params};

use crate::error::SchemaError;
use crate::match_groups;
use crate::match_id::MatchId;
use crate::record::METRIC_COLUMNS;
use crate::schema::{object_type, quote_ident, table_columns};
use crate::team::Team;
use crate::views;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyOutcome {
    Migrated { snapshot_table: String, rows: usize },
    AlreadyMigrated,
    NothingToMigrate,
}

/// Renames the legacy table to its dated snapshot name, copies its rows into
/// the master table under `id`, and puts the latest view in its place.
pub fn migrate_legacy(conn: &mut Connection, team: Team, id: MatchId) -> Result<LegacyOutcome> {
    let legacy = team.latest_view();
    match object_type(conn, legacy)?.as_deref() {
        None => return Ok(LegacyOutcome::NothingToMigrate),
        Some("view") => return Ok(LegacyOutcome::AlreadyMigrated),
        Some("table") => {}
        Some(other) => return Err(anyhow!("{legacy} is a {other}, cannot migrate")),
    }

    let columns = table_columns(conn, legacy)?;
    for required in std::iter::once("player_name").chain(METRIC_COLUMNS) {
        if !columns.iter().any(|c| c.name == required) {
            return Err(SchemaError::MissingColumn {
                table: legacy.to_string(),
                column: required.to_string(),
            }
            .into());
        }
    }

    let snapshot = team.snapshot_table(&id);
    if object_type(conn, &snapshot)?.is_some() {
        return Err(anyhow!("{snapshot} already exists; pick another identifier"));
    }

    let tx = conn.transaction().context("begin legacy migration")?;
    let snapshot_q = quote_ident(&snapshot);
    tx.execute_batch(&format!(
        "ALTER TABLE {} RENAME TO {snapshot_q};",
        quote_ident(legacy)
    ))
    .with_context(|| format!("rename {legacy} to {snapshot}"))?;

    for (column, decl) in [("match_date", "TEXT"), ("match_id", "TEXT"), ("team", "TEXT")] {
        if !columns.iter().any(|c| c.name == column) {
            tx.execute_batch(&format!(
                "ALTER TABLE {snapshot_q} ADD COLUMN {column} {decl};"
            ))
            .with_context(|| format!("add {column} to {snapshot}"))?;
        }
    }
    tx.execute(
        &format!("UPDATE {snapshot_q} SET match_date = ?1, match_id = ?2, team = ?3"),
        params![id.date_key(), id.key(), team.label()],
    )
    .with_context(|| format!("tag rows of {snapshot}"))?;

    let master = team.master_table();
    let cols = METRIC_COLUMNS.join(", ");
    let values = METRIC_COLUMNS
        .iter()
        .map(|c| format!("COALESCE({c}, 0)"))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute(
        &format!("DELETE FROM {master} WHERE match_id = ?1"),
        params![id.key()],
    )
    .with_context(|| format!("clear {master} rows for {id}"))?;
    let rows = tx
        .execute(
            &format!(
                "INSERT INTO {master} (match_date, match_id, player_name, {cols})
                 SELECT ?1, ?2, TRIM(player_name), {values} FROM {snapshot_q}"
            ),
            params![id.date_key(), id.key()],
        )
        .with_context(|| format!("copy {snapshot} into {master}"))?;

    views::refresh_latest_view(&tx, team)?;
    match_groups::refresh_match_groups(&tx)?;
    tx.commit().context("commit legacy migration")?;

    tracing::info!(%team, snapshot = %snapshot, rows, "migrated legacy table");
    Ok(LegacyOutcome::Migrated {
        snapshot_table: snapshot,
        rows,
    })
}
