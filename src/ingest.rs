use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, Transaction, params};
use serde::Serialize;

use crate::match_groups;
use crate::match_id::MatchId;
use crate::record::{self, METRIC_COLUMNS, PlayerRecord};
use crate::schema::{self, quote_ident};
use crate::team::Team;
use crate::views;

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub team: Team,
    pub match_id: MatchId,
    pub snapshot_table: String,
    pub rows_written: usize,
    /// Master rows that carried the same identifier before this run.
    pub rows_replaced: usize,
    pub latest_match_id: Option<MatchId>,
    pub match_groups_refreshed: usize,
}

/// Loads one team's scoreboard for one match.
///
/// Rows are validated before the database is touched. The snapshot table,
/// the master rows, the latest view and the match groups are then written
/// in a single transaction, so a failure leaves none of them changed.
/// Re-ingesting an identifier replaces its master rows.
pub fn ingest_team(
    conn: &mut Connection,
    team: Team,
    match_id: MatchId,
    records: &[PlayerRecord],
) -> Result<IngestSummary> {
    let records = prepare(records)?;

    let tx = conn.transaction().context("begin ingest transaction")?;
    let (snapshot_table, rows_replaced) = write_team(&tx, team, &match_id, &records)?;
    let latest_match_id = views::refresh_latest_view(&tx, team)?;
    let match_groups_refreshed = match_groups::refresh_match_groups(&tx)?;
    tx.commit().context("commit ingest transaction")?;

    tracing::info!(
        team = %team,
        match_id = %match_id,
        rows = records.len(),
        replaced = rows_replaced,
        "ingested match"
    );
    Ok(IngestSummary {
        team,
        match_id,
        snapshot_table,
        rows_written: records.len(),
        rows_replaced,
        latest_match_id,
        match_groups_refreshed,
    })
}

/// Decodes a scoreboard CSV and ingests it. Decode errors abort before the
/// database is touched.
pub fn ingest_csv(
    conn: &mut Connection,
    team: Team,
    match_id: MatchId,
    path: &Path,
) -> Result<IngestSummary> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let records =
        record::decode_csv(file).with_context(|| format!("decode {}", path.display()))?;
    ingest_team(conn, team, match_id, &records)
}

/// Decodes a `.csv` or `.json` file and ingests it. A JSON file that names
/// its own team or identifier must agree with the arguments.
pub fn ingest_file(
    conn: &mut Connection,
    team: Team,
    match_id: MatchId,
    path: &Path,
) -> Result<IngestSummary> {
    let input = record::read_input_file(path)?;
    if let Some(file_team) = input.team
        && file_team != team
    {
        return Err(anyhow!(
            "{} is tagged for team {file_team}, not {team}",
            path.display()
        ));
    }
    if let Some(file_id) = input.match_id
        && file_id != match_id
    {
        return Err(anyhow!(
            "{} is tagged for match {file_id}, not {match_id}",
            path.display()
        ));
    }
    ingest_team(conn, team, match_id, &input.players)
}

/// Loads both teams' scoreboards of one match in one transaction.
pub fn ingest_match(
    conn: &mut Connection,
    match_id: MatchId,
    yb: &[PlayerRecord],
    enemy: &[PlayerRecord],
) -> Result<[IngestSummary; 2]> {
    let yb = prepare(yb).context("yb rows")?;
    let enemy = prepare(enemy).context("enemy rows")?;

    let tx = conn.transaction().context("begin ingest transaction")?;
    let (yb_table, yb_replaced) = write_team(&tx, Team::Yb, &match_id, &yb)?;
    let (enemy_table, enemy_replaced) = write_team(&tx, Team::Enemy, &match_id, &enemy)?;
    let yb_latest = views::refresh_latest_view(&tx, Team::Yb)?;
    let enemy_latest = views::refresh_latest_view(&tx, Team::Enemy)?;
    let groups = match_groups::refresh_match_groups(&tx)?;
    tx.commit().context("commit ingest transaction")?;

    tracing::info!(
        match_id = %match_id,
        yb_rows = yb.len(),
        enemy_rows = enemy.len(),
        "ingested both teams"
    );
    Ok([
        IngestSummary {
            team: Team::Yb,
            match_id,
            snapshot_table: yb_table,
            rows_written: yb.len(),
            rows_replaced: yb_replaced,
            latest_match_id: yb_latest,
            match_groups_refreshed: groups,
        },
        IngestSummary {
            team: Team::Enemy,
            match_id,
            snapshot_table: enemy_table,
            rows_written: enemy.len(),
            rows_replaced: enemy_replaced,
            latest_match_id: enemy_latest,
            match_groups_refreshed: groups,
        },
    ])
}

/// Refreshes both latest views and the match groups without ingesting.
pub fn reindex(conn: &mut Connection) -> Result<usize> {
    let tx = conn.transaction().context("begin reindex transaction")?;
    for team in Team::ALL {
        views::refresh_latest_view(&tx, team)?;
    }
    let groups = match_groups::refresh_match_groups(&tx)?;
    tx.commit().context("commit reindex transaction")?;
    Ok(groups)
}

fn prepare(records: &[PlayerRecord]) -> Result<Vec<PlayerRecord>> {
    let records: Vec<PlayerRecord> = records
        .iter()
        .map(|r| PlayerRecord {
            player_name: r.player_name.trim().to_string(),
            ..r.clone()
        })
        .collect();
    record::validate(&records)?;
    Ok(records)
}

fn write_team(
    tx: &Transaction<'_>,
    team: Team,
    match_id: &MatchId,
    records: &[PlayerRecord],
) -> Result<(String, usize)> {
    let snapshot = schema::create_snapshot_table(tx, team, match_id)?;
    let key = match_id.key();
    let date_key = match_id.date_key();
    let cols = METRIC_COLUMNS.join(", ");

    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {} (player_name, {cols}, match_date, match_id, team)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                quote_ident(&snapshot)
            ))
            .with_context(|| format!("prepare insert into {snapshot}"))?;
        for r in records {
            let m = r.metrics();
            stmt.execute(params![
                r.player_name,
                m[0],
                m[1],
                m[2],
                m[3],
                m[4],
                m[5],
                m[6],
                m[7],
                date_key,
                key,
                team.label()
            ])
            .with_context(|| format!("insert {} into {snapshot}", r.player_name))?;
        }
    }

    let master = team.master_table();
    let replaced = tx
        .execute(
            &format!("DELETE FROM {master} WHERE match_id = ?1"),
            params![key],
        )
        .with_context(|| format!("clear {master} rows for {key}"))?;

    let mut stmt = tx
        .prepare(&format!(
            "INSERT INTO {master} (match_date, match_id, player_name, {cols})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ))
        .with_context(|| format!("prepare insert into {master}"))?;
    for r in records {
        let m = r.metrics();
        stmt.execute(params![
            date_key,
            key,
            r.player_name,
            m[0],
            m[1],
            m[2],
            m[3],
            m[4],
            m[5],
            m[6],
            m[7]
        ])
        .with_context(|| format!("insert {} into {master}", r.player_name))?;
    }

    tracing::debug!(%team, snapshot = %snapshot, rows = records.len(), "wrote team rows");
    Ok((snapshot, replaced))
}
