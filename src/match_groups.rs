use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::match_id::{format_match_date, parse_match_date};
use crate::schema::TIMESTAMP_FMT;
use crate::team::Team;

/// Aggregates for one match date, both teams side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchGroup {
    pub match_date: String,
    pub yb_player_count: i64,
    pub enemy_player_count: i64,
    pub yb_match_count: i64,
    pub enemy_match_count: i64,
    pub yb_total_defeated: i64,
    pub enemy_total_defeated: i64,
    pub yb_avg_damage: f64,
    pub enemy_avg_damage: f64,
    pub has_yb_data: bool,
    pub has_enemy_data: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl MatchGroup {
    fn empty(date: NaiveDate) -> Self {
        Self {
            match_date: format_match_date(date),
            yb_player_count: 0,
            enemy_player_count: 0,
            yb_match_count: 0,
            enemy_match_count: 0,
            yb_total_defeated: 0,
            enemy_total_defeated: 0,
            yb_avg_damage: 0.0,
            enemy_avg_damage: 0.0,
            has_yb_data: false,
            has_enemy_data: false,
            created_at: None,
            updated_at: None,
        }
    }

    fn apply(&mut self, team: Team, agg: &TeamAggregate) {
        let present = agg.player_count > 0;
        match team {
            Team::Yb => {
                self.yb_player_count = agg.player_count;
                self.yb_match_count = agg.match_count;
                self.yb_total_defeated = agg.total_defeated;
                self.yb_avg_damage = agg.avg_damage;
                self.has_yb_data = present;
            }
            Team::Enemy => {
                self.enemy_player_count = agg.player_count;
                self.enemy_match_count = agg.match_count;
                self.enemy_total_defeated = agg.total_defeated;
                self.enemy_avg_damage = agg.avg_damage;
                self.has_enemy_data = present;
            }
        }
    }

    /// Same aggregates, ignoring bookkeeping timestamps.
    pub fn same_stats(&self, other: &MatchGroup) -> bool {
        let strip = |g: &MatchGroup| MatchGroup {
            created_at: None,
            updated_at: None,
            ..g.clone()
        };
        strip(self) == strip(other)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            match_date: row.get("match_date")?,
            yb_player_count: row.get("yb_player_count")?,
            enemy_player_count: row.get("enemy_player_count")?,
            yb_match_count: row.get("yb_match_count")?,
            enemy_match_count: row.get("enemy_match_count")?,
            yb_total_defeated: row.get("yb_total_defeated")?,
            enemy_total_defeated: row.get("enemy_total_defeated")?,
            yb_avg_damage: row.get("yb_avg_damage")?,
            enemy_avg_damage: row.get("enemy_avg_damage")?,
            has_yb_data: row.get::<_, i64>("has_yb_data")? != 0,
            has_enemy_data: row.get::<_, i64>("has_enemy_data")? != 0,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct TeamAggregate {
    player_count: i64,
    match_count: i64,
    total_defeated: i64,
    avg_damage: f64,
}

fn team_aggregates(conn: &Connection, team: Team) -> Result<BTreeMap<NaiveDate, TeamAggregate>> {
    let table = team.master_table();
    let mut stmt = conn
        .prepare(&format!(
            r#"
            SELECT
                match_date,
                COUNT(*),
                COUNT(DISTINCT match_id),
                COALESCE(SUM(defeated), 0),
                COALESCE(AVG(damage), 0.0)
            FROM {table}
            WHERE match_date IS NOT NULL
            GROUP BY match_date
            "#
        ))
        .with_context(|| format!("prepare aggregate query for {table}"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                TeamAggregate {
                    player_count: row.get(1)?,
                    match_count: row.get(2)?,
                    total_defeated: row.get(3)?,
                    avg_damage: row.get(4)?,
                },
            ))
        })
        .with_context(|| format!("aggregate {table}"))?;

    let mut out = BTreeMap::new();
    for row in rows {
        let (raw_date, agg) = row.context("decode aggregate row")?;
        match parse_match_date(&raw_date) {
            Ok(date) => {
                out.insert(date, agg);
            }
            Err(err) => tracing::warn!(table, %err, "skipping rows with unparseable match_date"),
        }
    }
    Ok(out)
}

/// Pure aggregation over both master tables, one group per match date,
/// oldest first. Timestamps are left empty.
pub fn compute_match_groups(conn: &Connection) -> Result<Vec<MatchGroup>> {
    let mut groups: BTreeMap<NaiveDate, MatchGroup> = BTreeMap::new();
    for team in Team::ALL {
        for (date, agg) in team_aggregates(conn, team)? {
            groups
                .entry(date)
                .or_insert_with(|| MatchGroup::empty(date))
                .apply(team, &agg);
        }
    }
    Ok(groups.into_values().collect())
}

/// Recomputes and upserts every match group. Returns the number of groups
/// written.
pub fn refresh_match_groups(conn: &Connection) -> Result<usize> {
    refresh_match_groups_at(conn, Utc::now())
}

pub fn refresh_match_groups_at(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let groups = compute_match_groups(conn)?;
    let now = now.format(TIMESTAMP_FMT).to_string();
    let mut stmt = conn
        .prepare(
            r#"
            INSERT INTO match_groups (
                match_date,
                yb_player_count, enemy_player_count,
                yb_match_count, enemy_match_count,
                yb_total_defeated, enemy_total_defeated,
                yb_avg_damage, enemy_avg_damage,
                has_yb_data, has_enemy_data,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            ON CONFLICT(match_date) DO UPDATE SET
                yb_player_count = excluded.yb_player_count,
                enemy_player_count = excluded.enemy_player_count,
                yb_match_count = excluded.yb_match_count,
                enemy_match_count = excluded.enemy_match_count,
                yb_total_defeated = excluded.yb_total_defeated,
                enemy_total_defeated = excluded.enemy_total_defeated,
                yb_avg_damage = excluded.yb_avg_damage,
                enemy_avg_damage = excluded.enemy_avg_damage,
                has_yb_data = excluded.has_yb_data,
                has_enemy_data = excluded.has_enemy_data,
                updated_at = excluded.updated_at
            "#,
        )
        .context("prepare match group upsert")?;

    for g in &groups {
        stmt.execute(params![
            g.match_date,
            g.yb_player_count,
            g.enemy_player_count,
            g.yb_match_count,
            g.enemy_match_count,
            g.yb_total_defeated,
            g.enemy_total_defeated,
            g.yb_avg_damage,
            g.enemy_avg_damage,
            g.has_yb_data as i64,
            g.has_enemy_data as i64,
            now,
        ])
        .with_context(|| format!("upsert match group {}", g.match_date))?;
    }

    tracing::info!(groups = groups.len(), "match groups refreshed");
    Ok(groups.len())
}

pub fn list_match_groups(conn: &Connection, ascending: bool) -> Result<Vec<MatchGroup>> {
    let order = if ascending { "ASC" } else { "DESC" };
    let mut stmt = conn
        .prepare(&format!(
            "SELECT * FROM match_groups ORDER BY match_date {order}"
        ))
        .context("prepare match group listing")?;
    let rows = stmt
        .query_map([], MatchGroup::from_row)
        .context("query match groups")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode match group")?);
    }
    Ok(out)
}

pub fn match_group(conn: &Connection, date: NaiveDate) -> Result<Option<MatchGroup>> {
    conn.query_row(
        "SELECT * FROM match_groups WHERE match_date = ?1",
        params![format_match_date(date)],
        MatchGroup::from_row,
    )
    .optional()
    .context("query match group")
}
