use chrono::{TimeZone, Utc};
use rusqlite::Connection;

use wwm_stats::ingest::ingest_team;
use wwm_stats::match_groups::{
    compute_match_groups, list_match_groups, match_group, refresh_match_groups_at,
};
use wwm_stats::match_id::parse_match_date;
use wwm_stats::schema::ensure_schema;
use wwm_stats::{MatchId, PlayerRecord, Team};

fn fresh_db() -> Connection {
    let mut conn = Connection::open_in_memory().expect("in-memory db");
    ensure_schema(&mut conn).expect("schema");
    conn
}

fn player(name: &str, defeated: i64, damage: i64) -> PlayerRecord {
    PlayerRecord {
        defeated,
        damage,
        ..PlayerRecord::named(name)
    }
}

fn ingest(conn: &mut Connection, team: Team, raw_id: &str, rows: &[PlayerRecord]) {
    let id = MatchId::parse(raw_id).expect("valid id");
    ingest_team(conn, team, id, rows).expect("ingest");
}

#[test]
fn refresh_is_idempotent_and_keeps_created_at() {
    let mut conn = fresh_db();
    ingest(&mut conn, Team::Yb, "20260101", &[player("A", 1, 10), player("B", 2, 30)]);
    ingest(&mut conn, Team::Enemy, "20260102", &[player("X", 4, 100)]);

    let t1 = Utc.with_ymd_and_hms(2026, 1, 3, 8, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2026, 1, 3, 9, 30, 0).unwrap();
    refresh_match_groups_at(&conn, t1).expect("first refresh");
    let before = list_match_groups(&conn, true).expect("groups");
    assert_eq!(refresh_match_groups_at(&conn, t2).expect("second refresh"), 2);
    let after = list_match_groups(&conn, true).expect("groups");

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert!(b.same_stats(a), "aggregates changed: {b:?} vs {a:?}");
        assert_eq!(b.created_at, a.created_at);
        assert_eq!(a.updated_at.as_deref(), Some("2026-01-03 09:30:00"));
    }
}

#[test]
fn one_sided_dates_default_the_absent_team() {
    let mut conn = fresh_db();
    ingest(&mut conn, Team::Enemy, "20260110", &[player("X", 4, 100), player("Y", 0, 0)]);

    let date = parse_match_date("20260110").unwrap();
    let g = match_group(&conn, date).expect("query").expect("group exists");
    assert!(!g.has_yb_data);
    assert!(g.has_enemy_data);
    assert_eq!(g.yb_player_count, 0);
    assert_eq!(g.yb_total_defeated, 0);
    assert_eq!(g.yb_avg_damage, 0.0);
    assert_eq!(g.enemy_player_count, 2);
    assert_eq!(g.enemy_avg_damage, 50.0);
}

#[test]
fn several_matches_on_one_date_share_a_group() {
    let mut conn = fresh_db();
    ingest(&mut conn, Team::Yb, "20260118_140000", &[player("A", 1, 10)]);
    ingest(&mut conn, Team::Yb, "20260118_203000", &[player("A", 2, 20), player("B", 3, 60)]);
    ingest(&mut conn, Team::Yb, "20260119", &[player("A", 9, 90)]);

    let groups = list_match_groups(&conn, false).expect("groups");
    let dates: Vec<&str> = groups.iter().map(|g| g.match_date.as_str()).collect();
    assert_eq!(dates, vec!["20260119", "20260118"]);

    let g = &groups[1];
    assert_eq!(g.yb_match_count, 2);
    assert_eq!(g.yb_player_count, 3);
    assert_eq!(g.yb_total_defeated, 6);
    assert_eq!(g.yb_avg_damage, 30.0);
}

#[test]
fn stored_groups_equal_a_fresh_aggregation() {
    let mut conn = fresh_db();
    ingest(&mut conn, Team::Yb, "20260101", &[player("A", 5, 100)]);
    ingest(&mut conn, Team::Enemy, "20260101", &[player("X", 2, 40)]);
    // Rows written behind the indexer's back leave the cache stale.
    conn.execute(
        "INSERT INTO youngbuffalo_stats (match_date, match_id, player_name, defeated, damage)
         VALUES ('20260101', '20260101_120000', 'B', 7, 300)",
        [],
    )
    .expect("direct insert");

    let computed = compute_match_groups(&conn).expect("compute");
    let stored = list_match_groups(&conn, true).expect("stored");
    assert!(!computed[0].same_stats(&stored[0]));

    refresh_match_groups_at(&conn, Utc::now()).expect("refresh");
    let stored = list_match_groups(&conn, true).expect("stored");
    assert_eq!(computed.len(), stored.len());
    assert!(computed[0].same_stats(&stored[0]));
    assert_eq!(stored[0].yb_total_defeated, 12);
    assert_eq!(stored[0].yb_avg_damage, 200.0);
}
