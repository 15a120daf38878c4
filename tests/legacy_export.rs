use std::fs::File;
use std::path::PathBuf;

use rusqlite::Connection;

use wwm_stats::export::{export_table_csv, export_workbook, read_table};
use wwm_stats::ingest::{ingest_match, ingest_team};
use wwm_stats::legacy::{LegacyOutcome, migrate_legacy};
use wwm_stats::match_groups::list_match_groups;
use wwm_stats::queries::{list_tables, table_stats};
use wwm_stats::record::decode_csv;
use wwm_stats::schema::{ensure_schema, object_type};
use wwm_stats::views::read_latest;
use wwm_stats::{MatchId, PlayerRecord, Team};

fn fresh_db() -> Connection {
    let mut conn = Connection::open_in_memory().expect("in-memory db");
    ensure_schema(&mut conn).expect("schema");
    conn
}

fn id(raw: &str) -> MatchId {
    MatchId::parse(raw).expect("valid match id")
}

fn player(name: &str, defeated: i64, damage: i64) -> PlayerRecord {
    PlayerRecord {
        defeated,
        damage,
        ..PlayerRecord::named(name)
    }
}

fn scratch_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wwm_stats_tests_{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir.join(name)
}

#[test]
fn legacy_table_becomes_snapshot_master_rows_and_view() {
    let mut conn = fresh_db();
    conn.execute_batch(
        r#"
        CREATE TABLE yb_stats (
            player_name TEXT,
            defeated INTEGER, assist INTEGER, defeated_2 INTEGER, fun_coin INTEGER,
            damage INTEGER, tank INTEGER, heal INTEGER, siege_damage INTEGER
        );
        INSERT INTO yb_stats VALUES (' Ztee ', 16, 5, 1, 0, 6896682, 0, 0, NULL);
        INSERT INTO yb_stats VALUES ('Whiskey', 16, 2, 0, 0, 4021734, 10, 0, 5);
        "#,
    )
    .expect("legacy table");

    let outcome = migrate_legacy(&mut conn, Team::Yb, id("20260115")).expect("migrate");
    assert_eq!(
        outcome,
        LegacyOutcome::Migrated {
            snapshot_table: "yb_stats_20260115".to_string(),
            rows: 2,
        }
    );
    assert_eq!(
        object_type(&conn, "yb_stats").expect("lookup").as_deref(),
        Some("view")
    );

    let latest = read_latest(&conn, Team::Yb).expect("view");
    let names: Vec<&str> = latest.iter().map(|r| r.player_name.as_str()).collect();
    assert_eq!(names, vec!["Whiskey", "Ztee"]);
    assert_eq!(latest[1].siege_damage, 0);

    let groups = list_match_groups(&conn, true).expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].match_date, "20260115");
    assert_eq!(groups[0].yb_total_defeated, 32);

    assert_eq!(
        migrate_legacy(&mut conn, Team::Yb, id("20260115")).expect("second run"),
        LegacyOutcome::AlreadyMigrated
    );
    assert_eq!(
        migrate_legacy(&mut conn, Team::Enemy, id("20260115")).expect("enemy"),
        LegacyOutcome::NothingToMigrate
    );
}

#[test]
fn legacy_table_missing_metrics_is_left_alone() {
    let mut conn = fresh_db();
    conn.execute_batch("CREATE TABLE enemy_stats (player_name TEXT, defeated INTEGER);")
        .expect("legacy table");
    assert!(migrate_legacy(&mut conn, Team::Enemy, id("20260115")).is_err());
    assert_eq!(
        object_type(&conn, "enemy_stats").expect("lookup").as_deref(),
        Some("table")
    );
    assert_eq!(object_type(&conn, "enemy_stats_20260115").expect("lookup"), None);
}

#[test]
fn snapshot_csv_export_reads_back_as_input() {
    let mut conn = fresh_db();
    let players = vec![player("Ztee", 5, 100), player("Whiskey", 3, 200)];
    ingest_team(&mut conn, Team::Yb, id("20260101_203000"), &players).expect("ingest");

    let path = scratch_path("yb_stats_20260101_203000.csv");
    let rows = export_table_csv(&conn, "yb_stats_20260101_203000", &path).expect("export");
    assert_eq!(rows, 2);

    let decoded = decode_csv(File::open(&path).expect("open export")).expect("decode export");
    assert_eq!(decoded, players);

    let dump = read_table(&conn, "yb_stats_20260101_203000").expect("dump");
    assert_eq!(dump.columns.last().map(String::as_str), Some("team"));
    assert!(export_table_csv(&conn, "no_such_table", &scratch_path("none.csv")).is_err());
}

#[test]
fn workbook_export_counts_every_sheet() {
    let mut conn = fresh_db();
    ingest_match(
        &mut conn,
        id("20260101"),
        &[player("Ztee", 5, 100), player("Mochi", 7, 300)],
        &[player("Raven", 4, 1000)],
    )
    .expect("ingest");

    let path = scratch_path("match_report.xlsx");
    let report = export_workbook(&conn, &path).expect("workbook");
    assert_eq!(report.match_groups, 1);
    assert_eq!(report.yb_latest, 2);
    assert_eq!(report.enemy_latest, 1);
    assert!(std::fs::metadata(&path).expect("workbook file").len() > 0);
}

#[test]
fn table_listing_reports_views_and_counts() {
    let mut conn = fresh_db();
    ingest_team(
        &mut conn,
        Team::Enemy,
        id("20260101"),
        &[player("Raven", 4, 1000), player("Onyx", 6, 3000)],
    )
    .expect("ingest");

    let tables = list_tables(&conn).expect("tables");
    let view = tables
        .iter()
        .find(|t| t.name == "enemy_stats")
        .expect("latest view listed");
    assert_eq!(view.kind, "view");
    assert_eq!(view.rows, 2);
    assert!(tables.iter().all(|t| !t.name.starts_with("sqlite_")));
    assert!(tables.iter().any(|t| t.name == "enemy_stats_20260101" && t.kind == "table"));

    let stats = table_stats(&conn, "enemy_all_stats").expect("stats");
    assert_eq!(stats.rows, 2);
    assert!(stats.columns.contains(&"match_id".to_string()));
    assert!(table_stats(&conn, "missing").is_err());
}
