use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rusqlite::Connection;
use std::hint::black_box;

use wwm_stats::ingest::ingest_team;
use wwm_stats::match_groups::{compute_match_groups, refresh_match_groups};
use wwm_stats::record::{METRIC_COLUMNS, decode_csv};
use wwm_stats::schema::ensure_schema;
use wwm_stats::{MatchId, PlayerRecord, Team};

fn scoreboard_csv(players: usize) -> String {
    let mut out = format!("player_name,{}\n", METRIC_COLUMNS.join(","));
    for idx in 0..players {
        out.push_str(&format!(
            "Player {idx},{},{},{},{},{},{},{},{}\n",
            idx % 20,
            idx % 7,
            idx % 3,
            idx * 10,
            idx * 12_345,
            idx * 321,
            idx * 99,
            idx * 7
        ));
    }
    out
}

fn scoreboard(players: usize) -> Vec<PlayerRecord> {
    (0..players)
        .map(|idx| PlayerRecord {
            defeated: (idx % 20) as i64,
            damage: (idx * 12_345) as i64,
            ..PlayerRecord::named(format!("Player {idx}"))
        })
        .collect()
}

fn seeded_db(days: u32) -> Connection {
    let mut conn = Connection::open_in_memory().expect("in-memory db");
    ensure_schema(&mut conn).expect("schema");
    let rows = scoreboard(30);
    for day in 1..=days {
        let id = MatchId::parse(&format!("202601{day:02}_203000")).expect("valid id");
        ingest_team(&mut conn, Team::Yb, id, &rows).expect("seed yb");
        ingest_team(&mut conn, Team::Enemy, id, &rows).expect("seed enemy");
    }
    conn
}

fn bench_decode_csv(c: &mut Criterion) {
    let csv = scoreboard_csv(30);
    c.bench_function("decode_csv_30_players", |b| {
        b.iter(|| {
            let rows = decode_csv(black_box(csv.as_bytes())).unwrap();
            black_box(rows.len());
        })
    });
}

fn bench_ingest_team(c: &mut Criterion) {
    let rows = scoreboard(30);
    let id = MatchId::parse("20260131_203000").unwrap();
    c.bench_function("ingest_team_30_players_on_28_days", |b| {
        b.iter_batched(
            || seeded_db(28),
            |mut conn| {
                let summary = ingest_team(&mut conn, Team::Yb, id, black_box(&rows)).unwrap();
                black_box(summary.match_groups_refreshed);
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_match_groups(c: &mut Criterion) {
    let conn = seeded_db(28);
    c.bench_function("compute_match_groups_28_days", |b| {
        b.iter(|| {
            let groups = compute_match_groups(black_box(&conn)).unwrap();
            black_box(groups.len());
        })
    });
    c.bench_function("refresh_match_groups_28_days", |b| {
        b.iter(|| {
            let n = refresh_match_groups(black_box(&conn)).unwrap();
            black_box(n);
        })
    });
}

criterion_group!(
    benches,
    bench_decode_csv,
    bench_ingest_team,
    bench_match_groups
);
criterion_main!(benches);
