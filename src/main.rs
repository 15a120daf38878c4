use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wwm_stats::config::{DB_PATH_ENV, Settings};
use wwm_stats::export;
use wwm_stats::ingest::{self, IngestSummary};
use wwm_stats::legacy::{self, LegacyOutcome};
use wwm_stats::match_groups::{self, MatchGroup};
use wwm_stats::match_id::parse_match_date;
use wwm_stats::queries;
use wwm_stats::record;
use wwm_stats::schema;
use wwm_stats::template::{self, MatchTemplate};
use wwm_stats::{MatchId, Team};

#[derive(Parser)]
#[command(name = "wwm_stats")]
#[command(about = "Match statistics ingestion into SQLite")]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = DB_PATH_ENV)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the schema
    Init,

    /// Ingest one team's scoreboard from a .csv or .json file
    Ingest {
        /// yb or enemy
        team: Team,
        file: PathBuf,
        /// YYYYMMDD or YYYYMMDD_HHMMSS (default: today)
        #[arg(long)]
        id: Option<MatchId>,
    },

    /// Ingest both teams of one match in one transaction
    IngestMatch {
        yb_csv: PathBuf,
        enemy_csv: PathBuf,
        #[arg(long)]
        id: Option<MatchId>,
    },

    /// Rebuild the latest views and the match_groups index
    Reindex,

    /// List match groups
    Groups {
        /// Oldest first
        #[arg(long)]
        asc: bool,
        #[arg(long)]
        json: bool,
    },

    /// Show everything stored for one match date
    Show {
        /// YYYYMMDD
        date: String,
        #[arg(long, value_enum, default_value_t = Side::Both)]
        team: Side,
        #[arg(long)]
        json: bool,
    },

    /// List tables and views with row counts
    Tables,

    /// Export a table or view to CSV
    ExportCsv { table: String, out: PathBuf },

    /// Export match groups and latest views to an .xlsx workbook
    ExportXlsx { out: Option<PathBuf> },

    /// Write a blank JSON scoreboard template
    Template {
        team: Team,
        #[arg(long)]
        id: Option<MatchId>,
        #[arg(long, default_value_t = 30)]
        players: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Convert a pre-history yb_stats/enemy_stats table into the master layout
    MigrateLegacy {
        team: Team,
        /// Identifier to file the legacy rows under
        #[arg(long)]
        id: MatchId,
    },
}

/// Which team's rows `show` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Side {
    Yb,
    Enemy,
    Both,
}

impl Side {
    fn team(self) -> Option<Team> {
        match self {
            Side::Yb => Some(Team::Yb),
            Side::Enemy => Some(Team::Enemy),
            Side::Both => None,
        }
    }
}

fn main() {
    let settings = Settings::load();
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    let json = cli.json_logs;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    let db_path = cli.db.clone().unwrap_or_else(|| settings.db_path.clone());
    if let Err(err) = run(cli.command, &db_path, &settings) {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(command: Commands, db_path: &Path, settings: &Settings) -> Result<()> {
    if let Commands::Template {
        team,
        id,
        players,
        out,
    } = command
    {
        let id = id.unwrap_or_else(MatchId::today);
        let path =
            out.unwrap_or_else(|| template::default_template_path(&settings.export_dir, &id, team));
        template::write_template(&path, &MatchTemplate::blank(id, team, players))?;
        println!("Template written to: {}", path.display());
        return Ok(());
    }

    let mut conn = schema::open_db(db_path)?;

    match command {
        Commands::Init => {
            let version = queries::schema_version(&conn)?.unwrap_or_default();
            println!("DB: {}", db_path.display());
            println!("Schema version: {version}");
        }
        Commands::Ingest { team, file, id } => {
            let id = id.unwrap_or_else(MatchId::today);
            let summary = ingest::ingest_file(&mut conn, team, id, &file)?;
            print_summary(&summary);
        }
        Commands::IngestMatch {
            yb_csv,
            enemy_csv,
            id,
        } => {
            let id = id.unwrap_or_else(MatchId::today);
            let yb = record::read_input_file(&yb_csv)?;
            let enemy = record::read_input_file(&enemy_csv)?;
            for summary in ingest::ingest_match(&mut conn, id, &yb.players, &enemy.players)? {
                print_summary(&summary);
            }
        }
        Commands::Reindex => {
            let groups = ingest::reindex(&mut conn)?;
            println!("Updated {groups} match groups");
        }
        Commands::Groups { asc, json } => {
            let groups = match_groups::list_match_groups(&conn, asc)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                print_groups(&groups);
            }
        }
        Commands::Show { date, team, json } => {
            let date = parse_match_date(&date)?;
            let detail = queries::match_by_date(&conn, date, team.team())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                match &detail.group {
                    Some(group) => print_groups(std::slice::from_ref(group)),
                    None => println!("No match group for {}", detail.match_date),
                }
                for (label, rows) in [("YB", &detail.yb), ("Enemy", &detail.enemy)] {
                    let Some(rows) = rows else {
                        continue;
                    };
                    println!("{label}: {} rows", rows.len());
                    for row in rows {
                        println!(
                            "  {:<16} {:<20} defeated={:<4} damage={}",
                            row.match_id.as_deref().unwrap_or("-"),
                            row.record.player_name,
                            row.record.defeated,
                            row.record.damage
                        );
                    }
                }
            }
        }
        Commands::Tables => {
            for table in queries::list_tables(&conn)? {
                println!("{:<40} {:<5} rows={}", table.name, table.kind, table.rows);
            }
        }
        Commands::ExportCsv { table, out } => {
            let rows = export::export_table_csv(&conn, &table, &out)?;
            println!("Exported {rows} rows to {}", out.display());
        }
        Commands::ExportXlsx { out } => {
            let out = out.unwrap_or_else(|| settings.export_dir.join("match_report.xlsx"));
            let report = export::export_workbook(&conn, &out)?;
            println!("Workbook: {}", out.display());
            println!(
                "match groups={} yb latest={} enemy latest={}",
                report.match_groups, report.yb_latest, report.enemy_latest
            );
        }
        Commands::MigrateLegacy { team, id } => {
            match legacy::migrate_legacy(&mut conn, team, id)? {
                LegacyOutcome::Migrated {
                    snapshot_table,
                    rows,
                } => println!("Moved {rows} rows into {snapshot_table} and {}", team.master_table()),
                LegacyOutcome::AlreadyMigrated => {
                    println!("{} is already a view; nothing to do", team.latest_view())
                }
                LegacyOutcome::NothingToMigrate => {
                    println!("No {} table found; nothing to do", team.latest_view())
                }
            }
        }
        // Handled above without opening the database.
        Commands::Template { .. } => {}
    }
    Ok(())
}

fn print_summary(summary: &IngestSummary) {
    println!(
        "{}: {} rows for {} -> {}",
        summary.team.label(),
        summary.rows_written,
        summary.match_id,
        summary.snapshot_table
    );
    if summary.rows_replaced > 0 {
        println!("  replaced {} earlier rows", summary.rows_replaced);
    }
    println!(
        "  latest match: {}",
        summary
            .latest_match_id
            .map(|id| id.key())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("  match groups updated: {}", summary.match_groups_refreshed);
}

fn print_groups(groups: &[MatchGroup]) {
    if groups.is_empty() {
        println!("No match groups found.");
        return;
    }
    println!(
        "{:<10} {:>7} {:>7} {:>9} {:>9} {:>14} {:>14}",
        "date", "yb", "enemy", "yb def", "enemy def", "yb avg dmg", "enemy avg dmg"
    );
    for g in groups {
        println!(
            "{:<10} {:>7} {:>7} {:>9} {:>9} {:>14.2} {:>14.2}",
            g.match_date,
            g.yb_player_count,
            g.enemy_player_count,
            g.yb_total_defeated,
            g.enemy_total_defeated,
            g.yb_avg_damage,
            g.enemy_avg_damage
        );
    }
}
