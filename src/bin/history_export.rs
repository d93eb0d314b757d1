//! history_export - dump recent inspections and statistics as JSON

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;

use inspection_kernel::{HistoryStore, InspectionRecord, InspectionStats, SqliteHistoryStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the inspection history database.
    #[arg(long, env = "INSPECT_DB_PATH", default_value = "inspections.db")]
    db_path: String,
    /// Maximum number of records to export, newest first.
    #[arg(long, default_value_t = 100)]
    limit: usize,
    /// Leave thumbnails out of the export.
    #[arg(long)]
    no_thumbnails: bool,
    /// Output file path ("-" for stdout).
    #[arg(long, default_value = "-")]
    output: String,
}

#[derive(Serialize)]
struct HistoryExport {
    exported_at_s: u64,
    stats: InspectionStats,
    defect_rate: f64,
    records: Vec<InspectionRecord>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.db_path.starts_with("file:") && !std::path::Path::new(&args.db_path).exists() {
        return Err(anyhow!("history database {} does not exist", args.db_path));
    }
    let mut store = SqliteHistoryStore::open(&args.db_path)?;

    let mut records = store.recent(args.limit)?;
    if args.no_thumbnails {
        for record in &mut records {
            record.thumbnail = None;
        }
    }
    let stats = store.stats()?;
    let export = HistoryExport {
        exported_at_s: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs(),
        defect_rate: stats.defect_rate(),
        stats,
        records,
    };

    let json = serde_json::to_string_pretty(&export)?;
    if args.output == "-" {
        println!("{}", json);
    } else {
        std::fs::write(&args.output, json)
            .map_err(|e| anyhow!("failed to write {}: {}", args.output, e))?;
        log::info!(
            "exported {} records to {}",
            export.records.len(),
            args.output
        );
    }
    Ok(())
}
