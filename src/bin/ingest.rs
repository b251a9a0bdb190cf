use anyhow::{Context, Result};
use clap::Parser;
use kbsync::db::Db;
use kbsync::ingest::ingest_window;
use kbsync::store::{SqliteGraphStore, SqliteStagingStore};
use kbsync::{window, Config};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Create graph documents for entities staged in a time window")]
struct Args {
    /// Graph collection to fill, e.g. kb_patent
    collection: String,

    /// `yesterday`, `today` or a start date (YYYY-MM-DD)
    #[arg(default_value = "yesterday")]
    window: String,

    /// Exclusive end date (YYYY-MM-DD)
    end: Option<String>,

    /// Staging collection to read; defaults to the graph collection with `kb_` replaced by `process_`
    #[arg(long)]
    staging_collection: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", &config.kbsync.log_level)
    ).init();

    let window = window::resolve_today(&args.window, args.end.as_deref())?;
    let staging_collection = args
        .staging_collection
        .clone()
        .unwrap_or_else(|| staging_collection_for(&args.collection));
    log::info!("Ingesting {} -> {} for {}", staging_collection, args.collection, window);

    let staging_db = Db::new(&config.kbsync.staging_db);
    let graph_db = Db::new(&config.kbsync.graph_db);
    for db in [&staging_db, &graph_db] {
        db.migrate(&config.kbsync.migrations_dir)
            .await
            .with_context(|| format!("Failed to migrate {}", db.path().display()))?;
    }

    let staging = SqliteStagingStore::new(staging_db);
    let graph = SqliteGraphStore::new(graph_db);
    let dropped = config.ingest.dropped_for(&args.collection);
    log::debug!("Dropping properties {:?}", dropped);
    let report = ingest_window(&staging, &graph, &staging_collection, &args.collection, &window, dropped).await?;

    if report.failed > 0 {
        log::warn!("{} of {} documents could not be inserted", report.failed, report.total);
    }

    Ok(match config.run.max_failure_rate {
        Some(limit) if report.total > 0 && report.failed as f64 / report.total as f64 > limit => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn staging_collection_for(collection: &str) -> String {
    match collection.strip_prefix("kb_") {
        Some(entity) => format!("process_{}", entity),
        None => collection.to_string(),
    }
}
