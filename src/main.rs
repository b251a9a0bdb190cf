use anyhow::{Context, Result};
use clap::Parser;
use kbsync::classify::{HttpClassifier, IndustrySelection};
use kbsync::db::Db;
use kbsync::refresh::{self, RefreshContext, RelationRefresher, RelationResolver};
use kbsync::schema::{self, SchemaStore};
use kbsync::store::{GraphStore, SqliteGraphStore, SqliteStagingStore};
use kbsync::{window, Config, PoolReport, RelationKind};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "kbsync")]
#[command(version)]
#[command(about = "Refresh graph relations for entities staged in a time window")]
struct Args {
    /// `yesterday`, `today` or a start date (YYYY-MM-DD)
    #[arg(default_value = "yesterday")]
    window: String,

    /// Exclusive end date (YYYY-MM-DD); only used with an explicit start date
    end: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", &config.kbsync.log_level)
    ).init();

    log::info!("Starting kbsync v{}", env!("CARGO_PKG_VERSION"));

    // Bad tokens fail before any store is touched
    let window = window::resolve_today(&args.window, args.end.as_deref())?;
    log::info!("Sync window: {}", window);

    let report = run(&config, &window).await?;

    match config.run.max_failure_rate {
        Some(limit) if report.failure_rate() > limit => {
            log::error!(
                "Failure rate {:.1}% exceeds the configured {:.1}%",
                report.failure_rate() * 100.0,
                limit * 100.0
            );
            Ok(ExitCode::FAILURE)
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}

async fn run(config: &Config, window: &window::SyncWindow) -> Result<PoolReport> {
    let migrations_dir = &config.kbsync.migrations_dir;
    let staging_db = Db::new(&config.kbsync.staging_db);
    let graph_db = Db::new(&config.kbsync.graph_db);
    let schema_db = Db::new(&config.kbsync.schema_db);
    for db in [&staging_db, &graph_db, &schema_db] {
        db.migrate(migrations_dir)
            .await
            .with_context(|| format!("Failed to migrate {}", db.path().display()))?;
    }
    log::info!("Databases initialized");

    let schema_store = SchemaStore::new(schema_db);
    let (categories, divisions) = schema::load_indexes(&schema_store)
        .await
        .context("Failed to load category schema")?;
    let categories = Arc::new(categories);

    let kinds = config.relation_kinds()?;
    let targets = refresh::plan(&kinds, &config.refresh.industries, &categories)?;
    for target in &targets {
        match target.scope.len() {
            Some(n) => log::info!("Refreshing {} relations for {} categories", target.kind, n),
            None => log::info!("Refreshing all {} relations", target.kind),
        }
    }

    let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(graph_db));
    let mut resolver = RelationResolver::new(
        categories,
        Arc::new(divisions),
        schema_store,
        graph.clone(),
        config.refresh.company_collection.clone(),
    );
    if kinds.contains(&RelationKind::Industry) {
        let classifier = HttpClassifier::new(
            config.classifier.url.clone(),
            IndustrySelection::from_names(&config.refresh.industries),
            config.classifier_timeout(),
            config.classifier.max_retries,
        )?;
        resolver = resolver.with_classifier(Arc::new(classifier));
    }

    let ctx = RefreshContext {
        staging: Arc::new(SqliteStagingStore::new(staging_db)),
        staging_collection: config.refresh.staging_collection.clone(),
        refresher: Arc::new(RelationRefresher::new(
            config.refresh.collection.clone(),
            targets,
            resolver,
            graph,
        )),
        workers: config.pool.workers,
        progress_every: config.pool.progress_every,
        run_timeout: config.run_timeout(),
        handle_interrupt: true,
    };

    Ok(refresh::run_refresh(&ctx, window).await?)
}
