use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use engine::{StockfishLauncher, StockfishOptions, StrengthTable};
use tokio::sync::watch;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chess_server::config::{Args, CacheKind, ServerConfig};
use chess_server::console;
use chess_server::persistence::sqlite::{
    CacheBackend, Database, SqliteGameRecordStore, SqliteSessionCache,
};
use chess_server::persistence::MemorySessionCache;
use chess_server::pool::EnginePool;
use chess_server::reaper::StaleSessionReaper;
use chess_server::service::{GameService, PlaySettings};
use chess_server::session::SessionLocks;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {}", e);
        }
    }

    let config = ServerConfig::from_args(Args::parse())?;
    let _log_guard = init_tracing(&config)?;

    tracing::info!("Starting chess server");
    tracing::info!("Using database: {}", config.database_path.display());
    tracing::info!("Using engine: {}", config.stockfish_path.display());

    let db = Database::open(&config.database_path)
        .await
        .context("failed to open database")?;

    let cache = Arc::new(match config.cache_backend {
        CacheKind::Sqlite => CacheBackend::Sqlite(SqliteSessionCache::new(db.pool().clone())),
        CacheKind::Memory => CacheBackend::Memory(MemorySessionCache::new()),
    });
    let records = Arc::new(SqliteGameRecordStore::new(db.pool().clone()));

    let launcher = StockfishLauncher::new(
        StockfishOptions {
            path: config.stockfish_path.clone(),
            hash_mb: config.hash_mb,
            threads: config.threads,
        },
        StrengthTable::standard(),
    );
    let pool = Arc::new(EnginePool::new(launcher));
    let locks = Arc::new(SessionLocks::new());

    let service = GameService::new(
        cache.clone(),
        records.clone(),
        pool.clone(),
        locks.clone(),
        PlaySettings {
            move_time: config.move_time,
            analysis_depth: config.analysis_depth,
            analysis_lines: config.analysis_lines,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = StaleSessionReaper::new(
        cache,
        records,
        pool.clone(),
        locks,
        config.stale_after,
        config.sweep_interval,
    );
    let reaper_handle = tokio::spawn(reaper.run(shutdown_rx));

    tracing::info!("Server ready; reading commands from stdin, Ctrl-C to stop");
    let commands = async {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = console::serve(&service, stdin, tokio::io::stdout()).await {
            tracing::error!("Console failed: {}", e);
        }
        tracing::info!("Command input closed; waiting for Ctrl-C");
        std::future::pending::<()>().await
    };
    tokio::select! {
        () = commands => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
        }
    }

    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = reaper_handle.await {
        tracing::warn!("Reaper task ended abnormally: {}", e);
    }

    let stopped = pool.shutdown_all().await;
    db.pool().close().await;
    tracing::info!(stopped, "Chess server stopped");
    Ok(())
}

/// Logs go to stderr (stdout carries command replies), plus a daily rolling
/// file when a log directory is set. The returned guard flushes the file
/// writer on drop.
fn init_tracing(
    config: &ServerConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "chess-server");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file)
        .init();
    Ok(guard)
}
