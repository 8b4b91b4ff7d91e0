//! Startup configuration.
//!
//! Every setting resolves with the following precedence:
//! 1. command-line flag
//! 2. environment variable (a `.env` file in the working directory is loaded first)
//! 3. compiled default
//!
//! `STOCKFISH_PATH` has no default; starting without it is fatal.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use directories::ProjectDirs;

const DEV_DATABASE_PATH: &str = "./data/chess.db";

/// Command-line arguments for the chess server.
#[derive(Parser, Debug, Clone)]
#[command(name = "chess-server", version, about = "Session-pooled chess engine server")]
pub struct Args {
    /// Path to the Stockfish binary.
    #[arg(long, env = "STOCKFISH_PATH")]
    pub stockfish_path: Option<PathBuf>,

    /// SQLite file holding game records (and the cache when `--cache-backend sqlite`).
    #[arg(long, env = "CHESS_DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Where serialized session state lives.
    #[arg(long, env = "CHESS_CACHE_BACKEND", value_enum, default_value_t = CacheKind::Sqlite)]
    pub cache_backend: CacheKind,

    /// Engine hash table size per process, in MB.
    #[arg(long, env = "CHESS_ENGINE_HASH_MB", default_value_t = 128)]
    pub hash_mb: u32,

    /// Search threads per engine process.
    #[arg(long, env = "CHESS_ENGINE_THREADS", default_value_t = 1)]
    pub threads: u32,

    /// Time budget for each engine reply, in milliseconds.
    #[arg(long, env = "CHESS_MOVE_TIME_MS", default_value_t = 2000)]
    pub move_time_ms: u64,

    /// Search depth for top-move analysis.
    #[arg(long, env = "CHESS_ANALYSIS_DEPTH", default_value_t = 18)]
    pub analysis_depth: u8,

    /// Number of candidate moves returned by analysis.
    #[arg(long, env = "CHESS_ANALYSIS_LINES", default_value_t = 3)]
    pub analysis_lines: usize,

    /// Seconds between reaper sweeps.
    #[arg(long, env = "CHESS_SWEEP_INTERVAL_SECS", default_value_t = 1800)]
    pub sweep_interval_secs: u64,

    /// Seconds of inactivity after which an open session is reaped.
    #[arg(long, env = "CHESS_STALE_AFTER_SECS", default_value_t = 1800)]
    pub stale_after_secs: u64,

    /// Directory for daily rolling log files. Logs go to stdout only when unset.
    #[arg(long, env = "CHESS_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheKind {
    Sqlite,
    Memory,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("STOCKFISH_PATH is not set; the engine binary path is required")]
    MissingEnginePath,
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub stockfish_path: PathBuf,
    pub database_path: PathBuf,
    pub cache_backend: CacheKind,
    pub hash_mb: u32,
    pub threads: u32,
    pub move_time: Duration,
    pub analysis_depth: u8,
    pub analysis_lines: usize,
    pub sweep_interval: Duration,
    pub stale_after: Duration,
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let stockfish_path = args
            .stockfish_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingEnginePath)?;

        require_positive("CHESS_MOVE_TIME_MS", args.move_time_ms)?;
        require_positive("CHESS_ANALYSIS_DEPTH", u64::from(args.analysis_depth))?;
        require_positive("CHESS_ANALYSIS_LINES", args.analysis_lines as u64)?;
        require_positive("CHESS_SWEEP_INTERVAL_SECS", args.sweep_interval_secs)?;
        require_positive("CHESS_STALE_AFTER_SECS", args.stale_after_secs)?;

        Ok(Self {
            stockfish_path,
            database_path: args.database_path.unwrap_or_else(default_database_path),
            cache_backend: args.cache_backend,
            hash_mb: args.hash_mb,
            threads: args.threads,
            move_time: Duration::from_millis(args.move_time_ms),
            analysis_depth: args.analysis_depth,
            analysis_lines: args.analysis_lines,
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            stale_after: Duration::from_secs(args.stale_after_secs),
            log_dir: args.log_dir,
        })
    }
}

fn require_positive(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Default location of the SQLite database.
///
/// Priority:
/// 1. the platform data directory (e.g. `~/.local/share/chess-server/chess.db`)
/// 2. `./data/chess.db` as fallback
pub fn default_database_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", "chess-server") {
        return dirs.data_dir().join("chess.db");
    }
    PathBuf::from(DEV_DATABASE_PATH)
}
