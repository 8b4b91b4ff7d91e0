use crate::analysis::{PrincipalLines, RankedMove};
use crate::strength::{StrengthTable, MAX_SKILL_LEVEL};
use crate::uci::{parse_uci_message, UciMessage};
use crate::{Engine, EngineError, EngineLauncher};
use chess::{parse_move_for, Game};
use cozy_chess::Move;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// How long to wait for `uciok` / `readyok`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Slack on top of the search budget before a request counts as hung.
const SEARCH_GRACE: Duration = Duration::from_secs(5);
/// Upper bound for a depth-limited analysis.
const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(60);
/// How long a stopped search gets to deliver its `bestmove`.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);
/// How long `quit` gets before the process is killed.
const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Process-level settings shared by every engine a launcher starts.
#[derive(Debug, Clone)]
pub struct StockfishOptions {
    pub path: PathBuf,
    pub hash_mb: u32,
    pub threads: u32,
}

impl StockfishOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hash_mb: 128,
            threads: 1,
        }
    }
}

/// Starts one Stockfish process per call, configured from the strength table.
#[derive(Debug, Clone)]
pub struct StockfishLauncher {
    options: StockfishOptions,
    table: StrengthTable,
}

impl StockfishLauncher {
    pub fn new(options: StockfishOptions, table: StrengthTable) -> Self {
        Self { options, table }
    }
}

impl EngineLauncher for StockfishLauncher {
    type Engine = StockfishEngine;

    async fn launch(&self, rating: u32) -> Result<StockfishEngine, EngineError> {
        let skill_level = self.table.tier_for(rating);
        StockfishEngine::spawn(&self.options, skill_level).await
    }
}

/// One Stockfish subprocess speaking UCI over stdin/stdout.
///
/// Requests hold the `io` lock for their whole exchange, so the line protocol
/// never interleaves between callers.
pub struct StockfishEngine {
    skill_level: u8,
    pid: Option<u32>,
    io: Mutex<EngineIo>,
    process: Mutex<Option<Child>>,
}

struct EngineIo<W = ChildStdin> {
    stdin: W,
    events: mpsc::Receiver<UciMessage>,
}

impl StockfishEngine {
    /// Spawn a Stockfish instance, complete the UCI handshake and apply the
    /// play-strength and resource options.
    #[tracing::instrument(level = "info", skip(options), fields(path = %options.path.display()))]
    pub async fn spawn(options: &StockfishOptions, skill_level: u8) -> Result<Self, EngineError> {
        tracing::debug!("Spawning Stockfish process");
        let mut process = tokio::process::Command::new(&options.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn Stockfish: {}", e);
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::NotFound(options.path.display().to_string())
                } else {
                    EngineError::Spawn(e.to_string())
                }
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("Failed to get stdin".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("Failed to get stdout".into()))?;
        let pid = process.id();

        let (event_tx, events) = mpsc::channel::<UciMessage>(256);

        // Output reader: parse lines and forward them until EOF.
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::debug!(?pid, "Stockfish stdout EOF - engine closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        tracing::trace!("UCI << {}", trimmed);
                        match parse_uci_message(trimmed) {
                            Ok(msg) => {
                                if event_tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(_) => tracing::trace!("Ignoring UCI line: {}", trimmed),
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading from Stockfish stdout: {}", e);
                        break;
                    }
                }
            }
        });

        let mut io = EngineIo { stdin, events };

        io.send("uci").await?;
        io.wait_for(HANDSHAKE_TIMEOUT, |msg| {
            matches!(msg, UciMessage::UciOk).then_some(())
        })
        .await
        .map_err(|e| EngineError::Handshake(format!("waiting for uciok: {}", e)))?;

        io.send(&format!("setoption name Skill Level value {}", skill_level))
            .await?;
        io.send(&format!(
            "setoption name Hash value {}",
            options.hash_mb.clamp(1, 2048)
        ))
        .await?;
        io.send(&format!(
            "setoption name Threads value {}",
            options.threads.clamp(1, 16)
        ))
        .await?;

        io.send("isready").await?;
        io.wait_for(HANDSHAKE_TIMEOUT, |msg| {
            matches!(msg, UciMessage::ReadyOk).then_some(())
        })
        .await
        .map_err(|e| EngineError::Handshake(format!("waiting for readyok: {}", e)))?;

        tracing::info!(?pid, skill_level, "Stockfish engine spawned and initialized");
        Ok(Self {
            skill_level,
            pid,
            io: Mutex::new(io),
            process: Mutex::new(Some(process)),
        })
    }

    pub fn skill_level(&self) -> u8 {
        self.skill_level
    }

    async fn search_lines(
        &self,
        io: &mut EngineIo,
        game: &Game,
        n: usize,
        depth: u8,
    ) -> Result<PrincipalLines, EngineError> {
        io.send(&format!("setoption name Skill Level value {}", MAX_SKILL_LEVEL))
            .await?;
        io.send(&format!("setoption name MultiPV value {}", n)).await?;
        io.send(&position_command(game)).await?;
        io.send(&format!("go depth {}", depth)).await?;

        let mut lines = PrincipalLines::new();
        let finished = io
            .wait_for(ANALYSIS_TIMEOUT, |msg| match msg {
                UciMessage::Info(info) => {
                    lines.record(info);
                    None
                }
                UciMessage::BestMove { .. } => Some(()),
                _ => None,
            })
            .await;

        if let Err(EngineError::Timeout(_)) = finished {
            io.abort_search().await;
        }
        finished.map(|()| lines)
    }
}

impl Engine for StockfishEngine {
    #[tracing::instrument(level = "debug", skip(self, game), fields(pid = ?self.pid, ply = game.move_count()))]
    async fn best_move(&self, game: &Game, budget: Duration) -> Result<Move, EngineError> {
        let mut io = self.io.lock().await;
        io.drain();

        io.send(&position_command(game)).await?;
        io.send(&format!("go movetime {}", budget.as_millis())).await?;

        let reply = io
            .wait_for(budget + SEARCH_GRACE, |msg| match msg {
                UciMessage::BestMove { mv, .. } => Some(mv),
                _ => None,
            })
            .await;

        let text = match reply {
            Ok(Some(text)) => text,
            Ok(None) => return Err(EngineError::Query("engine returned no move".into())),
            Err(e) => {
                if matches!(e, EngineError::Timeout(_)) {
                    io.abort_search().await;
                }
                return Err(e);
            }
        };

        let legal = game.legal_moves();
        let mv = parse_move_for(game.position(), &text, &legal)
            .map_err(|e| EngineError::Query(format!("unparseable bestmove {}: {}", text, e)))?;
        if !legal.contains(&mv) {
            tracing::error!(fen = %game.to_fen(), "Engine suggested illegal move {}", text);
            return Err(EngineError::Query(format!("illegal bestmove {}", text)));
        }

        tracing::debug!("Engine chose {}", text);
        Ok(mv)
    }

    #[tracing::instrument(level = "debug", skip(self, game), fields(pid = ?self.pid))]
    async fn top_moves(&self, game: &Game, n: usize, depth: u8) -> Result<Vec<RankedMove>, EngineError> {
        let n = line_count(game, n);
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut io = self.io.lock().await;
        io.drain();

        let searched = self.search_lines(&mut io, game, n, depth).await;

        // Put the session's play strength back before anything else can use it.
        io.send(&format!(
            "setoption name Skill Level value {}",
            self.skill_level
        ))
        .await?;
        io.send("setoption name MultiPV value 1").await?;

        let lines = searched?;
        let legal = game.legal_moves();
        let board = game.position();
        Ok(lines.rank(n, game.side_to_move(), |text| {
            parse_move_for(board, text, &legal)
                .map(|mv| legal.contains(&mv))
                .unwrap_or(false)
        }))
    }

    async fn stop(&self) {
        {
            let mut io = self.io.lock().await;
            if let Err(e) = io.send("quit").await {
                tracing::warn!(pid = ?self.pid, "Failed to send quit: {}", e);
            }
        }

        let Some(mut process) = self.process.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(QUIT_TIMEOUT, process.wait()).await {
            Ok(Ok(status)) => tracing::info!(pid = ?self.pid, %status, "Stockfish exited"),
            Ok(Err(e)) => tracing::warn!(pid = ?self.pid, "Failed waiting for Stockfish: {}", e),
            Err(_) => {
                tracing::warn!(pid = ?self.pid, "Stockfish ignored quit, killing");
                if let Err(e) = process.kill().await {
                    tracing::warn!(pid = ?self.pid, "Failed to kill Stockfish: {}", e);
                }
            }
        }
    }
}

impl<W: AsyncWrite + Unpin> EngineIo<W> {
    async fn send(&mut self, line: &str) -> Result<(), EngineError> {
        tracing::trace!("UCI >> {}", line);
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Discard output left over from an earlier, abandoned request.
    fn drain(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    /// Stop an overrunning search and consume the `bestmove` it still owes,
    /// so that reply cannot answer the next request.
    async fn abort_search(&mut self) {
        if let Err(e) = self.send("stop").await {
            tracing::warn!("Failed to send stop: {}", e);
            return;
        }
        let settled = self
            .wait_for(STOP_TIMEOUT, |msg| {
                matches!(msg, UciMessage::BestMove { .. }).then_some(())
            })
            .await;
        if let Err(e) = settled {
            tracing::warn!("Search did not settle after stop: {}", e);
        }
    }

    async fn wait_for<T>(
        &mut self,
        limit: Duration,
        mut accept: impl FnMut(UciMessage) -> Option<T>,
    ) -> Result<T, EngineError> {
        let deadline = Instant::now() + limit;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Err(_) => return Err(EngineError::Timeout(limit)),
                Ok(None) => return Err(EngineError::Terminated),
                Ok(Some(msg)) => {
                    if let Some(value) = accept(msg) {
                        return Ok(value);
                    }
                }
            }
        }
    }
}

/// MultiPV never asks for more lines than there are legal moves.
fn line_count(game: &Game, requested: usize) -> usize {
    requested.min(game.legal_move_count())
}

/// `position startpos moves ...` for the game's full history.
fn position_command(game: &Game) -> String {
    let mut cmd = "position startpos".to_string();
    let moves = game.uci_moves();
    if !moves.is_empty() {
        cmd.push_str(" moves ");
        cmd.push_str(&moves.join(" "));
    }
    cmd
}
