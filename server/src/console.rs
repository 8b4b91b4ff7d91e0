//! Line-oriented command surface over the game service.
//!
//! One command per line, one JSON reply per line:
//!
//! ```text
//! new 1500
//! move <session-id> e2e4
//! undo <session-id>
//! top <session-id>
//! show <session-id>
//! end <session-id>
//! ```

use engine::EngineLauncher;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServiceError;
use crate::persistence::{GameRecordStore, SessionCache};
use crate::service::GameService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { rating: u32 },
    Move { session_id: String, uci: String },
    Undo { session_id: String },
    Top { session_id: String },
    Show { session_id: String },
    End { session_id: String },
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let session = |name: &str| -> Result<String, String> {
        match parts.as_slice() {
            [_, id] => Ok(id.to_string()),
            _ => Err(format!("usage: {} <session-id>", name)),
        }
    };

    match parts.first().copied() {
        Some("new") => match parts.as_slice() {
            [_, rating] => rating
                .parse()
                .map(|rating| Command::Start { rating })
                .map_err(|_| format!("invalid rating: {}", rating)),
            _ => Err("usage: new <rating>".to_string()),
        },
        Some("move") => match parts.as_slice() {
            [_, id, uci] => Ok(Command::Move {
                session_id: id.to_string(),
                uci: uci.to_string(),
            }),
            _ => Err("usage: move <session-id> <uci>".to_string()),
        },
        Some("undo") => session("undo").map(|session_id| Command::Undo { session_id }),
        Some("top") => session("top").map(|session_id| Command::Top { session_id }),
        Some("show") => session("show").map(|session_id| Command::Show { session_id }),
        Some("end") => session("end").map(|session_id| Command::End { session_id }),
        Some(other) => Err(format!("unknown command: {}", other)),
        None => Err("empty command".to_string()),
    }
}

fn reply<T: Serialize>(result: Result<T, ServiceError>) -> Value {
    match result {
        Ok(value) => json!({ "ok": true, "result": value }),
        Err(e) => json!({
            "ok": false,
            "error": e.to_string(),
            "retryable": e.is_retryable(),
            "not_found": e.is_not_found(),
        }),
    }
}

pub async fn execute<C, D, L>(service: &GameService<C, D, L>, command: Command) -> Value
where
    C: SessionCache,
    D: GameRecordStore,
    L: EngineLauncher,
{
    match command {
        Command::Start { rating } => reply(service.start_game(rating).await),
        Command::Move { session_id, uci } => reply(service.play_move(&session_id, &uci).await),
        Command::Undo { session_id } => reply(service.undo(&session_id).await),
        Command::Top { session_id } => reply(service.top_moves(&session_id).await),
        Command::Show { session_id } => reply(service.game_state(&session_id).await),
        Command::End { session_id } => reply(service.end_game(&session_id).await),
    }
}

/// Serve commands from `input` until EOF.
pub async fn serve<C, D, L, R, W>(
    service: &GameService<C, D, L>,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    C: SessionCache,
    D: GameRecordStore,
    L: EngineLauncher,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match parse_command(&line) {
            Ok(command) => execute(service, command).await,
            Err(message) => json!({ "ok": false, "error": message }),
        };
        output.write_all(response.to_string().as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::{Database, SqliteGameRecordStore};
    use crate::persistence::MemorySessionCache;
    use crate::pool::EnginePool;
    use crate::service::PlaySettings;
    use crate::session::SessionLocks;
    use crate::testing::FakeLauncher;
    use std::sync::Arc;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("new 1500"), Ok(Command::Start { rating: 1500 }));
        assert_eq!(
            parse_command("  move abc  e2e4 "),
            Ok(Command::Move {
                session_id: "abc".into(),
                uci: "e2e4".into()
            })
        );
        assert_eq!(
            parse_command("end abc"),
            Ok(Command::End {
                session_id: "abc".into()
            })
        );
        assert!(parse_command("new strong").is_err());
        assert!(parse_command("move abc").is_err());
        assert!(parse_command("resign abc").is_err());
        assert!(parse_command("undo").is_err());
    }

    #[tokio::test]
    async fn test_serve_replies_one_line_per_command() {
        let db = Database::new_in_memory().await.unwrap();
        let service = GameService::new(
            Arc::new(MemorySessionCache::new()),
            Arc::new(SqliteGameRecordStore::new(db.pool().clone())),
            Arc::new(EnginePool::new(FakeLauncher::new())),
            Arc::new(SessionLocks::new()),
            PlaySettings::default(),
        );

        let mut output = Vec::new();
        serve(&service, &b"new 1500\n\nbogus\nshow missing\n"[..], &mut output)
            .await
            .unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["ok"], true);
        assert!(replies[0]["result"]["session_id"].is_string());
        assert_eq!(replies[1]["ok"], false);
        assert_eq!(replies[2]["not_found"], true);
    }
}
