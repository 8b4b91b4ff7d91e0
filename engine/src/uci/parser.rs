use std::str::FromStr;

use super::UciError;
use crate::{EngineInfo, Score};

/// Engine output the server acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum UciMessage {
    Id { name: String, value: String },
    UciOk,
    ReadyOk,
    /// `mv` is `None` for `bestmove (none)` (no legal move in the position).
    BestMove {
        mv: Option<String>,
        ponder: Option<String>,
    },
    Info(EngineInfo),
}

/// Parse one line of engine output.
pub fn parse_uci_message(line: &str) -> Result<UciMessage, UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.as_slice() {
        ["uciok"] => Ok(UciMessage::UciOk),
        ["readyok"] => Ok(UciMessage::ReadyOk),
        ["id", name, rest @ ..] if !rest.is_empty() => Ok(UciMessage::Id {
            name: name.to_string(),
            value: rest.join(" "),
        }),
        ["bestmove", mv, rest @ ..] => {
            let mv = match *mv {
                "(none)" | "0000" => None,
                other => Some(other.to_string()),
            };
            let ponder = match rest {
                ["ponder", p, ..] => Some(p.to_string()),
                _ => None,
            };
            Ok(UciMessage::BestMove { mv, ponder })
        }
        ["info", rest @ ..] => Ok(UciMessage::Info(parse_info_line(rest))),
        ["id", ..] | ["bestmove"] => Err(UciError::MalformedMessage(line.to_string())),
        _ => Err(UciError::UnknownMessage(line.to_string())),
    }
}

fn parse_info_line(tokens: &[&str]) -> EngineInfo {
    let mut info = EngineInfo::default();
    let mut it = tokens.iter().copied().peekable();

    while let Some(key) = it.next() {
        match key {
            "depth" => info.depth = next_value(&mut it),
            "seldepth" => info.seldepth = next_value(&mut it),
            "time" => info.time_ms = next_value(&mut it),
            "nodes" => info.nodes = next_value(&mut it),
            "nps" => info.nps = next_value(&mut it),
            "hashfull" => info.hashfull = next_value(&mut it),
            "multipv" => info.multipv = next_value(&mut it),
            "currmove" => info.currmove = it.next().map(str::to_string),
            "score" => {
                let kind = it.next();
                let value: Option<i32> = next_value(&mut it);
                info.score = match (kind, value) {
                    (Some("cp"), Some(v)) => Some(Score::Centipawns(v)),
                    (Some("mate"), Some(v)) => Some(Score::Mate(v)),
                    _ => None,
                };
                // Aspiration-window re-searches report bounds, not exact scores.
                if let Some(&("lowerbound" | "upperbound")) = it.peek() {
                    info.bounded = true;
                    it.next();
                }
            }
            "pv" => {
                while let Some(mv) = it.next_if(|t| !is_keyword(t)) {
                    info.pv.push(mv.to_string());
                }
            }
            // Free text runs to end of line.
            "string" => break,
            _ => {}
        }
    }

    info
}

fn next_value<'a, T: FromStr>(it: &mut impl Iterator<Item = &'a str>) -> Option<T> {
    it.next().and_then(|s| s.parse().ok())
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "sbhits"
            | "cpuload"
            | "refutation"
            | "currline"
            | "string"
    )
}
