//! Multi-PV result ranking and score orientation.

use std::collections::BTreeMap;

use chess::Side;
use serde::{Deserialize, Serialize};

use crate::{EngineInfo, Score};

/// Evaluation from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AbsoluteScore {
    /// Positive means White is ahead.
    Centipawns(i32),
    /// Moves to mate; positive means White mates.
    Mate(i32),
}

impl AbsoluteScore {
    /// Convert a side-to-move relative engine score.
    pub fn from_relative(score: Score, mover: Side) -> Self {
        let sign = match mover {
            Side::White => 1,
            Side::Black => -1,
        };
        match score {
            Score::Centipawns(cp) => Self::Centipawns(cp * sign),
            Score::Mate(m) => Self::Mate(m * sign),
        }
    }
}

impl std::fmt::Display for AbsoluteScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Centipawns(cp) => write!(f, "{:+.2}", *cp as f64 / 100.0),
            Self::Mate(m) => write!(f, "Mate in {}", m),
        }
    }
}

/// One candidate move from a multi-line search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedMove {
    /// First move of the principal variation, canonical UCI.
    pub mv: String,
    pub score: AbsoluteScore,
}

/// Latest complete `info` line per multipv index.
///
/// Later lines for the same index replace earlier ones (deeper iterations).
/// Lines without a PV or score, and aspiration-window bound scores, are ignored.
#[derive(Debug, Default)]
pub struct PrincipalLines {
    lines: BTreeMap<u8, EngineInfo>,
}

impl PrincipalLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, info: EngineInfo) {
        if info.pv.is_empty() || info.score.is_none() || info.bounded {
            return;
        }
        let idx = info.multipv.unwrap_or(1);
        self.lines.insert(idx, info);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Up to `n` lines in search order with distinct first moves; the first
    /// line seen for a move wins. Scores are oriented to White.
    pub fn rank(&self, n: usize, mover: Side, is_legal: impl Fn(&str) -> bool) -> Vec<RankedMove> {
        let mut ranked: Vec<RankedMove> = Vec::with_capacity(n);
        for info in self.lines.values() {
            if ranked.len() >= n {
                break;
            }
            let (Some(first), Some(score)) = (info.pv.first(), info.score.clone()) else {
                continue;
            };
            if ranked.iter().any(|r| &r.mv == first) || !is_legal(first) {
                continue;
            }
            ranked.push(RankedMove {
                mv: first.clone(),
                score: AbsoluteScore::from_relative(score, mover),
            });
        }
        ranked
    }
}
