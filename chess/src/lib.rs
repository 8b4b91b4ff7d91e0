//! Rules adapter over cozy-chess: move replay, UCI and SAN notation, and terminal
//! classification for server-side game reconstruction.

pub mod game;
pub mod san;
pub mod types;
pub mod uci;

pub use game::{Game, GameError, GameOutcome, HistoryEntry};
pub use san::format_san;
pub use types::{Side, Winner};
pub use uci::{format_move_for, format_uci_move, parse_move_for, parse_uci_move, NotationError};
