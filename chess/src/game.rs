use cozy_chess::{BitBoard, Board, Color, Move, Piece};

use crate::san::format_san;
use crate::types::{Side, Winner};
use crate::uci::{format_move_for, parse_move_for, NotationError};

/// Halfmoves without a capture or pawn move after which the game is drawn
/// without a claim.
const AUTOMATIC_DRAW_HALFMOVES: u16 = 150;

/// A game replayed from the standard starting position.
///
/// Only the ordered move list is authoritative; the board is derived from it
/// and rebuilt whenever history is rewritten.
#[derive(Debug, Clone)]
pub struct Game {
    position: Board,
    history: Vec<HistoryEntry>,
    /// Position hashes, one per ply plus the initial position.
    hashes: Vec<u64>,
    /// Plies since the last capture or pawn move. cozy-chess saturates its
    /// own clock at 100, so the count is kept here.
    quiet_plies: u16,
}

/// One played move in cozy-chess, canonical UCI and SAN form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub mv: Move,
    pub uci: String,
    pub san: String,
}

/// Terminal classification of the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Ongoing,
    Checkmate { winner: Side },
    Stalemate,
    SeventyFiveMoveRule,
    InsufficientMaterial,
    FivefoldRepetition,
}

impl GameOutcome {
    pub fn is_over(self) -> bool {
        !matches!(self, Self::Ongoing)
    }

    pub fn winner(self) -> Winner {
        match self {
            Self::Checkmate { winner } => winner.into(),
            _ => Winner::None,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Checkmate { .. } => "checkmate",
            Self::Stalemate => "stalemate",
            Self::SeventyFiveMoveRule => "seventy-five-move rule",
            Self::InsufficientMaterial => "insufficient material",
            Self::FivefoldRepetition => "fivefold repetition",
        }
    }
}

impl Game {
    /// Create a new game from the standard starting position
    pub fn new() -> Self {
        let position = Board::default();
        let hashes = vec![position.hash()];
        Self {
            position,
            history: Vec::new(),
            hashes,
            quiet_plies: 0,
        }
    }

    /// Rebuild a game by playing `moves` (canonical UCI) in order from the
    /// starting position. The first rejected move aborts the replay.
    pub fn replay<S: AsRef<str>>(moves: &[S]) -> Result<Self, GameError> {
        let mut game = Self::new();
        for (ply, text) in moves.iter().enumerate() {
            let text = text.as_ref();
            game.play_uci(text)
                .map_err(|_| GameError::ReplayRejected {
                    ply,
                    mv: text.to_string(),
                })?;
        }
        Ok(game)
    }

    /// Get the current board position
    pub fn position(&self) -> &Board {
        &self.position
    }

    /// Get the move history
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Canonical UCI text of every move played so far.
    pub fn uci_moves(&self) -> Vec<String> {
        self.history.iter().map(|e| e.uci.clone()).collect()
    }

    pub fn move_count(&self) -> usize {
        self.history.len()
    }

    /// Parse UCI text against the current position and play it.
    pub fn play_uci(&mut self, text: &str) -> Result<HistoryEntry, GameError> {
        let legal = self.legal_moves();
        let mv = parse_move_for(&self.position, text, &legal)?;
        if !legal.contains(&mv) {
            return Err(GameError::IllegalMove(text.to_string()));
        }
        Ok(self.push_unchecked(mv))
    }

    /// Make a move on the board
    pub fn make_move(&mut self, mv: Move) -> Result<HistoryEntry, GameError> {
        if !self.legal_moves().contains(&mv) {
            return Err(GameError::IllegalMove(format_move_for(&self.position, mv)));
        }
        Ok(self.push_unchecked(mv))
    }

    fn push_unchecked(&mut self, mv: Move) -> HistoryEntry {
        let entry = HistoryEntry {
            mv,
            uci: format_move_for(&self.position, mv),
            san: format_san(&self.position, mv),
        };
        self.quiet_plies = next_quiet_plies(&self.position, mv, self.quiet_plies);
        self.position.play_unchecked(mv);
        self.hashes.push(self.position.hash());
        self.history.push(entry.clone());
        entry
    }

    /// Remove the last `plies` moves. Fails without touching the game if
    /// fewer moves have been played.
    pub fn undo_plies(&mut self, plies: usize) -> Result<(), GameError> {
        if plies == 0 {
            return Ok(());
        }
        if self.history.len() < plies {
            return Err(GameError::NothingToUndo);
        }

        let keep = self.history.len() - plies;
        self.history.truncate(keep);
        self.rebuild_position();
        Ok(())
    }

    /// Get all legal moves for the current position
    pub fn legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::new();
        self.position.generate_moves(|mvs| {
            moves.extend(mvs);
            false
        });
        moves
    }

    pub fn legal_move_count(&self) -> usize {
        let mut count = 0;
        self.position.generate_moves(|mvs| {
            count += mvs.len();
            false
        });
        count
    }

    /// Classify the current position.
    pub fn outcome(&self) -> GameOutcome {
        let has_moves = self.position.generate_moves(|_| true);
        if !has_moves {
            return if self.position.checkers().is_empty() {
                GameOutcome::Stalemate
            } else {
                GameOutcome::Checkmate {
                    winner: Side::from(self.position.side_to_move()).opposite(),
                }
            };
        }
        if self.insufficient_material() {
            return GameOutcome::InsufficientMaterial;
        }
        if self.quiet_plies >= AUTOMATIC_DRAW_HALFMOVES {
            return GameOutcome::SeventyFiveMoveRule;
        }
        if self.repetitions() >= 5 {
            return GameOutcome::FivefoldRepetition;
        }
        GameOutcome::Ongoing
    }

    pub fn is_over(&self) -> bool {
        self.outcome().is_over()
    }

    /// Get the side to move
    pub fn side_to_move(&self) -> Side {
        self.position.side_to_move().into()
    }

    /// Export position to FEN string
    pub fn to_fen(&self) -> String {
        self.position.to_string()
    }

    /// Neither side can ever deliver mate.
    fn insufficient_material(&self) -> bool {
        Self::cannot_mate(&self.position, Color::White)
            && Self::cannot_mate(&self.position, Color::Black)
    }

    fn cannot_mate(board: &Board, color: Color) -> bool {
        let ours = board.colors(color);
        let heavy = board.pieces(Piece::Pawn) | board.pieces(Piece::Rook) | board.pieces(Piece::Queen);
        if !(ours & heavy).is_empty() {
            return false;
        }
        if !(ours & board.pieces(Piece::Knight)).is_empty() {
            // A lone knight only mates with help from enemy minors or rooks.
            let theirs = board.colors(!color);
            let helpers = theirs & !board.pieces(Piece::King) & !board.pieces(Piece::Queen);
            return ours.len() <= 2 && helpers.is_empty();
        }
        if !(ours & board.pieces(Piece::Bishop)).is_empty() {
            let bishops = board.pieces(Piece::Bishop);
            let one_colour = (bishops & BitBoard::DARK_SQUARES).is_empty()
                || (bishops & BitBoard::LIGHT_SQUARES).is_empty();
            return one_colour
                && board.pieces(Piece::Pawn).is_empty()
                && board.pieces(Piece::Knight).is_empty();
        }
        true
    }

    fn repetitions(&self) -> usize {
        let current = self.position.hash();
        self.hashes.iter().filter(|&&h| h == current).count()
    }

    /// Rebuild position from start + history (for undo)
    fn rebuild_position(&mut self) {
        let mut board = Board::default();
        let mut hashes = Vec::with_capacity(self.history.len() + 1);
        let mut quiet_plies = 0;
        hashes.push(board.hash());
        for entry in &self.history {
            quiet_plies = next_quiet_plies(&board, entry.mv, quiet_plies);
            board.play_unchecked(entry.mv);
            hashes.push(board.hash());
        }
        self.position = board;
        self.hashes = hashes;
        self.quiet_plies = quiet_plies;
    }
}

/// Castling is encoded king-takes-own-rook, so only enemy pieces count as
/// captures.
fn next_quiet_plies(board: &Board, mv: Move, quiet_plies: u16) -> u16 {
    let pawn_move = board.piece_on(mv.from) == Some(Piece::Pawn);
    let capture = board.color_on(mv.to) == Some(!board.side_to_move());
    if pawn_move || capture {
        0
    } else {
        quiet_plies.saturating_add(1)
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Move {mv} rejected at ply {ply} during replay")]
    ReplayRejected { ply: usize, mv: String },
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Notation error: {0}")]
    Notation(#[from] NotationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_new_game_is_standard_start() {
        let game = Game::new();
        assert_eq!(game.to_fen(), START_FEN);
        assert_eq!(game.legal_move_count(), 20);
        assert_eq!(game.outcome(), GameOutcome::Ongoing);
    }

    #[test]
    fn test_replay_matches_incremental_play() {
        let moves = ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6", "e1g1"];
        let replayed = Game::replay(&moves).unwrap();

        let mut played = Game::new();
        for m in moves {
            played.play_uci(m).unwrap();
        }

        assert_eq!(replayed.to_fen(), played.to_fen());
        assert_eq!(replayed.uci_moves(), moves);
    }

    #[test]
    fn test_replay_reports_rejected_ply() {
        let err = Game::replay(&["e2e4", "e2e4"]).unwrap_err();
        assert_eq!(
            err,
            GameError::ReplayRejected {
                ply: 1,
                mv: "e2e4".to_string()
            }
        );
    }

    #[test]
    fn test_illegal_move_does_not_mutate() {
        let mut game = Game::replay(&["e2e4"]).unwrap();
        let before = game.to_fen();
        assert!(matches!(
            game.play_uci("e4e5"),
            Err(GameError::IllegalMove(_))
        ));
        assert!(game.play_uci("nonsense").is_err());
        assert_eq!(game.to_fen(), before);
        assert_eq!(game.move_count(), 1);
    }

    #[test]
    fn test_fools_mate_is_checkmate_for_black() {
        let game = Game::replay(&["f2f3", "e7e5", "g2g4", "d8h4"]).unwrap();
        let outcome = game.outcome();
        assert_eq!(
            outcome,
            GameOutcome::Checkmate {
                winner: Side::Black
            }
        );
        assert_eq!(outcome.winner(), Winner::Black);
        assert_eq!(game.legal_move_count(), 0);
    }

    #[test]
    fn test_stalemate() {
        // Black to move, no legal moves, not in check.
        let mut game = Game::new();
        game.position = "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1".parse().unwrap();
        assert_eq!(game.outcome(), GameOutcome::Stalemate);
        assert_eq!(game.outcome().winner(), Winner::None);
    }

    #[test]
    fn test_insufficient_material() {
        let mut game = Game::new();
        game.position = "8/8/4k3/8/8/3NK3/8/8 w - - 0 1".parse().unwrap();
        assert_eq!(game.outcome(), GameOutcome::InsufficientMaterial);
    }

    #[test]
    fn test_same_coloured_bishops_are_insufficient() {
        let mut game = Game::new();
        game.position = "8/8/4k3/3b4/8/3BK3/8/8 w - - 0 1".parse().unwrap();
        assert_eq!(game.outcome(), GameOutcome::InsufficientMaterial);

        game.position = "8/6b1/4k3/8/8/3BK3/8/8 w - - 0 1".parse().unwrap();
        assert_eq!(game.outcome(), GameOutcome::Ongoing);
    }

    #[test]
    fn test_knight_against_rook_can_still_mate() {
        let mut game = Game::new();
        game.position = "8/8/4k3/4r3/8/3NK3/8/8 w - - 0 1".parse().unwrap();
        assert_eq!(game.outcome(), GameOutcome::Ongoing);
    }

    #[test]
    fn test_draw_only_at_seventy_five_moves() {
        let mut game = Game::new();
        game.position = "8/8/4k3/8/8/3RK3/8/8 w - - 100 80".parse().unwrap();
        game.quiet_plies = 100;
        assert_eq!(game.outcome(), GameOutcome::Ongoing);

        game.quiet_plies = 149;
        assert_eq!(game.outcome(), GameOutcome::Ongoing);

        game.quiet_plies = 150;
        assert_eq!(game.outcome(), GameOutcome::SeventyFiveMoveRule);
        assert_eq!(game.outcome().winner(), Winner::None);
    }

    #[test]
    fn test_fivefold_repetition() {
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        let moves: Vec<&str> = shuffle.iter().cycle().take(16).copied().collect();
        let game = Game::replay(&moves).unwrap();
        assert_eq!(game.outcome(), GameOutcome::FivefoldRepetition);

        let shorter = Game::replay(&moves[..12]).unwrap();
        assert_eq!(shorter.outcome(), GameOutcome::Ongoing);
    }

    #[test]
    fn test_undo_plies_restores_earlier_position() {
        let mut game = Game::replay(&["d2d4", "d7d5"]).unwrap();
        let before = game.to_fen();
        game.play_uci("c2c4").unwrap();
        game.play_uci("e7e6").unwrap();
        game.undo_plies(2).unwrap();
        assert_eq!(game.to_fen(), before);
        assert_eq!(game.uci_moves(), vec!["d2d4", "d7d5"]);
    }

    #[test]
    fn test_quiet_plies_reset_by_pawn_moves_and_captures() {
        let mut game = Game::replay(&["g1f3", "g8f6", "f3g1"]).unwrap();
        assert_eq!(game.quiet_plies, 3);

        game.play_uci("e7e5").unwrap();
        assert_eq!(game.quiet_plies, 0);

        let mut capture = Game::replay(&["e2e4", "d7d5", "g1f3", "b8c6", "e4d5"]).unwrap();
        assert_eq!(capture.quiet_plies, 0);
        capture.undo_plies(1).unwrap();
        assert_eq!(capture.quiet_plies, 2);
    }

    #[test]
    fn test_undo_plies_without_history() {
        let mut game = Game::replay(&["e2e4"]).unwrap();
        assert_eq!(game.undo_plies(2), Err(GameError::NothingToUndo));
        assert_eq!(game.move_count(), 1);
    }

    #[test]
    fn test_castling_recorded_in_standard_notation() {
        let game = Game::replay(&["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "f8c5", "e1g1"])
            .unwrap();
        let last = game.history().last().unwrap();
        assert_eq!(last.uci, "e1g1");
        assert_eq!(last.san, "O-O");
        assert!(game.to_fen().starts_with("r1bqk1nr/pppp1ppp/2n5/2b1p3/2B1P3/5N2/PPPP1PPP/RNBQ1RK1"));
    }

    proptest! {
        #[test]
        fn replay_of_random_legal_sequence_reproduces_position(
            picks in proptest::collection::vec(any::<u16>(), 0..60)
        ) {
            let mut game = Game::new();
            for pick in picks {
                if game.is_over() {
                    break;
                }
                let legal = game.legal_moves();
                let mv = legal[pick as usize % legal.len()];
                game.make_move(mv).unwrap();
            }

            let rebuilt = Game::replay(&game.uci_moves()).unwrap();
            prop_assert_eq!(rebuilt.to_fen(), game.to_fen());
            prop_assert_eq!(rebuilt.outcome(), game.outcome());
        }
    }
}
