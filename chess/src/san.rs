//! Standard algebraic notation for moves about to be played.

use cozy_chess::{Board, Move, Piece};

use crate::uci::format_square;

/// Format `mv`, legal on `board`, in SAN: piece letter, disambiguation,
/// capture, destination, promotion and a check or mate suffix.
pub fn format_san(board: &Board, mv: Move) -> String {
    let mut san = san_body(board, mv);

    let mut after = board.clone();
    after.play_unchecked(mv);
    if !after.checkers().is_empty() {
        let can_reply = after.generate_moves(|_| true);
        san.push(if can_reply { '+' } else { '#' });
    }
    san
}

fn san_body(board: &Board, mv: Move) -> String {
    let us = board.side_to_move();
    let piece = board.piece_on(mv.from).unwrap_or(Piece::Pawn);

    if piece == Piece::King && board.color_on(mv.to) == Some(us) {
        let short = mv.to.file() as u8 > mv.from.file() as u8;
        return if short { "O-O" } else { "O-O-O" }.to_string();
    }

    let from = format_square(mv.from);
    let (from_file, from_rank) = from.split_at(1);
    let capture = board.color_on(mv.to) == Some(!us)
        || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

    let mut san = String::new();
    match piece_letter(piece) {
        Some(letter) => {
            san.push(letter);
            san.push_str(&disambiguation(board, mv, piece, from_file, from_rank));
        }
        None if capture => san.push_str(from_file),
        None => {}
    }
    if capture {
        san.push('x');
    }
    san.push_str(&format_square(mv.to));
    if let Some(letter) = mv.promotion.and_then(piece_letter) {
        san.push('=');
        san.push(letter);
    }
    san
}

/// The shortest origin hint that separates `mv` from other pieces of the
/// same kind able to reach the same square.
fn disambiguation(board: &Board, mv: Move, piece: Piece, file: &str, rank: &str) -> String {
    let mut rivals = Vec::new();
    board.generate_moves(|mvs| {
        if mvs.piece == piece && mvs.from != mv.from && mvs.to.has(mv.to) {
            rivals.push(mvs.from);
        }
        false
    });

    if rivals.is_empty() {
        String::new()
    } else if rivals.iter().all(|sq| sq.file() != mv.from.file()) {
        file.to_string()
    } else if rivals.iter().all(|sq| sq.rank() != mv.from.rank()) {
        rank.to_string()
    } else {
        format!("{}{}", file, rank)
    }
}

fn piece_letter(piece: Piece) -> Option<char> {
    match piece {
        Piece::Pawn => None,
        Piece::Knight => Some('N'),
        Piece::Bishop => Some('B'),
        Piece::Rook => Some('R'),
        Piece::Queen => Some('Q'),
        Piece::King => Some('K'),
    }
}
