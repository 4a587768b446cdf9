//! Tic-tac-toe implementation for the Descent engine
//!
//! Reference game used by the search tests and the default self-play setup.
//! The board is kept as two mover-relative bitboards: `own` always belongs to
//! the side to move, so every predicate reads naturally from the mover's
//! perspective and `apply` swaps the two boards when the turn passes.

use std::fmt;

use engine_core::{GameState, KeyError, Player};

/// A board square, 0..=8 in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move(pub u8);

/// The eight winning lines as bit masks over squares 0..=8.
const LINES: [u16; 8] = [
    0b000_000_111, // rows
    0b000_111_000,
    0b111_000_000,
    0b001_001_001, // columns
    0b010_010_010,
    0b100_100_100,
    0b100_010_001, // diagonals
    0b001_010_100,
];

const FULL: u16 = 0b111_111_111;

/// A tic-tac-toe position.
///
/// `own` holds the pieces of the side to move, `opp` the opponent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    own: u16,
    opp: u16,
    turn: Player,
}

impl Position {
    /// The empty start position, first player to move.
    pub fn new() -> Self {
        Self {
            own: 0,
            opp: 0,
            turn: Player::First,
        }
    }

    fn occupied(&self) -> u16 {
        self.own | self.opp
    }

    /// Pieces of the given absolute player, independent of whose turn it is.
    fn pieces_of(&self, player: Player) -> u16 {
        if self.turn == player {
            self.own
        } else {
            self.opp
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState for Position {
    type Move = Move;

    fn legal_moves(&self) -> Vec<Move> {
        if self.is_done() {
            return Vec::new();
        }
        (0..9u8)
            .filter(|&sq| self.occupied() & (1u16 << sq) == 0)
            .map(Move)
            .collect()
    }

    fn apply(&self, mv: Move) -> Self {
        debug_assert!(self.occupied() & (1 << mv.0) == 0);
        Self {
            own: self.opp,
            opp: self.own | (1 << mv.0),
            turn: self.turn.opponent(),
        }
    }

    fn is_win(&self) -> bool {
        // A line with two mover pieces and an empty third cell can be
        // completed this turn.
        LINES.iter().any(|&line| {
            line & self.opp == 0 && (line & self.own).count_ones() == 2
        })
    }

    fn is_lose(&self) -> bool {
        LINES.iter().any(|&line| line & self.opp == line)
    }

    fn is_draw(&self) -> bool {
        self.occupied() == FULL && !self.is_lose()
    }

    fn turn(&self) -> Player {
        self.turn
    }

    fn move_count(&self) -> u32 {
        self.occupied().count_ones()
    }

    fn canonical_key(&self) -> u64 {
        // Two bits per cell in absolute colors (0 empty, 1 first player,
        // 2 second player), low bit carries the turn. 19 significant bits.
        let first = self.pieces_of(Player::First);
        let second = self.pieces_of(Player::Second);
        let mut key = 0u64;
        for sq in 0..9 {
            key <<= 2;
            if first & (1 << sq) != 0 {
                key |= 1;
            } else if second & (1 << sq) != 0 {
                key |= 2;
            }
        }
        key <<= 1;
        if self.turn == Player::Second {
            key |= 1;
        }
        key
    }

    fn from_key(key: u64) -> Result<Self, KeyError> {
        let turn = if key & 1 == 0 {
            Player::First
        } else {
            Player::Second
        };
        let mut first = 0u16;
        let mut second = 0u16;
        let mut bits = key >> 1;
        for sq in (0..9).rev() {
            match bits & 3 {
                0 => {}
                1 => first |= 1 << sq,
                2 => second |= 1 << sq,
                _ => return Err(KeyError::InvalidCell { key, index: sq }),
            }
            bits >>= 2;
        }
        if bits != 0 {
            return Err(KeyError::Unreachable { key });
        }
        let (own, opp) = if turn == Player::First {
            (first, second)
        } else {
            (second, first)
        };
        Ok(Self { own, opp, turn })
    }

    const FEATURE_LEN: usize = 18;

    fn encode_features(&self, out: &mut Vec<f32>) {
        // Two 9-cell planes: mover pieces, then opponent pieces.
        for sq in 0..9 {
            out.push(if self.own & (1 << sq) != 0 { 1.0 } else { 0.0 });
        }
        for sq in 0..9 {
            out.push(if self.opp & (1 << sq) != 0 { 1.0 } else { 0.0 });
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.pieces_of(Player::First);
        let second = self.pieces_of(Player::Second);
        for row in 0..3 {
            for col in 0..3 {
                let sq = row * 3 + col;
                let c = if first & (1 << sq) != 0 {
                    'o'
                } else if second & (1 << sq) != 0 {
                    'x'
                } else {
                    '-'
                };
                write!(f, "{}", c)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Play out a sequence of squares from the start position.
    fn play(moves: &[u8]) -> Position {
        moves
            .iter()
            .fold(Position::new(), |pos, &sq| pos.apply(Move(sq)))
    }

    #[test]
    fn test_initial_position() {
        let pos = Position::new();
        assert_eq!(pos.turn(), Player::First);
        assert_eq!(pos.move_count(), 0);
        assert_eq!(pos.legal_moves().len(), 9);
        assert!(!pos.is_done());
        assert!(!pos.is_win());
    }

    #[test]
    fn test_apply_swaps_perspective() {
        let pos = Position::new().apply(Move(4));
        assert_eq!(pos.turn(), Player::Second);
        assert_eq!(pos.move_count(), 1);
        // The placed piece now belongs to the opponent from the new mover's
        // point of view.
        assert_eq!(pos.opp, 1 << 4);
        assert_eq!(pos.own, 0);
        assert_eq!(pos.legal_moves().len(), 8);
    }

    #[test]
    fn test_lose_detection() {
        // o o o / x x - / - - -, second player to move after o completes
        // the top row.
        let pos = play(&[0, 3, 1, 4, 2]);
        assert!(pos.is_lose());
        assert!(pos.is_done());
        assert!(!pos.is_draw());
        assert!(pos.legal_moves().is_empty());
    }

    #[test]
    fn test_win_detection() {
        // o o - / x x - / - - -, first player to move with two in a row.
        let pos = play(&[0, 3, 1, 4]);
        assert_eq!(pos.turn(), Player::First);
        assert!(pos.is_win());
        assert!(!pos.is_done());
    }

    #[test]
    fn test_win_requires_empty_third_cell() {
        // o o x on the top row: blocked, no immediate win there.
        let pos = play(&[0, 2, 1, 5, 8, 4]);
        assert_eq!(pos.turn(), Player::First);
        assert!(!pos.is_win());
    }

    #[test]
    fn test_draw_detection() {
        // o x o / o x x / x o o - full board, no line.
        let pos = play(&[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert_eq!(pos.move_count(), 9);
        assert!(pos.is_draw());
        assert!(!pos.is_lose());
        assert!(pos.is_done());
    }

    #[test]
    fn test_full_board_loss_is_not_a_draw() {
        // The ninth move completes a line; the board is full but the game is
        // a loss for the mover, not a draw.
        let pos = play(&[0, 3, 1, 4, 5, 7, 6, 8, 2]);
        assert_eq!(pos.move_count(), 9);
        assert!(pos.is_lose());
        assert!(!pos.is_draw());
    }

    #[test]
    fn test_key_roundtrip_simple() {
        let pos = play(&[4, 0, 8]);
        let key = pos.canonical_key();
        let restored = Position::from_key(key).unwrap();
        assert_eq!(restored.canonical_key(), key);
        assert_eq!(restored, pos);
    }

    #[test]
    fn test_key_roundtrip_all_reachable() {
        // Walk the full game tree and round-trip every reachable state.
        let mut stack = vec![Position::new()];
        let mut seen = std::collections::HashSet::new();
        while let Some(pos) = stack.pop() {
            let key = pos.canonical_key();
            if !seen.insert(key) {
                continue;
            }
            let restored = Position::from_key(key).unwrap();
            assert_eq!(restored.canonical_key(), key);
            assert_eq!(restored, pos);
            for mv in pos.legal_moves() {
                stack.push(pos.apply(mv));
            }
        }
        // 5478 legal tic-tac-toe states.
        assert_eq!(seen.len(), 5478);
    }

    #[test]
    fn test_key_rejects_invalid_cell() {
        // Cell value 3 is not a piece.
        let key = 0b11u64 << 1;
        assert!(Position::from_key(key).is_err());
    }

    #[test]
    fn test_key_rejects_out_of_range_bits() {
        let key = 1u64 << 40;
        assert!(Position::from_key(key).is_err());
    }

    #[test]
    fn test_feature_encoding() {
        let pos = play(&[4, 0]);
        let mut feats = Vec::new();
        pos.encode_features(&mut feats);
        assert_eq!(feats.len(), Position::FEATURE_LEN);
        // First player to move again: own plane has the center, opponent
        // plane has the corner.
        assert_eq!(feats[4], 1.0);
        assert_eq!(feats[9], 1.0);
        assert_eq!(feats.iter().sum::<f32>(), 2.0);
    }

    #[test]
    fn test_legal_moves_empty_when_done() {
        let pos = play(&[0, 3, 1, 4, 2]);
        assert!(pos.legal_moves().is_empty());
    }
}
