//! Typed game trait providing the position view the search engine works with.
//!
//! All values and predicates are expressed from the perspective of the player
//! to move: `is_lose` means "the side to move has already lost", and a
//! position's evaluation flips sign when the turn passes to the opponent.

use std::fmt::Debug;

/// The side to move. `First` is the player who moves from the start position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Player {
    First,
    Second,
}

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::First => Player::Second,
            Player::Second => Player::First,
        }
    }
}

/// An immutable game position.
///
/// Implementations should be cheap to clone; the search tree stores one
/// position per node. The `Send + Sync + 'static` bounds let a shared tree be
/// walked by multiple worker threads.
///
/// # Perspective convention
///
/// Every predicate and every derived value is from the viewpoint of the
/// player returned by [`turn`](GameState::turn):
///
/// * `is_lose`: the opponent completed a winning condition with their last
///   move; the mover has lost.
/// * `is_win`: the mover has a directly detectable immediate win available.
/// * `is_draw`: the game is over with no winner.
pub trait GameState: Clone + Send + Sync + 'static {
    /// A move, small enough to copy freely.
    type Move: Copy + Eq + Send + Sync + Debug + 'static;

    /// All legal moves from this position, in a stable order.
    fn legal_moves(&self) -> Vec<Self::Move>;

    /// The successor position after `mv`. Pure; `self` is unchanged.
    fn apply(&self, mv: Self::Move) -> Self;

    /// The mover has an immediate, directly detectable win.
    fn is_win(&self) -> bool;

    /// The mover has already lost.
    fn is_lose(&self) -> bool;

    /// The game ended without a winner.
    fn is_draw(&self) -> bool;

    /// The game is over (loss for the mover or draw).
    fn is_done(&self) -> bool {
        self.is_lose() || self.is_draw()
    }

    /// The player to move.
    fn turn(&self) -> Player;

    /// Number of moves played since the start position.
    fn move_count(&self) -> u32;

    /// A canonical 64-bit key identifying this position.
    ///
    /// `from_key(canonical_key(pos))` must reproduce a position with the same
    /// key for every reachable state.
    fn canonical_key(&self) -> u64;

    /// Reconstruct a position from its canonical key.
    fn from_key(key: u64) -> Result<Self, KeyError>;

    /// Number of floats `encode_features` appends.
    const FEATURE_LEN: usize;

    /// Append this position's evaluator input planes to `out`, encoded from
    /// the mover's perspective.
    fn encode_features(&self, out: &mut Vec<f32>);
}

/// Error type for canonical key decoding
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key {key:#x} holds an invalid cell value at index {index}")]
    InvalidCell { key: u64, index: usize },
    #[error("key {key:#x} does not describe a reachable position")]
    Unreachable { key: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opponent_roundtrip() {
        assert_eq!(Player::First.opponent(), Player::Second);
        assert_eq!(Player::Second.opponent(), Player::First);
        assert_eq!(Player::First.opponent().opponent(), Player::First);
    }
}
