//! Search tree nodes shared by the best-first and conspiracy-number searches.
//!
//! One node per visited position. A node owns its children exclusively: the
//! child array is allocated exactly once, under the parent's lock, and freed
//! with the tree. Mutation of a node's statistics happens only while holding
//! that node's lock (via [`NodeGuard`]); the statistics themselves are
//! published through atomics so sibling scans during selection can read them
//! without acquiring child locks. This keeps the locking discipline at "one
//! node lock held at a time" while staying data-race free.
//!
//! Values are negamax: `value()` is always from the perspective of the player
//! to move at that node, and a parent negates a child's value when using it.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use engine_core::GameState;

/// Exact game-theoretic state of a node, from the mover's perspective.
///
/// Once a node leaves `Unknown` it is "resolved": its outcome and value never
/// change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Outcome {
    Unknown = 0,
    Win = 1,
    Lose = 2,
    Draw = 3,
}

impl Outcome {
    pub fn is_resolved(self) -> bool {
        self != Outcome::Unknown
    }

    fn from_u8(raw: u8) -> Outcome {
        match raw {
            1 => Outcome::Win,
            2 => Outcome::Lose,
            3 => Outcome::Draw,
            _ => Outcome::Unknown,
        }
    }
}

/// Exact score of a proven win at the given ply. Shallower wins score higher,
/// so the engine prefers the quickest proven win.
pub fn score_win(ply: u32) -> f32 {
    0.9999 - ply as f32 / 2000.0
}

/// Exact score of a proven loss at the given ply. Deeper losses score less
/// negatively, so the engine holds out as long as possible when lost.
pub fn score_lose(ply: u32) -> f32 {
    -score_win(ply)
}

/// Clamp a raw evaluator score into the heuristic range, reserving headroom
/// so exact terminal scores always dominate heuristic ones.
pub fn clamp_score(raw: f32) -> f32 {
    raw.clamp(-0.8999, 0.8999)
}

/// Exact score and outcome if the position is terminal (or an immediate win
/// is directly detectable), else `None`.
pub fn terminal_score<S: GameState>(position: &S, ply: u32) -> Option<(f32, Outcome)> {
    if position.is_draw() {
        Some((0.0, Outcome::Draw))
    } else if position.is_lose() {
        Some((score_lose(ply), Outcome::Lose))
    } else if position.is_win() {
        Some((score_win(ply), Outcome::Win))
    } else {
        None
    }
}

/// Fields that are only ever touched under the node lock and never read by
/// lock-free sibling scans.
#[derive(Debug)]
struct Edit<M> {
    best_move: Option<M>,
}

/// A node of the shared search tree.
pub struct Node<S: GameState> {
    /// The position at this node. Immutable for the node's lifetime.
    pub position: S,
    /// Depth from the game's start.
    pub ply: u32,
    /// The move that produced this node; `None` only at the search root.
    pub parent_move: Option<S::Move>,

    /// Children, created exactly once under this node's lock. `None` until
    /// the node has been expanded.
    children: OnceLock<Box<[Arc<Node<S>>]>>,

    /// Guards mutation of this node's fields (not its subtree).
    lock: Mutex<Edit<S::Move>>,

    // Statistics, written under `lock`, readable without it.
    w: AtomicU32,
    n: AtomicU32,
    outcome: AtomicU8,
    // Proof/disproof numbers, used by the conspiracy-number search only.
    pn: AtomicU32,
    dn: AtomicU32,
}

impl<S: GameState> Node<S> {
    pub fn new(position: S, ply: u32, parent_move: Option<S::Move>) -> Self {
        Self {
            position,
            ply,
            parent_move,
            children: OnceLock::new(),
            lock: Mutex::new(Edit { best_move: None }),
            w: AtomicU32::new(0f32.to_bits()),
            n: AtomicU32::new(0),
            outcome: AtomicU8::new(Outcome::Unknown as u8),
            pn: AtomicU32::new(0),
            dn: AtomicU32::new(0),
        }
    }

    /// Heuristic or backed-up score in `[-1, 1]`, from the mover's
    /// perspective at this node.
    pub fn value(&self) -> f32 {
        f32::from_bits(self.w.load(Ordering::Relaxed))
    }

    pub fn visits(&self) -> u32 {
        self.n.load(Ordering::Relaxed)
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_u8(self.outcome.load(Ordering::Relaxed))
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome().is_resolved()
    }

    pub fn proof_number(&self) -> u32 {
        self.pn.load(Ordering::Relaxed)
    }

    pub fn disproof_number(&self) -> u32 {
        self.dn.load(Ordering::Relaxed)
    }

    /// The children, if this node has been expanded.
    pub fn children(&self) -> Option<&[Arc<Node<S>>]> {
        self.children.get().map(|c| &c[..])
    }

    pub fn best_move(&self) -> Option<S::Move> {
        self.lock().edit.best_move
    }

    /// Acquire this node's lock. A worker must hold at most one node lock at
    /// a time; release the parent before recursing into a child.
    pub fn lock(&self) -> NodeGuard<'_, S> {
        // A poisoned lock only means another worker panicked mid-update; the
        // statistics are still sound to read and overwrite.
        let edit = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        NodeGuard { node: self, edit }
    }

    /// Debug-only consistency check: for internal nodes of the plain search,
    /// the visit count is one more than the sum of the children's.
    #[cfg(debug_assertions)]
    pub fn check_visit_invariant(&self) -> bool {
        match self.children() {
            None => true,
            Some(children) => {
                let child_sum: u32 = children.iter().map(|c| c.visits()).sum();
                self.visits() == child_sum + 1
            }
        }
    }
}

impl<S: GameState> std::fmt::Debug for Node<S>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("ply", &self.ply)
            .field("parent_move", &self.parent_move)
            .field("w", &self.value())
            .field("n", &self.visits())
            .field("outcome", &self.outcome())
            .field("child_len", &self.children().map_or(-1, |c| c.len() as i64))
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a node's mutable statistics.
pub struct NodeGuard<'a, S: GameState> {
    node: &'a Node<S>,
    edit: MutexGuard<'a, Edit<S::Move>>,
}

impl<'a, S: GameState> NodeGuard<'a, S> {
    pub fn bump_visits(&mut self) {
        self.node.n.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_value(&mut self, w: f32) {
        debug_assert!(w.abs() <= 1.0, "node value out of range: {w}");
        self.node.w.store(w.to_bits(), Ordering::Relaxed);
    }

    /// Mark the node's exact outcome. Callers never resolve a node twice.
    pub fn resolve(&mut self, outcome: Outcome) {
        debug_assert!(outcome.is_resolved());
        self.node.outcome.store(outcome as u8, Ordering::Relaxed);
    }

    pub fn set_best_move(&mut self, mv: Option<S::Move>) {
        self.edit.best_move = mv;
    }

    pub fn set_proof_numbers(&mut self, pn: u32, dn: u32) {
        self.node.pn.store(pn, Ordering::Relaxed);
        self.node.dn.store(dn, Ordering::Relaxed);
    }

    /// Create the child array from the position's legal moves.
    ///
    /// Must only be called once per node, with the lock held (which this
    /// guard proves). The children become reachable by other workers when the
    /// guard is dropped.
    pub fn expand(&mut self) {
        debug_assert!(self.node.children.get().is_none(), "node expanded twice");
        let moves = self.node.position.legal_moves();
        debug_assert!(!moves.is_empty(), "expanding a terminal position");
        let children: Box<[Arc<Node<S>>]> = moves
            .into_iter()
            .map(|mv| {
                Arc::new(Node::new(
                    self.node.position.apply(mv),
                    self.node.ply + 1,
                    Some(mv),
                ))
            })
            .collect();
        let _ = self.node.children.set(children);
    }

    /// Write a freshly expanded child's initial score. The parent's guard is
    /// proof that no other worker can reach the child yet, so the child's own
    /// lock is not needed.
    pub fn init_child(&mut self, child: &Node<S>, w: f32, outcome: Outcome) {
        debug_assert!(w.abs() <= 1.0, "leaf score out of range: {w}");
        child.w.store(w.to_bits(), Ordering::Relaxed);
        child.outcome.store(outcome as u8, Ordering::Relaxed);
    }

    /// As `init_child`, for the conspiracy-number search.
    pub fn init_child_proof(&mut self, child: &Node<S>, pn: u32, dn: u32) {
        child.pn.store(pn, Ordering::Relaxed);
        child.dn.store(dn, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::GameState;
    use games_tictactoe::Position;

    #[test]
    fn test_score_lose_monotone_in_ply() {
        // Deeper forced losses score less negatively.
        for ply in 0..100 {
            assert!(score_lose(ply + 1) > score_lose(ply));
        }
        assert!(score_lose(0) < -0.99);
    }

    #[test]
    fn test_score_win_is_negated_lose() {
        for ply in [0, 1, 9, 50] {
            assert_eq!(score_win(ply), -score_lose(ply));
        }
    }

    #[test]
    fn test_clamp_reserves_headroom() {
        assert_eq!(clamp_score(1.7), 0.8999);
        assert_eq!(clamp_score(-3.0), -0.8999);
        assert_eq!(clamp_score(0.25), 0.25);
        // Exact scores always beat clamped heuristic ones.
        assert!(score_win(100) > clamp_score(f32::MAX));
    }

    #[test]
    fn test_terminal_score_detects_immediate_outcomes() {
        let start = Position::new();
        assert!(terminal_score(&start, 0).is_none());

        // o o - / x x - / - - -: mover wins by completing the top row.
        let winnable = [0u8, 3, 1, 4]
            .iter()
            .fold(Position::new(), |p, &sq| p.apply(games_tictactoe::Move(sq)));
        let (w, outcome) = terminal_score(&winnable, 4).unwrap();
        assert_eq!(outcome, Outcome::Win);
        assert_eq!(w, score_win(4));

        let lost = winnable.apply(games_tictactoe::Move(2));
        let (w, outcome) = terminal_score(&lost, 5).unwrap();
        assert_eq!(outcome, Outcome::Lose);
        assert_eq!(w, score_lose(5));
    }

    #[test]
    fn test_expand_once() {
        let node = Node::new(Position::new(), 0, None);
        assert!(node.children().is_none());
        node.lock().expand();
        let children = node.children().unwrap();
        assert_eq!(children.len(), 9);
        for child in children {
            assert_eq!(child.ply, 1);
            assert!(child.parent_move.is_some());
            assert_eq!(child.visits(), 0);
            assert_eq!(child.outcome(), Outcome::Unknown);
        }
    }

    #[test]
    fn test_guard_mutation_roundtrip() {
        let node = Node::new(Position::new(), 0, None);
        {
            let mut guard = node.lock();
            guard.bump_visits();
            guard.bump_visits();
            guard.set_value(0.25);
        }
        assert_eq!(node.visits(), 2);
        assert_eq!(node.value(), 0.25);
        assert!(!node.is_resolved());

        node.lock().resolve(Outcome::Draw);
        assert!(node.is_resolved());
        assert_eq!(node.outcome(), Outcome::Draw);
    }
}
