//! Unbounded best-first minimax search (UBFM).
//!
//! Each simulation descends the shared tree along the best negamax line,
//! expands and batch-evaluates one frontier node, and backs values and exact
//! resolutions up the visited path:
//!
//! 1. **Descend**: at each internal node pick the unresolved child maximizing
//!    the negated child value, preferring the less-visited child on ties
//! 2. **Expand + evaluate**: allocate all children of the frontier node and
//!    score them in one evaluator batch, overriding with exact scores where
//!    a terminal outcome is directly detectable
//! 3. **Back up**: recompute each visited node from its children, resolving
//!    it the moment its outcome is proven
//!
//! Workers share one tree. A worker locks a node only to mutate it, releases
//! the lock before recursing into the selected child, and re-locks for the
//! backup step, so at most one node lock is held at any moment.

use std::sync::Arc;
use std::thread;

use engine_core::GameState;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::SearchConfig;
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::node::{clamp_score, terminal_score, Node, NodeGuard, Outcome};

/// Errors that can occur during search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("evaluator error: {0}")]
    Evaluator(#[from] EvaluatorError),

    #[error("search called on a finished position")]
    TerminalPosition,

    #[error("no legal moves at the root")]
    NoLegalMoves,

    #[error("invalid search configuration: {0}")]
    InvalidConfig(String),

    #[error("a search worker panicked")]
    WorkerPanicked,
}

/// Result of one search call.
#[derive(Debug, Clone)]
pub struct SearchReport<M> {
    /// Best move found (best-effort if the budget ran out unresolved).
    pub best_move: M,

    /// Root value, from the root mover's perspective.
    pub value: f32,

    /// Exact root outcome, `Unknown` if the budget ran out first.
    pub outcome: Outcome,

    /// Simulations performed (root visit count).
    pub simulations: u32,
}

/// Best-first searcher owning the evaluator handle and worker configuration.
///
/// The tree is rebuilt from scratch on every [`think`](UbfmSearcher::think)
/// call; nothing is reused across searches.
pub struct UbfmSearcher<S: GameState> {
    config: SearchConfig,
    evaluator: Arc<dyn Evaluator<S>>,
}

impl<S: GameState> UbfmSearcher<S> {
    pub fn new(evaluator: Arc<dyn Evaluator<S>>, config: SearchConfig) -> Self {
        Self { config, evaluator }
    }

    /// Search `position` and return the chosen move with root statistics.
    ///
    /// Blocks until every worker has joined. Stops early once the root's
    /// outcome is proven; otherwise runs out the simulation budget and
    /// returns the best-effort move from current statistics.
    pub fn think(&self, position: S) -> Result<SearchReport<S::Move>, SearchError> {
        if position.is_done() {
            return Err(SearchError::TerminalPosition);
        }
        let root_ply = position.move_count();
        let root = Arc::new(Node::new(position, root_ply, None));

        let threads = self.config.num_threads.max(1);
        let budget = (self.config.num_simulations / threads as u32).max(1);

        thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|worker_id| {
                    let root = &root;
                    scope.spawn(move || self.run_worker(root, worker_id, budget))
                })
                .collect();
            let mut result = Ok(());
            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        if result.is_ok() {
                            result = Err(e);
                        }
                    }
                    Err(_) => {
                        if result.is_ok() {
                            result = Err(SearchError::WorkerPanicked);
                        }
                    }
                }
            }
            result
        })?;

        let report = self.choose_best_move(&root)?;
        debug!(
            simulations = report.simulations,
            value = report.value,
            outcome = ?report.outcome,
            "search finished"
        );
        Ok(report)
    }

    fn run_worker(
        &self,
        root: &Arc<Node<S>>,
        worker_id: usize,
        budget: u32,
    ) -> Result<(), SearchError> {
        let mut simulations = 0;
        for _ in 0..budget {
            if root.is_resolved() {
                break;
            }
            self.evaluate(root)?;
            simulations += 1;
        }
        trace!(worker_id, simulations, "search worker finished");
        Ok(())
    }

    /// One simulation: recursive best-first descent with backup on unwind.
    fn evaluate(&self, node: &Arc<Node<S>>) -> Result<(), SearchError> {
        debug_assert!(node.value().abs() <= 1.0);
        let mut guard = node.lock();
        guard.bump_visits();

        if node.position.is_draw() {
            guard.set_value(0.0);
            guard.resolve(Outcome::Draw);
            return Ok(());
        }
        if node.position.is_lose() {
            guard.resolve(Outcome::Lose);
            return Ok(());
        }
        if node.is_resolved() {
            return Ok(());
        }

        if node.children().is_none() {
            guard.expand();
            score_children(&mut guard, node, self.evaluator.as_ref(), self.config.device_id)?;
            drop(guard);
        } else {
            // Release this node before touching the child; re-acquired below
            // for backup.
            let next = next_child(node, None);
            drop(guard);
            if let Some(child) = next {
                self.evaluate(&child)?;
            }
        }

        let mut guard = node.lock();
        update_node(node, &mut guard);
        Ok(())
    }

    /// Pick the final move from root statistics, after all workers joined.
    ///
    /// A proven loss for the opponent decides the move outright; proven draws
    /// rank by visits; everything else by visits with the value as tiebreak.
    fn choose_best_move(&self, root: &Arc<Node<S>>) -> Result<SearchReport<S::Move>, SearchError> {
        let children = root.children().ok_or(SearchError::NoLegalMoves)?;
        let mut scores = vec![0f64; children.len()];
        for (i, child) in children.iter().enumerate() {
            match child.outcome() {
                Outcome::Lose => {
                    scores.iter_mut().for_each(|s| *s = 0.0);
                    scores[i] = 1.0;
                    break;
                }
                Outcome::Draw => scores[i] = child.visits() as f64 + 1.0,
                Outcome::Win => scores[i] = 0.0,
                Outcome::Unknown => {
                    scores[i] = child.visits() as f64 + 1.0 - child.value() as f64
                }
            }
        }
        if children.is_empty() {
            return Err(SearchError::NoLegalMoves);
        }
        // First maximum wins ties, matching the stable legal-move order.
        let mut index = 0;
        for (i, &score) in scores.iter().enumerate().skip(1) {
            if score > scores[index] {
                index = i;
            }
        }
        let chosen = &children[index];
        let best_move = chosen
            .parent_move
            .expect("non-root node carries its generating move");
        root.lock().set_best_move(Some(best_move));
        Ok(SearchReport {
            best_move,
            value: root.value(),
            outcome: root.outcome(),
            simulations: root.visits(),
        })
    }
}

/// Batch-evaluate a freshly expanded node's children and write their initial
/// scores: the clamped evaluator score, overridden by the exact score where a
/// terminal outcome is directly detectable.
///
/// Runs under the parent's lock; the children are not yet reachable by other
/// workers.
pub(crate) fn score_children<S: GameState>(
    guard: &mut NodeGuard<'_, S>,
    node: &Node<S>,
    evaluator: &dyn Evaluator<S>,
    device_id: usize,
) -> Result<(), SearchError> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    let positions: Vec<S> = children.iter().map(|c| c.position.clone()).collect();
    let raw = evaluator.predict(device_id, &positions)?;
    if raw.len() != children.len() {
        return Err(EvaluatorError::BatchMismatch {
            expected: children.len(),
            actual: raw.len(),
        }
        .into());
    }
    for (child, &score) in children.iter().zip(raw.iter()) {
        let (w, outcome) = match terminal_score(&child.position, child.ply) {
            Some(exact) => exact,
            None => (clamp_score(score), Outcome::Unknown),
        };
        guard.init_child(child, w, outcome);
        if outcome.is_resolved() {
            trace!(ply = child.ply, ?outcome, "leaf resolved at expansion");
        }
    }
    Ok(())
}

/// Select the next child to descend into: the unresolved child maximizing the
/// negated child value, preferring the less-visited child on ties. The
/// descent variant perturbs each candidate's score with Gaussian noise.
///
/// Returns `None` when every child is resolved; the caller then skips the
/// recursion and goes straight to backup.
pub(crate) fn next_child<S: GameState>(
    node: &Node<S>,
    mut noise: Option<(&mut ChaCha20Rng, &Normal<f32>)>,
) -> Option<Arc<Node<S>>> {
    let children = node.children()?;
    let mut best: Option<&Arc<Node<S>>> = None;
    let mut best_score = f32::NEG_INFINITY;
    let mut best_visits = u32::MAX;
    for child in children {
        if child.is_resolved() {
            continue;
        }
        let mut score = -child.value();
        if let Some((rng, normal)) = noise.as_mut() {
            score += normal.sample(&mut **rng);
        }
        let visits = child.visits();
        if score > best_score || (score == best_score && visits < best_visits) {
            best = Some(child);
            best_score = score;
            best_visits = visits;
        }
    }
    best.cloned()
}

/// Negamax backup: recompute a node's value, best move, and resolution state
/// from its children. Runs under the node's lock.
pub(crate) fn update_node<S: GameState>(node: &Node<S>, guard: &mut NodeGuard<'_, S>) {
    let Some(children) = node.children() else {
        return;
    };
    let mut best: Option<&Arc<Node<S>>> = None;
    let mut best_score = f32::NEG_INFINITY;
    let mut best_visits = 0u32;
    let mut opponent_wins = 0usize;
    let mut draws = 0usize;

    for child in children {
        match child.outcome() {
            // One proven-losing reply for the opponent proves a win here.
            Outcome::Lose => {
                guard.set_value(-child.value());
                guard.set_best_move(child.parent_move);
                guard.resolve(Outcome::Win);
                return;
            }
            Outcome::Win => opponent_wins += 1,
            Outcome::Draw => draws += 1,
            Outcome::Unknown => {}
        }
        let score = -child.value();
        let visits = child.visits();
        if score > best_score || (score == best_score && visits > best_visits) {
            best = Some(child);
            best_score = score;
            best_visits = visits;
        }
    }
    let Some(best) = best else {
        return;
    };

    if draws == children.len() {
        guard.set_value(0.0);
        guard.resolve(Outcome::Draw);
        return;
    }
    if opponent_wins == children.len() {
        // Every reply hands the opponent a proven win; prefer the deepest
        // resistance, which maximizes the negated child score.
        guard.set_value(best_score);
        guard.set_best_move(best.parent_move);
        guard.resolve(Outcome::Lose);
        return;
    }
    if draws + opponent_wins == children.len() {
        guard.set_value(0.0);
        guard.resolve(Outcome::Draw);
        return;
    }

    guard.set_value(best_score);
    guard.set_best_move(best.parent_move);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::UniformEvaluator;
    use games_tictactoe::{Move, Position};

    fn play(moves: &[u8]) -> Position {
        moves
            .iter()
            .fold(Position::new(), |pos, &sq| pos.apply(Move(sq)))
    }

    fn searcher(config: SearchConfig) -> UbfmSearcher<Position> {
        UbfmSearcher::new(Arc::new(UniformEvaluator::new()), config)
    }

    #[test]
    fn test_rejects_finished_position() {
        let s = searcher(SearchConfig::for_testing());
        let lost = play(&[0, 3, 1, 4, 2]);
        assert!(matches!(
            s.think(lost),
            Err(SearchError::TerminalPosition)
        ));
    }

    #[test]
    fn test_resolves_immediate_win_within_small_budget() {
        // o o - / x x - / - - -: completing the top row wins on the spot.
        let s = searcher(SearchConfig::for_testing().with_simulations(20));
        let report = s.think(play(&[0, 3, 1, 4])).unwrap();
        assert_eq!(report.outcome, Outcome::Win);
        assert_eq!(report.best_move, Move(2));
        assert!(report.simulations <= 20);
        assert!(report.value > 0.9);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let s = searcher(SearchConfig::for_testing());
        let root = Arc::new(Node::new(play(&[0, 3, 1, 4]), 4, None));
        s.evaluate(&root).unwrap();
        assert_eq!(root.outcome(), Outcome::Win);
        let value = root.value();
        let visits = root.visits();

        // Further simulations must leave a resolved node's state and value
        // untouched.
        for _ in 0..10 {
            s.evaluate(&root).unwrap();
        }
        assert_eq!(root.outcome(), Outcome::Win);
        assert_eq!(root.value(), value);
        assert_eq!(root.visits(), visits + 10);
    }

    #[test]
    fn test_visit_invariant_after_search() {
        let s = searcher(SearchConfig::for_testing().with_simulations(300));
        let root = Arc::new(Node::new(Position::new(), 0, None));
        for _ in 0..300 {
            if root.is_resolved() {
                break;
            }
            s.evaluate(&root).unwrap();
        }

        // n == 1 + sum(child.n) for every expanded node.
        fn check(node: &Node<Position>) {
            if let Some(children) = node.children() {
                let child_sum: u32 = children.iter().map(|c| c.visits()).sum();
                assert_eq!(node.visits(), child_sum + 1);
                for child in children {
                    check(child);
                }
            }
        }
        check(&root);
    }

    #[test]
    fn test_full_resolution_from_empty_board_is_draw() {
        // With exact terminal detection the whole game proves out as a draw.
        let s = searcher(SearchConfig::default().with_simulations(2_000_000));
        let report = s.think(Position::new()).unwrap();
        assert_eq!(report.outcome, Outcome::Draw);
        assert_eq!(report.value, 0.0);
        assert!(report.simulations < 2_000_000);
    }

    #[test]
    fn test_avoids_losing_move() {
        // x has two in a row; o must block at square 5.
        // o - - / - o x? Build: o:0, x:3, o:8, x:4 -> x threatens 3-4-5.
        let s = searcher(SearchConfig::default().with_simulations(5_000));
        let report = s.think(play(&[0, 3, 8, 4])).unwrap();
        assert_eq!(report.best_move, Move(5));
    }

    #[test]
    fn test_multithreaded_search_smoke() {
        let s = searcher(
            SearchConfig::default()
                .with_simulations(4_000)
                .with_threads(4),
        );
        let report = s.think(Position::new()).unwrap();
        // A legal move comes back and the root accumulated visits from every
        // worker.
        assert!(report.best_move.0 < 9);
        assert!(report.simulations >= 4);
    }

    #[test]
    fn test_best_effort_move_on_exhausted_budget() {
        // Far too small a budget to resolve anything: the report is still a
        // legal move with Unknown outcome.
        let s = searcher(SearchConfig::for_testing().with_simulations(3));
        let report = s.think(Position::new()).unwrap();
        assert!(report.best_move.0 < 9);
        assert_eq!(report.outcome, Outcome::Unknown);
    }

    #[test]
    fn test_next_child_skips_resolved() {
        let root = Arc::new(Node::new(play(&[0, 3, 1, 4]), 4, None));
        let s = searcher(SearchConfig::for_testing());
        s.evaluate(&root).unwrap();
        // The winning reply is resolved (a loss for the opponent), so
        // selection must never return it.
        if let Some(child) = next_child(&root, None) {
            assert!(!child.is_resolved());
        }
    }
}
