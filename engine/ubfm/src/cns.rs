//! Windowed conspiracy-number search (CNS).
//!
//! The proof-number sibling of the best-first search, sharing the same tree
//! plumbing. Instead of an exact win/lose/draw state, each node carries a
//! proof number `pn` and disproof number `dn`: lower bounds on how many leaf
//! values would have to change to push the root value above (`pn`) or below
//! (`dn`) an aspiration window. The window is recentered at the root's
//! current value before every descent, so it acts as a one-shot aspiration
//! window rather than a fixed bound.
//!
//! Unlike the recursive best-first backup, each iteration records the full
//! descended path and backs up every node on it in reverse after the frontier
//! expansion. Node values here are from the **root's** perspective: Max nodes
//! (even ply parity relative to the root) take the maximum child value, Min
//! nodes the minimum.

use std::sync::Arc;
use std::thread;

use engine_core::GameState;
use tracing::{debug, trace};

use crate::config::SearchConfig;
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::node::{clamp_score, terminal_score, Node, Outcome};
use crate::search::SearchError;

/// Saturation bound for proof and disproof numbers. A node is resolved once
/// either number reaches it.
pub const CONSPIRACY_MAX: u32 = 3000;

/// Half-width of the aspiration window around the root value.
const WINDOW_MARGIN: f32 = 0.1;

#[derive(Debug, Clone, Copy)]
struct Window {
    lower: f32,
    upper: f32,
}

impl Window {
    fn around(value: f32) -> Self {
        Self {
            lower: value - WINDOW_MARGIN,
            upper: value + WINDOW_MARGIN,
        }
    }
}

/// Proof number of a leaf against the window's upper bound: already proven
/// above it, still changeable, or hopeless because the leaf is exact.
fn leaf_pn(score: f32, upper: f32, terminal: bool) -> u32 {
    if score >= upper {
        0
    } else if terminal {
        CONSPIRACY_MAX
    } else {
        1
    }
}

fn leaf_dn(score: f32, lower: f32, terminal: bool) -> u32 {
    if score <= lower {
        0
    } else if terminal {
        CONSPIRACY_MAX
    } else {
        1
    }
}

fn proof_resolved<S: GameState>(node: &Node<S>) -> bool {
    node.proof_number() >= CONSPIRACY_MAX || node.disproof_number() >= CONSPIRACY_MAX
}

/// Result of one conspiracy-number search.
#[derive(Debug, Clone)]
pub struct CnsReport<M> {
    /// Child with the best root-perspective value.
    pub best_move: M,

    /// Root value, from the root mover's perspective.
    pub value: f32,

    /// Root proof number; 0 means the value is proven at or above the last
    /// window's upper bound.
    pub proof_number: u32,

    /// Root disproof number.
    pub disproof_number: u32,

    /// Iterations performed (root visit count).
    pub simulations: u32,
}

/// Conspiracy-number searcher sharing the node plumbing and worker-pool model
/// of the best-first search.
pub struct CnsSearcher<S: GameState> {
    config: SearchConfig,
    evaluator: Arc<dyn Evaluator<S>>,
}

impl<S: GameState> CnsSearcher<S> {
    pub fn new(evaluator: Arc<dyn Evaluator<S>>, config: SearchConfig) -> Self {
        Self { config, evaluator }
    }

    /// Search `position` until the root's proof or disproof number saturates
    /// or the budget runs out.
    pub fn think(&self, position: S) -> Result<CnsReport<S::Move>, SearchError> {
        if position.is_done() {
            return Err(SearchError::TerminalPosition);
        }
        let root_ply = position.move_count();
        let root = Arc::new(Node::new(position, root_ply, None));
        self.score_root(&root)?;

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
            pn = report.proof_number,
            dn = report.disproof_number,
            value = report.value,
            simulations = report.simulations,
            "conspiracy search finished"
        );
        Ok(report)
    }

    /// Score the root directly and derive its initial proof numbers from a
    /// window centered on its own value.
    ///
    /// The root is always scored as a heuristic leaf, even when an immediate
    /// win is detectable: marking it terminal would saturate both numbers
    /// before a single descent and end the search without a move. The win is
    /// proven through the children on the first iteration instead.
    fn score_root(&self, root: &Arc<Node<S>>) -> Result<(), SearchError> {
        let raw = self
            .evaluator
            .predict(self.config.device_id, std::slice::from_ref(&root.position))?;
        let raw = raw.first().copied().ok_or(EvaluatorError::BatchMismatch {
            expected: 1,
            actual: 0,
        })?;
        let score = clamp_score(raw);
        let window = Window::around(score);
        let mut guard = root.lock();
        guard.set_value(score);
        guard.set_proof_numbers(
            leaf_pn(score, window.upper, false),
            leaf_dn(score, window.lower, false),
        );
        Ok(())
    }

    fn run_worker(
        &self,
        root: &Arc<Node<S>>,
        worker_id: usize,
        budget: u32,
    ) -> Result<(), SearchError> {
        let mut path = Vec::new();
        let mut iterations = 0;
        for _ in 0..budget {
            if proof_resolved(root) {
                break;
            }
            // One-shot aspiration window, recentered at the current root
            // value before each descent.
            let window = Window::around(root.value());
            path.clear();
            self.descend(root, &mut path);
            if let Some(frontier) = path.last() {
                self.expand_frontier(frontier, window, root.ply)?;
            }
            backup(&path, root.ply);
            iterations += 1;
        }
        trace!(worker_id, iterations, "conspiracy worker finished");
        Ok(())
    }

    /// Descend by most-promising proof number, recording every node on the
    /// path: smallest `pn` at Max nodes (value tiebreak high), smallest `dn`
    /// at Min nodes (value tiebreak low).
    fn descend(&self, root: &Arc<Node<S>>, path: &mut Vec<Arc<Node<S>>>) {
        let mut current = Arc::clone(root);
        loop {
            current.lock().bump_visits();
            path.push(Arc::clone(&current));
            let Some(children) = current.children() else {
                break;
            };
            let is_max = (current.ply - root.ply) % 2 == 0;
            match select_child(children, is_max) {
                Some(next) => current = next,
                None => break,
            }
        }
    }

    /// Expand the frontier node and score its children against the current
    /// window, flipping odd-parity scores to the root's perspective. A
    /// terminal frontier only re-derives its proof numbers.
    fn expand_frontier(
        &self,
        leaf: &Arc<Node<S>>,
        window: Window,
        root_ply: u32,
    ) -> Result<(), SearchError> {
        let mut guard = leaf.lock();
        if leaf.position.is_done() {
            let score = leaf.value();
            guard.set_proof_numbers(
                leaf_pn(score, window.upper, true),
                leaf_dn(score, window.lower, true),
            );
            return Ok(());
        }
        if leaf.children().is_some() {
            // Another worker got here first.
            return Ok(());
        }
        guard.expand();
        let Some(children) = leaf.children() else {
            return Ok(());
        };

        let positions: Vec<S> = children.iter().map(|c| c.position.clone()).collect();
        let raw = self.evaluator.predict(self.config.device_id, &positions)?;
        if raw.len() != children.len() {
            return Err(EvaluatorError::BatchMismatch {
                expected: children.len(),
                actual: raw.len(),
            }
            .into());
        }
        for (child, &raw_score) in children.iter().zip(raw.iter()) {
            let (mut score, terminal) = match terminal_score(&child.position, child.ply) {
                Some((w, _)) => (w, true),
                None => (clamp_score(raw_score), false),
            };
            if (child.ply - root_ply) % 2 == 1 {
                score = -score;
            }
            guard.init_child(child, score, Outcome::Unknown);
            guard.init_child_proof(
                child,
                leaf_pn(score, window.upper, terminal),
                leaf_dn(score, window.lower, terminal),
            );
        }
        Ok(())
    }

    /// Final move: the child with the best root-perspective value.
    fn choose_best_move(&self, root: &Arc<Node<S>>) -> Result<CnsReport<S::Move>, SearchError> {
        let children = root.children().ok_or(SearchError::NoLegalMoves)?;
        if children.is_empty() {
            return Err(SearchError::NoLegalMoves);
        }
        let mut index = 0;
        for (i, child) in children.iter().enumerate().skip(1) {
            if child.value() > children[index].value() {
                index = i;
            }
        }
        let best_move = children[index]
            .parent_move
            .expect("non-root node carries its generating move");
        root.lock().set_best_move(Some(best_move));
        Ok(CnsReport {
            best_move,
            value: root.value(),
            proof_number: root.proof_number(),
            disproof_number: root.disproof_number(),
            simulations: root.visits(),
        })
    }
}

/// Pick the child to descend into. Children whose number already saturated
/// are still comparable through the value tiebreak, mirroring the backup
/// rule's min/sum arithmetic.
fn select_child<S: GameState>(children: &[Arc<Node<S>>], is_max: bool) -> Option<Arc<Node<S>>> {
    let mut best: Option<&Arc<Node<S>>> = None;
    let mut best_number = CONSPIRACY_MAX;
    if is_max {
        let mut best_score = f32::NEG_INFINITY;
        for child in children {
            let pn = child.proof_number();
            if pn < best_number {
                best = Some(child);
                best_number = pn;
                best_score = child.value();
            } else if pn == best_number && child.value() > best_score {
                best = Some(child);
                best_score = child.value();
            }
        }
    } else {
        let mut best_score = f32::INFINITY;
        for child in children {
            let dn = child.disproof_number();
            if dn < best_number {
                best = Some(child);
                best_number = dn;
                best_score = child.value();
            } else if dn == best_number && child.value() < best_score {
                best = Some(child);
                best_score = child.value();
            }
        }
    }
    best.cloned()
}

/// Back up every node on the descended path, in reverse. Max nodes take
/// `pn = min(children)`, `dn = min(sum(children), MAX)` and the maximum
/// child value; Min nodes mirror the roles.
fn backup<S: GameState>(path: &[Arc<Node<S>>], root_ply: u32) {
    for node in path.iter().rev() {
        let mut guard = node.lock();
        let Some(children) = node.children() else {
            continue;
        };
        let is_max = (node.ply - root_ply) % 2 == 0;
        if is_max {
            let mut min_pn = CONSPIRACY_MAX;
            let mut sum_dn: u64 = 0;
            let mut max_score = f32::NEG_INFINITY;
            for child in children {
                min_pn = min_pn.min(child.proof_number());
                sum_dn += child.disproof_number() as u64;
                max_score = max_score.max(child.value());
            }
            guard.set_proof_numbers(min_pn, sum_dn.min(CONSPIRACY_MAX as u64) as u32);
            guard.set_value(max_score);
        } else {
            let mut min_dn = CONSPIRACY_MAX;
            let mut sum_pn: u64 = 0;
            let mut min_score = f32::INFINITY;
            for child in children {
                min_dn = min_dn.min(child.disproof_number());
                sum_pn += child.proof_number() as u64;
                min_score = min_score.min(child.value());
            }
            guard.set_proof_numbers(sum_pn.min(CONSPIRACY_MAX as u64) as u32, min_dn);
            guard.set_value(min_score);
        }
    }
}
