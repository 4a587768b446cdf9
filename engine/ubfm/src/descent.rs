//! Descent search: the stochastic self-play variant of the best-first search.
//!
//! One worker, one tree per move. Selection perturbs child scores with
//! Gaussian noise so successive episodes visit different lines, early-stop
//! heuristics cut the budget short once the root is practically decided, and
//! the final move is chosen with a novelty bonus that favors positions seen
//! less often in prior self-play.

use std::sync::Arc;

use engine_core::GameState;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::Normal;
use tracing::{debug, trace};

use crate::config::DescentConfig;
use crate::evaluator::Evaluator;
use crate::node::{score_lose, Node, Outcome};
use crate::search::{next_child, score_children, update_node, SearchError};

/// Read access to the persistent per-position visit counter maintained by the
/// self-play driver. Only the count is needed during move selection;
/// incrementing is the driver's business.
pub trait VisitCounter {
    /// Times the position has been played through during prior self-play.
    /// 0 for never-seen positions.
    fn count(&self, key: u64) -> u64;
}

/// An always-empty counter; move choice falls back to pure value order with
/// a constant bonus that cancels out.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoveltyOff;

impl VisitCounter for NoveltyOff {
    fn count(&self, _key: u64) -> u64 {
        0
    }
}

/// Result of one descent search.
#[derive(Debug, Clone)]
pub struct DescentReport<M> {
    /// Move chosen by the novelty-weighted policy.
    pub best_move: M,

    /// Root value after the choice (negation of the chosen child's value);
    /// this is the training sample recorded for the position.
    pub value: f32,

    /// Exact root outcome, `Unknown` unless the search proved it.
    pub outcome: Outcome,

    /// Simulations run for this move.
    pub simulations: u32,
}

/// Self-play searcher. Owns its RNG; one instance per self-play worker.
pub struct DescentSearcher<S: GameState> {
    config: DescentConfig,
    evaluator: Arc<dyn Evaluator<S>>,
    rng: ChaCha20Rng,
    noise: Normal<f32>,
}

impl<S: GameState> DescentSearcher<S> {
    pub fn new(
        evaluator: Arc<dyn Evaluator<S>>,
        config: DescentConfig,
    ) -> Result<Self, SearchError> {
        let noise = Normal::new(0.0, config.noise_std)
            .map_err(|e| SearchError::InvalidConfig(format!("noise_std: {e}")))?;
        let rng = match config.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        Ok(Self {
            config,
            evaluator,
            rng,
            noise,
        })
    }

    /// Search `position` for one self-play move.
    ///
    /// The tree is rebuilt from scratch; `novelty` supplies the prior visit
    /// counts for the final move choice.
    pub fn think(
        &mut self,
        position: S,
        novelty: &dyn VisitCounter,
    ) -> Result<DescentReport<S::Move>, SearchError> {
        if position.is_done() {
            return Err(SearchError::TerminalPosition);
        }
        let root_ply = position.move_count();
        let root = Arc::new(Node::new(position, root_ply, None));

        let mut simulations = 0u32;
        while !self.should_stop(&root, simulations) {
            self.evaluate(&root)?;
            simulations += 1;
        }
        trace!(simulations, "descent search stopped");
        self.choose_move(&root, novelty)
    }

    /// One noisy simulation. Like the plain evaluate, but an immediate loss
    /// takes the exact ply-discounted score and selection is perturbed.
    fn evaluate(&mut self, node: &Arc<Node<S>>) -> Result<(), SearchError> {
        debug_assert!(node.value().abs() <= 1.0);
        let mut guard = node.lock();
        guard.bump_visits();

        if node.position.is_draw() {
            guard.set_value(0.0);
            guard.resolve(Outcome::Draw);
            return Ok(());
        }
        if node.position.is_lose() {
            guard.set_value(score_lose(node.ply));
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
            let next = next_child(node, Some((&mut self.rng, &self.noise)));
            drop(guard);
            if let Some(child) = next {
                self.evaluate(&child)?;
            }
        }

        let mut guard = node.lock();
        update_node(node, &mut guard);
        Ok(())
    }

    /// Early-stop policy for one self-play move.
    ///
    /// Stops when the root is resolved; when a near-certain winning reply
    /// exists (not gated); or, once at least `2 * child_len` simulations have
    /// run, when every reply (or all but one) looks lost. When the budget is
    /// exhausted the search extends until the best-scoring and most-visited
    /// children agree, so an under-sampled line is not picked.
    fn should_stop(&self, root: &Node<S>, current: u32) -> bool {
        if root.is_resolved() {
            return true;
        }
        let Some(children) = root.children() else {
            // Not expanded yet; always run the first simulation.
            return false;
        };

        let threshold = self.config.decided_threshold;
        let mut lost_replies = 0usize;
        let mut winning_replies = 0usize;
        for child in children {
            let score = -child.value();
            if score <= -threshold {
                lost_replies += 1;
            }
            if score >= threshold {
                winning_replies += 1;
            }
        }

        if winning_replies > 0 {
            return true;
        }

        let can_stop = current > 2 * children.len() as u32;
        if can_stop && lost_replies == children.len() {
            // Lost regardless of the reply.
            return true;
        }
        if can_stop && lost_replies + 1 == children.len() {
            return true;
        }

        if current >= self.config.num_simulations {
            let mut best_score = f32::NEG_INFINITY;
            let mut best_score_index = 0usize;
            let mut max_visits: i64 = -1;
            let mut max_visits_index = 0usize;
            for (i, child) in children.iter().enumerate() {
                let score = -child.value();
                if score > best_score {
                    best_score = score;
                    best_score_index = i;
                }
                if child.visits() as i64 > max_visits {
                    max_visits = child.visits() as i64;
                    max_visits_index = i;
                }
            }
            return best_score_index == max_visits_index;
        }
        false
    }

    /// Novelty-weighted final move choice.
    ///
    /// Unresolved children score `-w + weight / sqrt(1 + prior_visits)`.
    /// Resolved children override the score: a proven loss for the opponent
    /// forces the move, a proven draw scores 0, a proven win for the opponent
    /// scores the minimum.
    fn choose_move(
        &self,
        root: &Arc<Node<S>>,
        novelty: &dyn VisitCounter,
    ) -> Result<DescentReport<S::Move>, SearchError> {
        let children = root.children().ok_or(SearchError::NoLegalMoves)?;
        let mut scores = vec![0f32; children.len()];
        for (i, child) in children.iter().enumerate() {
            match child.outcome() {
                Outcome::Lose => {
                    scores.iter_mut().for_each(|s| *s = f32::NEG_INFINITY);
                    scores[i] = f32::INFINITY;
                    break;
                }
                Outcome::Draw => scores[i] = 0.0,
                Outcome::Win => scores[i] = -1.0,
                Outcome::Unknown => {
                    let seen = novelty.count(child.position.canonical_key());
                    let bonus = self.config.novelty_weight / (1.0 + seen as f32).sqrt();
                    scores[i] = -child.value() + bonus;
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
        let value = -chosen.value();
        {
            let mut guard = root.lock();
            guard.set_value(value);
            guard.set_best_move(Some(best_move));
        }
        debug!(value, simulations = root.visits(), "descent move chosen");
        Ok(DescentReport {
            best_move,
            value,
            outcome: root.outcome(),
            simulations: root.visits(),
        })
    }
}
