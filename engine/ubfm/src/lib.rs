//! Best-first game-tree search for the Descent engine.
//!
//! This crate implements two cooperating search algorithms over one shared
//! tree representation:
//!
//! 1. **UBFM** (unbounded best-first minimax, [`search`]): worker threads
//!    repeatedly descend the tree along the best negamax line, expand and
//!    batch-evaluate a frontier node, and back values and exact
//!    win/lose/draw resolutions up the visited path.
//! 2. **CNS** ([`cns`]): a windowed conspiracy-number sibling that maintains
//!    proof and disproof numbers against an aspiration window recentered at
//!    the root value each iteration.
//!
//! On top of the UBFM plumbing, [`descent`] adds the stochastic self-play
//! policy: Gaussian selection noise, early-stopping heuristics, and
//! novelty-weighted final move choice used to generate diverse training
//! episodes.
//!
//! # Concurrency model
//!
//! One tree, many workers. Each node guards its own mutation with an
//! embedded lock, and a worker holds at most one node's lock at a time: the
//! parent is released before recursing into a child and re-acquired only for
//! backup. Sibling statistics are published through atomics so selection can
//! read them without touching the child locks. The algorithm converges under
//! arbitrary interleaving of evaluate/backup calls; no visit ordering is
//! guaranteed between threads.

pub mod cns;
pub mod config;
pub mod descent;
pub mod evaluator;
pub mod node;
pub mod search;

#[cfg(feature = "onnx")]
pub mod onnx;

// Re-export main types
pub use cns::{CnsReport, CnsSearcher, CONSPIRACY_MAX};
pub use config::{DescentConfig, SearchConfig};
pub use descent::{DescentReport, DescentSearcher, NoveltyOff, VisitCounter};
pub use evaluator::{ConstEvaluator, Evaluator, EvaluatorError, UniformEvaluator};
pub use node::{score_lose, score_win, Node, Outcome};
pub use search::{SearchError, SearchReport, UbfmSearcher};

#[cfg(feature = "onnx")]
pub use onnx::OnnxEvaluator;
