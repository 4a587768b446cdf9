//! Evaluator trait for position scoring.
//!
//! The evaluator returns one scalar in `(-1, 1)` per position, from the
//! perspective of the player to move. In production this is a neural network
//! (see the `onnx` module behind the feature of the same name); for tests the
//! uniform and constant evaluators below avoid any model dependency.

use engine_core::GameState;
use thiserror::Error;

/// Errors that can occur during evaluation.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("model error: {0}")]
    ModelError(String),

    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("evaluator returned {actual} scores for a batch of {expected}")]
    BatchMismatch { expected: usize, actual: usize },
}

/// A batched position evaluator.
///
/// `predict` may be called concurrently from multiple search threads;
/// implementations backed by a single inference resource serialize calls
/// internally, making each batch call a de facto global critical section.
pub trait Evaluator<S: GameState>: Send + Sync {
    /// One score per position in `batch`, each in `(-1, 1)` from the
    /// respective mover's perspective.
    fn predict(&self, device_id: usize, batch: &[S]) -> Result<Vec<f32>, EvaluatorError>;
}

/// Scores every position as neutral. Useful for exercising the search
/// without a model: resolution then rests entirely on exact terminal
/// detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformEvaluator;

impl UniformEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl<S: GameState> Evaluator<S> for UniformEvaluator {
    fn predict(&self, _device_id: usize, batch: &[S]) -> Result<Vec<f32>, EvaluatorError> {
        Ok(vec![0.0; batch.len()])
    }
}

/// Scores every position with the same fixed value. Used by tests that need
/// leaf values on a known side of a search window.
#[derive(Debug, Clone, Copy)]
pub struct ConstEvaluator(pub f32);

impl<S: GameState> Evaluator<S> for ConstEvaluator {
    fn predict(&self, _device_id: usize, batch: &[S]) -> Result<Vec<f32>, EvaluatorError> {
        Ok(vec![self.0; batch.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_tictactoe::Position;

    #[test]
    fn test_uniform_evaluator() {
        let eval = UniformEvaluator::new();
        let batch = vec![Position::new(); 3];
        let scores = eval.predict(0, &batch).unwrap();
        assert_eq!(scores, vec![0.0; 3]);
    }

    #[test]
    fn test_const_evaluator() {
        let eval = ConstEvaluator(0.5);
        let batch = vec![Position::new(); 2];
        let scores = eval.predict(0, &batch).unwrap();
        assert_eq!(scores, vec![0.5, 0.5]);
    }

    #[test]
    fn test_empty_batch() {
        let eval = UniformEvaluator::new();
        let scores = Evaluator::<Position>::predict(&eval, 0, &[]).unwrap();
        assert!(scores.is_empty());
    }
}
