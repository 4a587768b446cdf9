//! ONNX Runtime evaluator for neural network inference.
//!
//! Expects a value-only model:
//! - Input: "observation" - shape (batch_size, feature_len) float32
//! - Output: "value" - shape (batch_size, 1) float32, in (-1, 1) from the
//!   mover's perspective
//!
//! The session is guarded by a mutex because `Session::run` needs `&mut`
//! while `Evaluator::predict` takes `&self`; every batch call from any
//! search thread therefore serializes on the model.

use std::path::Path;
use std::sync::Mutex;

use ort::{session::Session, value::Value};

use engine_core::GameState;

use crate::evaluator::{Evaluator, EvaluatorError};

pub struct OnnxEvaluator {
    session: Mutex<Session>,
}

impl std::fmt::Debug for OnnxEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEvaluator").finish_non_exhaustive()
    }
}

impl OnnxEvaluator {
    /// Load an ONNX model from the given path.
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, EvaluatorError> {
        let session = Session::builder()
            .map_err(|e| {
                EvaluatorError::ModelError(format!("failed to create session builder: {e}"))
            })?
            .with_intra_threads(4)
            .map_err(|e| EvaluatorError::ModelError(format!("failed to set intra threads: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| EvaluatorError::ModelError(format!("failed to load model: {e}")))?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl<S: GameState> Evaluator<S> for OnnxEvaluator {
    fn predict(&self, _device_id: usize, batch: &[S]) -> Result<Vec<f32>, EvaluatorError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut flat = Vec::with_capacity(batch.len() * S::FEATURE_LEN);
        for position in batch {
            position.encode_features(&mut flat);
        }
        let input_array = ndarray::Array2::from_shape_vec((batch.len(), S::FEATURE_LEN), flat)
            .map_err(|e| {
                EvaluatorError::EvaluationFailed(format!("failed to create input array: {e}"))
            })?;
        let input_value = Value::from_array(input_array).map_err(|e| {
            EvaluatorError::ModelError(format!("failed to create input tensor: {e}"))
        })?;

        let values = {
            let mut session = self.session.lock().map_err(|e| {
                EvaluatorError::EvaluationFailed(format!("failed to acquire session lock: {e}"))
            })?;
            let outputs = session
                .run(ort::inputs!["observation" => input_value])
                .map_err(|e| EvaluatorError::EvaluationFailed(format!("inference failed: {e}")))?;

            let value_output = outputs
                .get("value")
                .ok_or_else(|| EvaluatorError::ModelError("missing value output".to_string()))?;
            let (_shape, value_data) = value_output.try_extract_tensor::<f32>().map_err(|e| {
                EvaluatorError::ModelError(format!("failed to extract value tensor: {e}"))
            })?;
            value_data.to_vec()
        };

        if values.len() != batch.len() {
            return Err(EvaluatorError::BatchMismatch {
                expected: batch.len(),
                actual: values.len(),
            });
        }
        Ok(values)
    }
}
