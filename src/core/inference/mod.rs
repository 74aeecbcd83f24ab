//! ONNX Runtime inference engine for the defect classifier.
//!
//! [`OrtInfer`] owns a small pool of sessions so that concurrent requests do not
//! serialize on a single `Session::run`. The pool is the only synchronization the
//! classifier needs; callers share the engine behind an `Arc`.

mod ort_infer_config;

use crate::core::Tensor4D;
use crate::core::config::ClassifierConfig;
use crate::core::errors::{DefectError, DefectResult, SimpleError};
use ort::session::Session;
use ort::value::TensorRef;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Input names tried, in order, when the configuration does not name one.
const COMMON_INPUT_NAMES: [&str; 5] = ["x", "input", "images", "data", "image"];

/// Anything that can turn a preprocessed batch into one probability vector.
///
/// The production implementation is [`OrtInfer`]; tests substitute a fixed
/// distribution.
pub trait ClassifierBackend: Send + Sync + std::fmt::Debug {
    /// Runs a forward pass over a batch of exactly one image and returns the
    /// class probabilities in label order.
    fn forward(&self, input: &Tensor4D) -> DefectResult<Vec<f32>>;

    /// Name used in logs and error messages.
    fn name(&self) -> &str;
}

/// ONNX Runtime session pool.
#[derive(Debug)]
pub struct OrtInfer {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_name: String,
    model_name: String,
}

impl OrtInfer {
    /// Loads the model described by `config`, building `session_pool_size`
    /// sessions with the configured ORT options.
    ///
    /// When `optimized_model_path` is set the first session writes its optimized
    /// graph there, and later processes that point `model_path` at that file skip
    /// the optimization step.
    pub fn from_config(config: &ClassifierConfig) -> DefectResult<Self> {
        let path = config.model_path.as_path();
        let pool_size = config.session_pool_size.max(1);
        let mut sessions = Vec::with_capacity(pool_size);

        let first_session = Self::build_session(config, path, true)?;

        let available_inputs: Vec<String> = first_session
            .inputs
            .iter()
            .map(|input| input.name.clone())
            .collect();
        let input_name = match &config.input_name {
            Some(name) => {
                if !available_inputs.iter().any(|input| input == name) {
                    return Err(DefectError::model_load_error(
                        path,
                        format!("model has no input named '{name}'"),
                        Some(&format!("available inputs: {available_inputs:?}")),
                        None::<SimpleError>,
                    ));
                }
                name.clone()
            }
            None => COMMON_INPUT_NAMES
                .iter()
                .find(|&name| available_inputs.iter().any(|input| input == *name))
                .map(|name| name.to_string())
                .or_else(|| available_inputs.first().cloned())
                .ok_or_else(|| {
                    DefectError::model_load_error(
                        path,
                        "model declares no inputs",
                        None,
                        None::<SimpleError>,
                    )
                })?,
        };

        let output_name = first_session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| {
                DefectError::model_load_error(
                    path,
                    "model declares no outputs",
                    Some("the model may be invalid or corrupted"),
                    None::<SimpleError>,
                )
            })?;

        sessions.push(Mutex::new(first_session));
        for _ in 1..pool_size {
            sessions.push(Mutex::new(Self::build_session(config, path, false)?));
        }

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown_model".to_string());

        tracing::info!(
            model = %model_name,
            input = %input_name,
            output = %output_name,
            sessions = pool_size,
            "classifier loaded"
        );

        Ok(OrtInfer {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_name,
            output_name,
            model_name,
        })
    }
}

impl ClassifierBackend for OrtInfer {
    fn forward(&self, x: &Tensor4D) -> DefectResult<Vec<f32>> {
        let input_shape = x.shape().to_vec();
        if input_shape[0] != 1 {
            return Err(DefectError::validation(format!(
                "classifier expects a batch of one image, got {}",
                input_shape[0]
            )));
        }

        let input_tensor = TensorRef::from_array_view(x.view()).map_err(|e| {
            DefectError::model_inference_error(
                &self.model_name,
                "tensor_conversion",
                &input_shape,
                e,
            )
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        // Round-robin select a session
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session_guard = self.sessions[idx].lock().map_err(|_| {
            DefectError::inference_error(
                &self.model_name,
                &format!(
                    "failed to acquire session lock for session {}/{}",
                    idx,
                    self.sessions.len()
                ),
                SimpleError::new("session lock poisoned"),
            )
        })?;

        let outputs = session_guard.run(inputs).map_err(|e| {
            DefectError::model_inference_error(&self.model_name, "forward_pass", &input_shape, e)
        })?;

        let (output_shape, output_data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                DefectError::model_inference_error(
                    &self.model_name,
                    "output_extraction",
                    &input_shape,
                    e,
                )
            })?;

        if output_shape.first().copied().unwrap_or(0) != 1 {
            return Err(DefectError::inference_error(
                &self.model_name,
                &format!("unexpected output shape {output_shape:?}"),
                SimpleError::new("output batch dimension is not 1"),
            ));
        }

        tracing::trace!(model = %self.model_name, session = idx, "forward pass done");
        Ok(output_data.to_vec())
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_model_is_a_load_error() {
        let config = ClassifierConfig {
            model_path: PathBuf::from("does/not/exist.onnx"),
            ..Default::default()
        };
        let err = OrtInfer::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            DefectError::ModelLoad { .. } | DefectError::Session(_)
        ));
    }
}
