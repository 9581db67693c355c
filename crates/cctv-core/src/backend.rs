//! Inference backend seam.
//!
//! Every model-wrapping component holds an optional boxed
//! [`InferenceBackend`]. Production code plugs in [`OnnxBackend`]; tests plug
//! in fakes that return canned tensors.

use ndarray::ArrayView4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model not loaded")]
    Unavailable,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// First output tensor of a model run, flattened in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ModelOutput {
    /// First scalar of the output, as produced by single-unit sigmoid/regression heads.
    pub fn first(&self) -> Result<f32, ModelError> {
        self.data
            .first()
            .copied()
            .ok_or_else(|| ModelError::InferenceFailed("model produced an empty output".into()))
    }
}

/// A loaded model that maps one 4-D float tensor to one float tensor.
pub trait InferenceBackend: Send {
    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<ModelOutput, ModelError>;
}

/// ONNX Runtime session.
pub struct OnnxBackend {
    session: Session,
}

impl OnnxBackend {
    /// Load an ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ONNX model"
        );

        Ok(Self { session })
    }

    /// Load a model, logging and returning `None` if it cannot be loaded.
    ///
    /// The owning component then reports itself unavailable and answers
    /// with placeholder values.
    pub fn load_optional(model_path: &Path, what: &str) -> Option<Box<dyn InferenceBackend>> {
        match Self::load(model_path) {
            Ok(backend) => Some(Box::new(backend)),
            Err(e) => {
                tracing::error!(model = what, path = %model_path.display(), error = %e, "failed to load model");
                None
            }
        }
    }
}

impl InferenceBackend for OnnxBackend {
    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<ModelOutput, ModelError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input)?])?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("output extraction: {e}")))?;

        Ok(ModelOutput {
            shape: shape.iter().map(|&d| d.max(0) as usize).collect(),
            data: data.to_vec(),
        })
    }
}
