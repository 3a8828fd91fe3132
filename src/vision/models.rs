//! Model loading for ONNX Runtime
//!
//! Loads the letter classifier once at startup and exposes a single inference call.

use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::labels::NUM_CLASSES;
use super::PredictError;

/// Anything that maps an NHWC image batch to one score per class.
pub trait Classifier: Send + Sync {
    /// Run the model on a `[1, H, W, 3]` tensor and return the raw output vector
    fn infer(&self, input: Array4<f32>) -> Result<Vec<f32>, PredictError>;

    /// Description of the loaded artifact
    fn info(&self) -> &ModelInfo;
}

/// Metadata about the loaded model artifact
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
}

/// Tensor shape information
#[derive(Debug, Clone)]
pub struct TensorInfo {
    pub name: String,
    pub shape: Vec<i64>,
}

/// ONNX Runtime backed classifier
pub struct OnnxClassifier {
    /// `Session::run` needs `&mut`, so requests take turns
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    info: ModelInfo,
}

impl OnnxClassifier {
    /// Load a model from file. Any failure here should stop the server.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self> {
        info!("Loading ONNX model from {:?}", model_path);

        let bytes = std::fs::read(model_path)
            .with_context(|| format!("Failed to read model file {:?}", model_path))?;
        let sha256 = fingerprint(&bytes);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_memory(&bytes)
            .context("Failed to load ONNX model")?;

        let inputs = input_info(&session);
        let outputs = output_info(&session);

        info!(
            "Model loaded. Inputs: {:?}, Outputs: {:?}",
            inputs.iter().map(|t| (&t.name, &t.shape)).collect::<Vec<_>>(),
            outputs.iter().map(|t| (&t.name, &t.shape)).collect::<Vec<_>>()
        );

        let input_name = inputs
            .first()
            .map(|t| t.name.clone())
            .context("Model declares no inputs")?;
        let output_name = outputs
            .first()
            .map(|t| t.name.clone())
            .context("Model declares no outputs")?;

        let info = ModelInfo {
            path: model_path.to_path_buf(),
            size_bytes: bytes.len() as u64,
            sha256,
            input_names: inputs.into_iter().map(|t| t.name).collect(),
            output_names: outputs.into_iter().map(|t| t.name).collect(),
        };
        debug!("Model sha256 {}", info.sha256);

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            info,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn infer(&self, input: Array4<f32>) -> Result<Vec<f32>, PredictError> {
        let input_shape = input.shape().to_vec();

        let tensor = TensorRef::from_array_view(input.view()).map_err(|e| {
            PredictError::Inference(format!(
                "Failed to convert input tensor with shape {:?}: {}",
                input_shape, e
            ))
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => tensor];

        let mut session = self.session.lock();
        let outputs = session.run(inputs).map_err(|e| {
            PredictError::Inference(format!(
                "ONNX Runtime inference failed for input shape {:?}: {}",
                input_shape, e
            ))
        })?;

        let (_, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                PredictError::Inference(format!(
                    "Failed to extract output tensor '{}' as f32: {}",
                    self.output_name, e
                ))
            })?;

        if data.len() != NUM_CLASSES {
            return Err(PredictError::Inference(format!(
                "Expected {} output scores, model produced {}",
                NUM_CLASSES,
                data.len()
            )));
        }

        Ok(data.to_vec())
    }

    fn info(&self) -> &ModelInfo {
        &self.info
    }
}

/// Hex SHA-256 of the model bytes
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn input_info(session: &Session) -> Vec<TensorInfo> {
    session
        .inputs
        .iter()
        .map(|input| TensorInfo {
            name: input.name.clone(),
            shape: extract_shape(&input.input_type),
        })
        .collect()
}

fn output_info(session: &Session) -> Vec<TensorInfo> {
    session
        .outputs
        .iter()
        .map(|output| TensorInfo {
            name: output.name.clone(),
            shape: extract_shape(&output.output_type),
        })
        .collect()
}

/// Extract shape from ONNX value type
fn extract_shape(value_type: &ort::value::ValueType) -> Vec<i64> {
    value_type
        .tensor_shape()
        .map(|shape| shape.iter().copied().collect())
        .unwrap_or_default()
}
