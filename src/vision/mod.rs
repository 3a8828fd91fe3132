//! Vision Layer
//!
//! Letter recognition on uploaded images:
//! - decode + resize + normalize (`preprocess`)
//! - ONNX Runtime inference (`models`)
//! - top-k ranking against the class table (`ranking`, `labels`)

pub mod labels;
pub mod models;
pub mod preprocess;
pub mod ranking;

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;

pub use models::{Classifier, ModelInfo, OnnxClassifier};
pub use preprocess::{Normalization, PreprocessConfig};
pub use ranking::PredictionResult;

/// Failures on the prediction path
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("Empty filename")]
    EmptyFilename,
    #[error("{0}")]
    Decode(#[from] image::ImageError),
    #[error("{0}")]
    Inference(String),
    #[error("prediction worker failed: {0}")]
    Worker(String),
}

impl PredictError {
    /// Whether the caller sent a bad request (as opposed to a processing failure)
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictError::MissingFile | PredictError::EmptyFilename)
    }
}

/// Ranking parameters
#[derive(Debug, Clone)]
pub struct RankConfig {
    /// Entries returned in `top3`
    pub top_k: usize,
    /// Tolerance for treating raw output as already normalized
    pub tolerance: f32,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            tolerance: 0.01,
        }
    }
}

/// Decode → preprocess → infer → rank, for one image at a time
#[derive(Clone)]
pub struct LetterRecognizer {
    model: Arc<dyn Classifier>,
    preprocess: PreprocessConfig,
    rank: RankConfig,
}

impl LetterRecognizer {
    /// Create a recognizer with default preprocessing and ranking
    #[cfg(test)]
    pub fn new(model: Arc<dyn Classifier>) -> Self {
        Self {
            model,
            preprocess: PreprocessConfig::default(),
            rank: RankConfig::default(),
        }
    }

    /// Create a recognizer using the model and ranking sections of `config`
    pub fn from_config(model: Arc<dyn Classifier>, config: &AppConfig) -> Self {
        Self {
            model,
            preprocess: PreprocessConfig {
                width: config.model.input_width,
                height: config.model.input_height,
                normalization: config.model.normalization,
            },
            rank: RankConfig {
                top_k: config.ranking.top_k,
                tolerance: config.ranking.distribution_tolerance,
            },
        }
    }

    /// Metadata of the underlying model
    pub fn model_info(&self) -> &ModelInfo {
        self.model.info()
    }

    /// Predict the letter in an encoded image
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<PredictionResult, PredictError> {
        let image = preprocess::decode_image(bytes)?;
        self.predict(&image)
    }

    /// Predict the letter in a decoded image
    pub fn predict(&self, image: &image::DynamicImage) -> Result<PredictionResult, PredictError> {
        let start = Instant::now();

        let tensor = preprocess::preprocess(image, &self.preprocess);
        let scores = self.model.infer(tensor)?;
        let result = ranking::top_k(&scores, self.rank.top_k, self.rank.tolerance)?;

        debug!(
            "Prediction for {}x{} image complete in {:?}",
            image.width(),
            image.height(),
            start.elapsed()
        );

        Ok(result)
    }
}
