//! End-of-utterance scoring with an ONNX turn-detector model

mod backend;
pub mod error;
pub mod model_config;
pub mod onnx;
pub mod probability;

pub use backend::{
    Backend, DetectionConfig, EouDetector, InferenceEngine, TurnPrediction, TurnTokenizer, score,
    shared_detector,
};
pub use error::{EouError, Result};
pub use model_config::{ModelFamily, ModelRegistry, VariantConfig, registry};
pub use onnx::{HfTokenizer, OnnxModel};
pub use probability::{Logits, eou_probability, resolve_eou_token_id, round_probability, softmax};
