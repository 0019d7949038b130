//! Scoring pipeline around the tokenizer and inference collaborators

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::error::EouError;
use super::model_config::{ModelFamily, VariantConfig, registry};
use super::onnx::{HfTokenizer, OnnxModel};
use super::probability::{Logits, eou_probability, resolve_eou_token_id};
use crate::chat::{ChatTurn, flatten, limit_history};
use crate::config::Settings;
use crate::template::{ChatMlTemplate, ChatTemplate, render_prompt};

type Result<T> = super::error::Result<T>;

/// Text to token ids, using the vocabulary the scoring model was trained with.
pub trait TurnTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
}

/// One forward pass: `input_ids [1, N]` in, `logits [1, N, V]` out.
pub trait InferenceEngine: Send + Sync {
    fn forward(&self, input_ids: &[i64]) -> Result<Logits>;
}

/// Configuration for end-of-utterance detection
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Probability at or above which the turn is considered complete
    pub threshold: f64,
    /// Keep only this many of the most recent turns after flattening
    pub max_history_turns: Option<usize>,
    /// ONNX Runtime intra-op threads (0 = runtime default)
    pub intra_threads: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            max_history_turns: None,
            intra_threads: 1,
        }
    }
}

impl DetectionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            threshold: settings.detection.threshold,
            max_history_turns: settings.detection.max_history_turns,
            intra_threads: settings.model.intra_threads,
        }
    }
}

/// Probability paired with the threshold it is judged against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnPrediction {
    pub probability: f64,
    pub threshold: f64,
}

impl TurnPrediction {
    pub fn is_complete(&self) -> bool {
        self.probability >= self.threshold
    }
}

/// Local model files and the chat format they expect.
#[derive(Debug, Clone)]
pub struct Backend {
    onnx_path: PathBuf,
    tokenizer_json_path: PathBuf,
    turn_start_marker: String,
    turn_end_marker: String,
    /// Display name for the model (variant id for registry models, "custom" for explicit paths)
    display_name: String,
}

impl Backend {
    /// Create a backend from a `(ModelFamily, VariantConfig)` pair rooted at `model_dir`.
    ///
    /// The files must already be present; nothing is downloaded.
    pub fn from_variant(
        family: &ModelFamily,
        variant: &VariantConfig,
        model_dir: &Path,
    ) -> Result<Self> {
        let onnx_path = family.variant_path(model_dir, variant);
        let tokenizer_json_path = family.tokenizer_path(model_dir);
        for path in [&onnx_path, &tokenizer_json_path] {
            if !path.exists() {
                return Err(EouError::ModelNotFound(path.clone()));
            }
        }
        Ok(Backend {
            onnx_path,
            tokenizer_json_path,
            turn_start_marker: family.turn_start_marker.clone(),
            turn_end_marker: family.turn_end_marker.clone(),
            display_name: variant.id.clone(),
        })
    }

    /// Create a backend by looking up a variant id in the global registry.
    ///
    /// E.g. `Backend::from_variant_id("turn-detector-q8", dir)`
    pub fn from_variant_id(variant_id: &str, model_dir: &Path) -> Result<Self> {
        let (family, variant) = registry()
            .find_variant(variant_id)
            .ok_or_else(|| EouError::UnknownVariant(variant_id.to_string()))?;
        Self::from_variant(family, variant, model_dir)
    }

    /// Create a backend from explicit files, using the default ChatML markers
    /// of the registry's default family.
    pub fn from_paths<P: AsRef<Path>, T: AsRef<Path>>(onnx: P, tokenizer_json: T) -> Result<Self> {
        let onnx_path = onnx.as_ref().to_path_buf();
        let tokenizer_json_path = tokenizer_json.as_ref().to_path_buf();
        for path in [&onnx_path, &tokenizer_json_path] {
            if !path.exists() {
                return Err(EouError::ModelNotFound(path.clone()));
            }
        }
        let (turn_start_marker, turn_end_marker) = match registry().default_variant() {
            Some((family, _)) => (
                family.turn_start_marker.clone(),
                family.turn_end_marker.clone(),
            ),
            None => (
                crate::template::DEFAULT_TURN_START.to_string(),
                crate::template::DEFAULT_TURN_END.to_string(),
            ),
        };
        Ok(Backend {
            onnx_path,
            tokenizer_json_path,
            turn_start_marker,
            turn_end_marker,
            display_name: "custom".to_string(),
        })
    }

    /// Resolve the backend described by `settings`.
    ///
    /// Explicit `onnx_path`/`tokenizer_path` win over the registry variant.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if let (Some(onnx), Some(tokenizer)) =
            (&settings.model.onnx_path, &settings.model.tokenizer_path)
        {
            return Self::from_paths(onnx, tokenizer);
        }

        let model_dir = settings
            .model_dir()
            .ok_or_else(|| EouError::Config("could not determine model directory".to_string()))?;
        let variant_id = settings
            .model
            .variant
            .clone()
            .unwrap_or_else(|| registry().default_model.clone());
        Self::from_variant_id(&variant_id, &model_dir)
    }

    pub fn onnx_path(&self) -> &Path {
        &self.onnx_path
    }

    pub fn tokenizer_json_path(&self) -> &Path {
        &self.tokenizer_json_path
    }
}

/// End-of-utterance detector.
///
/// Holds the loaded tokenizer and model; both are read-only after
/// construction, so one detector can be shared across threads. Forward
/// passes through [`OnnxModel`] are serialized per instance.
pub struct EouDetector {
    tokenizer: Box<dyn TurnTokenizer>,
    engine: Box<dyn InferenceEngine>,
    template: Box<dyn ChatTemplate>,
    eou_token_id: u32,
    config: DetectionConfig,
    display_name: String,
}

impl EouDetector {
    /// Create a new detector with the specified backend
    pub fn new(backend: Backend) -> Result<Self> {
        Self::with_config(backend, DetectionConfig::default())
    }

    /// Create a new detector with the specified backend and configuration
    pub fn with_config(backend: Backend, config: DetectionConfig) -> Result<Self> {
        let tokenizer = HfTokenizer::from_file(&backend.tokenizer_json_path)?;
        let engine = OnnxModel::from_file(&backend.onnx_path, config.intra_threads)?;
        let template = ChatMlTemplate::new(backend.turn_start_marker, backend.turn_end_marker);
        let mut detector =
            Self::from_parts(Box::new(tokenizer), Box::new(engine), Box::new(template), config)?;
        detector.display_name = backend.display_name;
        Ok(detector)
    }

    /// Build a detector from arbitrary collaborators.
    ///
    /// The end-of-utterance token id is resolved here, once, by encoding the
    /// template's turn-end marker and taking the last id.
    pub fn from_parts(
        tokenizer: Box<dyn TurnTokenizer>,
        engine: Box<dyn InferenceEngine>,
        template: Box<dyn ChatTemplate>,
        config: DetectionConfig,
    ) -> Result<Self> {
        let marker_ids = tokenizer.encode(template.turn_end_marker())?;
        let eou_token_id = resolve_eou_token_id(&marker_ids)?;
        tracing::debug!(
            "Turn-end marker '{}' encodes to {:?}; label id {}",
            template.turn_end_marker(),
            marker_ids,
            eou_token_id
        );
        Ok(Self {
            tokenizer,
            engine,
            template,
            eou_token_id,
            config,
            display_name: "custom".to_string(),
        })
    }

    /// Probability, rounded to 4 decimals, that the conversation's last turn
    /// is complete.
    ///
    /// Fails with [`EouError::EmptyConversation`] before touching the
    /// tokenizer or model when nothing survives normalization.
    pub fn score(&self, turns: &[ChatTurn]) -> Result<f64> {
        let flattened = flatten(turns);
        if flattened.is_empty() {
            return Err(EouError::EmptyConversation);
        }
        let flattened = limit_history(flattened, self.config.max_history_turns);

        let prompt = render_prompt(self.template.as_ref(), &flattened)?;
        let token_ids = self.tokenizer.encode(&prompt)?;
        if token_ids.is_empty() {
            return Err(EouError::EmptyEncoding("the rendered conversation"));
        }
        let input_ids: Vec<i64> = token_ids.iter().map(|&id| id as i64).collect();

        let logits = self.engine.forward(&input_ids)?;
        logits.check_sequence_len(input_ids.len())?;

        let probability = eou_probability(&logits, self.eou_token_id)?;
        tracing::debug!(
            turns = flattened.len(),
            tokens = input_ids.len(),
            probability,
            "scored conversation"
        );
        Ok(probability)
    }

    /// Score the conversation and judge it against the configured threshold.
    pub fn predict(&self, turns: &[ChatTurn]) -> Result<TurnPrediction> {
        Ok(TurnPrediction {
            probability: self.score(turns)?,
            threshold: self.config.threshold,
        })
    }

    /// Token id whose probability is reported.
    pub fn eou_token_id(&self) -> u32 {
        self.eou_token_id
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Get a human-readable model name for display
    pub fn model_display_name(&self) -> &str {
        &self.display_name
    }
}

/// Process-wide detector (can only be initialized once)
static SHARED_DETECTOR: OnceLock<std::result::Result<EouDetector, String>> = OnceLock::new();

/// Get or initialize the process-wide detector from [`Settings::load`].
///
/// The first call loads the model; later calls reuse it. A failed
/// initialization is remembered and reported on every call.
pub fn shared_detector() -> Result<&'static EouDetector> {
    let result = SHARED_DETECTOR.get_or_init(|| {
        let settings = Settings::load().map_err(|e| format!("{:#}", e))?;
        let backend = Backend::from_settings(&settings).map_err(|e| error_chain(&e))?;
        tracing::info!("Loading end-of-utterance model '{}'", backend.display_name);
        EouDetector::with_config(backend, DetectionConfig::from_settings(&settings))
            .map_err(|e| error_chain(&e))
    });
    match result {
        Ok(detector) => Ok(detector),
        Err(e) => Err(EouError::ModelLoad(
            format!("Failed to initialize shared detector: {}", e).into(),
        )),
    }
}

/// Score `turns` with the process-wide detector.
pub fn score(turns: &[ChatTurn]) -> Result<f64> {
    shared_detector()?.score(turns)
}

/// Render an error and its sources as `outer: inner: ...`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_config_defaults() {
        let config = DetectionConfig::default();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.max_history_turns, None);
        assert_eq!(config.intra_threads, 1);
    }

    #[test]
    fn test_detection_config_from_settings() {
        let mut settings = Settings::default();
        settings.detection.threshold = 0.25;
        settings.detection.max_history_turns = Some(3);
        settings.model.intra_threads = 2;
        let config = DetectionConfig::from_settings(&settings);
        assert_eq!(config.threshold, 0.25);
        assert_eq!(config.max_history_turns, Some(3));
        assert_eq!(config.intra_threads, 2);
    }

    #[test]
    fn test_turn_prediction_threshold() {
        let p = TurnPrediction {
            probability: 0.5,
            threshold: 0.5,
        };
        assert!(p.is_complete());
        let p = TurnPrediction {
            probability: 0.4999,
            threshold: 0.5,
        };
        assert!(!p.is_complete());
    }

    #[test]
    fn test_backend_unknown_variant() {
        let err = Backend::from_variant_id("nonexistent-model", Path::new("/nowhere")).unwrap_err();
        assert!(matches!(err, EouError::UnknownVariant(_)));
    }

    #[test]
    fn test_backend_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = Backend::from_variant_id("turn-detector-q8", dir.path()).unwrap_err();
        assert!(matches!(err, EouError::ModelNotFound(_)));
    }

    #[test]
    fn test_backend_resolves_registry_paths() {
        let dir = tempfile::tempdir().unwrap();
        let family_dir = dir.path().join("livekit/turn-detector");
        std::fs::create_dir_all(&family_dir).unwrap();
        std::fs::write(family_dir.join("model_quantized.onnx"), b"").unwrap();
        std::fs::write(family_dir.join("tokenizer.json"), b"{}").unwrap();

        let backend = Backend::from_variant_id("turn-detector-q8", dir.path()).unwrap();
        assert_eq!(backend.onnx_path(), family_dir.join("model_quantized.onnx"));
        assert_eq!(backend.tokenizer_json_path(), family_dir.join("tokenizer.json"));
        assert_eq!(backend.turn_end_marker, "<|im_end|>");
        assert_eq!(backend.display_name, "turn-detector-q8");
    }

    #[test]
    fn test_backend_from_settings_explicit_paths() {
        let dir = tempfile::tempdir().unwrap();
        let onnx = dir.path().join("m.onnx");
        let tok = dir.path().join("t.json");
        std::fs::write(&onnx, b"").unwrap();
        std::fs::write(&tok, b"{}").unwrap();

        let mut settings = Settings::default();
        settings.model.onnx_path = Some(onnx.to_string_lossy().to_string());
        settings.model.tokenizer_path = Some(tok.to_string_lossy().to_string());

        let backend = Backend::from_settings(&settings).unwrap();
        assert_eq!(backend.onnx_path(), onnx.as_path());
        assert_eq!(backend.display_name, "custom");
    }
}
