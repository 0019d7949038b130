//! ONNX Runtime and HuggingFace tokenizer bindings
//!
//! These are the concrete collaborators behind [`TurnTokenizer`] and
//! [`InferenceEngine`]: a `tokenizer.json` loaded with the `tokenizers`
//! crate and a turn-detector graph executed with `ort`.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;

use super::backend::{InferenceEngine, TurnTokenizer};
use super::error::EouError;
use super::probability::Logits;

type Result<T> = super::error::Result<T>;

/// Preferred graph input name; the first input is used when absent.
const INPUT_IDS: &str = "input_ids";
/// Preferred graph output name; the first output is used when absent.
const LOGITS: &str = "logits";

/// Tokenizer loaded from a HuggingFace `tokenizer.json`.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut inner =
            tokenizers::Tokenizer::from_file(path.as_ref()).map_err(EouError::TokenizerLoad)?;
        // Padding or truncation would shift the final position the score is read from.
        inner.with_padding(None);
        inner
            .with_truncation(None)
            .map_err(EouError::TokenizerLoad)?;
        Ok(Self { inner })
    }
}

impl TurnTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(EouError::Tokenize)?;
        Ok(encoding.get_ids().to_vec())
    }
}

/// Turn-detector graph executed with ONNX Runtime.
///
/// `Session::run` needs exclusive access, so the session is kept behind a
/// mutex: one model instance serves any number of threads, but their forward
/// passes run one at a time. Load several instances for parallel inference.
pub struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxModel {
    /// Load an ONNX graph. `intra_threads == 0` leaves the runtime default.
    pub fn from_file<P: AsRef<Path>>(path: P, intra_threads: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut builder = Session::builder()
            .map_err(|e| EouError::ModelLoad(e.to_string().into()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EouError::ModelLoad(e.to_string().into()))?;
        if intra_threads > 0 {
            builder = builder
                .with_intra_threads(intra_threads)
                .map_err(|e| EouError::ModelLoad(e.to_string().into()))?;
        }
        let session = builder
            .commit_from_file(path)
            .map_err(|e| EouError::ModelLoad(e.to_string().into()))?;

        let input_name = session
            .inputs
            .iter()
            .find(|i| i.name == INPUT_IDS)
            .or_else(|| session.inputs.first())
            .map(|i| i.name.clone())
            .ok_or_else(|| EouError::ModelLoad("model has no inputs".into()))?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name == LOGITS)
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .ok_or_else(|| EouError::ModelLoad("model has no outputs".into()))?;

        tracing::info!(
            "Loaded ONNX model {} (input '{}', output '{}')",
            path.display(),
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl InferenceEngine for OnnxModel {
    fn forward(&self, input_ids: &[i64]) -> Result<Logits> {
        let input = Tensor::from_array(([1i64, input_ids.len() as i64], input_ids.to_vec()))
            .map_err(|e| EouError::Inference(e.to_string().into()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EouError::Inference("session lock poisoned".into()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| EouError::Inference(e.to_string().into()))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| EouError::Inference("missing model output".into()))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| EouError::Inference(e.to_string().into()))?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        Logits::new(&dims, data.to_vec())
    }
}
