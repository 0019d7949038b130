//! Error types for end-of-utterance scoring

/// Errors that can occur while scoring a conversation.
#[derive(Debug, thiserror::Error)]
pub enum EouError {
    // Input
    #[error("conversation has no non-empty turns after normalization")]
    EmptyConversation,

    // Collaborator contract violations
    #[error("rendered chat template does not contain the turn-end marker '{marker}'")]
    MissingTurnEndMarker { marker: String },

    #[error("tokenizer returned no tokens for {0}")]
    EmptyEncoding(&'static str),

    #[error("unexpected logits shape {shape:?}: {reason}")]
    UnexpectedLogitsShape { shape: Vec<i64>, reason: String },

    #[error("logits cover {actual} positions but {expected} tokens were fed")]
    SequenceLengthMismatch { expected: usize, actual: usize },

    #[error("logits at the final position contain a non-finite value ({value})")]
    NonFiniteLogits { value: f32 },

    #[error("turn-end token id {token_id} is outside the vocabulary (size {vocab_size})")]
    TokenOutOfVocab { token_id: u32, vocab_size: usize },

    // Collaborator failures
    #[error("tokenizer load failed")]
    TokenizerLoad(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("model load failed")]
    ModelLoad(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("tokenization failed")]
    Tokenize(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("inference failed")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),

    // Configuration
    #[error("unknown model variant: '{0}'")]
    UnknownVariant(String),

    #[error("model file not found: {0}")]
    ModelNotFound(std::path::PathBuf),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EouError>;
