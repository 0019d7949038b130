pub mod chat;
pub mod config;
pub mod eou;
pub mod template;
pub mod text;

pub use chat::{ChatTurn, Role, flatten, limit_history};
pub use config::Settings;
pub use eou::{Backend, DetectionConfig, EouDetector, EouError, TurnPrediction, score};
pub use template::{ChatMlTemplate, ChatTemplate, render_prompt, truncate_at_turn_end};
pub use text::{is_punctuation, normalize_nfkc, normalize_text};
