//! Chat template rendering and turn-end truncation
//!
//! The model is asked "does a turn-end marker come next?". To pose that
//! question the conversation is rendered in the model's chat format and then
//! cut just before the final turn-end marker.

use crate::chat::ChatTurn;
use crate::eou::error::{EouError, Result};

/// Default ChatML turn-start marker.
pub const DEFAULT_TURN_START: &str = "<|im_start|>";

/// Default ChatML turn-end marker. Its token is the end-of-utterance label.
pub const DEFAULT_TURN_END: &str = "<|im_end|>";

/// Renders a conversation into the serialized form the model was trained on.
pub trait ChatTemplate: Send + Sync {
    /// Render the whole conversation as a string (no tokenization).
    ///
    /// Implementations must terminate each turn with [`Self::turn_end_marker`].
    fn render(&self, turns: &[ChatTurn]) -> String;

    /// Literal text of the marker that closes a turn.
    fn turn_end_marker(&self) -> &str;
}

/// ChatML template: `<|im_start|>{role}\n{content}<|im_end|>\n` per turn,
/// without a trailing generation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMlTemplate {
    turn_start: String,
    turn_end: String,
}

impl ChatMlTemplate {
    pub fn new(turn_start: impl Into<String>, turn_end: impl Into<String>) -> Self {
        Self {
            turn_start: turn_start.into(),
            turn_end: turn_end.into(),
        }
    }
}

impl Default for ChatMlTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TURN_START, DEFAULT_TURN_END)
    }
}

impl ChatTemplate for ChatMlTemplate {
    fn render(&self, turns: &[ChatTurn]) -> String {
        let mut out = String::new();
        for turn in turns {
            out.push_str(&self.turn_start);
            out.push_str(turn.role.as_str());
            out.push('\n');
            out.push_str(&turn.content);
            out.push_str(&self.turn_end);
            out.push('\n');
        }
        out
    }

    fn turn_end_marker(&self) -> &str {
        &self.turn_end
    }
}

/// Cut `rendered` at the last occurrence of `marker`, dropping the marker and
/// everything after it.
///
/// A missing marker means the template broke its contract and is an error.
pub fn truncate_at_turn_end<'a>(rendered: &'a str, marker: &str) -> Result<&'a str> {
    if marker.is_empty() {
        return Err(EouError::MissingTurnEndMarker {
            marker: marker.to_string(),
        });
    }
    rendered
        .rfind(marker)
        .map(|idx| &rendered[..idx])
        .ok_or_else(|| EouError::MissingTurnEndMarker {
            marker: marker.to_string(),
        })
}

/// Render `turns` and truncate before the final turn-end marker.
pub fn render_prompt(template: &dyn ChatTemplate, turns: &[ChatTurn]) -> Result<String> {
    let rendered = template.render(turns);
    truncate_at_turn_end(&rendered, template.turn_end_marker()).map(str::to_string)
}
