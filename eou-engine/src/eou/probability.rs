//! Logits handling and end-of-utterance probability extraction

use super::error::{EouError, Result};

/// Model output of shape `[batch, seq_len, vocab]`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Logits {
    seq_len: usize,
    vocab_size: usize,
    data: Vec<f32>,
}

impl Logits {
    /// Validate an output tensor's shape and wrap its data.
    ///
    /// The shape must be rank 3 with batch size 1 and non-zero sequence and
    /// vocabulary dimensions, and `data` must hold exactly that many values.
    pub fn new(shape: &[i64], data: Vec<f32>) -> Result<Self> {
        let bad = |reason: &str| EouError::UnexpectedLogitsShape {
            shape: shape.to_vec(),
            reason: reason.to_string(),
        };

        let &[batch, seq_len, vocab_size] = shape else {
            return Err(bad("expected rank 3"));
        };
        if batch != 1 {
            return Err(bad("expected batch size 1"));
        }
        if seq_len <= 0 || vocab_size <= 0 {
            return Err(bad("sequence and vocabulary dimensions must be positive"));
        }

        let seq_len = seq_len as usize;
        let vocab_size = vocab_size as usize;
        if seq_len.checked_mul(vocab_size) != Some(data.len()) {
            return Err(bad(&format!(
                "{} values do not fill the tensor",
                data.len()
            )));
        }

        Ok(Self {
            seq_len,
            vocab_size,
            data,
        })
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Logits for sequence position `pos`.
    pub fn row(&self, pos: usize) -> Option<&[f32]> {
        if pos >= self.seq_len {
            return None;
        }
        let start = pos * self.vocab_size;
        Some(&self.data[start..start + self.vocab_size])
    }

    /// Logits for the final sequence position.
    pub fn last_row(&self) -> &[f32] {
        let start = (self.seq_len - 1) * self.vocab_size;
        &self.data[start..]
    }

    /// Check that the output covers exactly `expected` input positions.
    pub fn check_sequence_len(&self, expected: usize) -> Result<()> {
        if self.seq_len != expected {
            return Err(EouError::SequenceLengthMismatch {
                expected,
                actual: self.seq_len,
            });
        }
        Ok(())
    }
}

/// Numerically stable softmax: subtract the row maximum before exponentiating.
///
/// Accumulates in `f64`. An empty row yields an empty distribution.
pub fn softmax(row: &[f32]) -> Vec<f64> {
    let max_logit = row
        .iter()
        .map(|&x| x as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = row.iter().map(|&x| (x as f64 - max_logit).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Round to 4 decimal places, halves rounding up.
pub fn round_probability(p: f64) -> f64 {
    (p * 10_000.0).round() / 10_000.0
}

/// Pick the label id out of the turn-end marker's encoding.
///
/// The marker may encode to several sub-tokens; the model was trained to
/// predict the final one, so only the last id is used.
pub fn resolve_eou_token_id(marker_encoding: &[u32]) -> Result<u32> {
    marker_encoding
        .last()
        .copied()
        .ok_or(EouError::EmptyEncoding("the turn-end marker"))
}

/// Probability mass the final position assigns to `eou_token_id`, rounded to
/// 4 decimal places.
///
/// A NaN or infinite logit in the final row is rejected rather than scored.
pub fn eou_probability(logits: &Logits, eou_token_id: u32) -> Result<f64> {
    let vocab_size = logits.vocab_size();
    let idx = eou_token_id as usize;
    if idx >= vocab_size {
        return Err(EouError::TokenOutOfVocab {
            token_id: eou_token_id,
            vocab_size,
        });
    }

    let row = logits.last_row();
    if let Some(&value) = row.iter().find(|x| !x.is_finite()) {
        return Err(EouError::NonFiniteLogits { value });
    }

    let probs = softmax(row);
    Ok(round_probability(probs[idx]))
}
