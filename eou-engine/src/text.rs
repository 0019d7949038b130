//! Utterance normalization
//!
//! Chat content is canonicalized before templating so that the model sees
//! text in the same shape it was trained on: lowercase, NFKC, punctuation
//! stripped (apostrophes and hyphens kept), whitespace collapsed.

use unicode_normalization::UnicodeNormalization;

/// Code-point ranges treated as punctuation.
///
/// This is a coarse stand-in for the Unicode `P*` general categories and
/// must stay range-for-range identical to the table used when the model's
/// training data was preprocessed. Swapping in a precise Unicode property
/// lookup changes which characters survive and silently shifts the scores.
pub const PUNCTUATION_RANGES: &[(u32, u32)] = &[
    (0x21, 0x2F),     // !"#$%&'()*+,-./
    (0x3A, 0x40),     // :;<=>?@
    (0x5B, 0x60),     // [\]^_`
    (0x7B, 0x7E),     // {|}~
    (0xA0, 0xBF),     // Latin-1 punctuation
    (0x2000, 0x206F), // General Punctuation
    (0x3000, 0x303F), // CJK Symbols and Punctuation
];

/// Punctuation characters that are kept verbatim.
const PRESERVED_PUNCTUATION: [char; 2] = ['\'', '-'];

/// Apply NFKC normalization to text.
///
/// NFKC normalization converts:
/// - Full-width ASCII → Half-width: `（` → `(`, `！` → `!`, `？` → `?`
/// - Full-width digits → Half-width: `０` → `0`, `１` → `1`
/// - Compatibility characters → Canonical forms (`ﬁ` → `fi`, NBSP → space)
pub fn normalize_nfkc(text: &str) -> String {
    text.nfkc().collect()
}

/// Whether `c` falls in one of the [`PUNCTUATION_RANGES`].
pub fn is_punctuation(c: char) -> bool {
    let code = c as u32;
    PUNCTUATION_RANGES
        .iter()
        .any(|&(start, end)| (start..=end).contains(&code))
}

/// Whitespace as matched by `\s` in the preprocessing regex.
///
/// Differs from [`char::is_whitespace`]: U+FEFF counts, U+0085 does not.
fn is_collapsible_whitespace(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n'
            | '\u{0B}'
            | '\u{0C}'
            | '\r'
            | ' '
            | '\u{A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}

/// Canonicalize a single utterance.
///
/// Steps, in order:
/// 1. lowercase
/// 2. NFKC
/// 3. drop [`is_punctuation`] characters except `'` and `-`
/// 4. collapse whitespace runs to one ASCII space and trim
///
/// Empty input yields an empty string; this never fails.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let composed = normalize_nfkc(&text.to_lowercase());
    let stripped: String = composed
        .chars()
        .filter(|&c| !is_punctuation(c) || PRESERVED_PUNCTUATION.contains(&c))
        .collect();

    stripped
        .split(is_collapsible_whitespace)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
