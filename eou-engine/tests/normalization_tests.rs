//! Properties of utterance normalization and conversation flattening

use eou_engine::chat::{ChatTurn, Role, flatten};
use eou_engine::template::{ChatMlTemplate, ChatTemplate, render_prompt};
use eou_engine::text::normalize_text;
use proptest::prelude::*;

// ============================================================================
// Helper functions
// ============================================================================

const FRAGMENTS: &[&str] = &[
    "Hello",
    " there",
    ".",
    "  ",
    "\n",
    "\t",
    "I'm",
    "well-known",
    "?!",
    "Ｆｕｌｌ",
    "　",
    "こんにちは",
    "。",
    "\u{2026}",
    "\u{201c}",
    "Café",
    "ÉCOLE",
    "—",
    "42",
    "ﬁne",
    "",
];

fn text_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(FRAGMENTS), 0..8).prop_map(|parts| parts.concat())
}

fn turns_strategy() -> impl Strategy<Value = Vec<ChatTurn>> {
    let role = prop_oneof![Just(Role::User), Just(Role::Assistant)];
    prop::collection::vec(
        (role, text_strategy()).prop_map(|(role, text)| ChatTurn::new(role, text)),
        0..7,
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn normalize_is_idempotent(s in text_strategy()) {
        let once = normalize_text(&s);
        prop_assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn normalize_output_shape(s in text_strategy()) {
        let out = normalize_text(&s);
        prop_assert_eq!(out.trim(), out.as_str());
        prop_assert!(!out.contains("  "), "double space in {:?}", out);
        prop_assert!(!out.contains(['\n', '\t', '.', '?', '!']), "{:?}", out);
    }

    #[test]
    fn flatten_merge_invariant(turns in turns_strategy()) {
        let flat = flatten(&turns);
        prop_assert!(flat.iter().all(|t| !t.content.is_empty()));
        prop_assert!(
            flat.windows(2).all(|w| w[0].role != w[1].role),
            "adjacent roles repeat: {:?}",
            flat
        );
    }

    #[test]
    fn truncated_prompt_never_ends_with_marker(turns in turns_strategy()) {
        let template = ChatMlTemplate::default();
        let flat = flatten(&turns);
        prop_assume!(!flat.is_empty());

        let prompt = render_prompt(&template, &flat).expect("ChatML always has a marker");
        prop_assert!(!prompt.ends_with(template.turn_end_marker()));

        let rebuilt = format!("{}{}\n", prompt, template.turn_end_marker());
        prop_assert_eq!(rebuilt, template.render(&flat));
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_flatten_preserves_words_in_order() {
    let turns = vec![
        ChatTurn::assistant("How can I help?"),
        ChatTurn::user("Well,"),
        ChatTurn::user(""),
        ChatTurn::user("I need a taxi."),
        ChatTurn::assistant("Where to?"),
    ];
    let flat = flatten(&turns);
    assert_eq!(
        flat,
        vec![
            ChatTurn::assistant("how can i help"),
            ChatTurn::user("well i need a taxi"),
            ChatTurn::assistant("where to"),
        ]
    );
}

#[test]
fn test_scenario_merge_user_turns() {
    let turns = vec![
        ChatTurn::user("Hello there."),
        ChatTurn::user("How are you?"),
    ];
    let flat = flatten(&turns);
    assert_eq!(flat.len(), 1);
    assert_eq!(flat[0].role, Role::User);
    assert_eq!(flat[0].content, "hello there how are you");
}

#[test]
fn test_scenario_blank_conversation() {
    assert!(flatten(&[ChatTurn::user("   ")]).is_empty());
    assert!(flatten(&[]).is_empty());
}
