//! Tests against the real turn-detector model
//!
//! Note: These tests need the model files under `$EOU_MODEL_DIR`
//! (`livekit/turn-detector/model_quantized.onnx` and `tokenizer.json`).
//! They are skipped when the variable is unset.

use std::path::PathBuf;

use eou_engine::chat::ChatTurn;
use eou_engine::eou::{Backend, DetectionConfig, EouDetector, HfTokenizer, TurnTokenizer, registry};

fn model_dir() -> Option<PathBuf> {
    std::env::var("EOU_MODEL_DIR").ok().map(PathBuf::from)
}

fn load_detector() -> Option<EouDetector> {
    let Some(dir) = model_dir() else {
        eprintln!("Skipping: EOU_MODEL_DIR not set");
        return None;
    };
    let backend = Backend::from_variant_id(&registry().default_model, &dir)
        .expect("model files missing under EOU_MODEL_DIR");
    Some(EouDetector::with_config(backend, DetectionConfig::default()).expect("Failed to load"))
}

#[test]
fn test_marker_encoding() {
    let Some(dir) = model_dir() else {
        eprintln!("Skipping: EOU_MODEL_DIR not set");
        return;
    };
    let (family, _) = registry().default_variant().unwrap();
    let tokenizer = HfTokenizer::from_file(family.tokenizer_path(&dir)).expect("tokenizer");
    let ids = tokenizer.encode(&family.turn_end_marker).expect("encode");
    assert!(!ids.is_empty());
    println!("{} -> {:?}", family.turn_end_marker, ids);
}

#[test]
fn test_score_range() {
    let Some(detector) = load_detector() else {
        return;
    };
    let turns = vec![
        ChatTurn::assistant("Hi, how can I help you today?"),
        ChatTurn::user("I'd like to book a table for two."),
    ];
    let p = detector.score(&turns).expect("score failed");
    assert!((0.0..=1.0).contains(&p));
    assert_eq!((p * 10_000.0).round() / 10_000.0, p);
}

#[test]
fn test_complete_sentence_scores_above_trailing_fragment() {
    let Some(detector) = load_detector() else {
        return;
    };
    let context = ChatTurn::assistant("What have you been up to lately?");

    let unfinished = detector
        .score(&[context.clone(), ChatTurn::user("so I was thinking")])
        .expect("score failed");
    let finished = detector
        .score(&[
            context,
            ChatTurn::user("I was thinking about going to the beach this weekend."),
        ])
        .expect("score failed");

    println!("unfinished={} finished={}", unfinished, finished);
    assert!(
        unfinished < finished,
        "expected mid-sentence ({}) < complete ({})",
        unfinished,
        finished
    );
}
