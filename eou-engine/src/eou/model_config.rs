//! TOML-based model configuration
//!
//! All supported turn-detector models are defined in `models.toml` at the
//! crate root. This module deserializes that file and provides a global
//! registry for lookup and local path resolution.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Top-level config parsed from `models.toml`
#[derive(Debug, Deserialize)]
pub struct ModelRegistry {
    /// Default variant id (e.g. "turn-detector-q8")
    pub default_model: String,
    /// Model families keyed by short name (e.g. "turn-detector")
    pub models: HashMap<String, ModelFamily>,
}

/// A model family (one upstream repo, shared tokenizer and chat format)
#[derive(Debug, Deserialize)]
pub struct ModelFamily {
    pub repo_id: String,
    pub display_name: String,
    #[serde(default = "default_tokenizer_file")]
    pub tokenizer_file: String,
    pub turn_start_marker: String,
    /// Marker closing each turn; its final token is the end-of-utterance label
    pub turn_end_marker: String,
    /// Exported graphs keyed by short name (e.g. "q8")
    pub variants: HashMap<String, VariantConfig>,
}

/// A single ONNX export of a family
#[derive(Debug, Deserialize)]
pub struct VariantConfig {
    /// Unique variant id (e.g. "turn-detector-q8")
    pub id: String,
    /// ONNX filename inside the family directory
    pub filename: String,
    /// Human-readable name
    pub display_name: String,
}

fn default_tokenizer_file() -> String {
    "tokenizer.json".to_string()
}

static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();

/// Return the global model registry, parsed once from the embedded `models.toml`.
pub fn registry() -> &'static ModelRegistry {
    REGISTRY.get_or_init(|| {
        let toml_str = include_str!("../../models.toml");
        toml::from_str(toml_str).expect("Failed to parse models.toml")
    })
}

impl ModelRegistry {
    /// Look up a variant by its unique id (e.g. "turn-detector-q8").
    ///
    /// Returns `(family, variant)` if found.
    pub fn find_variant(&self, variant_id: &str) -> Option<(&ModelFamily, &VariantConfig)> {
        self.iter_variants().find(|(_, v)| v.id == variant_id)
    }

    /// Return the default `(family, variant)` pair.
    pub fn default_variant(&self) -> Option<(&ModelFamily, &VariantConfig)> {
        self.find_variant(&self.default_model)
    }

    /// All variant ids across every model family.
    pub fn all_variant_ids(&self) -> Vec<&str> {
        self.iter_variants().map(|(_, v)| v.id.as_str()).collect()
    }

    /// Iterate over all `(family, variant)` pairs.
    pub fn iter_variants(&self) -> impl Iterator<Item = (&ModelFamily, &VariantConfig)> {
        self.models
            .values()
            .flat_map(|f| f.variants.values().map(move |v| (f, v)))
    }
}

impl ModelFamily {
    /// Directory holding this family's files under `model_dir`.
    pub fn local_dir(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(&self.repo_id)
    }

    /// Expected location of the family's `tokenizer.json`.
    pub fn tokenizer_path(&self, model_dir: &Path) -> PathBuf {
        self.local_dir(model_dir).join(&self.tokenizer_file)
    }

    /// Expected location of a variant's ONNX graph.
    pub fn variant_path(&self, model_dir: &Path, variant: &VariantConfig) -> PathBuf {
        self.local_dir(model_dir).join(&variant.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry() {
        let reg = registry();
        assert_eq!(reg.default_model, "turn-detector-q8");
        assert_eq!(reg.models.len(), 1, "Expected exactly 1 model family");
    }

    #[test]
    fn test_find_variant() {
        let reg = registry();
        let (family, variant) = reg
            .find_variant("turn-detector-q8")
            .expect("variant not found");
        assert_eq!(family.repo_id, "livekit/turn-detector");
        assert_eq!(variant.filename, "model_quantized.onnx");
        assert_eq!(family.turn_end_marker, "<|im_end|>");
        assert_eq!(family.turn_start_marker, "<|im_start|>");
    }

    #[test]
    fn test_default_variant() {
        let reg = registry();
        let (family, variant) = reg.default_variant().expect("default not found");
        assert_eq!(variant.id, "turn-detector-q8");
        assert_eq!(family.tokenizer_file, "tokenizer.json");
    }

    #[test]
    fn test_unknown_variant_returns_none() {
        let reg = registry();
        assert!(reg.find_variant("nonexistent-model").is_none());
    }

    #[test]
    fn test_variant_ids_unique() {
        let reg = registry();
        let ids = reg.all_variant_ids();
        let unique: std::collections::HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len(), "Duplicate variant ids found");
        assert_eq!(reg.iter_variants().count(), ids.len());
    }

    #[test]
    fn test_local_paths() {
        let reg = registry();
        let (family, variant) = reg.default_variant().unwrap();
        let dir = Path::new("/models");
        assert_eq!(
            family.variant_path(dir, variant),
            PathBuf::from("/models/livekit/turn-detector/model_quantized.onnx")
        );
        assert_eq!(
            family.tokenizer_path(dir),
            PathBuf::from("/models/livekit/turn-detector/tokenizer.json")
        );
    }
}
