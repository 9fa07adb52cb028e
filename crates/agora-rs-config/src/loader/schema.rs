//! Structural checks for Agora JSON5 config layers.
//!
//! Layers are partial documents, so every key is optional; only unknown keys
//! and wrongly typed values are rejected here. Range checks live in
//! `AgoraConfig::validate` and run on the merged result.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Expected JSON type of a leaf setting.
#[derive(Clone, Copy)]
enum Kind {
    Str,
    Int,
    Number,
}

const DEDUP_KEYS: &[(&str, Kind)] = &[
    ("near_threshold", Kind::Number),
    ("related_threshold", Kind::Number),
    ("neighbors", Kind::Int),
    ("pairwise_limit", Kind::Int),
];

const BUS_KEYS: &[(&str, Kind)] = &[
    ("batch_size", Kind::Int),
    ("batch_interval_ms", Kind::Int),
    ("max_retries", Kind::Int),
    ("retry_backoff_ms", Kind::Int),
    ("delivery_timeout_ms", Kind::Int),
    ("queue_capacity", Kind::Int),
];

const SEARCH_KEYS: &[(&str, Kind)] = &[
    ("text_weight", Kind::Number),
    ("vector_weight", Kind::Number),
    ("candidate_pool", Kind::Int),
    ("max_batch_size", Kind::Int),
    ("timeline_page_size", Kind::Int),
];

const SUMMARY_KEYS: &[(&str, Kind)] = &[("max_chars", Kind::Int)];

const EMBEDDING_KEYS: &[(&str, Kind)] = &[("model", Kind::Str), ("dimensions", Kind::Int)];

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(
        map,
        &[
            "$schema",
            "dedup",
            "bus",
            "search",
            "summary",
            "store",
            "embedding",
        ],
        layer,
        "",
    )?;

    if let Some(value) = map.get("$schema") {
        expect_kind(value, Kind::Str, layer, "$schema")?;
    }
    for (section, keys) in [
        ("dedup", DEDUP_KEYS),
        ("bus", BUS_KEYS),
        ("search", SEARCH_KEYS),
        ("summary", SUMMARY_KEYS),
        ("embedding", EMBEDDING_KEYS),
    ] {
        if let Some(value) = map.get(section) {
            validate_section(value, keys, layer, section)?;
        }
    }
    if let Some(value) = map.get("store") {
        validate_store(value, layer, "store")?;
    }
    Ok(())
}

/// Validate a flat section whose keys all map to scalar settings.
fn validate_section(
    value: &Value,
    keys: &[(&str, Kind)],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    for (key, entry) in map {
        let Some((_, kind)) = keys.iter().find(|(name, _)| name == key) else {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        };
        expect_kind(entry, *kind, layer, &join_path(path, key))?;
    }
    Ok(())
}

fn validate_store(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["provider", "path"], layer, path)?;

    if let Some(value) = map.get("provider") {
        let provider_path = join_path(path, "provider");
        let Some(provider) = value.as_str() else {
            return Err(invalid_field(layer, &provider_path, "expected string"));
        };
        if !matches!(provider, "memory" | "file") {
            return Err(invalid_field(layer, &provider_path, "invalid store provider"));
        }
    }
    if let Some(value) = map.get("path") {
        if !value.is_null() {
            expect_kind(value, Kind::Str, layer, &join_path(path, "path"))?;
        }
    }
    Ok(())
}

fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| invalid_field(layer, path, "expected object"))
}

fn expect_kind(value: &Value, kind: Kind, layer: &str, path: &str) -> Result<(), ConfigError> {
    let (ok, expected) = match kind {
        Kind::Str => (value.is_string(), "expected string"),
        Kind::Int => (value.is_u64(), "expected non-negative integer"),
        Kind::Number => (value.is_number(), "expected number"),
    };
    if ok {
        Ok(())
    } else {
        Err(invalid_field(layer, path, expected))
    }
}

fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Error carrying `layer:path` so the offending file and field are both visible.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let path = if path.is_empty() { "root" } else { path };
    ConfigError::Schema {
        location: format!("{layer}:{path}"),
        reason: message.to_string(),
    }
}
