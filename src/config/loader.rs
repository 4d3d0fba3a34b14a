//! Configuration loading and environment parsing.

use super::validation::validate_config_security;
use super::Config;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Load configuration with the following precedence (highest first):
/// 1) `MOONFALL_CONFIG_JSON` env var containing raw JSON
/// 2) File pointed at by `MOONFALL_CONFIG_PATH`
/// 3) `config.json` in the current working directory
/// 4) Defaults compiled into the binary
///
/// Individual fields can additionally be overridden by environment variables
/// with the `MOONFALL__` prefix and `__` as nested separator, e.g.
/// `MOONFALL__PORT=8080` or `MOONFALL__RULES__NIGHT_SECONDS=90`.
///
/// Errors while reading or parsing any source are printed to stderr and the
/// remaining sources still apply. Validation errors are logged but not
/// propagated: `load()` always returns a `Config`; main re-validates and
/// fails hard where it matters.
#[must_use]
pub fn load() -> Config {
    use std::env;
    use std::path::PathBuf;

    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    if let Ok(json) = env::var("MOONFALL_CONFIG_JSON") {
        if let Some(value) = parse_json_document(&json, "MOONFALL_CONFIG_JSON") {
            merge_values(&mut merged, value);
        }
    }

    if let Ok(path) = env::var("MOONFALL_CONFIG_PATH") {
        merge_file_source(&mut merged, &PathBuf::from(path));
    }

    merge_file_source(&mut merged, &PathBuf::from("config.json"));

    apply_env_overrides(&mut merged);

    let config = match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    };

    if let Err(e) = validate_config_security(&config) {
        eprintln!("Configuration validation error: {e}");
    }

    config
}

fn parse_json_document(raw: &str, label: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("Failed to parse config from {label}: {err}");
            None
        }
    }
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => {
            if let Some(value) = parse_json_document(&contents, &format!("file {}", path.display()))
            {
                merge_values(target, value);
            }
        }
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", path.display(), err);
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix("MOONFALL__") else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if segments.is_empty() {
            continue;
        }

        let value = parse_scalar(raw_value.trim());
        set_nested_value(root, &segments, value);
    }
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    match segments {
        [] => *target = value,
        [leaf] => {
            ensure_object(target).insert(leaf.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = ensure_object(target)
                .entry(head.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            set_nested_value(entry, rest, value);
        }
    }
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }

    // SAFETY: The branch above guarantees `value` is a `Value::Object`.
    #[allow(clippy::expect_used)]
    value
        .as_object_mut()
        .expect("value should be coerced into an object")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides_scalars_and_keeps_siblings() {
        let mut base = serde_json::json!({"port": 3641, "rules": {"night_seconds": 120, "day_seconds": 180}});
        merge_values(
            &mut base,
            serde_json::json!({"rules": {"night_seconds": 60}}),
        );
        assert_eq!(base["port"], 3641);
        assert_eq!(base["rules"]["night_seconds"], 60);
        assert_eq!(base["rules"]["day_seconds"], 180);
    }

    #[test]
    fn test_set_nested_value_creates_path() {
        let mut root = Value::Object(serde_json::Map::new());
        set_nested_value(
            &mut root,
            &["security".into(), "cors_origins".into()],
            Value::String("*".into()),
        );
        assert_eq!(root["security"]["cors_origins"], "*");
    }

    #[test]
    fn test_parse_scalar_types() {
        assert_eq!(parse_scalar("8080"), Value::from(8080));
        assert_eq!(parse_scalar("true"), Value::from(true));
        assert_eq!(parse_scalar("hello"), Value::from("hello"));
    }
}
