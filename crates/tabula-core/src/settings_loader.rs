//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `TABULA_DEBUG` | `debug` |
//! | `TABULA_LOG_LEVEL` | `log_level` |
//! | `TABULA_DB_NAME` | `database.name` |
//! | `TABULA_DB_PATH` | `database.path` |
//! | `TABULA_DB_PREFIX_TABLE_NAMES` | `database.prefix_table_names` |
//! | `TABULA_DB_NAMED_PARAMETERS` | `database.named_parameters` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use tabula_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/tabula.toml").unwrap();
//! ```

use std::path::{Path, PathBuf};

use crate::error::DbError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Keys absent from the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, DbError> {
    // Go through serde_json so partial documents merge over the defaults.
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| DbError::Configuration(format!("Failed to parse TOML: {e}")))?;

    let json_value = toml_to_json(toml_value);
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        DbError::Configuration(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, json_value);
    serde_json::from_value(merged).map_err(|e| {
        DbError::Configuration(format!("Failed to deserialize settings from TOML: {e}"))
    })
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, DbError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        DbError::Configuration(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, DbError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `TABULA_*` environment variable overrides to a settings struct.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("TABULA_DEBUG") {
        settings.debug = parse_flag(&val);
    }

    if let Ok(val) = std::env::var("TABULA_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("TABULA_DB_NAME") {
        settings.database.name = val;
    }

    if let Ok(val) = std::env::var("TABULA_DB_PATH") {
        settings.database.path = if val.is_empty() {
            None
        } else {
            Some(PathBuf::from(val))
        };
    }

    if let Ok(val) = std::env::var("TABULA_DB_PREFIX_TABLE_NAMES") {
        settings.database.prefix_table_names = parse_flag(&val);
    }

    if let Ok(val) = std::env::var("TABULA_DB_NAMED_PARAMETERS") {
        settings.database.named_parameters = parse_flag(&val);
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_flag(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
