//! Settings for tabula.
//!
//! [`Settings`] holds logging options and a [`DatabaseSettings`] section that
//! drivers and the statement compiler read. Every field has a default so a
//! partial TOML file is enough; see [`settings_loader`](crate::settings_loader).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Database connection and statement-generation options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The logical database name, used when qualifying table names.
    pub name: String,
    /// Filesystem location for file-backed drivers. `None` lets the driver
    /// pick a location.
    pub path: Option<PathBuf>,
    /// Whether generated statements qualify table names with the database
    /// name (`` `db`.`table` ``).
    pub prefix_table_names: bool,
    /// Whether generated statements use named (`@name`) instead of
    /// positional (`?`) parameters.
    pub named_parameters: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            path: None,
            prefix_table_names: false,
            named_parameters: false,
        }
    }
}

/// The complete set of tabula settings.
///
/// # Examples
///
/// ```
/// use tabula_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.database.name, "main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,
    /// The log level filter (e.g. "info", "debug", "tabula_db=trace").
    pub log_level: String,
    /// Database options.
    pub database: DatabaseSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            database: DatabaseSettings::default(),
        }
    }
}
