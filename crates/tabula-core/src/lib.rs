//! # tabula-core
//!
//! Foundation types shared by every tabula crate. This crate has no
//! knowledge of tables or queries; it only carries the pieces every other
//! crate needs.
//!
//! ## Modules
//!
//! - [`error`] - The [`DbError`] taxonomy and the [`DbResult`] alias
//! - [`settings`] - [`Settings`] and its database section
//! - [`settings_loader`] - Loading settings from TOML and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{DbError, DbResult, ErrorCategory};
pub use settings::{DatabaseSettings, Settings};
