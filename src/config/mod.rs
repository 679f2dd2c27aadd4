//! Decline Defaults Configuration Module
//!
//! Provides the global "default properties" loaded from a TOML file: the
//! b-factors, terminal declines and economics every estimated well starts
//! with, plus curve-fit and forecast tuning.
//!
//! ## Loading Order
//!
//! 1. `WELL_DECLINE_CONFIG` environment variable (path to TOML file)
//! 2. `decline_defaults.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(DefaultProperties::load());
//!
//! let b = config::get().decline.oil_b_factor;
//! ```
//!
//! Library entry points also accept a `&DefaultProperties` directly, so
//! initializing the global is optional.

mod decline_config;
pub mod defaults;
pub mod validation;

pub use decline_config::*;

use std::sync::OnceLock;

/// Global defaults, initialized once at startup.
static DEFAULT_PROPERTIES: OnceLock<DefaultProperties> = OnceLock::new();

/// Initialize the global defaults.
///
/// Later calls are ignored with a warning.
pub fn init(config: DefaultProperties) {
    if DEFAULT_PROPERTIES.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global defaults.
///
/// Panics if `init()` has not been called. A missing config is a startup
/// bug, not a recoverable condition; use `is_initialized()` on optional paths.
pub fn get() -> &'static DefaultProperties {
    DEFAULT_PROPERTIES
        .get()
        .expect("config::get() called before config::init(), this is a startup bug")
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    DEFAULT_PROPERTIES.get().is_some()
}
