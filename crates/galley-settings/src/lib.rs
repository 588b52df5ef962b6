//! # galley-settings
//!
//! Layered configuration for the Galley agent.
//!
//! 1. **Compiled defaults**: [`GalleySettings::default()`]
//! 2. **User file**: `~/.galley/settings.json`, deep-merged over defaults
//! 3. **Environment**: `GALLEY_*` overrides
//!
//! Loading validates the result, so a returned [`GalleySettings`] always
//! produces a usable [`galley_realtime::ClientConfig`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings, load_settings_from_path, load_with,
    settings_home, settings_path,
};
pub use types::*;
