//! Layered settings loading.
//!
//! Precedence, lowest first:
//! 1. [`GalleySettings::default()`]
//! 2. `~/.galley/settings.json`, deep-merged over the defaults
//! 3. `GALLEY_*` environment variables
//!
//! Overrides are read through a lookup closure so tests never touch the
//! process environment.

use std::path::{Path, PathBuf};

use galley_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::GalleySettings;

/// Directory holding the settings file and local state (`~/.galley`).
pub fn settings_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".galley")
}

/// Default settings file location.
pub fn settings_path() -> PathBuf {
    settings_home().join("settings.json")
}

/// Load from the default path, apply process env overrides, validate.
pub fn load_settings() -> Result<GalleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with process env overrides.
///
/// A missing file yields defaults. Malformed JSON and values failing
/// [`GalleySettings::validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<GalleySettings> {
    load_with(path, |name| std::env::var(name).ok())
}

/// Load from `path`, resolving overrides through `lookup`.
pub fn load_with<F>(path: &Path, lookup: F) -> Result<GalleySettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(GalleySettings::default())?;
    let merged = if path.exists() {
        debug!(path = %path.display(), "loading settings file");
        let raw = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&raw)?;
        deep_merge(defaults, user)
    } else {
        debug!(path = %path.display(), "no settings file, using defaults");
        defaults
    };

    let mut settings: GalleySettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Merge `source` into `target`.
///
/// Objects merge per key, recursively. Arrays and scalars from `source`
/// replace. `null` in `source` leaves the target value in place.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut into), Value::Object(from)) => {
            for (key, value) in from.into_iter().filter(|(_, v)| !v.is_null()) {
                let next = match into.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = into.insert(key, next);
            }
            Value::Object(into)
        }
        (_, replacement) => replacement,
    }
}

/// Apply `GALLEY_*` overrides. Invalid values are logged and skipped.
pub fn apply_overrides<F>(settings: &mut GalleySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Overrides { lookup };

    // ── Realtime ────────────────────────────────────────────────────
    if let Some(v) = env.string("GALLEY_BASE_URL") {
        settings.realtime.base_url = v;
    }
    if let Some(v) = env.string("GALLEY_RESTAURANT_ID") {
        settings.restaurant_id = Some(v);
    }
    if let Some(v) = env.u64("GALLEY_HEARTBEAT_INTERVAL_MS", 1_000, 600_000) {
        settings.realtime.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("GALLEY_CONNECT_TIMEOUT_MS", 100, 120_000) {
        settings.realtime.connect_timeout_ms = v;
    }
    if let Some(v) = env.u64("GALLEY_BATCH_WINDOW_MS", 1, 1_000) {
        settings.realtime.batch_window_ms = v;
    }
    if let Some(v) = env.u32("GALLEY_RECONNECT_MAX_ATTEMPTS", 1, 1_000) {
        settings.realtime.reconnect.max_attempts = v;
    }
    if let Some(v) = env.u64("GALLEY_RECONNECT_BASE_DELAY_MS", 1, 600_000) {
        settings.realtime.reconnect.base_delay_ms = v;
    }
    if let Some(v) = env.u64("GALLEY_RECONNECT_MAX_DELAY_MS", 1, 3_600_000) {
        settings.realtime.reconnect.max_delay_ms = v;
    }

    // ── Consumers ───────────────────────────────────────────────────
    if let Some(v) = env.u64("GALLEY_CHECKOUT_POLLING_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.checkout.polling_timeout_ms = v;
    }
    if let Some(v) = env.string("GALLEY_CART_DIR") {
        settings.cart.storage_dir = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("GALLEY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("GALLEY_LOG_FORMAT", parse_log_format) {
        settings.logging.format = v;
    }
}

// ── Parsers ─────────────────────────────────────────────────────────────────

/// Parse a `u64` within `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a `u32` within `min..=max`.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// `compact` or `json`, case-insensitive.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.trim().to_ascii_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

struct Overrides<F> {
    lookup: F,
}

impl<F> Overrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.string(name)?;
        let parsed = parse(&raw);
        if parsed.is_none() {
            warn!(key = name, value = %raw, "ignoring invalid env override");
        }
        parsed
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, |v| parse_u64_range(v, min, max))
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.parsed(name, |v| parse_u32_range(v, min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use galley_core::logging::capture_logs;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn write_file(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn merge_objects_recursively() {
        let merged = deep_merge(
            json!({"a": {"x": 1, "y": 2}, "b": 3}),
            json!({"a": {"y": 20}, "c": 4}),
        );
        assert_eq!(merged, json!({"a": {"x": 1, "y": 20}, "b": 3, "c": 4}));
    }

    #[test]
    fn merge_replaces_arrays_and_skips_nulls() {
        let merged = deep_merge(
            json!({"list": [1, 2, 3], "keep": "yes"}),
            json!({"list": [9], "keep": null}),
        );
        assert_eq!(merged, json!({"list": [9], "keep": "yes"}));
    }

    #[test]
    fn merge_scalar_over_object() {
        assert_eq!(deep_merge(json!({"a": 1}), json!(5)), json!(5));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_with(&dir.path().join("absent.json"), no_env).unwrap();
        assert_eq!(settings, GalleySettings::default());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            r#"{
                "restaurantId": "r_1",
                "realtime": {
                    "baseUrl": "https://api.example.com/ws",
                    "reconnect": {"maxAttempts": 4}
                },
                "logging": {"format": "json"}
            }"#,
        );
        let settings = load_with(&path, no_env).unwrap();
        assert_eq!(settings.restaurant_id.as_deref(), Some("r_1"));
        assert_eq!(settings.realtime.base_url, "https://api.example.com/ws");
        assert_eq!(settings.realtime.reconnect.max_attempts, 4);
        assert_eq!(settings.realtime.reconnect.base_delay_ms, 1000);
        assert_eq!(settings.realtime.heartbeat_interval_ms, 30_000);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "{ not json");
        assert!(matches!(load_with(&path, no_env), Err(SettingsError::Json(_))));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, r#"{"realtime": {"batchWindowMs": 0}}"#);
        assert!(matches!(
            load_with(&path, no_env),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn env_overrides_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, r#"{"restaurantId": "from_file"}"#);
        let env = env_of(&[
            ("GALLEY_RESTAURANT_ID", "from_env"),
            ("GALLEY_BASE_URL", "wss://rt.example.com"),
            ("GALLEY_HEARTBEAT_INTERVAL_MS", "5000"),
            ("GALLEY_RECONNECT_MAX_ATTEMPTS", "3"),
            ("GALLEY_LOG_LEVEL", "galley_realtime=debug"),
            ("GALLEY_LOG_FORMAT", "JSON"),
            ("GALLEY_CART_DIR", "/var/lib/galley"),
        ]);
        let settings = load_with(&path, env).unwrap();
        assert_eq!(settings.restaurant_id.as_deref(), Some("from_env"));
        assert_eq!(settings.realtime.base_url, "wss://rt.example.com");
        assert_eq!(settings.realtime.heartbeat_interval_ms, 5000);
        assert_eq!(settings.realtime.reconnect.max_attempts, 3);
        assert_eq!(settings.logging.level, "galley_realtime=debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.cart.storage_dir, "/var/lib/galley");
    }

    #[test]
    fn zero_reconnect_attempts_override_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "{}");
        let settings = load_with(&path, env_of(&[("GALLEY_RECONNECT_MAX_ATTEMPTS", "0")])).unwrap();
        assert_eq!(settings.realtime.reconnect.max_attempts, 10);
    }

    #[test]
    fn invalid_override_is_ignored_with_warning() {
        let mut settings = GalleySettings::default();
        let (logs, _guard) = capture_logs();
        apply_overrides(
            &mut settings,
            env_of(&[
                ("GALLEY_HEARTBEAT_INTERVAL_MS", "10"),
                ("GALLEY_BATCH_WINDOW_MS", "abc"),
                ("GALLEY_LOG_FORMAT", "xml"),
            ]),
        );
        assert_eq!(settings, GalleySettings::default());
        assert_eq!(logs.count_at_level(tracing::Level::WARN), 3);
        assert!(logs.has_message("ignoring invalid env override"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut settings = GalleySettings::default();
        apply_overrides(&mut settings, env_of(&[("GALLEY_BASE_URL", "")]));
        assert_eq!(settings.realtime.base_url, "http://localhost:3001/ws");
    }

    #[test]
    fn range_parsers() {
        assert_eq!(parse_u64_range("500", 1, 1000), Some(500));
        assert_eq!(parse_u64_range(" 1000 ", 1, 1000), Some(1000));
        assert_eq!(parse_u64_range("1001", 1, 1000), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
        assert_eq!(parse_u32_range("0", 0, 5), Some(0));
        assert_eq!(parse_u32_range("x", 0, 5), None);
    }

    #[test]
    fn log_format_parser() {
        assert_eq!(parse_log_format("json"), Some(LogFormat::Json));
        assert_eq!(parse_log_format("Compact"), Some(LogFormat::Compact));
        assert_eq!(parse_log_format("text"), Some(LogFormat::Compact));
        assert_eq!(parse_log_format("yaml"), None);
    }

    #[test]
    fn default_path_is_under_galley_home() {
        let path = settings_path();
        assert!(path.ends_with(".galley/settings.json"));
        assert_eq!(path.parent(), Some(settings_home().as_path()));
    }
}
