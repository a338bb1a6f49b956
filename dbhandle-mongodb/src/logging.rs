//! Logging setup.
//!
//! The handle emits `tracing` events: `info` on connect and disconnect,
//! `debug` for every operation (with a `collection` field) and `trace` for
//! working session acquire/release. Applications with their own subscriber
//! need nothing from this module.
//!
//! With the `tracing-subscriber` feature, [`init`] installs a subscriber
//! configured from the environment:
//!
//! - `DBHANDLE_DEBUG=true|1|yes` - enable debug logging
//! - `DBHANDLE_LOG_LEVEL=trace|debug|info|warn|error` - set the level
//! - `DBHANDLE_LOG_FORMAT=json|pretty|compact` - output format (default: json)

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Whether `DBHANDLE_DEBUG` enables debug logging.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("DBHANDLE_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The level from `DBHANDLE_LOG_LEVEL`.
///
/// Unknown or missing values give "debug" when `DBHANDLE_DEBUG` is set,
/// otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("DBHANDLE_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// The format from `DBHANDLE_LOG_FORMAT`, defaulting to "json".
pub fn get_log_format() -> &'static str {
    env::var("DBHANDLE_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Install the environment-configured subscriber. Later calls are no-ops,
/// as is a call with neither `DBHANDLE_DEBUG` nor `DBHANDLE_LOG_LEVEL` set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("DBHANDLE_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "dbhandle={},dbhandle_mongodb={},mongodb=warn",
                level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match get_log_format() {
                "json" => registry.with(fmt::layer().json()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "dbhandle logging initialized"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases live in one test: they share process-wide variables.
    #[test]
    fn test_env_driven_settings() {
        // SAFETY: no other test in this crate touches these variables.
        unsafe {
            env::remove_var("DBHANDLE_DEBUG");
            env::remove_var("DBHANDLE_LOG_LEVEL");
            env::remove_var("DBHANDLE_LOG_FORMAT");
        }
        assert!(!is_debug_enabled());
        assert_eq!(get_log_level(), "warn");
        assert_eq!(get_log_format(), "json");

        unsafe {
            env::set_var("DBHANDLE_DEBUG", "Yes");
            env::set_var("DBHANDLE_LOG_LEVEL", "verbose");
            env::set_var("DBHANDLE_LOG_FORMAT", "COMPACT");
        }
        assert!(is_debug_enabled());
        assert_eq!(get_log_level(), "debug");
        assert_eq!(get_log_format(), "compact");

        unsafe {
            env::set_var("DBHANDLE_LOG_LEVEL", "trace");
        }
        assert_eq!(get_log_level(), "trace");

        unsafe {
            env::remove_var("DBHANDLE_DEBUG");
            env::remove_var("DBHANDLE_LOG_LEVEL");
            env::remove_var("DBHANDLE_LOG_FORMAT");
        }
    }
}
