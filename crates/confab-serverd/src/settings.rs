//! Configuration loading.
//!
//! Precedence, lowest to highest: compiled defaults, the JSON config
//! file (deep-merged), then `CONFAB_*` environment variables.

use std::path::Path;

use anyhow::Context as _;
use confab_server::ServerConfig;
use serde_json::Value;
use tracing::debug;

/// Load the server config with env overrides applied.
///
/// A missing file is fine (defaults apply); an unreadable or invalid
/// file is an error.
pub fn load(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading config file");
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let user: Value = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "config file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut config: ServerConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recursive deep merge: objects merge per key, everything else is
/// replaced, nulls in the source are skipped.
fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                if source_value.is_null() {
                    continue;
                }
                let merged = if let Some(target_value) = target_map.remove(&key) {
                    deep_merge(target_value, source_value)
                } else {
                    source_value
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

fn apply_env_overrides(config: &mut ServerConfig) {
    if let Some(host) = read_env_string("CONFAB_HOST") {
        config.host = host;
    }
    if let Some(port) = read_env_parsed::<u16>("CONFAB_PORT") {
        config.port = port;
    }
    if let Some(max) = read_env_parsed::<usize>("CONFAB_MAX_CONNECTIONS") {
        config.max_connections = max;
    }
    if let Some(depth) = read_env_parsed::<usize>("CONFAB_EVENT_BUFFER") {
        config.event_buffer = depth;
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn read_env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    // Unparseable values fall back to file/default.
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}
