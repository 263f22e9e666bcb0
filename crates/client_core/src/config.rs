use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub server_url: String,
    pub access_token: Option<String>,
    pub page_size: u32,
    /// Maximum concurrent count sub-queries during aggregation.
    pub aggregation_width: usize,
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            access_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            aggregation_width: 4,
            request_timeout_secs: 15,
        }
    }
}

impl ClientSettings {
    /// Checks the server URL and clamps numeric settings into usable ranges.
    pub fn validate(mut self) -> Result<Self> {
        Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url '{}'", self.server_url))?;
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.aggregation_width = self.aggregation_width.max(1);
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        Ok(self)
    }
}

pub fn load_settings() -> ClientSettings {
    load_settings_with(Path::new(DEFAULT_SETTINGS_FILE), |key| {
        std::env::var(key).ok()
    })
}

/// Defaults, then the top-level keys of `path` if it exists, then
/// environment overrides looked up through `env`.
pub fn load_settings_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Some(file_cfg) = read_settings_file(path) {
        if let Some(v) = file_cfg.get("server_url") {
            settings.server_url = v.clone();
        }
        if let Some(v) = file_cfg.get("access_token") {
            settings.access_token = Some(v.clone());
        }
        if let Some(v) = file_cfg.get("page_size").and_then(|v| v.parse().ok()) {
            settings.page_size = v;
        }
        if let Some(v) = file_cfg
            .get("aggregation_width")
            .and_then(|v| v.parse().ok())
        {
            settings.aggregation_width = v;
        }
        if let Some(v) = file_cfg
            .get("request_timeout_secs")
            .and_then(|v| v.parse().ok())
        {
            settings.request_timeout_secs = v;
        }
    }

    if let Some(v) = env("PANTRY_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("PANTRY_ACCESS_TOKEN") {
        settings.access_token = Some(v);
    }

    if let Some(v) = env("APP__PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.page_size = parsed;
        }
    }
    if let Some(v) = env("APP__AGGREGATION_WIDTH") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.aggregation_width = parsed;
        }
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    settings
}

/// Top-level scalars of `path` as strings. Tables and arrays are skipped; a
/// file that does not parse is ignored as a whole.
fn read_settings_file(path: &Path) -> Option<HashMap<String, String>> {
    let raw = fs::read_to_string(path).ok()?;
    let table = match toml::from_str::<toml::Table>(&raw) {
        Ok(table) => table,
        Err(err) => {
            warn!("config: ignoring {}: {err}", path.display());
            return None;
        }
    };
    let file_cfg = table
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                toml::Value::String(v) => v,
                toml::Value::Integer(v) => v.to_string(),
                toml::Value::Float(v) => v.to_string(),
                toml::Value::Boolean(v) => v.to_string(),
                _ => return None,
            };
            Some((key, value))
        })
        .collect();
    Some(file_cfg)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
