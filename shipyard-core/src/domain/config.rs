//! Service configuration bundle

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key holding the service name in the rendered bundle
pub const SERVICE_NAME_KEY: &str = "SERVICE_NAME";

/// Key holding the API version in the rendered bundle
pub const API_VERSION_KEY: &str = "API_VERSION";

/// Keys that must carry a non-empty value before an image is built
pub const REQUIRED_KEYS: [&str; 2] = [SERVICE_NAME_KEY, API_VERSION_KEY];

/// Flat key-value configuration baked into the service image
///
/// Entries are kept sorted so the rendered bundle only depends on the
/// entries themselves, never on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    entries: BTreeMap<String, String>,
}

impl ServiceConfig {
    pub fn new(service_name: impl Into<String>, api_version: impl Into<String>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(SERVICE_NAME_KEY.to_string(), service_name.into());
        entries.insert(API_VERSION_KEY.to_string(), api_version.into());
        Self { entries }
    }

    /// Adds a runtime parameter, replacing any previous value for the key
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn service_name(&self) -> &str {
        self.get(SERVICE_NAME_KEY).unwrap_or_default()
    }

    pub fn api_version(&self) -> &str {
        self.get(API_VERSION_KEY).unwrap_or_default()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the required keys that are absent or blank
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| self.get(key).is_none_or(|v| v.trim().is_empty()))
            .collect()
    }

    /// Renders the bundle as `KEY=value` lines in key order
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} ({} key(s))",
            self.service_name(),
            self.api_version(),
            self.entries.len()
        )
    }
}
