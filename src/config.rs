// Credential file loading: plain KEY=value lines, consumed as an opaque
// name-to-value mapping.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Credential key for the relational store location.
pub const DB_PATH: &str = "DB_PATH";
/// Credential key for the archival store root.
pub const ARCHIVE_ROOT: &str = "ARCHIVE_ROOT";
/// Optional credential key enabling the streaming delivery sink.
pub const STREAM_PATH: &str = "STREAM_PATH";

/// Opaque credential set parsed from a config file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl Credentials {
    /// Parse a `KEY=value` file. Blank lines and `#` comments are
    /// skipped; a line without `=` is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path)
            .with_context(|| format!("no config file found at {}", path.display()))?;
        Self::parse(&body)
    }

    fn parse(body: &str) -> Result<Self> {
        let mut values = HashMap::new();

        for (lineno, line) in body.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                bail!("malformed config line {}: {line:?}", lineno + 1);
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Credentials { values })
    }

    /// Required value; errors if the key is absent.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .with_context(|| format!("missing credential: {key}"))
    }

    /// Optional value.
    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Credentials {
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}
