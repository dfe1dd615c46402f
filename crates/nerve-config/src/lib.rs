use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment keys
// ─────────────────────────────────────────────────────────────────────────────

pub const ENV_CONFIG_FILE: &str = "NERVE_CONFIG";
pub const ENV_HOST: &str = "NERVE_HOST";
pub const ENV_PORT: &str = "NERVE_PORT";
pub const ENV_METRICS_PORT: &str = "NERVE_METRICS_PORT";
pub const ENV_MODEL_PATH: &str = "NERVE_MODEL_PATH";
pub const ENV_INFERENCE_TIMEOUT_MS: &str = "NERVE_INFERENCE_TIMEOUT_MS";
pub const ENV_MAX_INPUT_CHARS: &str = "NERVE_MAX_INPUT_CHARS";

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Port of the scrape endpoint. `None` disables it.
    pub metrics_port: Option<u16>,
    /// Model file to load instead of the embedded default.
    pub model_path: Option<PathBuf>,
    pub inference_timeout_ms: u64,
    /// Reject longer inputs with 413. `None` means unlimited.
    pub max_input_chars: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            metrics_port: Some(8000),
            model_path: None,
            inference_timeout_ms: 30_000,
            max_input_chars: None,
        }
    }
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults, then the JSON file named by `NERVE_CONFIG`, then individual
    /// `NERVE_*` overrides.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match lookup(ENV_CONFIG_FILE) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        settings.apply_overrides(&lookup)?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = parse(ENV_PORT, &port)?;
        }
        if let Some(port) = lookup(ENV_METRICS_PORT) {
            self.metrics_port = match port.trim().to_ascii_lowercase().as_str() {
                "" | "off" | "none" | "disabled" => None,
                p => Some(parse(ENV_METRICS_PORT, p)?),
            };
        }
        if let Some(path) = lookup(ENV_MODEL_PATH) {
            self.model_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(ms) = lookup(ENV_INFERENCE_TIMEOUT_MS) {
            self.inference_timeout_ms = parse(ENV_INFERENCE_TIMEOUT_MS, &ms)?;
        }
        if let Some(limit) = lookup(ENV_MAX_INPUT_CHARS) {
            self.max_input_chars = match limit.trim() {
                "" => None,
                l => Some(parse(ENV_MAX_INPUT_CHARS, l)?),
            };
        }
        Ok(())
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn metrics_addr(&self) -> Option<String> {
        self.metrics_port.map(|p| format!("{}:{}", self.host, p))
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.api_addr(), "0.0.0.0:8080");
        assert_eq!(settings.metrics_addr().as_deref(), Some("0.0.0.0:8000"));
        assert_eq!(settings.inference_timeout(), Duration::from_secs(30));
        assert!(settings.max_input_chars.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (ENV_HOST, "127.0.0.1"),
            (ENV_PORT, "9090"),
            (ENV_METRICS_PORT, "off"),
            (ENV_MODEL_PATH, "/models/ner.json"),
            (ENV_INFERENCE_TIMEOUT_MS, "1500"),
            (ENV_MAX_INPUT_CHARS, "10000"),
        ]))
        .unwrap();

        assert_eq!(settings.api_addr(), "127.0.0.1:9090");
        assert!(settings.metrics_addr().is_none());
        assert_eq!(settings.model_path, Some(PathBuf::from("/models/ner.json")));
        assert_eq!(settings.inference_timeout_ms, 1500);
        assert_eq!(settings.max_input_chars, Some(10_000));
    }

    #[test]
    fn test_invalid_port() {
        let err = Settings::from_lookup(lookup(&[(ENV_PORT, "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_PORT, .. }));
    }

    #[test]
    fn test_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 7000, "max_input_chars": 64}}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let settings = Settings::from_lookup(lookup(&[
            (ENV_CONFIG_FILE, path.as_str()),
            (ENV_PORT, "7001"),
        ]))
        .unwrap();

        assert_eq!(settings.port, 7001);
        assert_eq!(settings.max_input_chars, Some(64));
        assert_eq!(settings.host, "0.0.0.0");
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::from_lookup(lookup(&[(ENV_CONFIG_FILE, "/nonexistent/nerve.json")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
