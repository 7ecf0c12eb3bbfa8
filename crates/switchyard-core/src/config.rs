use std::path::Path;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchyardError};

/// Top-level Switchyard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Orchestration engine behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Abort all unresolved work on the first agent error.
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
    /// On abort, drop in-flight sibling invocations instead of letting them
    /// finish silently.
    #[serde(default)]
    pub cancel_in_flight: bool,
    /// Maximum concurrent invocations within one level (0 = unbounded).
    #[serde(default)]
    pub max_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fail_fast: default_fail_fast(),
            cancel_in_flight: false,
            max_concurrency: 0,
        }
    }
}

impl EngineConfig {
    /// Strict mode used for single-pipeline ingestion runs.
    pub fn fail_fast() -> Self {
        Self::default()
    }

    /// Partial-success mode used for independent query agents.
    pub fn tolerant() -> Self {
        Self {
            fail_fast: false,
            ..Self::default()
        }
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    pub fn with_cancel_in_flight(mut self, cancel: bool) -> Self {
        self.cancel_in_flight = cancel;
        self
    }
}

fn default_fail_fast() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Reject output keys that the schema does not declare.
    #[serde(default = "default_reject_unknown_keys")]
    pub reject_unknown_keys: bool,
    /// Run the non-blocking cross-agent consistency pass.
    #[serde(default = "default_cross_validate")]
    pub cross_validate: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            reject_unknown_keys: default_reject_unknown_keys(),
            cross_validate: default_cross_validate(),
        }
    }
}

fn default_reject_unknown_keys() -> bool {
    true
}

fn default_cross_validate() -> bool {
    true
}

/// Keywords matched against agent id/name to infer synthesis roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_location_keywords")]
    pub location_keywords: Vec<String>,
    #[serde(default = "default_temporal_keywords")]
    pub temporal_keywords: Vec<String>,
    #[serde(default = "default_sentiment_keywords")]
    pub sentiment_keywords: Vec<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            location_keywords: default_location_keywords(),
            temporal_keywords: default_temporal_keywords(),
            sentiment_keywords: default_sentiment_keywords(),
        }
    }
}

fn default_location_keywords() -> Vec<String> {
    vec!["geo".into(), "location".into(), "address".into()]
}

fn default_temporal_keywords() -> Vec<String> {
    vec!["temporal".into(), "time".into(), "date".into()]
}

fn default_sentiment_keywords() -> Vec<String> {
    vec!["entity".into(), "entities".into(), "sentiment".into()]
}

/// Tracing filter for the operator binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "switchyard=info,warn".to_string()
}

impl SwitchyardConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchyardError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| SwitchyardError::Config(e.to_string()))
    }
}

/// Expand `${VAR}` and `${VAR:-fallback}` references.
///
/// An unset variable without a fallback is left as written.
pub fn expand_env_vars(input: &str) -> String {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap();
    pattern
        .replace_all(input, |caps: &Captures<'_>| {
            match (std::env::var(&caps[1]), caps.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(fallback)) => fallback.as_str().to_string(),
                (Err(_), None) => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = SwitchyardConfig::from_toml_str("").unwrap();
        assert!(config.engine.fail_fast);
        assert!(!config.engine.cancel_in_flight);
        assert_eq!(config.engine.max_concurrency, 0);
        assert!(config.validation.reject_unknown_keys);
        assert!(config.synthesis.location_keywords.contains(&"geo".to_string()));
        assert_eq!(config.log.filter, "switchyard=info,warn");
    }

    #[test]
    fn test_partial_sections() {
        let config = SwitchyardConfig::from_toml_str(
            r#"
[engine]
fail_fast = false
max_concurrency = 4

[synthesis]
location_keywords = ["where"]
"#,
        )
        .unwrap();
        assert_eq!(config.engine, EngineConfig::tolerant().with_max_concurrency(4));
        assert_eq!(config.synthesis.location_keywords, vec!["where"]);
        assert_eq!(config.synthesis.temporal_keywords, default_temporal_keywords());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_SWITCHYARD_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_SWITCHYARD_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_SWITCHYARD_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_SWITCHYARD_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_SWITCHYARD_VAR}\"");
    }

    #[test]
    fn test_expand_env_vars_fallback() {
        std::env::remove_var("SWITCHYARD_UNSET_FILTER");
        let result = expand_env_vars("filter = \"${SWITCHYARD_UNSET_FILTER:-switchyard=debug}\"");
        assert_eq!(result, "filter = \"switchyard=debug\"");
        assert_eq!(expand_env_vars("cost = \"$5 {x}\""), "cost = \"$5 {x}\"");
    }

    #[test]
    fn test_load_missing_file() {
        let err = SwitchyardConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, SwitchyardError::ConfigNotFound(_)));
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"[engine\nfail_fast = ").unwrap();
        let err = SwitchyardConfig::load(tmp.path()).unwrap_err();
        assert!(matches!(err, SwitchyardError::Config(_)));
    }
}
