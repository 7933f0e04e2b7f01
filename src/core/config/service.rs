use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::types::AppConfig;
use super::validation::validate_config;
use crate::core::errors::RagError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 10] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "auth_",
    "access_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 3] = ["max_tokens", "token_count", "tokens"];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
    override_path: Option<PathBuf>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self {
            paths,
            override_path: None,
        }
    }

    /// Pins the public config file, e.g. from `--config`.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.override_path = Some(path);
        self
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.override_path {
            return path.clone();
        }

        if let Ok(path) = env::var("REVIEW_RAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Defaults, then `config.yml`, then `secrets.yaml`, as one JSON tree.
    pub fn load_raw(&self) -> Result<Value, RagError> {
        let defaults = serde_json::to_value(AppConfig::default()).map_err(RagError::internal)?;
        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        let merged = deep_merge(&deep_merge(&defaults, &public_config), &secrets_config);
        validate_config(&merged)?;
        Ok(merged)
    }

    pub fn load_config(&self) -> Result<AppConfig, RagError> {
        let merged = self.load_raw()?;
        serde_json::from_value(merged).map_err(|e| RagError::Config(e.to_string()))
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

/// A missing file is an empty config; an unparseable one is an error.
fn load_yaml_file(path: &Path) -> Result<Value, RagError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path)?;
    let value = serde_yaml::from_str::<Value>(&contents)
        .map_err(|e| RagError::Config(format!("{}: {}", path.display(), e)))?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(RagError::Config(format!(
            "{}: top level must be a mapping",
            path.display()
        ))),
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProviderKind;
    use serde_json::json;

    fn service_in(dir: &Path) -> ConfigService {
        let paths = AppPaths::with_dirs(dir.to_path_buf(), dir.join("data"));
        ConfigService::new(Arc::new(paths)).with_config_path(dir.join("config.yml"))
    }

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "a": 1,
            "b": { "c": 2, "d": 3 },
            "arr": [1, 2]
        });
        let override_value = json!({
            "b": { "c": 99 },
            "arr": [3],
            "e": "x"
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "a": 1,
                "b": { "c": 99, "d": 3 },
                "arr": [3],
                "e": "x"
            })
        );
    }

    #[test]
    fn missing_files_yield_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = service_in(tmp.path()).load_config().unwrap();

        assert_eq!(config.retrieval.top_k, 2);
        assert_eq!(config.embedding.provider, ProviderKind::Ollama);
        assert_eq!(config.embedding.model, "mxbai-embed-large");
        assert_eq!(config.index.collection, "restaurant_reviews");
    }

    #[test]
    fn yaml_and_secrets_override_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("config.yml"),
            "retrieval:\n  top_k: 5\nllm:\n  provider: openai_compatible\n  base_url: http://localhost:1234\n",
        )
        .unwrap();
        let service = service_in(tmp.path());
        fs::write(service.secrets_path(), "llm:\n  api_key: sk-local\n").unwrap();

        let config = service.load_config().unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.llm.provider, ProviderKind::OpenaiCompatible);
        assert_eq!(config.llm.base_url, "http://localhost:1234");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-local"));
        assert_eq!(config.llm.model, "llama3.2");
    }

    #[test]
    fn invalid_yaml_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("config.yml"), "retrieval: [unclosed").unwrap();

        let err = service_in(tmp.path()).load_config().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "llm": {
                "api_key": "secret",
                "max_tokens": 42
            },
            "embedding": { "api_key": null }
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "llm": {
                    "api_key": "****",
                    "max_tokens": 42
                },
                "embedding": { "api_key": null }
            })
        );
    }
}
