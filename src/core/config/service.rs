use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::AppConfig;
use super::validation::validate_config;
use crate::core::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

/// Key fragments that mark a value as a credential.
const SENSITIVE_PATTERNS: [&str; 7] = [
    "api_key",
    "auth_token",
    "account_sid",
    "secret",
    "password",
    "access_token",
    "bearer",
];

/// Environment variables that override credential settings, applied after
/// `config.yml` and `secrets.yaml` are merged.
const ENV_OVERRIDES: [(&str, &[&str]); 5] = [
    ("SAHAYAK_LLM_API_KEY", &["llm", "api_key"]),
    ("SAHAYAK_EMBEDDING_API_KEY", &["embedding", "api_key"]),
    ("SAHAYAK_TWILIO_ACCOUNT_SID", &["notify", "account_sid"]),
    ("SAHAYAK_TWILIO_AUTH_TOKEN", &["notify", "auth_token"]),
    ("SAHAYAK_API_KEY", &["server", "api_key"]),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("SAHAYAK_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.secrets_path());
        let mut merged = deep_merge(&public_config, &secrets_config);
        apply_env_overrides(&mut merged, |name| env::var(name).ok());
        validate_config(&merged)?;
        Ok(merged)
    }

    /// Loads, validates and deserialises the configuration into `AppConfig`.
    pub fn load_app_config(&self) -> Result<AppConfig, ApiError> {
        let value = self.load_config()?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::BadRequest(format!("Invalid config: {}", e)))
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

fn apply_env_overrides<F>(config: &mut Value, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (var, path) in ENV_OVERRIDES {
        let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        ensure_object_path(config, path, Value::String(value));
    }
}

fn ensure_object_path(config: &mut Value, path: &[&str], value: Value) {
    if path.is_empty() {
        return;
    }

    let mut current = config;
    for (index, key) in path.iter().enumerate() {
        if index == path.len() - 1 {
            if let Some(map) = current.as_object_mut() {
                map.insert(key.to_string(), value);
            }
            return;
        }

        if !current.get(*key).map(|v| v.is_object()).unwrap_or(false) {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            map.insert((*key).to_string(), Value::Object(Map::new()));
        }

        let Some(next) = current.get_mut(*key) else {
            return;
        };
        current = next;
    }
}

/// A missing file is an empty section. An unreadable or malformed one is
/// logged and ignored so the other layers still apply.
fn load_yaml_file(path: &Path) -> Value {
    let empty = Value::Object(Map::new());
    if !path.exists() {
        return empty;
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Config file unreadable");
            return empty;
        }
    };
    match serde_yaml::from_str::<Value>(&contents) {
        Ok(value @ Value::Object(_)) => value,
        Ok(Value::Null) => empty,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Config file is not a mapping; ignoring it");
            empty
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Config file is not valid YAML");
            empty
        }
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
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn secrets_layer_overrides_only_what_it_names() {
        let public = json!({
            "llm": { "model": "llama-3.3-70b-versatile", "temperature": 0.3 },
            "notify": { "recipients": ["+911"] }
        });
        let secrets = json!({
            "llm": { "api_key": "gsk_live" },
            "notify": { "recipients": ["+912", "+913"] }
        });

        assert_eq!(
            deep_merge(&public, &secrets),
            json!({
                "llm": { "model": "llama-3.3-70b-versatile", "temperature": 0.3, "api_key": "gsk_live" },
                "notify": { "recipients": ["+912", "+913"] }
            })
        );
    }

    #[test]
    fn redaction_masks_credentials_but_not_token_budgets() {
        let input = json!({
            "llm": { "api_key": "gsk_live", "max_context_tokens": 8192 },
            "notify": { "account_sid": "AC1", "auth_token": "tok", "recipients": ["+911"] },
            "server": { "api_key": null }
        });

        assert_eq!(
            redact_sensitive_values(&input),
            json!({
                "llm": { "api_key": "****", "max_context_tokens": 8192 },
                "notify": { "account_sid": "****", "auth_token": "****", "recipients": ["+911"] },
                "server": { "api_key": null }
            })
        );
    }

    #[test]
    fn malformed_yaml_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "rag: [unclosed").unwrap();
        assert_eq!(load_yaml_file(&path), json!({}));
    }

    #[test]
    fn env_overrides_fill_missing_sections() {
        let mut config = json!({ "llm": { "model": "m" } });
        apply_env_overrides(&mut config, |name| match name {
            "SAHAYAK_LLM_API_KEY" => Some("gsk_test".to_string()),
            "SAHAYAK_TWILIO_AUTH_TOKEN" => Some("   ".to_string()),
            "SAHAYAK_API_KEY" => Some("admin".to_string()),
            _ => None,
        });

        assert_eq!(
            config,
            json!({
                "llm": { "model": "m", "api_key": "gsk_test" },
                "server": { "api_key": "admin" }
            })
        );
    }

    #[test]
    fn load_app_config_merges_secrets_over_public_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_roots(dir.path().to_path_buf(), dir.path().to_path_buf());
        fs::write(
            dir.path().join("config.yml"),
            "rag:\n  top_k: 3\nllm:\n  model: small\n",
        )
        .unwrap();
        fs::write(dir.path().join("secrets.yaml"), "llm:\n  api_key: from-secrets\n").unwrap();

        let service = ConfigService::new(Arc::new(paths));
        let config = service.load_app_config().unwrap();

        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.llm.model, "small");
        assert!(config.llm.api_key.is_some());
    }

    #[test]
    fn load_config_rejects_invalid_chunking() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_roots(dir.path().to_path_buf(), dir.path().to_path_buf());
        fs::write(
            dir.path().join("config.yml"),
            "rag:\n  chunk_size: 10\n  chunk_overlap: 20\n",
        )
        .unwrap();

        let service = ConfigService::new(Arc::new(paths));
        assert!(service.load_app_config().is_err());
    }
}
