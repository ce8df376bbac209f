use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 1, 65535)?;
        validate_optional_string_field(server, "server.api_key", "api_key")?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_optional_string_field(llm, "llm.vision_model", "vision_model")?;
        validate_optional_string_field(llm, "llm.transcription_model", "transcription_model")?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_u64_field(
            llm,
            "llm.stream_idle_timeout_secs",
            "stream_idle_timeout_secs",
            1,
            3_600,
        )?;
        validate_u64_field(
            llm,
            "llm.max_context_tokens",
            "max_context_tokens",
            256,
            10_000_000,
        )?;
        validate_u64_field(
            llm,
            "llm.output_reserve_tokens",
            "output_reserve_tokens",
            0,
            1_000_000,
        )?;
        if let Some(value) = llm.get("temperature") {
            match value.as_f64() {
                Some(t) if (0.0..=2.0).contains(&t) => {}
                Some(_) => {
                    return Err(ApiError::BadRequest(
                        "Invalid config at 'llm.temperature': must be between 0 and 2".to_string(),
                    ))
                }
                None => return Err(config_type_error("llm.temperature", "number")),
            }
        }
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.provider", "provider")?;
        if let Some(provider) = embedding.get("provider").and_then(|v| v.as_str()) {
            if !matches!(provider, "openai" | "lexical") {
                return Err(ApiError::BadRequest(format!(
                    "Invalid config at 'embedding.provider': unknown provider '{}'",
                    provider
                )));
            }
        }
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimensions", "dimensions", 1, 65_536)?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_optional_string_field(rag, "rag.corpus_dir", "corpus_dir")?;
        validate_optional_string_field(rag, "rag.index_path", "index_path")?;
        validate_u64_field(rag, "rag.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(rag, "rag.chunk_overlap", "chunk_overlap", 0, 1_000_000)?;
        validate_u64_field(rag, "rag.top_k", "top_k", 1, 100)?;
        validate_u64_field(rag, "rag.max_pdf_pages", "max_pdf_pages", 1, 10_000)?;
        validate_bool_field(rag, "rag.include_sources", "include_sources")?;

        let size = rag.get("chunk_size").and_then(|v| v.as_u64()).unwrap_or(1000);
        let overlap = rag.get("chunk_overlap").and_then(|v| v.as_u64()).unwrap_or(200);
        if overlap >= size {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at 'rag.chunk_overlap': {} must be smaller than chunk_size {}",
                overlap, size
            )));
        }
    }

    if let Some(notify) = expect_optional_object(root, "notify")? {
        validate_optional_string_field(notify, "notify.account_sid", "account_sid")?;
        validate_optional_string_field(notify, "notify.from_number", "from_number")?;
        validate_optional_string_field(notify, "notify.sos_message", "sos_message")?;
        validate_string_array_field(notify, "notify.recipients", "recipients")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_config() {
        assert!(validate_config(&json!({})).is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = validate_config(&json!({"rag": {"chunk_size": 100, "chunk_overlap": 100}}))
            .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));

        assert!(validate_config(&json!({"rag": {"chunk_size": 100, "chunk_overlap": 99}})).is_ok());
    }

    #[test]
    fn rejects_zero_top_k_and_bad_types() {
        assert!(validate_config(&json!({"rag": {"top_k": 0}})).is_err());
        assert!(validate_config(&json!({"server": {"port": "eighty"}})).is_err());
        assert!(validate_config(&json!({"server": {"port": 0}})).is_err());
        assert!(validate_config(&json!({"server": {"port": 8000}})).is_ok());
        assert!(validate_config(&json!({"llm": {"stream_idle_timeout_secs": 0}})).is_err());
        assert!(validate_config(&json!({"notify": {"recipients": ["+91", ""]}})).is_err());
        assert!(validate_config(&json!({"llm": {"temperature": 3.5}})).is_err());
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let err = validate_config(&json!({"embedding": {"provider": "magic"}})).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }
}
