use serde_json::{Map, Value};

use crate::core::errors::RagError;

const EMBEDDING_PROVIDERS: [&str; 4] = ["ollama", "openai_compatible", "llama_server", "hashing"];
const LLM_PROVIDERS: [&str; 3] = ["ollama", "openai_compatible", "llama_server"];

pub fn validate_config(config: &Value) -> Result<(), RagError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(corpus) = expect_optional_object(root, "corpus")? {
        validate_required_string_field(corpus, "corpus.path", "path")?;
    }

    if let Some(index) = expect_optional_object(root, "index")? {
        validate_required_string_field(index, "index.location", "location")?;
        validate_required_string_field(index, "index.collection", "collection")?;
        validate_u64_field(index, "index.batch_size", "batch_size", 1, 10_000)?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 0, 1_000)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_choice_field(
            embedding,
            "embedding.provider",
            "provider",
            &EMBEDDING_PROVIDERS,
        )?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_optional_string_field(embedding, "embedding.api_key", "api_key")?;
        validate_u64_field(embedding, "embedding.dimension", "dimension", 1, 65_536)?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_choice_field(llm, "llm.provider", "provider", &LLM_PROVIDERS)?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_optional_string_field(llm, "llm.model_path", "model_path")?;
        validate_u64_field(llm, "llm.port", "port", 0, 65_535)?;
        validate_u64_field(llm, "llm.n_ctx", "n_ctx", 1, 10_000_000)?;
        validate_u64_field(llm, "llm.n_threads", "n_threads", 1, 1_024)?;
        validate_i64_field(llm, "llm.n_gpu_layers", "n_gpu_layers", -1, 1_000_000)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
        if let Some(temperature) = llm.get("temperature").filter(|v| !v.is_null()) {
            let Some(value) = temperature.as_f64() else {
                return Err(config_type_error("llm.temperature", "number"));
            };
            if !(0.0..=2.0).contains(&value) {
                return Err(RagError::Config(
                    "invalid config at 'llm.temperature': must be between 0 and 2".to_string(),
                ));
            }
        }
    }

    if let Some(prompt) = expect_optional_object(root, "prompt")? {
        validate_required_string_field(prompt, "prompt.template", "template")?;
        if let Some(template) = prompt.get("template").and_then(Value::as_str) {
            for placeholder in ["{reviews}", "{question}"] {
                if !template.contains(placeholder) {
                    return Err(RagError::Config(format!(
                        "invalid config at 'prompt.template': missing {} placeholder",
                        placeholder
                    )));
                }
            }
        }
    }

    if let Some(logging) = expect_optional_object(root, "logging")? {
        validate_optional_string_field(logging, "logging.level", "level")?;
        validate_bool_field(logging, "logging.file", "file")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, RagError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_choice_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    choices: &[&str],
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !choices.contains(&text) {
        return Err(RagError::Config(format!(
            "invalid config at '{}': '{}' is not one of {}",
            path,
            text,
            choices.join(", ")
        )));
    }
    Ok(())
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
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
) -> Result<(), RagError> {
    let Some(value) = section.get(key).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(RagError::Config(format!(
            "invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_i64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: i64,
    max: i64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_i64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(RagError::Config(format!(
            "invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let value = section.get(key).ok_or_else(|| {
        RagError::Config(format!("invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(RagError::Config(format!(
            "invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> RagError {
    RagError::Config(format!(
        "invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_defaults() {
        let defaults = serde_json::to_value(crate::core::config::AppConfig::default()).unwrap();
        validate_config(&defaults).unwrap();
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = validate_config(&json!({ "llm": { "provider": "hashing" } })).unwrap_err();
        assert!(err.to_string().contains("llm.provider"));

        let err = validate_config(&json!({ "embedding": { "provider": "chroma" } })).unwrap_err();
        assert!(err.to_string().contains("'chroma' is not one of"));
    }

    #[test]
    fn rejects_template_without_placeholders() {
        let err = validate_config(&json!({ "prompt": { "template": "Answer: {question}" } }))
            .unwrap_err();
        assert!(err.to_string().contains("{reviews}"));
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        assert!(validate_config(&json!({ "index": {
            "location": "idx", "collection": "c", "batch_size": 0
        } }))
        .is_err());
        assert!(validate_config(&json!({ "llm": { "temperature": 3.5 } })).is_err());
        assert!(validate_config(&json!({ "llm": { "n_gpu_layers": -2 } })).is_err());
    }

    #[test]
    fn zero_top_k_is_allowed() {
        validate_config(&json!({ "retrieval": { "top_k": 0 } })).unwrap();
    }
}
