use anyhow::{bail, Context, Result};
use rmcp::model::JsonObject;
use serde_json::Value;

/// Merges `--args '<json object>'` with repeated `--arg key=value` pairs.
///
/// Values of `--arg` are parsed as JSON when possible (`a=6` is the number 6,
/// `s=HeLLo` is a string). Later pairs override keys from `--args`.
pub fn parse_arguments(json: Option<&str>, pairs: &[String]) -> Result<JsonObject> {
    let mut arguments = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--args is not valid JSON")? {
            Value::Object(map) => map,
            other => bail!("--args must be a JSON object, got {}", other),
        },
        None => JsonObject::new(),
    };

    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("--arg expects key=value, got '{}'", pair);
        };
        if key.is_empty() {
            bail!("--arg has an empty key: '{}'", pair);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        arguments.insert(key.to_string(), value);
    }

    Ok(arguments)
}

pub fn render_arguments(arguments: &JsonObject) -> String {
    Value::Object(arguments.clone()).to_string()
}
