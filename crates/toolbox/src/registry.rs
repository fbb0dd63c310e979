use std::collections::HashMap;
use std::fmt;

use rmcp::model::JsonObject;
use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// Semantic type of a tool parameter or return value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    String,
}

impl ParamType {
    fn json_type(&self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::String => "string",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::Integer => value.as_i64().is_some(),
            ParamType::String => value.is_string(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
}

/// Declared signature of a registered tool. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    returns: ParamType,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, returns: ParamType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            returns,
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn returns(&self) -> ParamType {
        self.returns
    }

    /// JSON Schema advertised through `tools/list`.
    pub fn input_schema(&self) -> JsonObject {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), json!({ "type": p.ty.json_type() })))
            .collect();
        let required: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();

        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        schema.insert("required".to_string(), json!(required));
        schema.insert("additionalProperties".to_string(), json!(false));
        schema
    }

    pub(crate) fn validate(&self, arguments: &JsonObject) -> Result<(), ToolError> {
        if let Some(unknown) = arguments
            .keys()
            .find(|k| !self.params.iter().any(|p| &p.name == *k))
        {
            return Err(ToolError::Validation(format!(
                "{}: unexpected argument '{}'",
                self.name, unknown
            )));
        }

        for param in &self.params {
            match arguments.get(&param.name) {
                None => {
                    return Err(ToolError::Validation(format!(
                        "{}: missing required argument '{}'",
                        self.name, param.name
                    )))
                }
                Some(v) if !param.ty.accepts(v) => {
                    return Err(ToolError::Validation(format!(
                        "{}: argument '{}' must be {}, got {}",
                        self.name, param.name, param.ty, v
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: JsonObject,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: JsonObject) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Success value or structured error.
pub type ToolCallResult = Result<Value, ToolError>;

/// Arguments that already passed schema validation.
pub struct ToolArgs<'a> {
    tool: &'a str,
    values: &'a JsonObject,
}

impl<'a> ToolArgs<'a> {
    pub fn integer(&self, name: &str) -> anyhow::Result<i64> {
        self.values
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("{}: no integer argument '{}'", self.tool, name))
    }

    pub fn string(&self, name: &str) -> anyhow::Result<&'a str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("{}: no string argument '{}'", self.tool, name))
    }
}

pub type ToolHandler = Box<dyn for<'a> Fn(&ToolArgs<'a>) -> anyhow::Result<Value> + Send + Sync>;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: ToolHandler,
}

/// Name-to-handler mapping with typed dispatch.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, definition: ToolDefinition, handler: F) -> Result<(), ToolError>
    where
        F: for<'a> Fn(&ToolArgs<'a>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        if self.by_name.contains_key(definition.name()) {
            return Err(ToolError::Conflict(definition.name().to_string()));
        }
        self.by_name
            .insert(definition.name().to_string(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Registered definitions in registration order.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.by_name.get(name).map(|&i| &self.tools[i].definition)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn dispatch(&self, request: &ToolCallRequest) -> ToolCallResult {
        let tool = self
            .by_name
            .get(&request.name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| ToolError::NotFound(request.name.clone()))?;

        tool.definition.validate(&request.arguments)?;

        let args = ToolArgs {
            tool: tool.definition.name(),
            values: &request.arguments,
        };
        let value = (tool.handler)(&args).map_err(|e| ToolError::Internal(format!("{e:#}")))?;

        if !tool.definition.returns().accepts(&value) {
            return Err(ToolError::Internal(format!(
                "{} returned {}, expected {}",
                tool.definition.name(),
                value,
                tool.definition.returns()
            )));
        }
        Ok(value)
    }
}
