use serde_json::json;

use crate::registry::{ParamType, ToolDefinition, ToolRegistry};

pub const TOOL_ADD: &str = "add";
pub const TOOL_MULT: &str = "mult";
pub const TOOL_LOWER: &str = "lower";

pub fn add(a: i64, b: i64) -> anyhow::Result<i64> {
    a.checked_add(b)
        .ok_or_else(|| anyhow::anyhow!("{a} + {b} overflows a 64-bit integer"))
}

pub fn mult(a: i64, b: i64) -> anyhow::Result<i64> {
    a.checked_mul(b)
        .ok_or_else(|| anyhow::anyhow!("{a} * {b} overflows a 64-bit integer"))
}

pub fn lower(s: &str) -> String {
    s.to_lowercase()
}

/// Registry with the `add`, `mult` and `lower` tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_defaults(&mut registry).expect("default tool names are unique");
    registry
}

fn register_defaults(registry: &mut ToolRegistry) -> Result<(), crate::ToolError> {
    registry.register(
        ToolDefinition::new(TOOL_ADD, "Add two numbers", ParamType::Integer)
            .param("a", ParamType::Integer)
            .param("b", ParamType::Integer),
        |args| Ok(json!(add(args.integer("a")?, args.integer("b")?)?)),
    )?;
    registry.register(
        ToolDefinition::new(TOOL_MULT, "Multiply two numbers", ParamType::Integer)
            .param("a", ParamType::Integer)
            .param("b", ParamType::Integer),
        |args| Ok(json!(mult(args.integer("a")?, args.integer("b")?)?)),
    )?;
    registry.register(
        ToolDefinition::new(TOOL_LOWER, "lower case a string", ParamType::String)
            .param("s", ParamType::String),
        |args| Ok(json!(lower(args.string("s")?))),
    )?;
    Ok(())
}
