//! Example MCP tool server and client over streamable HTTP.
//!
//! The server side is a [`ToolRegistry`] exposed through [`ToolServer`]; the
//! client side is [`ToolClient`], which opens one session per operation.

pub mod client;
pub mod configuration;
pub mod error;
pub mod http;
pub mod logging;
pub mod registry;
pub mod server;
pub mod tools;

pub use client::{ClientConfig, PingOutcome, Session, SessionState, ToolClient};
pub use configuration::Settings;
pub use error::{ErrorKind, ToolError};
pub use registry::{
    ParamSpec, ParamType, ToolArgs, ToolCallRequest, ToolCallResult, ToolDefinition, ToolRegistry,
};
pub use server::ToolServer;
pub use tools::default_registry;
