use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "TOOLBOX";
pub const DEFAULT_PORT: u16 = 8888;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub name: String,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            path: "/mcp".to_string(),
            name: "Demo".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `TOOLBOX_*` environment variables.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("path", defaults.path)?
            .set_default("name", defaults.name)?
            .set_default("timeout_secs", defaults.timeout_secs as i64)?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// URL a local client uses to reach a server started with these settings.
    pub fn endpoint(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" => "localhost",
            other => other,
        };
        format!("http://{}:{}{}", host, self.port, self.path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_env() {
        let settings = Settings::load(Some(HashMap::new())).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.endpoint(), "http://localhost:8888/mcp");
        assert_eq!(settings.socket_addr().unwrap().port(), 8888);
    }

    #[test]
    fn env_overrides_port_and_timeout() {
        let settings = Settings::load(Some(env(&[
            ("TOOLBOX_PORT", "3000"),
            ("TOOLBOX_TIMEOUT_SECS", "5"),
            ("TOOLBOX_HOST", "127.0.0.1"),
        ])))
        .unwrap();
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.timeout(), Duration::from_secs(5));
        assert_eq!(settings.endpoint(), "http://127.0.0.1:3000/mcp");
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(Settings::load(Some(env(&[("TOOLBOX_PORT", "eighty")]))).is_err());
    }
}
