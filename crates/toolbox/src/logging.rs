use anyhow::{Context, Result};
use std::sync::Once;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

// Used to ensure we only set up tracing once
static INIT: Once = Once::new();

fn default_filter() -> EnvFilter {
    EnvFilter::new("")
        .add_directive("toolbox=info".parse().unwrap())
        .add_directive("toolbox_cli=info".parse().unwrap())
        .add_directive("tower_http=info".parse().unwrap())
        .add_directive(LevelFilter::WARN.into())
}

/// Installs the global subscriber. Logs go to stderr so stdout only carries results.
///
/// `RUST_LOG` replaces the default directives when set.
pub fn setup_logging(name: Option<&str>) -> Result<()> {
    let mut result = Ok(());

    INIT.call_once(|| {
        result = (|| {
            let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

            let console_layer = fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr)
                .with_filter(env_filter);

            Registry::default()
                .with(console_layer)
                .try_init()
                .context("Failed to set global subscriber")?;

            if let Some(n) = name {
                tracing::debug!(component = n, "logging initialized");
            }
            Ok(())
        })();
    });

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_is_idempotent() {
        setup_logging(Some("test")).unwrap();
        setup_logging(None).unwrap();
    }
}
