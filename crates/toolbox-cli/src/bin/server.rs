use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use toolbox::{default_registry, http, logging, Settings};
use tracing::info;

#[derive(Parser)]
#[command(name = "toolbox-server")]
#[command(author, version, about = "Example MCP tool server over streamable HTTP", long_about = None)]
struct Cli {
    /// Port to listen on (defaults to TOOLBOX_PORT, then 8888)
    #[arg(long, short)]
    port: Option<u16>,

    /// Address to bind (defaults to TOOLBOX_HOST, then 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// Server name reported in the initialize result
    #[arg(long, short)]
    name: Option<String>,

    /// HTTP path of the MCP endpoint
    #[arg(long)]
    path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::setup_logging(Some("toolbox-server"))?;

    let cli = Cli::parse();
    let mut settings = Settings::new()?;
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(name) = cli.name {
        settings.name = name;
    }
    if let Some(path) = cli.path {
        settings.path = path;
    }

    let registry = Arc::new(default_registry());
    info!(
        tools = ?registry.list_tools().iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
        "registered tools"
    );

    http::serve(&settings, registry, http::shutdown_signal()).await?;

    info!("Server exiting");
    Ok(())
}
