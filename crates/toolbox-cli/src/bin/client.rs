use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use toolbox::{logging, ClientConfig, Settings, ToolClient};
use toolbox_cli::{parse_arguments, render_arguments};

#[derive(Parser)]
#[command(name = "toolbox-client")]
#[command(author, version, about = "Calls an MCP tool server over streamable HTTP", long_about = None)]
struct Cli {
    /// MCP endpoint (defaults to http://localhost:$TOOLBOX_PORT/mcp)
    #[arg(long)]
    url: Option<String>,

    /// Seconds to wait for each response
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the server's initialize result
    Init,
    /// List the tools the server advertises
    Tools,
    /// Call a tool
    Call {
        name: String,
        /// Arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
        /// A single argument as key=value (repeatable)
        #[arg(long = "arg", action = clap::ArgAction::Append)]
        pairs: Vec<String>,
    },
    /// Check the server is alive
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::setup_logging(Some("toolbox-client"))?;

    let cli = Cli::parse();
    let settings = Settings::new()?;
    let mut config = ClientConfig::from(&settings);
    if let Some(url) = cli.url {
        config.endpoint = url;
    }
    if let Some(secs) = cli.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    let client = ToolClient::new(config);

    match cli.command {
        Command::Init => {
            let info = client.fetch_initialize_result().await?;
            println!(
                "initialize_result: {}",
                serde_json::to_string_pretty(&info)?
            );
        }
        Command::Tools => {
            let tools = client.list_tools().await?;
            println!("tools_list: {}", serde_json::to_string_pretty(&tools)?);
        }
        Command::Call { name, args, pairs } => {
            let arguments = parse_arguments(args.as_deref(), &pairs)?;
            let rendered = render_arguments(&arguments);
            match client.call_tool(name.as_str(), arguments).await {
                Ok(value) => println!("call_tool {name}({rendered}): {value}"),
                Err(err) => {
                    println!("call_tool {name}({rendered}): error [{}] {err}", err.kind().as_str());
                    std::process::exit(1);
                }
            }
        }
        Command::Ping => {
            let outcome = client.ping().await?;
            match outcome.latency {
                Some(latency) => println!("ping result: {} ({:?})", outcome.ok, latency),
                None => println!("ping result: {}", outcome.ok),
            }
            if !outcome.ok {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
