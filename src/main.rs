use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use stb_agent::{Agent, AgentConfig, HttpDeviceClient, OpenAiClient, StdConsole};

/// Command-line arguments for the agent
#[derive(Parser, Debug)]
#[command(about = "Drive a set-top-box GUI application toward an objective", version)]
struct Args {
    /// Print the prompt we send to the model
    #[arg(short, long)]
    verbose: bool,

    /// Give the model free rein (don't prompt for confirmation)
    #[arg(long = "no-interactive", action = ArgAction::SetFalse)]
    interactive: bool,

    /// Completion model to query
    #[arg(long, default_value = "gpt-3.5-turbo-instruct")]
    model: String,

    /// Base URL of the device page-detection and control service
    #[arg(long, default_value = "http://127.0.0.1:8090")]
    device: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stb_agent=warn"));
    fmt().with_env_filter(filter).init();

    info!(model = %args.model, device = %args.device, "starting agent");

    let config = AgentConfig {
        verbose: args.verbose,
        interactive: args.interactive,
        ..AgentConfig::default()
    };

    let device = Arc::new(HttpDeviceClient::new(args.device)?);
    let model = Arc::new(OpenAiClient::new(args.model)?);

    let mut agent = Agent::new(
        config,
        device.clone(),
        device,
        model,
        Box::new(StdConsole::new()),
    );
    agent.run().await?;

    Ok(())
}
