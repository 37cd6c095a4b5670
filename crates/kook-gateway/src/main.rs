//! kook-gateway - KOOK bot gateway client
//!
//! Connects a bot to the KOOK gateway and keeps the event stream alive, or
//! posts one-off messages through the HTTP API.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use kook_gateway::config::{GatewayConfig, LogFormat, LoggingSettings};
use kook_gateway::{GatewayError, KookApi, LogConsumer, ReconnectSupervisor, SupervisorEvent};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kook-gateway")]
#[command(about = "KOOK bot gateway client")]
#[command(version)]
struct Cli {
    /// Bot token (overrides the config file)
    #[arg(long, env = "KOOK_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "kook-gateway.toml")]
    config: PathBuf,

    /// Log output format (overrides the config file)
    #[arg(long, global = true, value_parser = ["text", "json"])]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the gateway and log incoming events
    Run,

    /// Post a text message to a channel
    SendText {
        /// Target channel id
        #[arg(long)]
        channel: String,

        /// Message text
        #[arg(long)]
        text: String,
    },

    /// Post an image message to a channel
    SendImage {
        /// Target channel id
        #[arg(long)]
        channel: String,

        /// URL of an already-hosted image
        #[arg(long)]
        url: String,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "kook-gateway.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { output } = &cli.command {
        init_tracing(&LoggingSettings::default(), cli.log_format.as_deref())?;
        return init_config(output);
    }

    let config = load_config(&cli)?;
    init_tracing(&config.logging, cli.log_format.as_deref())?;

    let token = config.credential(cli.token.as_deref())?;
    let api = KookApi::new(&config.api_base_url, token)?;

    match cli.command {
        Commands::Run => run_gateway(&config, api).await,
        Commands::SendText { channel, text } => {
            let receipt = api.send_text(&channel, &text).await?;
            println!("{}", receipt.msg_id);
            Ok(())
        }
        Commands::SendImage { channel, url } => {
            let receipt = api.send_image(&channel, &url).await?;
            println!("{}", receipt.msg_id);
            Ok(())
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<GatewayConfig> {
    if cli.config.exists() {
        return GatewayConfig::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()));
    }
    // Running from the environment alone is allowed.
    Ok(GatewayConfig::default())
}

fn init_tracing(logging: &LoggingSettings, format_override: Option<&str>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("invalid log level")?;

    let format = match format_override {
        Some("json") => LogFormat::Json,
        Some(_) => LogFormat::Text,
        None => logging.format,
    };

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
    Ok(())
}

async fn run_gateway(config: &GatewayConfig, api: KookApi) -> anyhow::Result<()> {
    info!(api = %config.api_base_url, compression = config.connection.compression, "starting kook-gateway");

    let (events_tx, mut events_rx) = mpsc::channel(64);
    let supervisor = ReconnectSupervisor::new(api, LogConsumer)
        .with_session_config(config.session_config())
        .with_reconnect_config(config.reconnect_config())
        .with_recycle_interval(config.recycle_interval())
        .with_events(events_tx);

    let handle = supervisor.handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        handle.stop();
    });

    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                SupervisorEvent::Connected {
                    session_id,
                    resumed,
                    at,
                } => info!(session_id = ?session_id, resumed, %at, "connected"),
                SupervisorEvent::Disconnected { reason } => warn!(%reason, "disconnected"),
                SupervisorEvent::Reconnecting { attempt, delay } => {
                    info!(attempt, ?delay, "reconnecting");
                }
                SupervisorEvent::ReconnectFailed {
                    attempts,
                    last_error,
                } => error!(attempts, %last_error, "reconnect failed"),
                SupervisorEvent::CredentialRejected { code } => {
                    error!(code, "credential rejected");
                }
            }
        }
    });

    match supervisor.run().await {
        Ok(()) => {
            info!("kook-gateway stopped");
            Ok(())
        }
        Err(e @ GatewayError::CredentialRejected { .. }) => {
            Err(anyhow::Error::new(e).context("the bot token must be replaced"))
        }
        Err(e) => Err(e.into()),
    }
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    let config = GatewayConfig {
        token: Some("your-bot-token".to_string()),
        ..GatewayConfig::default()
    };

    let toml = config.to_toml()?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output, toml)?;
    info!(path = %output.display(), "wrote config");
    Ok(())
}
