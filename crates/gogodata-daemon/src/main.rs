//! GoGoData bridge.
//!
//! Streams GoGo Board sensor readings (USB serial or MQTT) into a CODAP
//! document through the Data Interactive API.
//!
//! Usage:
//!   gogodata [--config gogodata.toml] serial --device /dev/ttyACM0
//!   gogodata [--config gogodata.toml] mqtt --board GoGo-99A5FCE8
//!   gogodata --standalone mqtt

mod config;
mod run;

use anyhow::bail;
use clap::{Parser, Subcommand};
use config::Config;
use run::Source;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gogodata", version, about = "Stream GoGo Board sensor data into CODAP")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "GOGODATA_CONFIG")]
    config: Option<PathBuf>,

    /// WebSocket URL of the CODAP relay (overrides the config file).
    #[arg(long, env = "GOGODATA_CODAP_URL")]
    codap_url: Option<String>,

    /// Run without CODAP: log every request and pretend it succeeded.
    #[arg(long)]
    standalone: bool,

    #[command(subcommand)]
    source: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read CSV or JSON lines from a board on USB serial.
    Serial {
        /// Serial device; opened at 9600 baud.
        #[arg(short, long)]
        device: Option<PathBuf>,
    },
    /// Subscribe to board readings on an MQTT broker.
    Mqtt {
        /// Only forward readings from this board.
        #[arg(short, long)]
        board: Option<String>,

        #[arg(long, env = "GOGODATA_MQTT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

impl Cli {
    /// Fold command-line overrides into the loaded config.
    fn resolve(self) -> anyhow::Result<(Config, Source, bool)> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(url) = self.codap_url {
            config.codap.url = url;
        }
        let source = match self.source {
            Command::Serial { device } => {
                let Some(device) = device.or_else(|| config.serial.device.clone()) else {
                    bail!("no serial device given (use --device or [serial] device)");
                };
                Source::Serial { device }
            }
            Command::Mqtt { board, password } => {
                if board.is_some() {
                    config.mqtt.board = board;
                }
                if password.is_some() {
                    config.mqtt.password = password;
                }
                Source::Mqtt
            }
        };
        Ok((config, source, self.standalone))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gogodata=info".parse()?))
        .init();

    let (config, source, standalone) = Cli::parse().resolve()?;
    tracing::info!("Starting GoGoData ({:?}) against {}", source, config.codap.url);
    run::run(config, source, standalone).await
}
