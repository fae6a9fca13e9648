//! kobold-cli - Command-line interface for kobold
//!
//! Publishes to a node and encodes or decodes framed messages offline.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use kobold_client::{Client, ConnectionConfig};
use kobold_protocol::{Format, Operation, DEFAULT_PORT};
use std::net::{Ipv4Addr, SocketAddr};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kobold-cli")]
#[command(about = "Command-line interface for kobold nodes")]
#[command(version)]
struct Cli {
    /// Node address
    #[arg(short, long, env = "KOBOLD_SERVER", default_value_t = SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)))]
    server: SocketAddr,

    /// Envelope format (msgpack, cbor, json, bincode)
    #[arg(short, long, env = "KOBOLD_FORMAT", default_value_t = Format::default())]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish messages on a topic
    Pub {
        /// Topic name
        topic: String,

        /// Number of messages to publish
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u64,

        /// Message content
        #[arg(short, long)]
        content: Option<String>,
    },

    /// Send one message with any operation
    Send {
        #[command(flatten)]
        message: MessageArgs,
    },

    /// Print a framed message as hex (no connection)
    Encode {
        #[command(flatten)]
        message: MessageArgs,
    },

    /// Decode hex framed bytes and print the messages as JSON (no connection)
    Decode {
        /// Hex-encoded frames
        hex: String,
    },
}

#[derive(clap::Args)]
pub struct MessageArgs {
    /// Operation (advertise, publish, reply, request, subscribe, unadvertise, unsubscribe)
    #[arg(short, long)]
    pub op: Operation,

    /// Topic name
    #[arg(short, long)]
    pub topic: String,

    /// Message content
    #[arg(short, long)]
    pub content: Option<String>,

    /// Transaction ID
    #[arg(long)]
    pub tx_id: Option<String>,

    /// Message ID (encode only)
    #[arg(long, default_value = "1")]
    pub id: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        // Offline commands never touch the network
        cmd @ (Commands::Encode { .. } | Commands::Decode { .. }) => {
            match commands::execute_offline(cli.format, cmd) {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
        cmd => {
            let config = ConnectionConfig::new(cli.server).with_format(cli.format);
            let mut client = Client::new(config);

            client.connect().await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            let result = commands::execute(&mut client, cmd).await;

            match result {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            client.close().await?;
        }
    }

    Ok(())
}
