//! cadence - voice coaching relay and terminal client

mod chat;
mod config;
mod error;
mod server;
mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// cadence - voice coaching relay
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server
    Serve {
        /// Port to listen on (default: config file, then PORT, then 3001)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for session files
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Upstream model id
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Send one message to a running relay and speak the reply
    Chat {
        /// Continue an existing session (a new one is started otherwise)
        #[arg(short, long)]
        session: Option<String>,

        /// Print the reply without speaking it
        #[arg(long)]
        mute: bool,

        /// Relay address
        #[arg(long)]
        relay_url: Option<String>,

        /// Message to send
        #[arg(required = true)]
        message: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("cadence=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let mut cfg = config::Config::load();

    match args.command {
        Some(Command::Serve {
            port,
            data_dir,
            model,
        }) => {
            if let Some(dir) = data_dir {
                cfg.data_dir = Some(dir);
            }
            if let Some(model) = model {
                cfg.model = model;
            }
            let port = port.unwrap_or_else(|| cfg.port());
            server::serve(&cfg, port).await
        }
        Some(Command::Chat {
            session,
            mute,
            relay_url,
            message,
        }) => {
            let options = chat::ChatOptions {
                relay_url: relay_url.unwrap_or_else(|| cfg.relay_url.clone()),
                session_id: session,
                mute,
                message: message.join(" "),
            };
            chat::run(&cfg, options).await
        }
        None => {
            eprintln!("Nothing to do. Try `cadence serve` or `cadence chat <MESSAGE>`.");
            eprintln!("Run `cadence --help` for all options.");
            Ok(())
        }
    }
}
