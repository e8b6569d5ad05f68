use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tempo::config::{self, ClientConfig, ServerConfig, CLIENT_CONFIG_FILE, SERVER_CONFIG_FILE};
use tempo::error::BenchError;
use tempo::receiver::Receiver;
use tempo::sender::Sender;
use tempo::smoke::{self, SmokeConfig};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "TCP file-transfer timing benchmark")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send the configured file under each timeout budget
    Client {
        #[arg(short, long, default_value = CLIENT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Receive rounds and write the timing report
    Server {
        #[arg(short, long, default_value = SERVER_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Raw loopback throughput check, no protocol framing
    Smoke {
        #[arg(long, default_value_t = 7777)]
        port: u16,
        #[arg(long, default_value_t = 100_000)]
        count: u64,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run() {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

fn run() -> Result<(), BenchError> {
    match Cli::parse().command {
        Commands::Client { config } => {
            match config::load_or_init::<ClientConfig>(&config)? {
                Some(cfg) => Sender::new(cfg)?.run(),
                None => {
                    info!(path = %config.display(), "generated default config; edit it and re-run");
                    Ok(())
                }
            }
        }
        Commands::Server { config } => {
            match config::load_or_init::<ServerConfig>(&config)? {
                Some(cfg) => Receiver::new(cfg).run(),
                None => {
                    info!(path = %config.display(), "generated default config; edit it and re-run");
                    Ok(())
                }
            }
        }
        Commands::Smoke { port, count } => smoke::run(&SmokeConfig {
            port,
            count,
            ..SmokeConfig::default()
        }),
    }
}
