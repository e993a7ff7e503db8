use std::path::PathBuf;

use battleship_server::{init_logging, RandomBot, Server, ServerConfig, TcpTransport};
use clap::Parser;
use log::info;
use tokio::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Host matches, pairing connections as they arrive.
    Serve {
        #[arg(long, help = "Load settings from a JSON file; flags override it")]
        config: Option<PathBuf>,
        #[arg(long)]
        bind: Option<String>,
        #[arg(long, help = "Number of matches that may run at once")]
        sessions: Option<usize>,
        #[arg(long, help = "Seconds a participant has to fire")]
        turn_timeout: Option<f64>,
        #[arg(long, help = "Seconds a participant has to place each ship")]
        placement_timeout: Option<f64>,
        #[arg(long, help = "Append the audit trail to this file")]
        audit_log: Option<PathBuf>,
        #[arg(long, conflicts_with = "audit_log", help = "Do not write an audit trail")]
        no_audit: bool,
    },
    /// Connect to a server and play one match with random moves.
    Bot {
        #[arg(long, default_value = "127.0.0.1:8080")]
        connect: String,
        #[arg(long, default_value = "bot")]
        name: String,
        #[arg(long, help = "Fix RNG seed for reproducible games (e.g., --seed 12345)")]
        seed: Option<u64>,
    },
}

fn seconds(flag: &str, secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| anyhow::anyhow!("--{}: {}", flag, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            sessions,
            turn_timeout,
            placement_timeout,
            audit_log,
            no_audit,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::from_json_file(path)?,
                None => ServerConfig::default(),
            };
            if let Some(bind) = bind {
                config = config.with_bind_address(bind);
            }
            if let Some(n) = sessions {
                config = config.with_max_sessions(n);
            }
            if let Some(secs) = turn_timeout {
                config = config.with_turn_timeout(seconds("turn-timeout", secs)?);
            }
            if let Some(secs) = placement_timeout {
                config = config.with_placement_timeout(seconds("placement-timeout", secs)?);
            }
            if audit_log.is_some() {
                config = config.with_audit_log(audit_log);
            }
            if no_audit {
                config = config.with_audit_log(None);
            }

            let server = Server::from_config(config)?;
            let listener = server.bind().await?;
            tokio::select! {
                result = server.serve(listener) => result?,
                _ = tokio::signal::ctrl_c() => info!("shutting down"),
            }
        }
        Commands::Bot {
            connect,
            name,
            seed,
        } => {
            let mut transport = TcpTransport::connect(&connect).await?;
            let mut bot = RandomBot::new(name, seed);
            let reason = bot.play(&mut transport).await?;
            println!(
                "{}: {} after {} shots",
                bot.name(),
                reason.as_str(),
                bot.shots_fired()
            );
        }
    }
    Ok(())
}
