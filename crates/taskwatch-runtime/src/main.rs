//! taskwatch: cross-tab task activity aggregator.
//! The daemon embeds the engine, UDS server and heartbeat monitor in-process;
//! the other subcommands talk to it over the socket.

use clap::Parser;

use taskwatch_runtime::cli::{self, Command};
use taskwatch_runtime::client;
use taskwatch_runtime::config::DaemonConfig;
use taskwatch_runtime::daemon;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    match args.command {
        Command::Daemon(opts) => {
            let filter = std::env::var("TASKWATCH_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("taskwatch daemon starting");

            let config = DaemonConfig::resolve(&opts, args.socket_path)?;
            daemon::run_daemon(config).await?;
        }
        Command::Snapshot => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_snapshot(&socket_path).await?;
        }
        Command::Status => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_status(&socket_path).await?;
        }
        Command::SetDebounce { ms } => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_set_debounce(&socket_path, ms).await?;
        }
    }

    Ok(())
}
