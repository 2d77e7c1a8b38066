//! ggwatch: fortnite.gg player-count alert daemon and its CLI client.
//! One process hosts the store, poll loop, UI controller and RPC server.

use clap::Parser;

mod actions;
mod cli;
mod client;
mod daemon;
mod engine;
mod error;
mod menu;
mod poll_loop;
mod provider;
mod server;
mod store;
#[cfg(test)]
mod testing;
mod transport;
mod ui_session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("GGWATCH_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("ggwatch daemon starting");
            daemon::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Call(opts) => {
            client::cmd_call(&socket_path, &opts.method, opts.params.as_deref()).await?;
        }
    }

    Ok(())
}
