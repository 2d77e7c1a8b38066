//! Daemon wiring: store, collaborators, poll loop and RPC server.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use ggwatch_core::threshold::AlertPolicy;

use crate::actions::ActionHandler;
use crate::cli::{self, DaemonOpts};
use crate::engine::ThresholdEngine;
use crate::menu::TextMenu;
use crate::poll_loop::{PollConfig, PollingLoop};
use crate::provider::FixtureProvider;
use crate::server::{self, DaemonState};
use crate::store::SubscriptionStore;
use crate::transport::LogTransport;
use crate::ui_session::UiSessionController;

pub async fn run_daemon(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let db_path = opts.db_path.clone().unwrap_or_else(cli::default_db_path);
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let store = Arc::new(SubscriptionStore::open_or_recover(&db_path)?);
    tracing::info!(db = %db_path.display(), "subscription store ready");

    let policy = AlertPolicy::from(opts.alert_policy);
    let config = PollConfig {
        interval: Duration::from_secs(opts.poll_interval_secs.max(1)),
        fetch_timeout: Duration::from_secs(opts.fetch_timeout_secs.max(1)),
    };

    let provider = Arc::new(FixtureProvider::new(opts.catalog.clone()));
    let transport = Arc::new(LogTransport::new());
    let menu = Arc::new(TextMenu::new(opts.banner.clone()));

    let ui = Arc::new(UiSessionController::new(
        Arc::clone(&transport),
        Arc::clone(&store),
    ));
    let restored = ui.restore();
    if restored > 0 {
        tracing::info!(restored, "ui sessions restored");
    }

    let engine = Arc::new(ThresholdEngine::new(
        Arc::clone(&store),
        Arc::clone(&transport),
        Arc::clone(&menu),
        policy,
    ));
    let poller = Arc::new(PollingLoop::new(
        Arc::clone(&provider),
        Arc::clone(&store),
        engine,
        config,
    ));
    let handler = ActionHandler::new(
        provider,
        Arc::clone(&store),
        Arc::clone(&ui),
        menu,
        config.fetch_timeout,
    );
    let state = Arc::new(DaemonState {
        handler,
        store,
        ui,
        poller: Arc::clone(&poller),
        policy,
        started_at: Utc::now(),
    });

    // Start UDS server
    let server_socket = socket_path.to_string();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, state).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Start poll loop
    let shutdown_token = CancellationToken::new();
    let mut poll_handle = tokio::spawn(poller.run(shutdown_token.clone()));

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    }
                }
                Err(e) => {
                    tracing::warn!("cannot register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                    tracing::info!("received ctrl-c, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    let mut poll_finished = false;
    tokio::select! {
        () = shutdown => {}
        _ = &mut poll_handle => {
            poll_finished = true;
            tracing::warn!("poll loop exited unexpectedly");
        }
        _ = &mut server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    // Stop taking requests, then let an in-flight poll cycle finish and
    // deliver its alerts.
    server_handle.abort();
    shutdown_token.cancel();
    if !poll_finished {
        if let Err(e) = poll_handle.await {
            tracing::warn!("poll loop task failed: {e}");
        }
    }

    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}
