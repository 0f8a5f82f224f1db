//! `realtime-sync` - tails every envelope from the configured endpoint.

use std::process::ExitCode;

use realtime_sync::config::{LoggingConfig, SyncConfig};
use realtime_sync::ports::Handler;
use realtime_sync::RealtimeSync;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match SyncConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging);

    let sync = match RealtimeSync::from_config(&config) {
        Ok(sync) => sync,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let tail = Handler::envelope_fn("tail", |envelope| {
        tracing::info!(event_type = %envelope.event_type, data = %envelope.data, "Event");
        Ok(())
    });
    if let Err(e) = sync.subscribe("*", tail) {
        tracing::error!(error = %e, "Failed to register tail handler");
        return ExitCode::FAILURE;
    }

    tracing::info!(session_id = %sync.session_id(), endpoint = %sync.endpoint(), "Tailing real-time events");
    sync.start();

    let mut states = sync.state_changes();
    let exit = tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                ExitCode::FAILURE
            }
        },
        _ = states.wait_for(|s| !s.is_active()) => {
            tracing::warn!("Real-time sync disabled, exiting");
            ExitCode::FAILURE
        }
    };

    sync.stop().await;
    exit
}

fn init_tracing(logging: &LoggingConfig) {
    let builder = tracing_subscriber::fmt().with_env_filter(logging.env_filter());
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
