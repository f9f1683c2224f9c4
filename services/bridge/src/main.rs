use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use bridge::config;
use bridge::state::AppState;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let bridge_config = config::load_config().expect("failed to load bridge config");
    let session_config_template = bridge_config
        .session_config_template()
        .expect("invalid session key configuration");

    let state = AppState::new(bridge_config.default_device_class.clone(), session_config_template)
        .expect("failed to build wire registry");

    let panel_bind_addr = bridge_config.panel_bind_addr.clone();
    let panel_link_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = bridge::panel_link::run(&panel_bind_addr, panel_link_state).await {
            tracing::error!(error = %e, "panel-link accept loop exited");
        }
    });

    let router = bridge::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bridge_config.ws_bind_addr)
        .await
        .expect("failed to bind UI listener");
    info!(addr = %bridge_config.ws_bind_addr, "UI facade listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("bridge shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
