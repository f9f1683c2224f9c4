//! TCP accept loop for inbound panel connections (§4.6, §6): one
//! `itv2_engine::Session` per connection, registered into the session
//! registry for the lifetime of the connection and handed its own
//! notification dispatcher task.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use itv2_engine::{dispatch, Session};

use crate::state::AppState;

pub async fn run(bind_addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "panel-link listening");
    serve(listener, state).await;
    Ok(())
}

/// Runs the accept loop against an already-bound listener. Split out from
/// [`run`] so tests can bind an ephemeral port and learn its address before
/// the (otherwise infinite) accept loop starts.
pub async fn serve(listener: TcpListener, state: AppState) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "panel-link accept failed");
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer_addr, state).await;
        });
    }
}

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, state: AppState) {
    let _ = stream.set_nodelay(true);
    let (reader, writer) = stream.into_split();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let (session, handle) = match Session::accept(
        reader,
        writer,
        state.wire_registry.clone(),
        state.session_config_template.clone(),
        inbound_tx,
    )
    .await
    {
        Ok(pair) => pair,
        Err(e) => {
            warn!(%peer_addr, error = %e, "panel handshake failed");
            return;
        }
    };

    let session_id = handle.id.clone();
    info!(%peer_addr, session_id = %session_id, "panel handshake complete");

    if let Err(e) = state.session_registry.register(handle).await {
        warn!(%peer_addr, session_id = %session_id, error = %e, "session registration rejected");
        return;
    }

    let dispatch_task = tokio::spawn(dispatch::run(inbound_rx, state.panel_state.clone()));

    session.run().await;

    dispatch_task.abort();
    state.session_registry.deregister(&session_id).await;
    info!(session_id = %session_id, "panel session ended");
}
