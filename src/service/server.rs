use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::Backend;

use super::{router, AppState};

/// The servicebox HTTP server.
pub struct ApiService;

impl ApiService {
	/// Serves the API on `0.0.0.0:port` until Ctrl-C.
	///
	/// The backend is not unbound here; the caller owns its lifecycle.
	pub async fn serve(backend: Arc<dyn Backend>, port: u16) -> std::io::Result<()> {
		let addr = SocketAddr::from(([0, 0, 0, 0], port));
		let listener = TcpListener::bind(addr).await.map_err(|e| {
			error!("failed to listen on {}: {}", addr, e);
			e
		})?;
		info!(task = "http_setup", backend = backend.name(), "listening on {}", addr);

		axum::serve(listener, router(AppState::new(backend)))
			.with_graceful_shutdown(shutdown_signal())
			.await
	}
}

async fn shutdown_signal() {
	match tokio::signal::ctrl_c().await {
		Ok(()) => info!("received Ctrl-C, shutting down"),
		Err(e) => error!("failed to listen for Ctrl-C: {}", e),
	}
}
