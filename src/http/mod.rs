//! HTTP host surface: camera entities, live streams and the config flow.

mod mjpeg;
mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::Mutex;

use crate::entity::Integration;
use crate::entries::EntryStore;
use crate::error::Result;
use crate::flow::ConfigFlow;

pub use routes::create_router;

/// Knobs of the HTTP layer, taken from the bridge config.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Capacity of the per-request frame ring of `/stream`.
    pub stream_buffer_frames: usize,
    pub mjpeg_interval:       Duration,
    /// Where `?save=true` snapshots are stored.
    pub snapshot_dir:         PathBuf,
}

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub integration: Arc<Integration>,
    pub flow:        Arc<ConfigFlow>,
    pub entries:     Arc<Mutex<EntryStore>>,
    pub settings:    Arc<HttpSettings>,
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
