//! Route table and handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use log::{debug, error, warn};
use serde::Deserialize;
use serde_json::json;

use super::mjpeg;
use super::AppState;
use crate::config::DeviceConfig;
use crate::entity::{CameraEntity, CameraInfo};
use crate::entries::{unique_id_for, ConfigEntry};
use crate::flow::{self, FlowResult};
use crate::ptz::PtzRequest;
use crate::relay::{FrameRing, FrameSink};
use crate::session::DeviceSession;
use crate::util;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/:id", delete(remove_camera))
        .route("/api/cameras/:id/snapshot", get(snapshot))
        .route("/api/cameras/:id/stream_source", get(stream_source))
        .route("/api/cameras/:id/stream", get(stream))
        .route("/api/cameras/:id/mjpeg", get(mjpeg_stream))
        .route("/api/cameras/:id/ptz", post(ptz))
        .route("/api/flow/user", post(flow_user))
        .with_state(state)
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({ "error": msg.into() }))).into_response()
}

async fn entity_or_404(state: &AppState, id: &str) -> Result<Arc<CameraEntity>, Response> {
    state
        .integration
        .get(id)
        .await
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("unknown camera {id}")))
}

/// GET /api/cameras
async fn list_cameras(State(state): State<AppState>) -> Json<Vec<CameraInfo>> {
    let cams = state.integration.list().await;
    Json(cams.iter().map(|c| c.info()).collect())
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotQuery {
    width:  Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    save:   bool,
}

/// GET /api/cameras/:id/snapshot
async fn snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<SnapshotQuery>,
) -> Response {
    let entity = match entity_or_404(&state, &id).await {
        Ok(e) => e,
        Err(r) => return r,
    };
    let Some(jpeg) = entity.camera_image(q.width, q.height).await else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "snapshot unavailable");
    };
    if q.save {
        let host = &entity.session().device().host;
        if let Err(e) = util::save_snapshot(&state.settings.snapshot_dir, host, &jpeg).await {
            warn!("cannot store snapshot of {host}: {e}");
        }
    }
    ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response()
}

/// GET /api/cameras/:id/stream_source
async fn stream_source(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let entity = match entity_or_404(&state, &id).await {
        Ok(e) => e,
        Err(r) => return r,
    };
    match entity.stream_source() {
        Some(url) => Json(json!({ "url": url })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "camera not connected"),
    }
}

/// Stops the native stream when the response body is dropped. A newer
/// stream that replaced this one is left running.
struct StreamGuard {
    session: Arc<DeviceSession>,
    ring:    Arc<FrameRing>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.ring.dropped() > 0 {
            debug!("stream of {}: {} frames dropped for a slow client", self.session.device().host, self.ring.dropped());
        }
        if self.ring.is_closed() {
            return;
        }
        let session = Arc::clone(&self.session);
        let sink: Arc<dyn FrameSink> = self.ring.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match session.stop_stream_for(&sink).await {
                        Ok(true) => debug!("stream of {} stopped, client went away", session.device().host),
                        Ok(false) => {}
                        Err(e) => warn!("stopping stream of {} failed: {e}", session.device().host),
                    }
                });
            }
            Err(_) => warn!("stream of {} outlived the runtime", self.session.device().host),
        }
    }
}

/// GET /api/cameras/:id/stream: raw PS stream, system header first.
async fn stream(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let entity = match entity_or_404(&state, &id).await {
        Ok(e) => e,
        Err(r) => return r,
    };
    let ring = match entity.open_stream(state.settings.stream_buffer_frames).await {
        Ok(r) => r,
        Err(e) => {
            warn!("{}: cannot start stream: {e}", entity.name());
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "stream unavailable");
        }
    };
    let guard = StreamGuard { session: Arc::clone(entity.session()), ring: Arc::clone(&ring) };
    let body = futures_util::stream::unfold((ring, guard), |(ring, guard)| async move {
        let frame = ring.next().await?;
        Some((Ok::<_, Infallible>(frame.data), (ring, guard)))
    });
    (
        [(header::CONTENT_TYPE, "video/mp2p")],
        Body::from_stream(body),
    )
        .into_response()
}

/// GET /api/cameras/:id/mjpeg
async fn mjpeg_stream(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let entity = match entity_or_404(&state, &id).await {
        Ok(e) => e,
        Err(r) => return r,
    };
    let body = mjpeg::snapshot_stream(entity, state.settings.mjpeg_interval);
    ([(header::CONTENT_TYPE, mjpeg::content_type())], Body::from_stream(body)).into_response()
}

/// POST /api/cameras/:id/ptz
async fn ptz(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PtzRequest>,
) -> Response {
    let entity = match entity_or_404(&state, &id).await {
        Ok(e) => e,
        Err(r) => return r,
    };
    if let Err(e) = request.commands() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }
    if entity.ptz(&request).await {
        Json(json!({ "ok": true })).into_response()
    } else {
        error_response(StatusCode::BAD_GATEWAY, "PTZ command failed")
    }
}

fn abort_response(reason: &str) -> Response {
    Json(json!({ "type": "abort", "reason": reason })).into_response()
}

/// POST /api/flow/user: empty body shows the form.
async fn flow_user(State(state): State<AppState>, body: Bytes) -> Response {
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<DeviceConfig>(&body) {
            Ok(d) => Some(d),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid input: {e}")),
        }
    };

    // The device check can take the full connect timeout; only look at the
    // store briefly before and after it.
    let known = state.entries.lock().await.unique_ids();
    let result = state.flow.step_user(input, |host| known.contains(&unique_id_for(host))).await;
    match result {
        FlowResult::Form { step_id, defaults, errors } => Json(json!({
            "type":     "form",
            "step_id":  step_id,
            "defaults": defaults,
            "errors":   errors,
        }))
        .into_response(),
        FlowResult::Abort { reason } => abort_response(reason),
        FlowResult::CreateEntry { title, data } => {
            let entry = ConfigEntry::new(title, data);
            {
                let mut store = state.entries.lock().await;
                if store.has_unique_id(&entry.unique_id) {
                    debug!("{} was configured while its flow ran", entry.unique_id);
                    return abort_response(flow::ABORT_ALREADY_CONFIGURED);
                }
                if let Err(e) = store.add(entry.clone()) {
                    error!("cannot store entry {}: {e}", entry.title);
                    return error_response(StatusCode::INTERNAL_SERVER_ERROR, "cannot store entry");
                }
            }
            let loaded = match state.integration.setup_entry(entry.clone()).await {
                Ok(_) => true,
                Err(e) => {
                    error!("setup of {} failed: {e}", entry.title);
                    false
                }
            };
            (
                StatusCode::CREATED,
                Json(json!({
                    "type":     "create_entry",
                    "entry_id": entry.entry_id,
                    "title":    entry.title,
                    "loaded":   loaded,
                })),
            )
                .into_response()
        }
    }
}

/// DELETE /api/cameras/:id
async fn remove_camera(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let unloaded = state.integration.unload_entry(&id).await;
    let removed = match state.entries.lock().await.remove(&id) {
        Ok(r) => r.is_some(),
        Err(e) => {
            error!("cannot remove entry {id}: {e}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "cannot remove entry");
        }
    };
    if unloaded || removed {
        Json(json!({ "ok": true })).into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("unknown camera {id}"))
    }
}
