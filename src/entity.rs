//! Camera entities and the integration that owns them.
//!
//! A [`CameraEntity`] is what the host sees: a name, a still image, a stream
//! source and a PTZ service. Every call is delegated to the entity's
//! [`DeviceSession`]; failures are logged and surface as `None` / `false`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::entries::ConfigEntry;
use crate::error::{HikError, Result};
use crate::ptz::PtzRequest;
use crate::relay::{FrameRing, RelayStats};
use crate::runtime::SdkRuntime;
use crate::session::{DeviceSession, SessionState, StreamOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFeature {
    Stream,
    Ptz,
}

pub const SUPPORTED_FEATURES: &[CameraFeature] = &[CameraFeature::Stream, CameraFeature::Ptz];

#[derive(Debug, Clone, Serialize)]
pub struct CameraInfo {
    pub id:       String,
    pub name:     String,
    pub host:     String,
    pub features: &'static [CameraFeature],
    pub state:    SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream:   Option<RelayStats>,
}

pub struct CameraEntity {
    entry:          ConfigEntry,
    session:        Arc<DeviceSession>,
    stream_options: StreamOptions,
}

impl CameraEntity {
    pub fn new(entry: ConfigEntry, session: Arc<DeviceSession>, stream_options: StreamOptions) -> Self {
        Self { entry, session, stream_options }
    }

    pub fn name(&self) -> String {
        format!("Hikvision {}", self.entry.title)
    }

    pub fn unique_id(&self) -> &str {
        &self.entry.entry_id
    }

    pub fn supported_features(&self) -> &'static [CameraFeature] {
        SUPPORTED_FEATURES
    }

    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }

    pub fn info(&self) -> CameraInfo {
        CameraInfo {
            id:       self.entry.entry_id.clone(),
            name:     self.name(),
            host:     self.entry.data.host.clone(),
            features: self.supported_features(),
            state:    self.session.state(),
            stream:   self.session.stream_stats(),
        }
    }

    /// Current still image. The device always captures at its configured
    /// resolution; the requested size is advisory.
    pub async fn camera_image(&self, width: Option<u32>, height: Option<u32>) -> Option<Vec<u8>> {
        if width.is_some() || height.is_some() {
            debug!("{}: ignoring requested size {width:?}x{height:?}", self.name());
        }
        match self.session.snapshot().await {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                warn!("{}: snapshot failed: {e}", self.name());
                None
            }
        }
    }

    pub fn stream_source(&self) -> Option<String> {
        self.session.stream_url()
    }

    pub async fn ptz(&self, request: &PtzRequest) -> bool {
        match self.session.ptz(request).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: PTZ failed: {e}", self.name());
                false
            }
        }
    }

    /// Start a preview into a fresh ring. Any previous preview of this
    /// camera is closed.
    pub async fn open_stream(&self, capacity: usize) -> Result<Arc<FrameRing>> {
        let ring = FrameRing::new(capacity);
        self.session.start_stream(ring.clone(), self.stream_options).await?;
        Ok(ring)
    }

    pub async fn added_to_host(&self) -> Result<()> {
        self.session.connect().await
    }

    pub async fn will_remove_from_host(&self) {
        if let Err(e) = self.session.disconnect().await {
            error!("{}: disconnect failed: {e}", self.name());
        }
    }
}

impl fmt::Debug for CameraEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraEntity")
            .field("entry_id", &self.entry.entry_id)
            .field("title", &self.entry.title)
            .field("host", &self.entry.data.host)
            .field("state", &self.session.state())
            .finish()
    }
}

/// All camera entities of this process, keyed by entry id.
pub struct Integration {
    runtime:        Arc<SdkRuntime>,
    stream_options: StreamOptions,
    entities:       RwLock<HashMap<String, Arc<CameraEntity>>>,
}

impl Integration {
    pub fn new(runtime: Arc<SdkRuntime>, stream_options: StreamOptions) -> Arc<Self> {
        Arc::new(Self { runtime, stream_options, entities: RwLock::new(HashMap::new()) })
    }

    /// Connect the entry's camera and register its entity. A connect failure
    /// aborts the setup and is returned.
    pub async fn setup_entry(&self, entry: ConfigEntry) -> Result<Arc<CameraEntity>> {
        if self.entities.read().await.contains_key(&entry.entry_id) {
            return Err(HikError::Validation(format!("entry {} is already set up", entry.entry_id)));
        }
        let session = DeviceSession::new(Arc::clone(&self.runtime), entry.data.clone());
        let entity = Arc::new(CameraEntity::new(entry, session, self.stream_options));
        entity.added_to_host().await?;

        let mut entities = self.entities.write().await;
        info!("Set up {} ({})", entity.name(), entity.unique_id());
        entities.insert(entity.unique_id().to_string(), Arc::clone(&entity));
        Ok(entity)
    }

    /// Remove the entity and disconnect it. `false` if it was not set up.
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let entity = self.entities.write().await.remove(entry_id);
        match entity {
            Some(entity) => {
                entity.will_remove_from_host().await;
                info!("Unloaded {}", entity.name());
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, entry_id: &str) -> Option<Arc<CameraEntity>> {
        self.entities.read().await.get(entry_id).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<CameraEntity>> {
        let mut v: Vec<_> = self.entities.read().await.values().cloned().collect();
        v.sort_by_key(|e| e.name());
        v
    }

    pub async fn unload_all(&self) {
        let ids: Vec<String> = self.entities.read().await.keys().cloned().collect();
        for id in ids {
            self.unload_entry(&id).await;
        }
    }
}
