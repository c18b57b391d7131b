//! Process-wide SDK runtime with reference counting.
//!
//! `NET_DVR_Init` / `NET_DVR_Cleanup` are process-global. Sessions never
//! call them directly; they hold a [`RuntimeGuard`] instead. The first guard
//! applies the init options and initialises the SDK, dropping the last one
//! cleans it up. All methods block and belong on the blocking pool.

use std::sync::Arc;

use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::{HikError, Result};
use crate::sdk::{self, HcNetSdk, NetSdk, PlayCtrl, PlayM4, SdkInitOptions};

static GLOBAL: OnceCell<Arc<SdkRuntime>> = OnceCell::new();

pub struct SdkRuntime {
    sdk:      Arc<dyn NetSdk>,
    playctrl: Option<Arc<dyn PlayCtrl>>,
    options:  SdkInitOptions,
    /// Number of live guards. Held across init/cleanup so they never race.
    refs:     Mutex<usize>,
}

impl SdkRuntime {
    pub fn new(
        sdk:      Arc<dyn NetSdk>,
        playctrl: Option<Arc<dyn PlayCtrl>>,
        options:  SdkInitOptions,
    ) -> Arc<Self> {
        Arc::new(Self { sdk, playctrl, options, refs: Mutex::new(0) })
    }

    /// Load the vendor libraries. The decode library is optional.
    pub fn load(options: SdkInitOptions) -> Result<Arc<Self>> {
        let lib_dir = options.lib_dir.as_deref();
        let sdk = HcNetSdk::load(lib_dir)?;
        let playctrl: Option<Arc<dyn PlayCtrl>> = match PlayM4::load(lib_dir) {
            Ok(p) => Some(Arc::new(p)),
            Err(e) => {
                warn!("decode library unavailable, preview decoding disabled: {e}");
                None
            }
        };
        Ok(Self::new(Arc::new(sdk), playctrl, options))
    }

    /// The runtime shared by every session in this process.
    ///
    /// The first successful call fixes the options; later calls with
    /// different options get the existing runtime and a warning.
    pub fn global(options: &SdkInitOptions) -> Result<Arc<Self>> {
        let rt = GLOBAL.get_or_try_init(|| Self::load(options.clone()))?;
        if rt.options != *options {
            warn!("SDK runtime already loaded with different options; keeping the first");
        }
        Ok(Arc::clone(rt))
    }

    pub fn sdk(&self) -> &Arc<dyn NetSdk> {
        &self.sdk
    }

    pub fn playctrl(&self) -> Option<&Arc<dyn PlayCtrl>> {
        self.playctrl.as_ref()
    }

    pub fn ref_count(&self) -> usize {
        *self.refs.lock()
    }

    /// Take a reference, initialising the SDK if this is the first one.
    pub fn acquire(self: &Arc<Self>) -> Result<RuntimeGuard> {
        let mut refs = self.refs.lock();
        if *refs == 0 {
            self.start()?;
        }
        *refs += 1;
        debug!("SDK runtime acquired (refs={})", *refs);
        Ok(RuntimeGuard { runtime: Arc::clone(self) })
    }

    fn release(&self) {
        let mut refs = self.refs.lock();
        if *refs == 0 {
            warn!("SDK runtime released more often than acquired");
            return;
        }
        *refs -= 1;
        debug!("SDK runtime released (refs={})", *refs);
        if *refs == 0 {
            if !self.sdk.cleanup() {
                warn!("NET_DVR_Cleanup failed: vendor error {}", self.sdk.last_error());
            }
            info!("SDK runtime cleaned up");
        }
    }

    fn start(&self) -> Result<()> {
        let opts = &self.options;
        // Component and crypto paths must be set before NET_DVR_Init.
        if let Some(dir) = &opts.lib_dir {
            if !self.sdk.set_sdk_paths(dir) {
                warn!("SDK init paths under {} not fully applied", dir.display());
            }
        }
        if !self.sdk.init() {
            let code = self.sdk.last_error();
            return Err(HikError::SdkInit(format!(
                "NET_DVR_Init failed: vendor error {code} ({})",
                sdk::describe_error(code)
            )));
        }
        if !self.sdk.set_connect_time(opts.connect_timeout_ms, opts.connect_attempts) {
            warn!("NET_DVR_SetConnectTime failed: vendor error {}", self.sdk.last_error());
        }
        if !self.sdk.set_reconnect(opts.reconnect_interval_ms, opts.reconnect) {
            warn!("NET_DVR_SetReconnect failed: vendor error {}", self.sdk.last_error());
        }
        if let Some(dir) = &opts.log_dir {
            if !self.sdk.set_log_to_file(opts.log_level, dir, true) {
                warn!("NET_DVR_SetLogToFile failed: vendor error {}", self.sdk.last_error());
            }
        }
        info!("SDK runtime initialised");
        Ok(())
    }
}

/// One reference on the SDK runtime; released on drop.
pub struct RuntimeGuard {
    runtime: Arc<SdkRuntime>,
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        self.runtime.release();
    }
}
