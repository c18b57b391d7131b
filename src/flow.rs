//! User config flow: collect address and credentials, verify them against
//! the device, produce a config entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::config::{DeviceConfig, DEFAULT_PORT, DEFAULT_USERNAME};
use crate::runtime::SdkRuntime;
use crate::session::check_credentials;

pub const STEP_USER: &str = "user";
pub const ERROR_CANNOT_CONNECT: &str = "cannot_connect";
pub const ERROR_UNKNOWN: &str = "unknown";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

/// Pre-filled values of the user form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormDefaults {
    pub host:     String,
    pub port:     u16,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    Form {
        step_id:  &'static str,
        defaults: FormDefaults,
        /// Field name (or `base`) → error key.
        errors:   BTreeMap<&'static str, &'static str>,
    },
    CreateEntry {
        title: String,
        data:  DeviceConfig,
    },
    Abort {
        reason: &'static str,
    },
}

pub struct ConfigFlow {
    runtime: Arc<SdkRuntime>,
}

impl ConfigFlow {
    pub fn new(runtime: Arc<SdkRuntime>) -> Self {
        Self { runtime }
    }

    /// One pass of the user step. `configured` reports whether a host already
    /// has an entry.
    pub async fn step_user(
        &self,
        input:      Option<DeviceConfig>,
        configured: impl Fn(&str) -> bool,
    ) -> FlowResult {
        let Some(input) = input else {
            return form(None, BTreeMap::new());
        };
        let input = DeviceConfig { host: input.host.trim().to_string(), ..input };

        let mut errors = BTreeMap::new();
        match check_credentials(Arc::clone(&self.runtime), input.clone()).await {
            Ok(()) => {
                if configured(&input.host) {
                    return FlowResult::Abort { reason: ABORT_ALREADY_CONFIGURED };
                }
                info!("Config flow accepted {}:{}", input.host, input.port);
                return FlowResult::CreateEntry { title: format!("Camera {}", input.host), data: input };
            }
            Err(e) if e.is_connectivity() => {
                warn!("Config flow cannot connect to {}: {e}", input.host);
                errors.insert("base", ERROR_CANNOT_CONNECT);
            }
            Err(e) => {
                warn!("Config flow failed for {}: {e}", input.host);
                errors.insert("base", ERROR_UNKNOWN);
            }
        }
        form(Some(&input), errors)
    }
}

fn form(last: Option<&DeviceConfig>, errors: BTreeMap<&'static str, &'static str>) -> FlowResult {
    let defaults = match last {
        Some(d) => FormDefaults { host: d.host.clone(), port: d.port, username: d.username.clone() },
        None => FormDefaults {
            host:     String::new(),
            port:     DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
        },
    };
    FlowResult::Form { step_id: STEP_USER, defaults, errors }
}
