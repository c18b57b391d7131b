//! Bridge configuration file parser and per-device settings.
//!
//! The bridge file uses the same `key = value` format as the other
//! daemons on the box; device credentials live in the config-entry store
//! (see `entries.rs`), not here.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HikError, Result};
use crate::sdk::{LinkMode, SdkInitOptions, StreamType};

pub const DEFAULT_PORT:     u16 = 8000;
pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_CHANNEL:  i32 = 1;

const CONNECT_TIMEOUT_MS:    u32 = 3000;
const CONNECT_ATTEMPTS:      u32 = 1;
const RECONNECT_INTERVAL_MS: u32 = 10_000;
const STREAM_BUFFER_FRAMES:  usize = 256;
const MJPEG_INTERVAL_MS:     u64 = 1000;
const LISTEN_ADDR:           &str = "127.0.0.1:8765";

/// Full bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    // ── Vendor SDK ────────────────────────────────────────────────────────────
    /// Directory holding libhcnetsdk, HCNetSDKCom/ and the bundled OpenSSL.
    pub sdk_lib_dir:           Option<PathBuf>,
    /// SDK log directory; unset disables SDK file logging.
    pub sdk_log_dir:           Option<PathBuf>,
    pub sdk_log_level:         u32,
    pub connect_timeout_ms:    u32,
    pub connect_attempts:      u32,
    pub reconnect:             bool,
    pub reconnect_interval_ms: u32,
    // ── Preview ───────────────────────────────────────────────────────────────
    pub stream_type:           StreamType,
    pub link_mode:             LinkMode,
    /// Payload frames buffered per stream consumer before the oldest drops.
    pub stream_buffer_frames:  usize,
    /// Feed preview streams through PlayCtrl as well.
    pub decode_preview:        bool,
    pub mjpeg_interval_ms:     u64,
    // ── Host surface ──────────────────────────────────────────────────────────
    pub listen_addr:           SocketAddr,
    pub entries_file:          PathBuf,
    pub snapshot_dir:          PathBuf,
    // ── Process ───────────────────────────────────────────────────────────────
    pub pid_file:              PathBuf,
    pub log_syslog:            bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sdk_lib_dir:           None,
            sdk_log_dir:           None,
            sdk_log_level:         0,
            connect_timeout_ms:    CONNECT_TIMEOUT_MS,
            connect_attempts:      CONNECT_ATTEMPTS,
            reconnect:             true,
            reconnect_interval_ms: RECONNECT_INTERVAL_MS,
            stream_type:           StreamType::Main,
            link_mode:             LinkMode::Tcp,
            stream_buffer_frames:  STREAM_BUFFER_FRAMES,
            decode_preview:        false,
            mjpeg_interval_ms:     MJPEG_INTERVAL_MS,
            listen_addr:           default_listen_addr(),
            entries_file:          PathBuf::from("/var/lib/hik-bridge/entries.json"),
            snapshot_dir:          PathBuf::from("/tmp/hik-bridge"),
            pid_file:              PathBuf::from("/var/run/hik-bridge.pid"),
            log_syslog:            true,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    LISTEN_ADDR.parse().unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8765)))
}

fn parse_bool(val: &str) -> bool {
    matches!(val.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl BridgeConfig {
    /// Options for the process-wide SDK runtime.
    pub fn sdk_options(&self) -> SdkInitOptions {
        SdkInitOptions {
            lib_dir:               self.sdk_lib_dir.clone(),
            log_dir:               self.sdk_log_dir.clone(),
            log_level:             self.sdk_log_level,
            connect_timeout_ms:    self.connect_timeout_ms,
            connect_attempts:      self.connect_attempts,
            reconnect:             self.reconnect,
            reconnect_interval_ms: self.reconnect_interval_ms,
        }
    }
}

/// Parse `path` as a `hik_bridge.conf` key=value configuration file.
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| HikError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<BridgeConfig> {
    let mut cfg = BridgeConfig::default();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, val)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let val = val.trim().to_string();
        if val.is_empty() {
            continue;
        }

        match key.as_str() {
            "sdk_lib_dir"           => cfg.sdk_lib_dir           = Some(PathBuf::from(&val)),
            "sdk_log_dir"           => cfg.sdk_log_dir           = Some(PathBuf::from(&val)),
            "sdk_log_level"         => cfg.sdk_log_level         = val.parse::<u32>().unwrap_or(0).min(3),
            "connect_timeout_ms"    => cfg.connect_timeout_ms    = val.parse().unwrap_or(CONNECT_TIMEOUT_MS),
            "connect_attempts"      => cfg.connect_attempts      = val.parse().unwrap_or(CONNECT_ATTEMPTS),
            "reconnect"             => cfg.reconnect             = parse_bool(&val),
            "reconnect_interval_ms" => cfg.reconnect_interval_ms = val.parse().unwrap_or(RECONNECT_INTERVAL_MS),
            "stream_buffer_frames"  => cfg.stream_buffer_frames  = val.parse().unwrap_or(STREAM_BUFFER_FRAMES),
            "decode_preview"        => cfg.decode_preview        = parse_bool(&val),
            "mjpeg_interval_ms"     => cfg.mjpeg_interval_ms     = val.parse().unwrap_or(MJPEG_INTERVAL_MS),
            "entries_file"          => cfg.entries_file          = PathBuf::from(&val),
            "snapshot_dir"          => cfg.snapshot_dir          = PathBuf::from(&val),
            "pid_file"              => cfg.pid_file              = PathBuf::from(&val),
            "log_syslog"            => cfg.log_syslog            = parse_bool(&val),
            "listen_addr" => {
                cfg.listen_addr = val.parse::<SocketAddr>().map_err(|e| {
                    HikError::Config(format!("line {}: listen_addr {val:?}: {e}", lineno + 1))
                })?;
            }
            "stream_type" => {
                cfg.stream_type = match val.to_ascii_lowercase().as_str() {
                    "sub" => StreamType::Sub,
                    _     => StreamType::Main,
                };
            }
            "link_mode" => {
                cfg.link_mode = match val.to_ascii_lowercase().as_str() {
                    "udp" => LinkMode::Udp,
                    _     => LinkMode::Tcp,
                };
            }
            _ => {} // ignore unknown keys
        }
    }

    Ok(cfg)
}

/// Validate values that would only fail later at runtime.
pub fn validate_config(cfg: &BridgeConfig) -> Result<()> {
    if cfg.stream_buffer_frames == 0 {
        return Err(HikError::Config("stream_buffer_frames must be at least 1".into()));
    }
    if cfg.connect_timeout_ms < 300 {
        // The SDK clamps lower values and logs nothing about it.
        return Err(HikError::Config("connect_timeout_ms must be at least 300".into()));
    }
    if cfg.mjpeg_interval_ms == 0 {
        return Err(HikError::Config("mjpeg_interval_ms must be positive".into()));
    }
    if let Some(dir) = &cfg.sdk_lib_dir {
        if !dir.is_dir() {
            return Err(HikError::Config(format!("sdk_lib_dir {} is not a directory", dir.display())));
        }
    }
    Ok(())
}

// ── Device settings ───────────────────────────────────────────────────────────

fn default_port() -> u16 { DEFAULT_PORT }
fn default_username() -> String { DEFAULT_USERNAME.to_string() }
fn default_channel() -> i32 { DEFAULT_CHANNEL }

/// Address and credentials of one camera, as stored in a config entry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host:      String,
    #[serde(default = "default_port")]
    pub port:      u16,
    #[serde(default = "default_username")]
    pub username:  String,
    pub password:  String,
    #[serde(default = "default_channel")]
    pub channel:   i32,
    /// RTSP port for the derived stream URL, when it differs from `port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtsp_port: Option<u16>,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host:      host.into(),
            port:      DEFAULT_PORT,
            username:  DEFAULT_USERNAME.to_string(),
            password:  password.into(),
            channel:   DEFAULT_CHANNEL,
            rtsp_port: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(HikError::Validation("host is required".into()));
        }
        if host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(HikError::Validation(format!("invalid host {host:?}")));
        }
        if self.port == 0 {
            return Err(HikError::Validation("port must be 1-65535".into()));
        }
        if self.username.is_empty() {
            return Err(HikError::Validation("username is required".into()));
        }
        if self.channel < 1 {
            return Err(HikError::Validation("channel must be at least 1".into()));
        }
        Ok(())
    }
}

// Keeps the password out of logs and panics.
impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("channel", &self.channel)
            .field("rtsp_port", &self.rtsp_port)
            .finish()
    }
}
