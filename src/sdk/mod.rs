//! Seam between the bridge and the vendor's native libraries.
//!
//! Everything above this module talks to [`NetSdk`] (device login, preview,
//! capture, PTZ) and [`PlayCtrl`] (the decode library paired with preview
//! streams). The production implementations in [`hcnetsdk`] and
//! [`playctrl`] load `libhcnetsdk` / `libPlayCtrl` at runtime; the tests use
//! the simulated layer in `mock`.
//!
//! Both traits keep the SDK's own calling style: calls report success as a
//! `bool` or a handle (negative means failure) and the caller asks
//! [`NetSdk::last_error`] for the vendor code right after a failed call, on
//! the same thread.

pub mod ffi;
pub mod hcnetsdk;
pub mod playctrl;

#[cfg(test)]
pub mod mock;

use std::path::PathBuf;
use std::sync::Arc;

pub use hcnetsdk::HcNetSdk;
pub use playctrl::PlayM4;

/// Handle value the SDK uses for "no login / no preview".
pub const INVALID_HANDLE: i32 = -1;

// Real-data callback type discriminators.
pub const NET_DVR_SYSHEAD:         u32 = 1;
pub const NET_DVR_STREAMDATA:      u32 = 2;
pub const NET_DVR_AUDIOSTREAMDATA: u32 = 3;
pub const NET_DVR_PRIVATE_DATA:    u32 = 112;

// PTZ command codes (NET_DVR_PTZControl_Other).
pub const ZOOM_IN:    u32 = 11;
pub const ZOOM_OUT:   u32 = 12;
pub const TILT_UP:    u32 = 21;
pub const TILT_DOWN:  u32 = 22;
pub const PAN_LEFT:   u32 = 23;
pub const PAN_RIGHT:  u32 = 24;
pub const UP_LEFT:    u32 = 25;
pub const UP_RIGHT:   u32 = 26;
pub const DOWN_LEFT:  u32 = 27;
pub const DOWN_RIGHT: u32 = 28;

/// Vendor error: the supplied buffer was too small.
pub const NET_DVR_NOENOUGH_BUF: u32 = 43;

/// Kind of buffer handed to the real-data callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Stream description; must reach the decoder before any payload.
    SystemHeader,
    /// Muxed (PS) stream payload.
    Payload,
    /// Separate audio payload.
    Audio,
    /// Vendor private data (smart-event overlays and the like).
    Private,
    Other(u32),
}

impl FrameKind {
    pub fn from_raw(data_type: u32) -> Self {
        match data_type {
            NET_DVR_SYSHEAD         => FrameKind::SystemHeader,
            NET_DVR_STREAMDATA      => FrameKind::Payload,
            NET_DVR_AUDIOSTREAMDATA => FrameKind::Audio,
            NET_DVR_PRIVATE_DATA    => FrameKind::Private,
            other                   => FrameKind::Other(other),
        }
    }

    pub fn is_header(self) -> bool {
        self == FrameKind::SystemHeader
    }
}

/// Closure invoked by the native layer for each received buffer.
///
/// Runs on an SDK-owned thread; the slice is only valid for the call.
pub type RawFrameCallback = Arc<dyn Fn(FrameKind, &[u8]) + Send + Sync>;

/// Process-wide settings applied once before `NET_DVR_Init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkInitOptions {
    /// Directory holding `libhcnetsdk`, its `HCNetSDKCom/` components and
    /// the bundled `libcrypto` / `libssl`.
    pub lib_dir:               Option<PathBuf>,
    /// Directory for the SDK's own log files; `None` disables them.
    pub log_dir:               Option<PathBuf>,
    /// SDK log level, 0 (off) to 3 (debug).
    pub log_level:             u32,
    pub connect_timeout_ms:    u32,
    pub connect_attempts:      u32,
    pub reconnect:             bool,
    pub reconnect_interval_ms: u32,
}

impl Default for SdkInitOptions {
    fn default() -> Self {
        Self {
            lib_dir:               None,
            log_dir:               None,
            log_level:             0,
            connect_timeout_ms:    2000,
            connect_attempts:      1,
            reconnect:             true,
            reconnect_interval_ms: 10_000,
        }
    }
}

/// Device address and credentials for `NET_DVR_Login_V40`.
#[derive(Debug, Clone, Copy)]
pub struct LoginParams<'a> {
    pub host:     &'a str,
    pub port:     u16,
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamType {
    #[default]
    Main,
    Sub,
}

impl StreamType {
    pub fn as_raw(self) -> u32 {
        match self {
            StreamType::Main => 0,
            StreamType::Sub  => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    #[default]
    Tcp,
    Udp,
}

impl LinkMode {
    pub fn as_raw(self) -> u32 {
        match self {
            LinkMode::Tcp => 0,
            LinkMode::Udp => 1,
        }
    }
}

/// Preview request for `NET_DVR_RealPlay_V40`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewParams {
    pub channel:     i32,
    pub stream_type: StreamType,
    pub link_mode:   LinkMode,
}

/// Device login, preview, capture and PTZ entry points.
pub trait NetSdk: Send + Sync {
    fn init(&self) -> bool;
    fn cleanup(&self) -> bool;

    /// `NET_DVR_SetSDKInitCfg` for the component, libcrypto and libssl paths.
    fn set_sdk_paths(&self, lib_dir: &std::path::Path) -> bool;
    fn set_connect_time(&self, wait_ms: u32, attempts: u32) -> bool;
    fn set_reconnect(&self, interval_ms: u32, enable: bool) -> bool;
    fn set_log_to_file(&self, level: u32, dir: &std::path::Path, auto_delete: bool) -> bool;

    /// Returns the login handle, negative on failure.
    fn login(&self, params: &LoginParams<'_>) -> i32;
    fn logout(&self, user: i32) -> bool;

    /// Starts a preview and registers `callback`. Returns the play handle,
    /// negative on failure. The callback is released by `stop_real_play`.
    fn real_play(&self, user: i32, preview: &PreviewParams, callback: RawFrameCallback) -> i32;
    /// Stops the preview. No callback runs once this returns.
    fn stop_real_play(&self, play: i32) -> bool;

    /// Captures a JPEG from `channel`. `None` on failure.
    fn capture_jpeg(&self, user: i32, channel: i32) -> Option<Vec<u8>>;

    /// Starts (`stop == false`) or stops a PTZ motion. `speed` is 1..=7.
    fn ptz_control(&self, user: i32, channel: i32, command: u32, stop: bool, speed: Option<u32>) -> bool;

    fn last_error(&self) -> u32;
}

/// Decode library paired with preview streams.
pub trait PlayCtrl: Send + Sync {
    fn get_port(&self) -> Option<i32>;
    /// Real-time open mode plus `PlayM4_OpenStream` with the system header.
    fn open_stream(&self, port: i32, header: &[u8], pool_size: u32) -> bool;
    fn input_data(&self, port: i32, data: &[u8]) -> bool;
    fn play(&self, port: i32) -> bool;
    fn stop(&self, port: i32) -> bool;
    fn close_stream(&self, port: i32) -> bool;
    fn free_port(&self, port: i32) -> bool;
    fn last_error(&self, port: i32) -> u32;
}

/// Short description of a well-known HCNetSDK error code, for logs.
pub fn describe_error(code: u32) -> &'static str {
    match code {
        0   => "no error",
        1   => "wrong user name or password",
        2   => "insufficient privilege",
        3   => "SDK not initialised",
        4   => "invalid channel",
        5   => "too many connections",
        6   => "SDK/device version mismatch",
        7   => "cannot connect to device",
        8   => "send failed",
        9   => "receive failed",
        10  => "receive timed out",
        11  => "malformed data",
        12  => "call order error",
        17  => "invalid parameter",
        23  => "not supported by device",
        41  => "resource allocation failed",
        NET_DVR_NOENOUGH_BUF => "buffer too small",
        47  => "user does not exist",
        64  => "failed to load SDK component",
        153 => "user locked",
        _   => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_kind_from_raw() {
        assert_eq!(FrameKind::from_raw(1), FrameKind::SystemHeader);
        assert_eq!(FrameKind::from_raw(2), FrameKind::Payload);
        assert_eq!(FrameKind::from_raw(112), FrameKind::Private);
        assert_eq!(FrameKind::from_raw(99), FrameKind::Other(99));
        assert!(FrameKind::SystemHeader.is_header());
        assert!(!FrameKind::Audio.is_header());
    }

    #[test]
    fn describe_known_and_unknown() {
        assert_eq!(describe_error(7), "cannot connect to device");
        assert_eq!(describe_error(9999), "unknown error");
    }
}
