//! Simulated native layer for tests.
//!
//! Records every call, hands out handles like the SDK does (login handles
//! start at 0, which is valid) and lets a test drive the preview callback
//! from any thread with [`MockSdk::emit`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{FrameKind, LoginParams, NetSdk, PlayCtrl, PreviewParams, RawFrameCallback};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init,
    Cleanup,
    SetSdkPaths,
    SetConnectTime(u32, u32),
    SetReconnect(u32, bool),
    SetLogToFile(u32),
    Login { host: String, port: u16, username: String },
    Logout(i32),
    RealPlay { user: i32, channel: i32 },
    StopRealPlay(i32),
    Capture { user: i32, channel: i32 },
    Ptz { command: u32, stop: bool, speed: Option<u32> },
}

pub struct MockSdk {
    calls:           Mutex<Vec<Call>>,
    init_ok:         AtomicBool,
    login_error:     Mutex<Option<u32>>,
    login_delay:     Mutex<Duration>,
    real_play_error: Mutex<Option<u32>>,
    ptz_error:       Mutex<Option<u32>>,
    jpeg:            Mutex<Option<Vec<u8>>>,
    next_user:       AtomicI32,
    next_play:       AtomicI32,
    last_error:      AtomicU32,
    callbacks:       Mutex<HashMap<i32, RawFrameCallback>>,
}

impl MockSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls:           Mutex::new(Vec::new()),
            init_ok:         AtomicBool::new(true),
            login_error:     Mutex::new(None),
            login_delay:     Mutex::new(Duration::ZERO),
            real_play_error: Mutex::new(None),
            ptz_error:       Mutex::new(None),
            jpeg:            Mutex::new(Some(vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0xff, 0xd9])),
            next_user:       AtomicI32::new(0),
            next_play:       AtomicI32::new(100),
            last_error:      AtomicU32::new(0),
            callbacks:       Mutex::new(HashMap::new()),
        })
    }

    pub fn fail_init(&self) {
        self.init_ok.store(false, Ordering::SeqCst);
    }

    pub fn fail_login(&self, code: u32) {
        *self.login_error.lock() = Some(code);
    }

    /// Make every login block its thread this long, like an unreachable
    /// host running into the connect timeout.
    pub fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.lock() = delay;
    }

    pub fn fail_real_play(&self, code: u32) {
        *self.real_play_error.lock() = Some(code);
    }

    pub fn fail_ptz(&self, code: u32) {
        *self.ptz_error.lock() = Some(code);
    }

    pub fn set_jpeg(&self, jpeg: Option<Vec<u8>>) {
        *self.jpeg.lock() = jpeg;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Play handles that still have a registered callback.
    pub fn active_plays(&self) -> Vec<i32> {
        let mut v: Vec<i32> = self.callbacks.lock().keys().copied().collect();
        v.sort_unstable();
        v
    }

    /// Invoke the preview callback of `play` as the SDK thread would.
    /// Returns `false` if no preview is registered under that handle.
    pub fn emit(&self, play: i32, kind: FrameKind, data: &[u8]) -> bool {
        let cb = self.callbacks.lock().get(&play).cloned();
        match cb {
            Some(cb) => {
                cb(kind, data);
                true
            }
            None => false,
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn fail(&self, code: u32) {
        self.last_error.store(code, Ordering::SeqCst);
    }
}

impl NetSdk for MockSdk {
    fn init(&self) -> bool {
        self.record(Call::Init);
        let ok = self.init_ok.load(Ordering::SeqCst);
        if !ok {
            self.fail(64);
        }
        ok
    }

    fn cleanup(&self) -> bool {
        self.record(Call::Cleanup);
        true
    }

    fn set_sdk_paths(&self, _lib_dir: &Path) -> bool {
        self.record(Call::SetSdkPaths);
        true
    }

    fn set_connect_time(&self, wait_ms: u32, attempts: u32) -> bool {
        self.record(Call::SetConnectTime(wait_ms, attempts));
        true
    }

    fn set_reconnect(&self, interval_ms: u32, enable: bool) -> bool {
        self.record(Call::SetReconnect(interval_ms, enable));
        true
    }

    fn set_log_to_file(&self, level: u32, _dir: &Path, _auto_delete: bool) -> bool {
        self.record(Call::SetLogToFile(level));
        true
    }

    fn login(&self, params: &LoginParams<'_>) -> i32 {
        self.record(Call::Login {
            host:     params.host.to_string(),
            port:     params.port,
            username: params.username.to_string(),
        });
        let delay = *self.login_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(code) = *self.login_error.lock() {
            self.fail(code);
            return -1;
        }
        self.next_user.fetch_add(1, Ordering::SeqCst)
    }

    fn logout(&self, user: i32) -> bool {
        self.record(Call::Logout(user));
        true
    }

    fn real_play(&self, user: i32, preview: &PreviewParams, callback: RawFrameCallback) -> i32 {
        self.record(Call::RealPlay { user, channel: preview.channel });
        if let Some(code) = *self.real_play_error.lock() {
            self.fail(code);
            return -1;
        }
        let handle = self.next_play.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().insert(handle, callback);
        handle
    }

    fn stop_real_play(&self, play: i32) -> bool {
        self.record(Call::StopRealPlay(play));
        self.callbacks.lock().remove(&play).is_some()
    }

    fn capture_jpeg(&self, user: i32, channel: i32) -> Option<Vec<u8>> {
        self.record(Call::Capture { user, channel });
        let jpeg = self.jpeg.lock().clone();
        if jpeg.is_none() {
            self.fail(23);
        }
        jpeg
    }

    fn ptz_control(&self, _user: i32, _channel: i32, command: u32, stop: bool, speed: Option<u32>) -> bool {
        self.record(Call::Ptz { command, stop, speed });
        if let Some(code) = *self.ptz_error.lock() {
            self.fail(code);
            return false;
        }
        true
    }

    fn last_error(&self) -> u32 {
        self.last_error.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayCall {
    GetPort,
    OpenStream(Vec<u8>),
    InputData(Vec<u8>),
    Play(i32),
    Stop(i32),
    CloseStream(i32),
    FreePort(i32),
}

#[derive(Default)]
pub struct MockPlayCtrl {
    calls: Mutex<Vec<PlayCall>>,
}

impl MockPlayCtrl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<PlayCall> {
        self.calls.lock().clone()
    }
}

impl PlayCtrl for MockPlayCtrl {
    fn get_port(&self) -> Option<i32> {
        self.calls.lock().push(PlayCall::GetPort);
        Some(7)
    }

    fn open_stream(&self, _port: i32, header: &[u8], _pool_size: u32) -> bool {
        self.calls.lock().push(PlayCall::OpenStream(header.to_vec()));
        true
    }

    fn input_data(&self, _port: i32, data: &[u8]) -> bool {
        self.calls.lock().push(PlayCall::InputData(data.to_vec()));
        true
    }

    fn play(&self, port: i32) -> bool {
        self.calls.lock().push(PlayCall::Play(port));
        true
    }

    fn stop(&self, port: i32) -> bool {
        self.calls.lock().push(PlayCall::Stop(port));
        true
    }

    fn close_stream(&self, port: i32) -> bool {
        self.calls.lock().push(PlayCall::CloseStream(port));
        true
    }

    fn free_port(&self, port: i32) -> bool {
        self.calls.lock().push(PlayCall::FreePort(port));
        true
    }

    fn last_error(&self, _port: i32) -> u32 {
        0
    }
}
