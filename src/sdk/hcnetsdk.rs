//! `libhcnetsdk` loaded at runtime.
//!
//! The library is opened with `libloading` and every entry point is resolved
//! up front, so a missing symbol fails at load time instead of mid-stream.
//! Preview callbacks go through a single `extern "system"` trampoline; the
//! boxed Rust closure travels as the SDK's `pUser` pointer and stays owned by
//! this struct until `NET_DVR_StopRealPlay` has succeeded.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::ptr;

use libloading::Library;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use super::ffi::*;
use super::{FrameKind, LoginParams, NetSdk, PreviewParams, RawFrameCallback, NET_DVR_NOENOUGH_BUF};
use crate::error::{HikError, Result};

const INITIAL_JPEG_BUF: usize = 512 * 1024;
const MAX_JPEG_BUF:     usize = 8 * 1024 * 1024;

#[cfg(target_os = "windows")]
const LIB_NAME: &str = "HCNetSDK.dll";
#[cfg(not(target_os = "windows"))]
const LIB_NAME: &str = "libhcnetsdk.so";

#[cfg(target_os = "windows")]
const CRYPTO_NAME: &str = "libcrypto-1_1-x64.dll";
#[cfg(not(target_os = "windows"))]
const CRYPTO_NAME: &str = "libcrypto.so.1.1";

#[cfg(target_os = "windows")]
const SSL_NAME: &str = "libssl-1_1-x64.dll";
#[cfg(not(target_os = "windows"))]
const SSL_NAME: &str = "libssl.so.1.1";

struct CallbackContext {
    callback: RawFrameCallback,
}

/// Boxed callback contexts of live previews, keyed by play handle.
struct ContextTable<T> {
    live: Mutex<HashMap<i32, Box<T>>>,
}

impl<T> ContextTable<T> {
    fn new() -> Self {
        Self { live: Mutex::new(HashMap::new()) }
    }

    fn insert(&self, play: i32, ctx: Box<T>) {
        self.live.lock().insert(play, ctx);
    }

    /// Forget the context of `play`. It is freed only if the preview was
    /// stopped; otherwise the SDK may still call back with it, so it is
    /// leaked. Returns whether it was freed.
    fn release(&self, play: i32, stopped: bool) -> bool {
        let Some(ctx) = self.live.lock().remove(&play) else {
            return false;
        };
        if stopped {
            drop(ctx);
            true
        } else {
            error!("preview {play} did not stop, leaking its callback context");
            std::mem::forget(ctx);
            false
        }
    }
}

pub struct HcNetSdk {
    _lib:                 Library,
    init:                 NetDvrInitFn,
    cleanup:              NetDvrCleanupFn,
    set_sdk_init_cfg:     NetDvrSetSdkInitCfgFn,
    set_connect_time:     NetDvrSetConnectTimeFn,
    set_reconnect:        NetDvrSetReconnectFn,
    set_log_to_file:      NetDvrSetLogToFileFn,
    login_v40:            NetDvrLoginV40Fn,
    logout:               NetDvrLogoutFn,
    real_play_v40:        NetDvrRealPlayV40Fn,
    stop_real_play:       NetDvrStopRealPlayFn,
    capture_jpeg_new:     NetDvrCaptureJpegNewFn,
    ptz_control_other:    NetDvrPtzControlOtherFn,
    ptz_control_speed:    NetDvrPtzControlSpeedFn,
    get_last_error:       NetDvrGetLastErrorFn,
    contexts:             ContextTable<CallbackContext>,
}

/// Resolve one symbol and copy the function pointer out of the `Symbol`.
///
/// # Safety
/// `T` must match the exported symbol's real signature.
unsafe fn sym<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    Ok(*lib.get::<T>(name)?)
}

impl HcNetSdk {
    /// Open `libhcnetsdk`, preferring `lib_dir` over the loader search path.
    pub fn load(lib_dir: Option<&Path>) -> Result<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = lib_dir {
            candidates.push(dir.join(LIB_NAME));
        }
        candidates.push(PathBuf::from(LIB_NAME));

        let mut last_error = String::new();
        for path in candidates {
            match unsafe { Library::new(&path) } {
                Ok(lib) => {
                    info!("loaded vendor SDK from {}", path.display());
                    return unsafe { Self::from_library(lib) };
                }
                Err(e) => {
                    debug!("cannot open {}: {e}", path.display());
                    last_error = format!("{}: {e}", path.display());
                }
            }
        }
        Err(HikError::SdkInit(format!("cannot load {LIB_NAME}: {last_error}")))
    }

    unsafe fn from_library(lib: Library) -> Result<Self> {
        Ok(Self {
            init:              sym(&lib, b"NET_DVR_Init\0")?,
            cleanup:           sym(&lib, b"NET_DVR_Cleanup\0")?,
            set_sdk_init_cfg:  sym(&lib, b"NET_DVR_SetSDKInitCfg\0")?,
            set_connect_time:  sym(&lib, b"NET_DVR_SetConnectTime\0")?,
            set_reconnect:     sym(&lib, b"NET_DVR_SetReconnect\0")?,
            set_log_to_file:   sym(&lib, b"NET_DVR_SetLogToFile\0")?,
            login_v40:         sym(&lib, b"NET_DVR_Login_V40\0")?,
            logout:            sym(&lib, b"NET_DVR_Logout\0")?,
            real_play_v40:     sym(&lib, b"NET_DVR_RealPlay_V40\0")?,
            stop_real_play:    sym(&lib, b"NET_DVR_StopRealPlay\0")?,
            capture_jpeg_new:  sym(&lib, b"NET_DVR_CaptureJPEGPicture_NEW\0")?,
            ptz_control_other: sym(&lib, b"NET_DVR_PTZControl_Other\0")?,
            ptz_control_speed: sym(&lib, b"NET_DVR_PTZControlWithSpeed_Other\0")?,
            get_last_error:    sym(&lib, b"NET_DVR_GetLastError\0")?,
            contexts:          ContextTable::new(),
            _lib: lib,
        })
    }

    fn set_init_cfg_string(&self, kind: i32, path: &Path) -> bool {
        let Ok(c) = CString::new(path.to_string_lossy().as_bytes()) else {
            return false;
        };
        unsafe { (self.set_sdk_init_cfg)(kind, c.as_ptr() as *const c_void) != 0 }
    }
}

unsafe extern "system" fn real_data_trampoline(
    play:      LONG,
    data_type: DWORD,
    buffer:    *mut BYTE,
    size:      DWORD,
    user:      *mut c_void,
) {
    if user.is_null() || buffer.is_null() || size == 0 {
        return;
    }
    let ctx = &*(user as *const CallbackContext);
    let data = std::slice::from_raw_parts(buffer as *const u8, size as usize);
    // A panic must not unwind into the vendor's thread.
    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        (ctx.callback)(FrameKind::from_raw(data_type), data)
    }));
    if res.is_err() {
        error!("preview {play}: frame handler panicked, buffer dropped");
    }
}

impl NetSdk for HcNetSdk {
    fn init(&self) -> bool {
        unsafe { (self.init)() != 0 }
    }

    fn cleanup(&self) -> bool {
        unsafe { (self.cleanup)() != 0 }
    }

    fn set_sdk_paths(&self, lib_dir: &Path) -> bool {
        let mut com_path = NET_DVR_LOCAL_SDK_PATH { sPath: [0; 256], byRes: [0; 128] };
        fill_c_chars(&mut com_path.sPath, lib_dir.to_string_lossy().as_bytes());
        let sdk_ok = unsafe {
            (self.set_sdk_init_cfg)(
                NET_SDK_INIT_CFG_SDK_PATH,
                &com_path as *const NET_DVR_LOCAL_SDK_PATH as *const c_void,
            ) != 0
        };
        let crypto_ok = self.set_init_cfg_string(NET_SDK_INIT_CFG_LIBEAY_PATH, &lib_dir.join(CRYPTO_NAME));
        let ssl_ok    = self.set_init_cfg_string(NET_SDK_INIT_CFG_SSLEAY_PATH, &lib_dir.join(SSL_NAME));
        if !(crypto_ok && ssl_ok) {
            warn!("SDK crypto/ssl path not accepted (crypto={crypto_ok} ssl={ssl_ok})");
        }
        sdk_ok && crypto_ok && ssl_ok
    }

    fn set_connect_time(&self, wait_ms: u32, attempts: u32) -> bool {
        unsafe { (self.set_connect_time)(wait_ms, attempts) != 0 }
    }

    fn set_reconnect(&self, interval_ms: u32, enable: bool) -> bool {
        unsafe { (self.set_reconnect)(interval_ms, enable as BOOL) != 0 }
    }

    fn set_log_to_file(&self, level: u32, dir: &Path, auto_delete: bool) -> bool {
        let Ok(c) = CString::new(dir.to_string_lossy().as_bytes()) else {
            return false;
        };
        unsafe { (self.set_log_to_file)(level, c.as_ptr(), auto_delete as BOOL) != 0 }
    }

    fn login(&self, params: &LoginParams<'_>) -> i32 {
        let mut info = NET_DVR_USER_LOGIN_INFO {
            sDeviceAddress: [0; NET_DVR_DEV_ADDRESS_MAX_LEN],
            byUseTransport: 0,
            wPort:          params.port,
            sUserName:      [0; NET_DVR_LOGIN_USERNAME_MAX_LEN],
            sPassword:      [0; NET_DVR_LOGIN_PASSWD_MAX_LEN],
            cbLoginResult:  None,
            pUser:          ptr::null_mut(),
            bUseAsynLogin:  0,
            byProxyType:    0,
            byUseUTCTime:   0,
            byLoginMode:    0,
            byHttps:        0,
            iProxyID:       0,
            byVerifyMode:   0,
            byRes3:         [0; 119],
        };
        fill_c_chars(&mut info.sDeviceAddress, params.host.as_bytes());
        fill_c_chars(&mut info.sUserName, params.username.as_bytes());
        fill_c_chars(&mut info.sPassword, params.password.as_bytes());

        // Plain-old-data out parameter; all-zero is a valid value.
        let mut device: NET_DVR_DEVICEINFO_V40 = unsafe { std::mem::zeroed() };
        let handle = unsafe { (self.login_v40)(&mut info, &mut device) };
        if handle >= 0 {
            let v30 = &device.struDeviceV30;
            debug!(
                "login to {} ok: channels={} start_chan={} ip_channels={}",
                params.host, v30.byChanNum, v30.byStartChan, v30.byIPChanNum
            );
        }
        handle
    }

    fn logout(&self, user: i32) -> bool {
        unsafe { (self.logout)(user) != 0 }
    }

    fn real_play(&self, user: i32, preview: &PreviewParams, callback: RawFrameCallback) -> i32 {
        let mut info: NET_DVR_PREVIEWINFO = unsafe { std::mem::zeroed() };
        info.lChannel     = preview.channel;
        info.dwStreamType = preview.stream_type.as_raw();
        info.dwLinkMode   = preview.link_mode.as_raw();
        info.hPlayWnd     = 0;
        info.bBlocked     = 1;

        let ctx = Box::new(CallbackContext { callback });
        let user_ptr = &*ctx as *const CallbackContext as *mut c_void;
        let handle = unsafe {
            (self.real_play_v40)(user, &mut info, Some(real_data_trampoline), user_ptr)
        };
        if handle >= 0 {
            self.contexts.insert(handle, ctx);
        }
        handle
    }

    fn stop_real_play(&self, play: i32) -> bool {
        let ok = unsafe { (self.stop_real_play)(play) != 0 };
        self.contexts.release(play, ok);
        ok
    }

    fn capture_jpeg(&self, user: i32, channel: i32) -> Option<Vec<u8>> {
        let mut para = NET_DVR_JPEGPARA { wPicSize: 0xff, wPicQuality: 0 };
        let mut cap = INITIAL_JPEG_BUF;
        loop {
            let mut buf = vec![0u8; cap];
            let mut returned: DWORD = 0;
            let ok = unsafe {
                (self.capture_jpeg_new)(
                    user,
                    channel,
                    &mut para,
                    buf.as_mut_ptr() as *mut libc::c_char,
                    cap as DWORD,
                    &mut returned,
                ) != 0
            };
            if ok {
                buf.truncate((returned as usize).min(cap));
                return Some(buf);
            }
            if self.last_error() == NET_DVR_NOENOUGH_BUF && cap < MAX_JPEG_BUF {
                cap *= 2;
                debug!("JPEG buffer too small, retrying with {cap} bytes");
                continue;
            }
            return None;
        }
    }

    fn ptz_control(&self, user: i32, channel: i32, command: u32, stop: bool, speed: Option<u32>) -> bool {
        let stop = stop as DWORD;
        unsafe {
            match speed {
                Some(s) => (self.ptz_control_speed)(user, channel, command, stop, s) != 0,
                None    => (self.ptz_control_other)(user, channel, command, stop) != 0,
            }
        }
    }

    fn last_error(&self) -> u32 {
        unsafe { (self.get_last_error)() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn context_freed_only_after_successful_stop() {
        let table = ContextTable::new();
        let stopped = Arc::new(());
        let running = Arc::new(());
        table.insert(1, Box::new(Arc::clone(&stopped)));
        table.insert(2, Box::new(Arc::clone(&running)));

        assert!(table.release(1, true));
        assert_eq!(Arc::strong_count(&stopped), 1);

        // A failed stop keeps the context alive for late callbacks.
        assert!(!table.release(2, false));
        assert_eq!(Arc::strong_count(&running), 2);

        assert!(!table.release(3, true));
    }

    #[test]
    fn panicking_handler_stays_on_our_side() {
        let calls = Arc::new(parking_lot::Mutex::new(0));
        let callback: RawFrameCallback = {
            let calls = Arc::clone(&calls);
            Arc::new(move |_: FrameKind, _: &[u8]| {
                *calls.lock() += 1;
                panic!("handler bug");
            })
        };
        let ctx = CallbackContext { callback };
        let mut buf = [0u8; 4];
        let user = &ctx as *const CallbackContext as *mut c_void;
        unsafe {
            real_data_trampoline(5, crate::sdk::NET_DVR_SYSHEAD, buf.as_mut_ptr(), buf.len() as DWORD, user);
            real_data_trampoline(5, crate::sdk::NET_DVR_SYSHEAD, buf.as_mut_ptr(), buf.len() as DWORD, user);
        }
        assert_eq!(*calls.lock(), 2);
    }
}
