//! C layouts and entry-point signatures of `libhcnetsdk` and `libPlayCtrl`.
//!
//! Field names follow the vendor headers so the structures can be checked
//! against `HCNetSDK.h` / `PlayM4.h` line by line. On Linux the SDK typedefs
//! `LONG`, `BOOL` and `HWND` to 32-bit integers and `DWORD` to `unsigned int`.

#![allow(non_snake_case, dead_code)]

use std::ffi::c_void;

use libc::{c_char, c_int, c_uint};

pub type LONG  = c_int;
pub type BOOL  = c_int;
pub type DWORD = c_uint;
pub type WORD  = u16;
pub type BYTE  = u8;
pub type HWND  = c_uint;

pub const NET_DVR_DEV_ADDRESS_MAX_LEN:    usize = 129;
pub const NET_DVR_LOGIN_USERNAME_MAX_LEN: usize = 64;
pub const NET_DVR_LOGIN_PASSWD_MAX_LEN:   usize = 64;
pub const SERIALNO_LEN:                   usize = 48;

// NET_SDK_INIT_CFG_TYPE
pub const NET_SDK_INIT_CFG_SDK_PATH:     c_int = 2;
pub const NET_SDK_INIT_CFG_LIBEAY_PATH:  c_int = 3;
pub const NET_SDK_INIT_CFG_SSLEAY_PATH:  c_int = 4;

/// PlayCtrl real-time stream mode.
pub const STREAME_REALTIME: DWORD = 0;

#[repr(C)]
pub struct NET_DVR_LOCAL_SDK_PATH {
    pub sPath: [c_char; 256],
    pub byRes: [BYTE; 128],
}

pub type LoginResultCallback =
    Option<unsafe extern "system" fn(LONG, DWORD, *mut c_void, *mut c_void)>;

#[repr(C)]
pub struct NET_DVR_USER_LOGIN_INFO {
    pub sDeviceAddress: [c_char; NET_DVR_DEV_ADDRESS_MAX_LEN],
    pub byUseTransport: BYTE,
    pub wPort:          WORD,
    pub sUserName:      [c_char; NET_DVR_LOGIN_USERNAME_MAX_LEN],
    pub sPassword:      [c_char; NET_DVR_LOGIN_PASSWD_MAX_LEN],
    pub cbLoginResult:  LoginResultCallback,
    pub pUser:          *mut c_void,
    pub bUseAsynLogin:  BOOL,
    pub byProxyType:    BYTE,
    pub byUseUTCTime:   BYTE,
    pub byLoginMode:    BYTE,
    pub byHttps:        BYTE,
    pub iProxyID:       LONG,
    pub byVerifyMode:   BYTE,
    pub byRes3:         [BYTE; 119],
}

#[repr(C)]
pub struct NET_DVR_DEVICEINFO_V30 {
    pub sSerialNumber:        [BYTE; SERIALNO_LEN],
    pub byAlarmInPortNum:     BYTE,
    pub byAlarmOutPortNum:    BYTE,
    pub byDiskNum:            BYTE,
    pub byDVRType:            BYTE,
    pub byChanNum:            BYTE,
    pub byStartChan:          BYTE,
    pub byAudioChanNum:       BYTE,
    pub byIPChanNum:          BYTE,
    pub byZeroChanNum:        BYTE,
    pub byMainProto:          BYTE,
    pub bySubProto:           BYTE,
    pub bySupport:            BYTE,
    pub bySupport1:           BYTE,
    pub bySupport2:           BYTE,
    pub wDevType:             WORD,
    pub bySupport3:           BYTE,
    pub byMultiStreamProto:   BYTE,
    pub byStartDChan:         BYTE,
    pub byStartDTalkChan:     BYTE,
    pub byHighDChanNum:       BYTE,
    pub bySupport4:           BYTE,
    pub byLanguageType:       BYTE,
    pub byVoiceInChanNum:     BYTE,
    pub byStartVoiceInChanNo: BYTE,
    pub bySupport5:           BYTE,
    pub bySupport6:           BYTE,
    pub byMirrorChanNum:      BYTE,
    pub wStartMirrorChanNo:   WORD,
    pub bySupport7:           BYTE,
    pub byRes2:               BYTE,
}

/// Only the leading V30 block is read. The tail is larger than the vendor's
/// so the SDK never writes past the end of it.
#[repr(C)]
pub struct NET_DVR_DEVICEINFO_V40 {
    pub struDeviceV30: NET_DVR_DEVICEINFO_V30,
    pub byTail:        [BYTE; 512],
}

#[repr(C)]
pub struct NET_DVR_PREVIEWINFO {
    pub lChannel:          LONG,
    pub dwStreamType:      DWORD,
    pub dwLinkMode:        DWORD,
    pub hPlayWnd:          HWND,
    pub bBlocked:          BOOL,
    pub bPassbackRecord:   BOOL,
    pub byPreviewMode:     BYTE,
    pub byStreamID:        [BYTE; 32],
    pub byProtoType:       BYTE,
    pub byRes1:            BYTE,
    pub byVideoCodingType: BYTE,
    pub dwDisplayBufNum:   DWORD,
    pub byNPQMode:         BYTE,
    pub byRecvMetaData:    BYTE,
    pub byDataType:        BYTE,
    pub byRes:             [BYTE; 213],
}

#[repr(C)]
pub struct NET_DVR_JPEGPARA {
    /// 0xff = current resolution.
    pub wPicSize:    WORD,
    /// 0 best, 1 better, 2 normal.
    pub wPicQuality: WORD,
}

pub type RealDataCallback =
    unsafe extern "system" fn(LONG, DWORD, *mut BYTE, DWORD, *mut c_void);

// ── libhcnetsdk ──────────────────────────────────────────────────────────────

pub type NetDvrInitFn              = unsafe extern "system" fn() -> BOOL;
pub type NetDvrCleanupFn           = unsafe extern "system" fn() -> BOOL;
pub type NetDvrSetSdkInitCfgFn     = unsafe extern "system" fn(c_int, *const c_void) -> BOOL;
pub type NetDvrSetConnectTimeFn    = unsafe extern "system" fn(DWORD, DWORD) -> BOOL;
pub type NetDvrSetReconnectFn      = unsafe extern "system" fn(DWORD, BOOL) -> BOOL;
pub type NetDvrSetLogToFileFn      = unsafe extern "system" fn(DWORD, *const c_char, BOOL) -> BOOL;
pub type NetDvrLoginV40Fn          = unsafe extern "system" fn(
    *mut NET_DVR_USER_LOGIN_INFO,
    *mut NET_DVR_DEVICEINFO_V40,
) -> LONG;
pub type NetDvrLogoutFn            = unsafe extern "system" fn(LONG) -> BOOL;
pub type NetDvrRealPlayV40Fn       = unsafe extern "system" fn(
    LONG,
    *mut NET_DVR_PREVIEWINFO,
    Option<RealDataCallback>,
    *mut c_void,
) -> LONG;
pub type NetDvrStopRealPlayFn      = unsafe extern "system" fn(LONG) -> BOOL;
pub type NetDvrCaptureJpegNewFn    = unsafe extern "system" fn(
    LONG,
    LONG,
    *mut NET_DVR_JPEGPARA,
    *mut c_char,
    DWORD,
    *mut DWORD,
) -> BOOL;
pub type NetDvrPtzControlOtherFn   = unsafe extern "system" fn(LONG, LONG, DWORD, DWORD) -> BOOL;
pub type NetDvrPtzControlSpeedFn   = unsafe extern "system" fn(LONG, LONG, DWORD, DWORD, DWORD) -> BOOL;
pub type NetDvrGetLastErrorFn      = unsafe extern "system" fn() -> DWORD;

// ── libPlayCtrl ──────────────────────────────────────────────────────────────

pub type PlayM4GetPortFn           = unsafe extern "system" fn(*mut LONG) -> BOOL;
pub type PlayM4SetStreamOpenModeFn = unsafe extern "system" fn(LONG, DWORD) -> BOOL;
pub type PlayM4OpenStreamFn        = unsafe extern "system" fn(LONG, *mut BYTE, DWORD, DWORD) -> BOOL;
pub type PlayM4InputDataFn         = unsafe extern "system" fn(LONG, *mut BYTE, DWORD) -> BOOL;
pub type PlayM4PlayFn              = unsafe extern "system" fn(LONG, HWND) -> BOOL;
pub type PlayM4PortFn              = unsafe extern "system" fn(LONG) -> BOOL;
pub type PlayM4GetLastErrorFn      = unsafe extern "system" fn(LONG) -> DWORD;

/// Copy `src` into a fixed C char array, truncating and NUL-terminating.
pub fn fill_c_chars(dst: &mut [c_char], src: &[u8]) {
    let n = src.len().min(dst.len().saturating_sub(1));
    for (d, s) in dst.iter_mut().zip(&src[..n]) {
        *d = *s as c_char;
    }
    if let Some(end) = dst.get_mut(n) {
        *end = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_truncates_and_terminates() {
        let mut buf = [1 as c_char; 4];
        fill_c_chars(&mut buf, b"abcdef");
        assert_eq!(buf, [b'a' as c_char, b'b' as c_char, b'c' as c_char, 0]);

        let mut buf = [1 as c_char; 8];
        fill_c_chars(&mut buf, b"ab");
        assert_eq!(&buf[..3], &[b'a' as c_char, b'b' as c_char, 0]);
    }
}
