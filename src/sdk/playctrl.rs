//! `libPlayCtrl` (PlayM4) loaded at runtime.

use std::path::{Path, PathBuf};

use libloading::Library;
use log::{debug, info};

use super::ffi::*;
use super::PlayCtrl;
use crate::error::{HikError, Result};

#[cfg(target_os = "windows")]
const LIB_NAME: &str = "PlayCtrl.dll";
#[cfg(not(target_os = "windows"))]
const LIB_NAME: &str = "libPlayCtrl.so";

pub struct PlayM4 {
    _lib:                 Library,
    get_port:             PlayM4GetPortFn,
    set_stream_open_mode: PlayM4SetStreamOpenModeFn,
    open_stream:          PlayM4OpenStreamFn,
    input_data:           PlayM4InputDataFn,
    play:                 PlayM4PlayFn,
    stop:                 PlayM4PortFn,
    close_stream:         PlayM4PortFn,
    free_port:            PlayM4PortFn,
    get_last_error:       PlayM4GetLastErrorFn,
}

unsafe fn sym<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    Ok(*lib.get::<T>(name)?)
}

impl PlayM4 {
    pub fn load(lib_dir: Option<&Path>) -> Result<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = lib_dir {
            candidates.push(dir.join(LIB_NAME));
        }
        candidates.push(PathBuf::from(LIB_NAME));

        let mut last_error = String::new();
        for path in candidates {
            match unsafe { Library::new(&path) } {
                Ok(lib) => unsafe {
                    info!("loaded decode library from {}", path.display());
                    return Ok(Self {
                        get_port:             sym(&lib, b"PlayM4_GetPort\0")?,
                        set_stream_open_mode: sym(&lib, b"PlayM4_SetStreamOpenMode\0")?,
                        open_stream:          sym(&lib, b"PlayM4_OpenStream\0")?,
                        input_data:           sym(&lib, b"PlayM4_InputData\0")?,
                        play:                 sym(&lib, b"PlayM4_Play\0")?,
                        stop:                 sym(&lib, b"PlayM4_Stop\0")?,
                        close_stream:         sym(&lib, b"PlayM4_CloseStream\0")?,
                        free_port:            sym(&lib, b"PlayM4_FreePort\0")?,
                        get_last_error:       sym(&lib, b"PlayM4_GetLastError\0")?,
                        _lib: lib,
                    });
                },
                Err(e) => {
                    debug!("cannot open {}: {e}", path.display());
                    last_error = format!("{}: {e}", path.display());
                }
            }
        }
        Err(HikError::SdkInit(format!("cannot load {LIB_NAME}: {last_error}")))
    }
}

impl PlayCtrl for PlayM4 {
    fn get_port(&self) -> Option<i32> {
        let mut port: LONG = -1;
        let ok = unsafe { (self.get_port)(&mut port) != 0 };
        (ok && port >= 0).then_some(port)
    }

    fn open_stream(&self, port: i32, header: &[u8], pool_size: u32) -> bool {
        unsafe {
            if (self.set_stream_open_mode)(port, STREAME_REALTIME) == 0 {
                return false;
            }
            // PlayM4 takes a mutable pointer but only reads the header.
            (self.open_stream)(port, header.as_ptr() as *mut BYTE, header.len() as DWORD, pool_size) != 0
        }
    }

    fn input_data(&self, port: i32, data: &[u8]) -> bool {
        unsafe { (self.input_data)(port, data.as_ptr() as *mut BYTE, data.len() as DWORD) != 0 }
    }

    fn play(&self, port: i32) -> bool {
        unsafe { (self.play)(port, 0) != 0 }
    }

    fn stop(&self, port: i32) -> bool {
        unsafe { (self.stop)(port) != 0 }
    }

    fn close_stream(&self, port: i32) -> bool {
        unsafe { (self.close_stream)(port) != 0 }
    }

    fn free_port(&self, port: i32) -> bool {
        unsafe { (self.free_port)(port) != 0 }
    }

    fn last_error(&self, port: i32) -> u32 {
        unsafe { (self.get_last_error)(port) }
    }
}
