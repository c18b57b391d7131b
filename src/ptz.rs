//! PTZ request vocabulary and its mapping onto SDK command codes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HikError, Result};
use crate::sdk::{
    DOWN_LEFT, DOWN_RIGHT, PAN_LEFT, PAN_RIGHT, TILT_DOWN, TILT_UP, UP_LEFT, UP_RIGHT, ZOOM_IN,
    ZOOM_OUT,
};

pub const DEFAULT_NUDGE_MS: u32 = 120;
pub const MAX_NUDGE_MS:     u32 = 5000;

/// How a motion is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtzMode {
    /// Start, wait `duration_ms`, stop.
    #[default]
    Nudge,
    /// Start only; the caller sends `Stop` later.
    Continuous,
    /// Stop the given (or any) motion.
    Stop,
}

/// PTZ service call. Signs give direction: pan > 0 right, tilt > 0 up,
/// zoom > 0 in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PtzRequest {
    #[serde(default)]
    pub pan:         f32,
    #[serde(default)]
    pub tilt:        f32,
    #[serde(default)]
    pub zoom:        f32,
    #[serde(default)]
    pub mode:        PtzMode,
    #[serde(default = "default_duration")]
    pub duration_ms: u32,
    /// 0.0-1.0; unset uses the device's default speed.
    #[serde(default)]
    pub speed:       Option<f32>,
}

fn default_duration() -> u32 {
    DEFAULT_NUDGE_MS
}

impl Default for PtzRequest {
    fn default() -> Self {
        Self {
            pan:         0.0,
            tilt:        0.0,
            zoom:        0.0,
            mode:        PtzMode::Nudge,
            duration_ms: DEFAULT_NUDGE_MS,
            speed:       None,
        }
    }
}

impl PtzRequest {
    pub fn pan_tilt(pan: f32, tilt: f32) -> Self {
        Self { pan, tilt, ..Self::default() }
    }

    pub fn stop() -> Self {
        Self { mode: PtzMode::Stop, ..Self::default() }
    }

    /// SDK commands this request drives: at most one pan/tilt command and
    /// one zoom command.
    pub fn commands(&self) -> Result<Vec<u32>> {
        if [self.pan, self.tilt, self.zoom].iter().any(|v| !v.is_finite()) {
            return Err(HikError::Validation("PTZ values must be finite".into()));
        }
        let mut cmds = Vec::with_capacity(2);
        if let Some(c) = pan_tilt_command(self.pan, self.tilt) {
            cmds.push(c);
        }
        if self.zoom > 0.0 {
            cmds.push(ZOOM_IN);
        } else if self.zoom < 0.0 {
            cmds.push(ZOOM_OUT);
        }

        if cmds.is_empty() {
            if self.mode == PtzMode::Stop {
                // A stop on any pan/tilt code halts pan/tilt; zoom stops separately.
                return Ok(vec![PAN_LEFT, ZOOM_IN]);
            }
            return Err(HikError::Validation("PTZ request has no motion".into()));
        }
        Ok(cmds)
    }

    pub fn nudge_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.duration_ms.clamp(1, MAX_NUDGE_MS)))
    }

    /// SDK speed level 1..=7.
    pub fn speed_level(&self) -> Option<u32> {
        self.speed.map(|s| {
            let s = if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.5 };
            1 + (s * 6.0).round() as u32
        })
    }
}

fn pan_tilt_command(pan: f32, tilt: f32) -> Option<u32> {
    let p = sign(pan);
    let t = sign(tilt);
    match (p, t) {
        (0, 0)   => None,
        (1, 0)   => Some(PAN_RIGHT),
        (-1, 0)  => Some(PAN_LEFT),
        (0, 1)   => Some(TILT_UP),
        (0, -1)  => Some(TILT_DOWN),
        (1, 1)   => Some(UP_RIGHT),
        (-1, 1)  => Some(UP_LEFT),
        (1, -1)  => Some(DOWN_RIGHT),
        _        => Some(DOWN_LEFT),
    }
}

fn sign(v: f32) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}
