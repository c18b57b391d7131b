//! Error types for the camera bridge.

use thiserror::Error;

use crate::sdk;

#[derive(Debug, Error)]
pub enum HikError {
    #[error("connection failed: vendor error {code} ({})", sdk::describe_error(*code))]
    Connection { code: u32 },

    #[error("SDK init: {0}")]
    SdkInit(String),

    #[error("SDK library: {0}")]
    Library(#[from] libloading::Error),

    #[error("stream failed: vendor error {code} ({})", sdk::describe_error(*code))]
    Stream { code: u32 },

    #[error("capture failed: vendor error {code} ({})", sdk::describe_error(*code))]
    Capture { code: u32 },

    #[error("PTZ failed: vendor error {code} ({})", sdk::describe_error(*code))]
    Ptz { code: u32 },

    #[error("validation: {0}")]
    Validation(String),

    #[error("session is not connected")]
    NotConnected,

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task join: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Config: {0}")]
    Config(String),
}

impl HikError {
    /// True for failures that mean "the device could not be reached or
    /// refused us", as opposed to bugs or local I/O trouble.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            HikError::Connection { .. } | HikError::SdkInit(_) | HikError::Library(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HikError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_classification() {
        assert!(HikError::Connection { code: 7 }.is_connectivity());
        assert!(HikError::SdkInit("no lib".into()).is_connectivity());
        assert!(!HikError::Capture { code: 23 }.is_connectivity());
        assert!(!HikError::Config("x".into()).is_connectivity());
    }

    #[test]
    fn message_carries_vendor_code() {
        let e = HikError::Connection { code: 1 };
        assert!(e.to_string().contains("vendor error 1"), "{e}");
    }
}
