//! Error type shared by the protocol client.

use thiserror::Error;

/// Failure classes of a device operation.
///
/// Only `Transport` marks the device unavailable. `Validation` and
/// `Capability` are raised before anything is sent.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection refused, DNS failure, request timeout or socket error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response arrived but could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The device answered with `{"status":"timeout"}`.
    #[error("device reported timeout")]
    DeviceTimeout,

    /// Caller-supplied value outside the parameter's documented domain.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Feature only available on new-generation hardware.
    #[error("{feature} is only available on new generation devices")]
    Capability { feature: &'static str },
}

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Errors that prove the device is unreachable, as opposed to ones where it answered.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Protocol(format!("json error: {}", value))
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for Error {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        Error::Protocol(format!("json error at `{}`: {}", value.path(), value.inner()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
