// Copyright 2025-2026 CEMAXECUTER LLC

//! Error types for RSP device control and streaming.
//!
//! State-machine violations are reported at the call that violates them.
//! Vendor failures carry the vendor's diagnostic string. Buffer overflow is
//! not an error: see [`SampleBuffer::overflow`](crate::buffer::SampleBuffer::overflow).

/// Result type for rsp-sdr operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success,
    UnknownError,
    ApiError,

    DeviceNotFound,
    DeviceNotSupported,
    DeviceAlreadySelected,
    DeviceNotSelected,
    DeviceNotInitialized,

    StreamingError,
    StreamingAlreadyActive,
    StreamingNotActive,

    InvalidParameter,
    ParameterOutOfRange,

    UnsupportedDevice,
}

impl ErrorCode {
    /// Human-readable description of the error class.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::UnknownError => "Unknown error",
            ErrorCode::ApiError => "SDRplay API error",
            ErrorCode::DeviceNotFound => "Device not found",
            ErrorCode::DeviceNotSupported => "Device not supported",
            ErrorCode::DeviceAlreadySelected => "Device already selected",
            ErrorCode::DeviceNotSelected => "No device selected",
            ErrorCode::DeviceNotInitialized => "Device not initialized",
            ErrorCode::StreamingError => "Streaming error",
            ErrorCode::StreamingAlreadyActive => "Streaming already active",
            ErrorCode::StreamingNotActive => "Streaming not active",
            ErrorCode::InvalidParameter => "Invalid parameter",
            ErrorCode::ParameterOutOfRange => "Parameter out of range",
            ErrorCode::UnsupportedDevice => "Unsupported device hardware version",
        }
    }
}

/// Errors that can occur while controlling or streaming from an RSP.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested device is absent or not marked valid by the driver.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device was found but this library cannot drive it.
    #[error("device not supported: {0}")]
    DeviceNotSupported(String),

    /// A device is already selected on this control.
    #[error("a device is already selected")]
    DeviceAlreadySelected,

    /// The operation needs a selected device.
    #[error("no device selected")]
    DeviceNotSelected,

    /// The vendor API session has not been opened.
    #[error("device API not opened")]
    DeviceNotInitialized,

    /// Generic streaming failure.
    #[error("streaming error: {0}")]
    Streaming(String),

    #[error("streaming already active")]
    StreamingAlreadyActive,

    #[error("streaming not active")]
    StreamingNotActive,

    /// A vendor SDK call did not report success.
    ///
    /// `context` names the operation, `message` is the vendor's own
    /// diagnostic string.
    #[error("{context}: {message}")]
    Api { context: String, message: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("parameter out of range: {0}")]
    ParameterOutOfRange(String),

    /// No control factory is registered for this hardware version.
    #[error("unsupported device hardware version: {0}")]
    UnsupportedDevice(u8),
}

impl Error {
    /// Build an [`Error::Api`] from a vendor failure.
    pub fn api(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Api {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            Error::DeviceNotSupported(_) => ErrorCode::DeviceNotSupported,
            Error::DeviceAlreadySelected => ErrorCode::DeviceAlreadySelected,
            Error::DeviceNotSelected => ErrorCode::DeviceNotSelected,
            Error::DeviceNotInitialized => ErrorCode::DeviceNotInitialized,
            Error::Streaming(_) => ErrorCode::StreamingError,
            Error::StreamingAlreadyActive => ErrorCode::StreamingAlreadyActive,
            Error::StreamingNotActive => ErrorCode::StreamingNotActive,
            Error::Api { .. } => ErrorCode::ApiError,
            Error::InvalidParameter(_) => ErrorCode::InvalidParameter,
            Error::ParameterOutOfRange(_) => ErrorCode::ParameterOutOfRange,
            Error::UnsupportedDevice(_) => ErrorCode::UnsupportedDevice,
        }
    }

    /// Description of the error class followed by the specific message.
    pub fn full_message(&self) -> String {
        format!("{}: {}", self.code().description(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_device_names_the_id() {
        let e = Error::UnsupportedDevice(123);
        assert_eq!(e.to_string(), "unsupported device hardware version: 123");
        assert_eq!(e.code(), ErrorCode::UnsupportedDevice);
    }

    #[test]
    fn test_api_error_keeps_vendor_message() {
        let e = Error::api("failed to select device", "sdrplay_api_HwError");
        assert_eq!(e.to_string(), "failed to select device: sdrplay_api_HwError");
        assert_eq!(e.code(), ErrorCode::ApiError);
    }

    #[test]
    fn test_full_message_prefixes_description() {
        let e = Error::DeviceNotSelected;
        assert_eq!(e.full_message(), "No device selected: no device selected");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
