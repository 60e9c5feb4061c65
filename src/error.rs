//! Unified error types for the Anthem signing core
//!
//! All errors flow through this module so the UI layer receives one
//! consistent, serializable shape regardless of which network or device
//! path produced the failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all signing-core operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthemError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl AnthemError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, msg)
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    pub fn insufficient_funds(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientFunds, msg)
    }

    pub fn transport_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportUnavailable, msg)
    }

    pub fn device_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceError, msg)
    }

    pub fn screensaver_active() -> Self {
        Self::new(
            ErrorCode::ScreensaverActive,
            "Ledger device is in screensaver mode",
        )
    }

    pub fn invalid_app_version(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAppVersion, msg)
    }

    pub fn user_rejected() -> Self {
        Self::new(
            ErrorCode::UserRejected,
            "Transaction was rejected on the device",
        )
    }

    pub fn signing_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SigningFailed, msg)
    }

    pub fn operation_not_supported(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::OperationNotSupported, msg)
    }

    pub fn network_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, msg)
    }

    pub fn broadcast_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::BroadcastFailed, msg)
    }

    pub fn transaction_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransactionFailed, msg)
    }

    pub fn out_of_gas(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::OutOfGas, msg)
    }

    pub fn confirmation_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfirmationTimeout, msg)
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, msg)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Signing dialog was closed")
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// Whether a connect retry against the device is worth attempting
    pub fn is_transient_device_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ScreensaverActive | ErrorCode::DeviceError
        )
    }
}

impl fmt::Display for AnthemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for AnthemError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Input errors
    InvalidInput,
    InvalidAddress,
    InsufficientFunds,

    // Environment errors
    TransportUnavailable,

    // Device-state errors
    DeviceError,
    ScreensaverActive,
    InvalidAppVersion,
    UserRejected,
    SigningFailed,
    OperationNotSupported,

    // Network errors
    NetworkError,
    Timeout,

    // Transaction errors
    BroadcastFailed,
    TransactionFailed,
    OutOfGas,
    ConfirmationTimeout,
    TransactionNotFound,

    // Parse errors
    ParseError,
    JsonError,
    HexError,

    // Internal
    Cancelled,
    Internal,
}

/// Result type alias for signing-core operations
pub type AnthemResult<T> = Result<T, AnthemError>;

// Conversions from common error types

impl From<serde_json::Error> for AnthemError {
    fn from(e: serde_json::Error) -> Self {
        AnthemError::new(ErrorCode::JsonError, e.to_string())
    }
}

impl From<hex::FromHexError> for AnthemError {
    fn from(e: hex::FromHexError) -> Self {
        AnthemError::new(ErrorCode::HexError, e.to_string())
    }
}

impl From<bech32::Error> for AnthemError {
    fn from(e: bech32::Error) -> Self {
        AnthemError::new(ErrorCode::InvalidAddress, format!("Bech32 error: {}", e))
    }
}

impl From<reqwest::Error> for AnthemError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AnthemError::new(ErrorCode::Timeout, "Request timed out")
        } else if e.is_connect() {
            AnthemError::new(ErrorCode::NetworkError, "Connection failed")
        } else {
            AnthemError::new(ErrorCode::NetworkError, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = AnthemError::invalid_app_version("Cosmos app 1.1.1 or later required")
            .with_details("Device reports 1.0.3");

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("invalid_app_version"));
        assert!(json.contains("1.1.1"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AnthemError::screensaver_active().is_transient_device_error());
        assert!(AnthemError::device_error("unplugged").is_transient_device_error());
        assert!(!AnthemError::user_rejected().is_transient_device_error());
        assert!(!AnthemError::invalid_app_version("x").is_transient_device_error());
    }
}
