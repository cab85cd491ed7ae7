//! Error handling for destra-rs
//!
//! This module defines the error taxonomy shared by the symbol side
//! (image loading, type resolution) and the protocol side (peek/poke
//! exchanges), plus a Result alias used throughout the crate.

use crate::protocol::frame::{ExchangeContext, HandshakeStep, StatusCode};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for destra-rs operations
#[derive(Error, Debug)]
pub enum DestraError {
    /// The program image does not exist on disk
    #[error("Image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    /// The program image is unreadable, malformed, or lacks debug metadata
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A variable's type could not be resolved; the variable is skipped
    #[error("Unresolved type for variable '{name}'")]
    UnresolvedType { name: String },

    /// A protocol operation was attempted without an open channel
    #[error("Not connected")]
    NotConnected,

    /// Requested address does not fit the 16-bit target address space
    #[error("Address 0x{address:X} out of range (0x0000..=0xFFFF)")]
    AddressOutOfRange { address: u32 },

    /// Requested transfer size is outside 1..=8 bytes
    #[error("Size {size} out of range (1..=8)")]
    SizeOutOfRange { size: usize },

    /// The magic word was not echoed back correctly
    #[error("Handshake failure during {ctx} at {step}: expected 0x{expected:02X}, got {}", fmt_byte(*.got))]
    HandshakeFailure {
        ctx: ExchangeContext,
        step: HandshakeStep,
        expected: u8,
        got: Option<u8>,
    },

    /// A command, address, size or payload byte was not echoed back correctly
    #[error("Echo mismatch during {ctx} at {step}: expected 0x{expected:02X}, got {}", fmt_byte(*.got))]
    EchoMismatch {
        ctx: ExchangeContext,
        step: HandshakeStep,
        expected: u8,
        got: Option<u8>,
    },

    /// The response header was incomplete or did not match the request
    #[error("Malformed response during {ctx}: header {header:02X?}")]
    MalformedResponse { ctx: ExchangeContext, header: Vec<u8> },

    /// The peer answered with a non-success status
    #[error("Device reported {status} during {ctx}")]
    DeviceStatus {
        ctx: ExchangeContext,
        status: StatusCode,
    },

    /// Fewer data bytes arrived than the frame size announced
    #[error("Short read during {ctx}: received {received} byte(s)")]
    ShortRead { ctx: ExchangeContext, received: usize },

    /// Poke read-back differs from the bytes that were sent
    #[error("Verify mismatch during {ctx}: sent {sent:02X?}, read back {received:02X?}")]
    VerifyMismatch {
        ctx: ExchangeContext,
        sent: Vec<u8>,
        received: Vec<u8>,
    },

    /// Type tag not present in the codec table
    #[error("Unknown type tag: {0}")]
    UnknownTypeTag(String),

    /// Not enough bytes to decode the requested type
    #[error("Insufficient bytes for {tag}: need {needed}, got {got}")]
    InsufficientBytes {
        tag: String,
        needed: usize,
        got: usize,
    },

    /// A value cannot be encoded as requested
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised by the serial port layer
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DestraError>,
    },
}

fn fmt_byte(byte: Option<u8>) -> String {
    match byte {
        Some(b) => format!("0x{:02X}", b),
        None => "timeout".to_string(),
    }
}

impl DestraError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DestraError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &DestraError {
        match self {
            DestraError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for failures of a single peek/poke exchange
    ///
    /// These leave the session usable; the caller may retry.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self.root(),
            DestraError::HandshakeFailure { .. }
                | DestraError::EchoMismatch { .. }
                | DestraError::MalformedResponse { .. }
                | DestraError::DeviceStatus { .. }
                | DestraError::ShortRead { .. }
                | DestraError::VerifyMismatch { .. }
        )
    }
}

/// Result type alias for destra-rs operations
pub type Result<T> = std::result::Result<T, DestraError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::Command;

    fn ctx() -> ExchangeContext {
        ExchangeContext {
            command: Command::Peek,
            address: 0x0100,
            size: 2,
        }
    }

    #[test]
    fn test_error_display() {
        let err = DestraError::UnknownTypeTag("quad".to_string());
        assert_eq!(err.to_string(), "Unknown type tag: quad");
    }

    #[test]
    fn test_error_with_context() {
        let err = DestraError::NotConnected;
        let with_ctx = err.with_context("Failed to peek");
        assert!(with_ctx.to_string().contains("Failed to peek"));
        assert!(matches!(with_ctx.root(), DestraError::NotConnected));
    }

    #[test]
    fn test_echo_mismatch_names_step_and_bytes() {
        let err = DestraError::EchoMismatch {
            ctx: ctx(),
            step: HandshakeStep::AddressHigh,
            expected: 0x01,
            got: Some(0x7F),
        };
        let msg = err.to_string();
        assert!(msg.contains("PEEK"));
        assert!(msg.contains("0x0100"));
        assert!(msg.contains("address high"));
        assert!(msg.contains("0x7F"));
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_handshake_timeout_display() {
        let err = DestraError::HandshakeFailure {
            ctx: ctx(),
            step: HandshakeStep::MagicHigh,
            expected: 0xCA,
            got: None,
        };
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_address_out_of_range() {
        let err = DestraError::AddressOutOfRange { address: 0x1_0000 };
        assert!(err.to_string().contains("0x10000"));
        assert!(!err.is_protocol_error());
    }
}
