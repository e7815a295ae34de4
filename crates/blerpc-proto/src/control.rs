//! Control payload codecs: capabilities, timeout, and error reports.
//!
//! These are the bodies of CONTROL containers. They bypass the assembler
//! entirely, so each must fit a single container.

use crate::errors::{ProtoError, Result};

/// Wire size of the current capabilities payload.
pub const CAPABILITIES_LEN: usize = 6;

/// Wire size of the pre-encryption capabilities payload (no flags field).
pub const CAPABILITIES_LEGACY_LEN: usize = 4;

/// Peripheral error code: the response exceeded the capability limit.
pub const ERROR_RESPONSE_TOO_LARGE: u8 = 0x01;

/// Peripheral error code: a request arrived while one was in flight.
pub const ERROR_BUSY: u8 = 0x02;

/// Capability record advertised by the peripheral.
///
/// The peripheral is the source of truth; the central caches this after
/// the CAPABILITIES exchange and enforces the request limit before
/// transmitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Largest command packet the peripheral accepts, in bytes
    pub max_request_payload_size: u16,
    /// Largest response the peripheral will emit, in bytes
    pub max_response_payload_size: u16,
    /// Feature bits; only [`Capabilities::ENCRYPTION_SUPPORTED`] is defined
    pub flags: u16,
}

impl Capabilities {
    /// Flag bit: the peripheral supports the key-exchange handshake.
    pub const ENCRYPTION_SUPPORTED: u16 = 1 << 0;

    /// Whether the peripheral advertises encryption support.
    pub fn encryption_supported(&self) -> bool {
        self.flags & Self::ENCRYPTION_SUPPORTED != 0
    }

    /// Encode the 6-byte current wire form.
    pub fn encode(&self) -> [u8; CAPABILITIES_LEN] {
        let mut out = [0u8; CAPABILITIES_LEN];
        out[0..2].copy_from_slice(&self.max_request_payload_size.to_le_bytes());
        out[2..4].copy_from_slice(&self.max_response_payload_size.to_le_bytes());
        out[4..6].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    /// Decode a capabilities payload.
    ///
    /// Accepts both the 6-byte current form and the 4-byte pre-encryption
    /// form; a missing flags field decodes as 0, so older peripherals
    /// read as not supporting encryption.
    ///
    /// # Errors
    ///
    /// `ProtoError::MalformedFrame` for any other length.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let flags = match buf.len() {
            CAPABILITIES_LEGACY_LEN => 0,
            CAPABILITIES_LEN => u16::from_le_bytes([buf[4], buf[5]]),
            _ => {
                return Err(ProtoError::MalformedFrame {
                    reason: "capabilities payload must be 4 or 6 bytes",
                });
            },
        };

        Ok(Self {
            max_request_payload_size: u16::from_le_bytes([buf[0], buf[1]]),
            max_response_payload_size: u16::from_le_bytes([buf[2], buf[3]]),
            flags,
        })
    }
}

/// Encode a timeout reply payload (milliseconds, u16 LE).
pub fn encode_timeout_ms(ms: u16) -> [u8; 2] {
    ms.to_le_bytes()
}

/// Decode a timeout reply payload.
///
/// # Errors
///
/// `ProtoError::MalformedFrame` unless the payload is exactly 2 bytes.
pub fn decode_timeout_ms(buf: &[u8]) -> Result<u16> {
    let [lo, hi] = buf else {
        return Err(ProtoError::MalformedFrame { reason: "timeout payload must be 2 bytes" });
    };
    Ok(u16::from_le_bytes([*lo, *hi]))
}

/// Decode an error report payload (one code byte).
///
/// # Errors
///
/// `ProtoError::MalformedFrame` unless the payload is exactly 1 byte.
pub fn decode_error_code(buf: &[u8]) -> Result<u8> {
    let [code] = buf else {
        return Err(ProtoError::MalformedFrame { reason: "error payload must be 1 byte" });
    };
    Ok(*code)
}
