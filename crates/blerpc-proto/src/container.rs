//! Container frame codec.
//!
//! A container is the on-wire unit written to or notified from the channel.
//! Three variants share a common 3-byte prefix (`transaction_id`,
//! `sequence_number`, `flags`); the flags byte selects the variant:
//!
//! ```text
//!   +----------------+----------------+----------------+
//!   | transaction_id | sequence_num   | flags          |
//!   +================+================+================+
//!   | FIRST:      total_length (u16 LE) | payload_len (u8) | payload...
//!   | SUBSEQUENT: payload_len (u8)      | payload...
//!   | CONTROL:    payload_len (u8)      | payload...
//!   +---------------------------------------------------+
//! ```
//!
//! `flags` packs the container type in bits 7:6 and the control command in
//! bits 5:2; bits 1:0 are reserved and must be zero. All multi-byte
//! integers are little-endian.
//!
//! Parsing is zero-copy: [`Container::parse`] returns payload borrows into
//! the input buffer. Validation happens before any payload access, so a
//! malformed header is rejected without touching the body.

use crate::errors::{ProtoError, Result};

/// ATT protocol overhead subtracted from the MTU to get the usable
/// container size for one write-without-response or notification.
pub const ATT_OVERHEAD: usize = 3;

/// Serialized header size of a FIRST container.
pub const FIRST_HEADER_LEN: usize = 6;

/// Serialized header size of a SUBSEQUENT or CONTROL container.
pub const SHORT_HEADER_LEN: usize = 4;

/// Smallest MTU the protocol supports (BLE 4.0 default ATT MTU).
pub const MIN_MTU: u16 = 23;

const TYPE_FIRST: u8 = 0;
const TYPE_SUBSEQUENT: u8 = 1;
const TYPE_CONTROL: u8 = 3;

/// Control command carried in bits 5:2 of the flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlCmd {
    /// Per-read timeout negotiation (request: empty, reply: u16 LE ms)
    Timeout = 1,
    /// Peripheral signals the end of a peripheral-to-central stream
    StreamEndP2c = 2,
    /// Central signals the end of a central-to-peripheral stream
    StreamEndC2p = 3,
    /// Capability record exchange (request: empty, reply: 4 or 6 bytes)
    Capabilities = 4,
    /// Peripheral error report (1-byte code)
    Error = 5,
    /// Key-exchange handshake message (raw handshake bytes)
    KeyExchange = 6,
}

impl ControlCmd {
    /// Decode from the 4-bit field of the flags byte.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Self::Timeout),
            2 => Some(Self::StreamEndP2c),
            3 => Some(Self::StreamEndC2p),
            4 => Some(Self::Capabilities),
            5 => Some(Self::Error),
            6 => Some(Self::KeyExchange),
            _ => None,
        }
    }

    /// Encode into the 4-bit field of the flags byte.
    pub fn to_bits(self) -> u8 {
        self as u8
    }
}

/// Variant body of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerBody<'a> {
    /// First container of a payload; declares the total reassembled length.
    First {
        /// Payload bytes across all containers of this payload
        total_length: u16,
        /// Payload bytes carried by this container
        payload: &'a [u8],
    },

    /// Continuation container of a payload.
    Subsequent {
        /// Payload bytes carried by this container
        payload: &'a [u8],
    },

    /// Control frame; bypasses the assembler entirely.
    Control {
        /// Control command
        cmd: ControlCmd,
        /// Control payload (may be empty)
        payload: &'a [u8],
    },
}

/// One on-wire container frame.
///
/// `transaction_id` is consistent across all containers of one logical
/// payload but carries no uniqueness guarantee; it is not a multiplexing
/// key. `sequence_number` starts at 0 on FIRST and increments by one per
/// SUBSEQUENT container of the same payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container<'a> {
    /// Caller-chosen payload identifier
    pub transaction_id: u8,
    /// Position of this container within its payload
    pub sequence_number: u8,
    /// Variant body
    pub body: ContainerBody<'a>,
}

impl<'a> Container<'a> {
    /// Parse one container from a complete notification frame.
    ///
    /// Returns payload borrows into `buf`; no bytes are copied. Trailing
    /// bytes beyond the declared payload are ignored (the channel delivers
    /// whole frames, padding is not part of the contract).
    ///
    /// # Errors
    ///
    /// `ProtoError::MalformedFrame` if the buffer is shorter than the
    /// header implies, the declared payload overruns the buffer, the type
    /// bits hold the reserved value, the reserved flag bits are set, or a
    /// CONTROL frame carries an unknown command.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let [transaction_id, sequence_number, flags, rest @ ..] = buf else {
            return Err(ProtoError::MalformedFrame { reason: "frame shorter than common header" });
        };

        if flags & 0b11 != 0 {
            return Err(ProtoError::MalformedFrame { reason: "reserved flag bits set" });
        }

        let body = match flags >> 6 {
            TYPE_FIRST => {
                let [total_lo, total_hi, payload_len, payload @ ..] = rest else {
                    return Err(ProtoError::MalformedFrame {
                        reason: "frame shorter than FIRST header",
                    });
                };
                let total_length = u16::from_le_bytes([*total_lo, *total_hi]);
                ContainerBody::First {
                    total_length,
                    payload: take_payload(payload, *payload_len)?,
                }
            },
            TYPE_SUBSEQUENT => {
                let [payload_len, payload @ ..] = rest else {
                    return Err(ProtoError::MalformedFrame {
                        reason: "frame shorter than SUBSEQUENT header",
                    });
                };
                ContainerBody::Subsequent { payload: take_payload(payload, *payload_len)? }
            },
            TYPE_CONTROL => {
                let cmd = ControlCmd::from_bits((flags >> 2) & 0x0F).ok_or(
                    ProtoError::MalformedFrame { reason: "unknown control command" },
                )?;
                let [payload_len, payload @ ..] = rest else {
                    return Err(ProtoError::MalformedFrame {
                        reason: "frame shorter than CONTROL header",
                    });
                };
                ContainerBody::Control { cmd, payload: take_payload(payload, *payload_len)? }
            },
            _ => return Err(ProtoError::MalformedFrame { reason: "reserved container type" }),
        };

        Ok(Self { transaction_id: *transaction_id, sequence_number: *sequence_number, body })
    }

    /// Serialized size of this container.
    pub fn encoded_len(&self) -> usize {
        match self.body {
            ContainerBody::First { payload, .. } => FIRST_HEADER_LEN + payload.len(),
            ContainerBody::Subsequent { payload } | ContainerBody::Control { payload, .. } => {
                SHORT_HEADER_LEN + payload.len()
            },
        }
    }

    /// Serialize into `out`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// - `ProtoError::BufferTooSmall` if `out` cannot hold the frame
    /// - `ProtoError::Overflow` if the payload exceeds the 255-byte
    ///   per-container limit imposed by the u8 `payload_len` field
    pub fn serialize(&self, out: &mut [u8]) -> Result<usize> {
        let needed = self.encoded_len();
        if out.len() < needed {
            return Err(ProtoError::BufferTooSmall { needed, available: out.len() });
        }

        out[0] = self.transaction_id;
        out[1] = self.sequence_number;

        match self.body {
            ContainerBody::First { total_length, payload } => {
                let payload_len = fit_payload_len(payload)?;
                out[2] = TYPE_FIRST << 6;
                out[3..5].copy_from_slice(&total_length.to_le_bytes());
                out[5] = payload_len;
                out[FIRST_HEADER_LEN..needed].copy_from_slice(payload);
            },
            ContainerBody::Subsequent { payload } => {
                out[2] = TYPE_SUBSEQUENT << 6;
                out[3] = fit_payload_len(payload)?;
                out[SHORT_HEADER_LEN..needed].copy_from_slice(payload);
            },
            ContainerBody::Control { cmd, payload } => {
                out[2] = (TYPE_CONTROL << 6) | (cmd.to_bits() << 2);
                out[3] = fit_payload_len(payload)?;
                out[SHORT_HEADER_LEN..needed].copy_from_slice(payload);
            },
        }

        Ok(needed)
    }

    /// Serialize into a fresh, exactly-sized buffer.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.encoded_len()];
        let written = self.serialize(&mut out)?;
        debug_assert_eq!(written, out.len());
        Ok(out)
    }
}

fn take_payload(rest: &[u8], payload_len: u8) -> Result<&[u8]> {
    rest.get(..payload_len as usize)
        .ok_or(ProtoError::MalformedFrame { reason: "payload_len exceeds frame" })
}

fn fit_payload_len(payload: &[u8]) -> Result<u8> {
    u8::try_from(payload.len())
        .map_err(|_| ProtoError::Overflow { size: payload.len(), max: u8::MAX as usize })
}

/// Build a serialized CONTROL container carrying `payload`.
///
/// # Errors
///
/// `ProtoError::Overflow` if `payload` exceeds the 255-byte container limit.
pub fn control_frame(transaction_id: u8, cmd: ControlCmd, payload: &[u8]) -> Result<Vec<u8>> {
    Container {
        transaction_id,
        sequence_number: 0,
        body: ContainerBody::Control { cmd, payload },
    }
    .to_vec()
}

fn empty_control(transaction_id: u8, cmd: ControlCmd) -> Vec<u8> {
    let Ok(frame) = control_frame(transaction_id, cmd, &[]) else {
        unreachable!("empty control payload always fits");
    };
    frame
}

/// TIMEOUT negotiation request (empty payload; peripheral replies with ms).
pub fn timeout_request(transaction_id: u8) -> Vec<u8> {
    empty_control(transaction_id, ControlCmd::Timeout)
}

/// CAPABILITIES request (empty payload; peripheral replies with its record).
pub fn capabilities_request(transaction_id: u8) -> Vec<u8> {
    empty_control(transaction_id, ControlCmd::Capabilities)
}

/// End-of-stream marker for a central-to-peripheral upload.
pub fn stream_end_c2p(transaction_id: u8) -> Vec<u8> {
    empty_control(transaction_id, ControlCmd::StreamEndC2p)
}

/// End-of-stream marker for a peripheral-to-central stream.
pub fn stream_end_p2c(transaction_id: u8) -> Vec<u8> {
    empty_control(transaction_id, ControlCmd::StreamEndP2c)
}

/// Peripheral error report carrying a one-byte code.
pub fn error_frame(transaction_id: u8, code: u8) -> Vec<u8> {
    let Ok(frame) = control_frame(transaction_id, ControlCmd::Error, &[code]) else {
        unreachable!("one-byte control payload always fits");
    };
    frame
}

/// Key-exchange handshake message.
///
/// # Errors
///
/// `ProtoError::Overflow` if the handshake message exceeds the 255-byte
/// container limit (the longest defined message is 128 bytes).
pub fn key_exchange(transaction_id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    control_frame(transaction_id, ControlCmd::KeyExchange, payload)
}
