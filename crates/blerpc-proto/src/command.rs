//! Command packet codec.
//!
//! The command packet is the typed inner message carried by an assembled
//! (and possibly decrypted) container payload:
//!
//! ```text
//!   +-------------+--------------+----------------+---------------+---------+
//!   | header (u8) | name_len (u8)| name (1..=16 B)| data_len (u16)| data... |
//!   +-------------+--------------+----------------+---------------+---------+
//! ```
//!
//! Bit 7 of the header byte distinguishes requests (0) from responses (1);
//! bits 6:0 are reserved and must be zero. `data_len` is little-endian and
//! the data bytes are opaque to the core.

use crate::errors::{ProtoError, Result};

/// Maximum command name length in bytes.
pub const MAX_NAME_LEN: usize = 16;

const RESPONSE_BIT: u8 = 0x80;

/// Direction of a command packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Central-to-peripheral request (or one message of an upload stream)
    Request,
    /// Peripheral-to-central response (or one message of a download stream)
    Response,
}

/// Borrowed view of one parsed command packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket<'a> {
    /// Request or response
    pub kind: CommandKind,
    /// RPC name, ASCII snake_case in practice
    pub name: &'a str,
    /// Opaque user bytes
    pub data: &'a [u8],
}

/// Serialized size of a command packet with the given name and data.
pub fn command_len(name: &str, data: &[u8]) -> usize {
    2 + name.len() + 2 + data.len()
}

/// Serialize a command packet into `out`, returning the bytes written.
///
/// # Errors
///
/// - `ProtoError::InvalidCommandName` if `name` is empty or longer than 16
///   bytes
/// - `ProtoError::Overflow` if `data` exceeds the u16 length field
/// - `ProtoError::BufferTooSmall` if `out` cannot hold the packet
pub fn serialize_command(
    kind: CommandKind,
    name: &str,
    data: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ProtoError::InvalidCommandName { len: name.len() });
    }
    if data.len() > u16::MAX as usize {
        return Err(ProtoError::Overflow { size: data.len(), max: u16::MAX as usize });
    }

    let needed = command_len(name, data);
    if out.len() < needed {
        return Err(ProtoError::BufferTooSmall { needed, available: out.len() });
    }

    out[0] = match kind {
        CommandKind::Request => 0,
        CommandKind::Response => RESPONSE_BIT,
    };
    out[1] = name.len() as u8;
    out[2..2 + name.len()].copy_from_slice(name.as_bytes());

    let data_offset = 2 + name.len();
    out[data_offset..data_offset + 2].copy_from_slice(&(data.len() as u16).to_le_bytes());
    out[data_offset + 2..needed].copy_from_slice(data);

    Ok(needed)
}

/// Serialize a command packet into a fresh, exactly-sized buffer.
pub fn command_to_vec(kind: CommandKind, name: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![0u8; command_len(name, data)];
    let written = serialize_command(kind, name, data, &mut out)?;
    debug_assert_eq!(written, out.len());
    Ok(out)
}

/// Parse a command packet, returning borrows over name and data.
///
/// # Errors
///
/// - `ProtoError::MalformedFrame` for short buffers, reserved header bits,
///   or non-UTF-8 names
/// - `ProtoError::InvalidCommandName` if the declared name length is
///   outside 1..=16
pub fn parse_command(buf: &[u8]) -> Result<CommandPacket<'_>> {
    let [header, name_len, rest @ ..] = buf else {
        return Err(ProtoError::MalformedFrame { reason: "command packet shorter than header" });
    };

    if header & !RESPONSE_BIT != 0 {
        return Err(ProtoError::MalformedFrame { reason: "reserved command header bits set" });
    }
    let kind = if header & RESPONSE_BIT == 0 { CommandKind::Request } else { CommandKind::Response };

    let name_len = *name_len as usize;
    if name_len == 0 || name_len > MAX_NAME_LEN {
        return Err(ProtoError::InvalidCommandName { len: name_len });
    }
    if rest.len() < name_len + 2 {
        return Err(ProtoError::MalformedFrame { reason: "command packet truncated in name" });
    }

    let name = std::str::from_utf8(&rest[..name_len])
        .map_err(|_| ProtoError::MalformedFrame { reason: "command name is not utf-8" })?;

    let data_len = u16::from_le_bytes([rest[name_len], rest[name_len + 1]]) as usize;
    let data = rest
        .get(name_len + 2..name_len + 2 + data_len)
        .ok_or(ProtoError::MalformedFrame { reason: "command packet truncated in data" })?;

    Ok(CommandPacket { kind, name, data })
}
