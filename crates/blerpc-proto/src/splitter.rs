//! Payload fragmentation sized to the channel MTU.
//!
//! [`split`] cuts one payload into a FIRST container followed by zero or
//! more SUBSEQUENT containers, each fitting in `mtu - 3` bytes on the wire
//! (3 bytes of ATT overhead). The containers must be written to the channel
//! in iteration order; the channel preserves that order end to end, so no
//! retransmission or reordering logic exists at this layer.

use crate::{
    container::{
        ATT_OVERHEAD, Container, ContainerBody, FIRST_HEADER_LEN, MIN_MTU, SHORT_HEADER_LEN,
    },
    errors::{ProtoError, Result},
};

/// Transaction-id allocator for outgoing payloads.
///
/// The id ties the containers of one payload together on the wire; it is
/// not a uniqueness key, so wrapping at 256 is fine.
#[derive(Debug, Default)]
pub struct Splitter {
    next_tid: u8,
}

impl Splitter {
    /// Create a splitter with the transaction counter at zero.
    pub fn new() -> Self {
        Self { next_tid: 0 }
    }

    /// Return the current transaction id and post-increment the counter.
    pub fn next_transaction_id(&mut self) -> u8 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1);
        tid
    }
}

/// Split `payload` into containers sized to `mtu`.
///
/// The FIRST container carries `total_length = payload.len()` and up to
/// `mtu - 3 - 6` payload bytes; SUBSEQUENT containers carry up to
/// `mtu - 3 - 4` bytes each, with sequence numbers 0, 1, 2, ... A
/// zero-length payload yields exactly one FIRST with an empty body.
///
/// # Errors
///
/// - `ProtoError::MalformedFrame` if `mtu` is below the 23-byte minimum
/// - `ProtoError::Overflow` if the payload exceeds the u16 total-length
///   field or needs more containers than the u8 sequence space holds
pub fn split(payload: &[u8], transaction_id: u8, mtu: u16) -> Result<SplitIter<'_>> {
    if mtu < MIN_MTU {
        return Err(ProtoError::MalformedFrame { reason: "mtu below 23-byte minimum" });
    }
    if payload.len() > u16::MAX as usize {
        return Err(ProtoError::Overflow { size: payload.len(), max: u16::MAX as usize });
    }

    let effective = mtu as usize - ATT_OVERHEAD;
    let first_capacity = effective - FIRST_HEADER_LEN;
    let subsequent_capacity = effective - SHORT_HEADER_LEN;

    // Sequence numbers are u8 and do not wrap: a payload needing 256 or
    // more containers is out of range for this MTU.
    let max_in_range = first_capacity + 255 * subsequent_capacity;
    if payload.len() > max_in_range {
        return Err(ProtoError::Overflow { size: payload.len(), max: max_in_range });
    }

    Ok(SplitIter {
        payload,
        transaction_id,
        first_capacity,
        subsequent_capacity,
        offset: 0,
        sequence_number: 0,
        done: false,
    })
}

/// Iterator over the containers of one split payload.
///
/// Yields borrows into the source payload; nothing is copied until the
/// containers are serialized for the wire.
#[derive(Debug)]
pub struct SplitIter<'a> {
    payload: &'a [u8],
    transaction_id: u8,
    first_capacity: usize,
    subsequent_capacity: usize,
    offset: usize,
    sequence_number: u8,
    done: bool,
}

impl<'a> Iterator for SplitIter<'a> {
    type Item = Container<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let remaining = &self.payload[self.offset..];
        let seq = self.sequence_number;
        self.sequence_number = self.sequence_number.wrapping_add(1);

        let body = if seq == 0 {
            let take = remaining.len().min(self.first_capacity);
            self.offset += take;
            ContainerBody::First {
                total_length: self.payload.len() as u16,
                payload: &remaining[..take],
            }
        } else {
            let take = remaining.len().min(self.subsequent_capacity);
            self.offset += take;
            ContainerBody::Subsequent { payload: &remaining[..take] }
        };

        if self.offset == self.payload.len() {
            self.done = true;
        }

        Some(Container { transaction_id: self.transaction_id, sequence_number: seq, body })
    }
}
