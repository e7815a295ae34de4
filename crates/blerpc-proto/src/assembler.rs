//! Payload reassembly from an incoming container sequence.
//!
//! One assembler instance serves one channel and tracks at most one
//! in-flight payload. Interleaving two payloads on a channel is a protocol
//! violation and resets the assembler; CONTROL frames never enter it, the
//! session routes those directly.
//!
//! # State machine
//!
//! ```text
//!            FIRST (partial)              SUBSEQUENT (correct, partial)
//!   ┌──────┐ ───────────────> ┌────────┐ ─────────────┐
//!   │ Idle │                  │ Active │ <────────────┘
//!   └──────┘ <─────────────── └────────┘
//!      ^        complete / any violation
//!      └── FIRST carrying the whole payload completes immediately
//! ```
//!
//! Every violation (gap, tid mismatch, overflow, unexpected variant)
//! resets to Idle so the next FIRST starts clean.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::{
    container::{Container, ContainerBody},
    errors::{ProtoError, Result},
};

/// Outcome of feeding one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// More containers are needed to complete the payload.
    Incomplete,
    /// The payload is fully reassembled; the assembler is Idle again.
    Complete(Bytes),
}

#[derive(Debug)]
struct InFlight {
    transaction_id: u8,
    expected_seq: u8,
    total_length: usize,
    buffer: BytesMut,
}

/// Single-stream payload assembler.
#[derive(Debug)]
pub struct Assembler {
    max_payload: usize,
    in_flight: Option<InFlight>,
}

impl Assembler {
    /// Create an assembler accepting payloads up to `max_payload` bytes.
    ///
    /// A FIRST container declaring a larger `total_length` fails with
    /// `Overflow` before any buffer is allocated.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload, in_flight: None }
    }

    /// Whether a payload is currently being assembled.
    pub fn is_active(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Drop any in-flight payload and return to Idle.
    pub fn reset(&mut self) {
        self.in_flight = None;
    }

    /// Feed one FIRST or SUBSEQUENT container.
    ///
    /// # Errors
    ///
    /// - `UnexpectedSubsequent` — SUBSEQUENT while Idle
    /// - `UnexpectedFirst` — FIRST while a payload is in flight
    /// - `TidMismatch` / `SequenceGap` — continuation does not match the
    ///   in-flight payload
    /// - `Overflow` — declared or accumulated length exceeds bounds
    /// - `MalformedFrame` — a CONTROL frame was routed here
    ///
    /// All errors reset the assembler to Idle.
    pub fn feed(&mut self, container: &Container<'_>) -> Result<FeedOutcome> {
        let outcome = self.feed_inner(container);
        if let Err(err) = &outcome {
            debug!(%err, tid = container.transaction_id, "assembler reset");
            self.in_flight = None;
        }
        outcome
    }

    fn feed_inner(&mut self, container: &Container<'_>) -> Result<FeedOutcome> {
        match (container.body, self.in_flight.as_mut()) {
            (ContainerBody::Control { .. }, _) => {
                Err(ProtoError::MalformedFrame { reason: "control frame fed to assembler" })
            },

            (ContainerBody::First { total_length, payload }, None) => {
                let total_length = total_length as usize;
                if total_length > self.max_payload {
                    return Err(ProtoError::Overflow {
                        size: total_length,
                        max: self.max_payload,
                    });
                }
                if payload.len() > total_length {
                    return Err(ProtoError::Overflow { size: payload.len(), max: total_length });
                }

                let mut buffer = BytesMut::with_capacity(total_length);
                buffer.extend_from_slice(payload);

                if buffer.len() == total_length {
                    return Ok(FeedOutcome::Complete(buffer.freeze()));
                }

                self.in_flight = Some(InFlight {
                    transaction_id: container.transaction_id,
                    expected_seq: 1,
                    total_length,
                    buffer,
                });
                Ok(FeedOutcome::Incomplete)
            },

            (ContainerBody::First { .. }, Some(_)) => Err(ProtoError::UnexpectedFirst),

            (ContainerBody::Subsequent { .. }, None) => Err(ProtoError::UnexpectedSubsequent),

            (ContainerBody::Subsequent { payload }, Some(in_flight)) => {
                if container.transaction_id != in_flight.transaction_id {
                    return Err(ProtoError::TidMismatch {
                        expected: in_flight.transaction_id,
                        actual: container.transaction_id,
                    });
                }
                if container.sequence_number != in_flight.expected_seq {
                    return Err(ProtoError::SequenceGap {
                        expected: in_flight.expected_seq,
                        actual: container.sequence_number,
                    });
                }

                let new_len = in_flight.buffer.len() + payload.len();
                if new_len > in_flight.total_length {
                    return Err(ProtoError::Overflow {
                        size: new_len,
                        max: in_flight.total_length,
                    });
                }

                in_flight.buffer.extend_from_slice(payload);
                in_flight.expected_seq = in_flight.expected_seq.wrapping_add(1);

                if in_flight.buffer.len() == in_flight.total_length {
                    let Some(done) = self.in_flight.take() else {
                        unreachable!("in-flight state matched above");
                    };
                    return Ok(FeedOutcome::Complete(done.buffer.freeze()));
                }
                Ok(FeedOutcome::Incomplete)
            },
        }
    }
}
