//! Fuzz target for container frame parsing
//!
//! Harden the container codec against hostile notification bytes
//!
//! # Strategy
//!
//! - Random bytes: completely arbitrary frames (general malformation)
//! - Truncation: valid frames cut at every length
//! - Flag abuse: reserved type bits, unknown control commands
//!
//! # Invariants
//!
//! - Parsing never panics and never over-reads the input
//! - A frame that parses re-serializes to an equal container
//! - Declared payload lengths are bounded by the input length

#![no_main]

use blerpc_proto::{Container, ContainerBody};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(container) = Container::parse(data) else {
        return;
    };

    // Payload borrows must stay inside the input
    let payload_len = match container.body {
        ContainerBody::First { payload, .. }
        | ContainerBody::Subsequent { payload }
        | ContainerBody::Control { payload, .. } => payload.len(),
    };
    assert!(payload_len <= data.len());

    // Round-trip: serialize then re-parse must be identity
    let wire = container.to_vec().expect("parsed container must serialize");
    let reparsed = Container::parse(&wire).expect("serialized container must parse");
    assert_eq!(reparsed, container);
});
