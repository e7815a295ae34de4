//! Fuzz target for command packet parsing
//!
//! Harden the command codec against hostile payload bytes
//!
//! # Strategy
//!
//! - Random bytes: arbitrary assembled payloads
//! - Name abuse: lengths outside 1..=16, invalid UTF-8
//! - Length abuse: data_len disagreeing with the buffer
//!
//! # Invariants
//!
//! - Parsing never panics
//! - Accepted names are 1..=16 bytes of valid UTF-8
//! - Round-trip through serialize is identity

#![no_main]

use blerpc_proto::{command_to_vec, parse_command};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(packet) = parse_command(data) else {
        return;
    };

    assert!(!packet.name.is_empty());
    assert!(packet.name.len() <= 16);

    let wire = command_to_vec(packet.kind, packet.name, packet.data)
        .expect("parsed packet must serialize");
    let reparsed = parse_command(&wire).expect("serialized packet must parse");
    assert_eq!(reparsed.kind, packet.kind);
    assert_eq!(reparsed.name, packet.name);
    assert_eq!(reparsed.data, packet.data);
});
