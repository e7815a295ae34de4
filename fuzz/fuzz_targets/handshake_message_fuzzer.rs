//! Fuzz target for handshake message handling
//!
//! Feed both handshake state machines hostile key-exchange payloads
//!
//! # Strategy
//!
//! - Arbitrary bytes as message 1 / message 2 / confirmation frames
//! - Length-boundary inputs around 32 and 128 bytes
//!
//! # Invariants
//!
//! - Message handling never panics
//! - Malformed input never yields a live session
//! - A poisoned handshake rejects all further input

#![no_main]

use blerpc_crypto::{
    CentralHandshake, HandshakeProgress, MemoryIdentityStore, PeripheralHandshake, SigningKey,
};
use libfuzzer_sys::fuzz_target;

/// Deterministic RNG so the fuzzer explores message handling, not
/// entropy.
struct FixedRng(u64);

impl rand_core::RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl rand_core::CryptoRng for FixedRng {}

fuzz_target!(|data: &[u8]| {
    let mut rng = FixedRng(0x5EED);
    let mut store = MemoryIdentityStore::default();

    // Peripheral side: arbitrary bytes as message 1, then as message 3
    let identity = SigningKey::from_bytes(&[7u8; 32]);
    let mut peripheral = PeripheralHandshake::new(identity);
    if let Ok(HandshakeProgress::Complete { .. }) = peripheral.on_message(data, &mut rng) {
        panic!("arbitrary bytes must not complete a handshake");
    }
    let _ = peripheral.on_message(data, &mut rng);

    // Central side: arbitrary bytes as message 2
    let (mut central, _msg1) = CentralHandshake::initiate(&mut rng);
    if let Ok(HandshakeProgress::Complete { .. }) =
        central.on_message(data, &mut store, "fuzz-peer")
    {
        panic!("arbitrary bytes must not complete a handshake");
    }
    let _ = central.on_message(data, &mut store, "fuzz-peer");
});
