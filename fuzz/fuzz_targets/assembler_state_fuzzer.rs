//! Fuzz target for the assembler state machine
//!
//! Drive reassembly with arbitrary container sequences
//!
//! # Strategy
//!
//! - Arbitrary sequences of FIRST/SUBSEQUENT containers with random
//!   transaction ids, sequence numbers, and declared totals
//! - Interleaved resets
//!
//! # Invariants
//!
//! - Feeding never panics
//! - The buffer never exceeds the configured cap
//! - Any error leaves the assembler idle (active == false)
//! - A completed payload length equals the declared total

#![no_main]

use arbitrary::Arbitrary;
use blerpc_proto::{Assembler, Container, ContainerBody, FeedOutcome};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Step {
    First { tid: u8, total: u16, payload: Vec<u8> },
    Subsequent { tid: u8, seq: u8, payload: Vec<u8> },
    Reset,
}

const CAP: usize = 8192;

fuzz_target!(|steps: Vec<Step>| {
    let mut assembler = Assembler::new(CAP);

    for step in &steps {
        match step {
            Step::Reset => assembler.reset(),
            Step::First { tid, total, payload } => {
                let container = Container {
                    transaction_id: *tid,
                    sequence_number: 0,
                    body: ContainerBody::First { total_length: *total, payload },
                };
                check_feed(&mut assembler, &container, *total);
            },
            Step::Subsequent { tid, seq, payload } => {
                let container = Container {
                    transaction_id: *tid,
                    sequence_number: *seq,
                    body: ContainerBody::Subsequent { payload },
                };
                check_feed(&mut assembler, &container, 0);
            },
        }
    }
});

fn check_feed(assembler: &mut Assembler, container: &Container<'_>, declared_total: u16) {
    match assembler.feed(container) {
        Ok(FeedOutcome::Complete(payload)) => {
            assert!(payload.len() <= CAP);
            if matches!(container.body, ContainerBody::First { .. }) {
                assert_eq!(payload.len(), declared_total as usize);
            }
            assert!(!assembler.is_active());
        },
        Ok(FeedOutcome::Incomplete) => {},
        Err(_) => assert!(!assembler.is_active()),
    }
}
