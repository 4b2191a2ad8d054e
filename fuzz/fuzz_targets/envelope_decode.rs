//! Fuzz target for Envelope::decode
//!
//! This fuzzer tests envelope decoding with arbitrary byte sequences to find:
//! - Parser crashes or panics
//! - Inputs that decode but do not survive re-encoding
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::Envelope;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = Envelope::decode(data) {
        // Anything accepted must round-trip exactly
        let again = Envelope::decode(&envelope.encode()).unwrap();
        assert_eq!(again, envelope);
        assert!(Envelope::TYPES.contains(&envelope.type_tag()));
    }
});
