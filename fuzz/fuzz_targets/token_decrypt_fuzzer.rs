//! Fuzz target for RoomKey::decrypt
//!
//! Arbitrary tokens must never panic and never authenticate under a key
//! that did not produce them.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_crypto::RoomKey;

fuzz_target!(|input: (&str, [u8; 32])| {
    let (token, key_bytes) = input;
    let key = RoomKey::from_bytes(key_bytes);

    let _ = key.decrypt(token);
});
