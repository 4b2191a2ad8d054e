//! Fuzz target for frame header boundary conditions
//!
//! Prevent allocation blowups and mis-parses via hostile length headers
//!
//! # Strategy
//!
//! - Header width: 1 to 32 bytes
//! - Header contents: valid lengths, padding variants (leading, trailing,
//!   tabs), signs, non-digits, overflowing digit strings, random bytes
//! - Payload: shorter than, equal to and longer than the declared length
//!
//! # Invariants
//!
//! - A declared length above `max_payload` MUST return
//!   `FramingError::PayloadTooLarge` without reading the payload
//! - A stream that ends inside the payload MUST return
//!   `FramingError::TruncatedPayload`
//! - A successfully read payload MUST have exactly the declared length
//! - All decode errors MUST be structured (never panic)

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_proto::{FrameCodec, FramingError};

const MAX_PAYLOAD: usize = 4096;

#[derive(Debug, Clone, Arbitrary)]
struct HeaderCase {
    width: u8,
    header: HeaderBytes,
    payload: Vec<u8>,
}

#[derive(Debug, Clone, Arbitrary)]
enum HeaderBytes {
    Length(u32),
    LeadingSpaces(u16),
    Tabs(u16),
    Negative(u16),
    Plus(u16),
    AllSpaces,
    Digits(Vec<u8>),
    Random(Vec<u8>),
}

fn render(header: &HeaderBytes, width: usize) -> Vec<u8> {
    let text = match header {
        HeaderBytes::Length(n) => n.to_string(),
        HeaderBytes::LeadingSpaces(n) => format!("   {n}"),
        HeaderBytes::Tabs(n) => format!("\t{n}\t"),
        HeaderBytes::Negative(n) => format!("-{n}"),
        HeaderBytes::Plus(n) => format!("+{n}"),
        HeaderBytes::AllSpaces => String::new(),
        HeaderBytes::Digits(d) => d.iter().map(|b| char::from(b'0' + b % 10)).collect(),
        HeaderBytes::Random(bytes) => {
            let mut raw = bytes.clone();
            raw.resize(width, b' ');
            return raw;
        },
    };
    let mut raw = text.into_bytes();
    raw.resize(width, b' ');
    raw
}

fuzz_target!(|case: HeaderCase| {
    let width = usize::from(case.width % 32) + 1;
    let codec = FrameCodec::new(width).unwrap().with_max_payload(MAX_PAYLOAD);

    let mut wire = render(&case.header, width);
    wire.extend_from_slice(&case.payload);

    let declared = codec.decode_header(&wire[..width]);

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let result = runtime.block_on(async {
        let mut reader = &wire[..];
        codec.read_frame(&mut reader).await
    });

    match (declared, result) {
        (Ok(len), Ok(payload)) => {
            assert_eq!(payload.len(), len);
            assert_eq!(&payload[..], &case.payload[..len]);
        },
        (Ok(len), Err(FramingError::TruncatedPayload { expected, actual })) => {
            assert_eq!(expected, len);
            assert!(actual < len);
            assert!(case.payload.len() < len);
        },
        (Ok(_), Err(e)) => panic!("valid header failed to read: {e}"),
        (Err(FramingError::PayloadTooLarge { size, max }), Err(FramingError::PayloadTooLarge { .. })) => {
            assert!(size > max);
        },
        (Err(_), Ok(_)) => panic!("invalid header produced a payload"),
        (Err(_), Err(_)) => {},
    }
});
