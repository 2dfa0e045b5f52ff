#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tunnel_aead::crypto::framing;

/// Padding and timestamp checks on arbitrary input.
#[derive(Arbitrary, Debug)]
struct FramingInput {
    key: Vec<u8>,
    salt: Vec<u8>,
    candidate: Vec<u8>,
    now: u64,
}

fuzz_target!(|input: FramingInput| {
    let padding = framing::derive_padding(&input.key, &input.salt);
    assert!((framing::MIN_PADDING..=framing::MAX_PADDING).contains(&padding.len()));

    // The derived padding must verify, however much follows it.
    let mut packet = padding.clone();
    packet.extend_from_slice(&input.candidate);
    assert_eq!(
        framing::verify_padding(&input.key, &input.salt, &packet),
        Ok(padding.len())
    );

    // Arbitrary candidates must never panic.
    let _ = framing::verify_padding(&input.key, &input.salt, &input.candidate);
    let _ = framing::verify_timestamp_at(&input.candidate, input.now);
});
