#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use tunnel_aead::crypto::{AeadCipher, CipherKind, ReplayCache};
use tunnel_aead::transport::{PacketCodec, PacketError, MAX_PACKET_SIZE};

/// Feed arbitrary datagrams to the receiver and round-trip arbitrary
/// payloads. Nothing here may panic, and a packet that was rejected must
/// never leave its salt in the cache.
#[derive(Arbitrary, Debug)]
struct UnpackInput {
    /// 0=AES-128-GCM, 1=AES-256-GCM, 2=ChaCha20-Poly1305
    suite: u8,
    datagram: Vec<u8>,
    payload: Vec<u8>,
}

fuzz_target!(|input: UnpackInput| {
    if input.datagram.len() > MAX_PACKET_SIZE || input.payload.len() > MAX_PACKET_SIZE {
        return;
    }

    let kind = match input.suite % 3 {
        0 => CipherKind::Aes128Gcm,
        1 => CipherKind::Aes256Gcm,
        _ => CipherKind::ChaCha20Poly1305,
    };
    let key = vec![0x5Au8; kind.key_size()];
    let cipher = Arc::new(AeadCipher::new(kind, &key).unwrap());
    let sender = PacketCodec::new(cipher.clone(), Arc::new(ReplayCache::default()));
    let receiver = PacketCodec::new(cipher, Arc::new(ReplayCache::default()));

    // Arbitrary bytes: must be rejected cleanly.
    let mut buf = input.datagram.clone();
    let len = buf.len();
    match receiver.unpack_in_place(&mut buf, len) {
        Ok(n) => assert!(n <= len),
        Err(PacketError::RepeatedSalt) => unreachable!("fresh cache"),
        Err(_) => assert!(receiver.cache().is_empty()),
    }

    // Valid packets: must round-trip exactly once.
    if let Ok(packet) = sender.pack_to_vec(&input.payload) {
        let opened = receiver.unpack_to_vec(&packet).expect("sealed packet must open");
        assert_eq!(opened, input.payload);
        assert!(matches!(
            receiver.unpack_to_vec(&packet),
            Err(PacketError::RepeatedSalt)
        ));
    }
});
