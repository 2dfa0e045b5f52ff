//! Encrypted UDP socket.
//!
//! [`PacketConn`] wraps a [`UdpSocket`] so that every datagram sent is a
//! packed packet and every datagram received is unpacked before it reaches
//! the caller. Rejected datagrams are reported as errors, never dropped:
//! the socket stays usable and the caller decides whether to read again.

use super::packet::{PacketCodec, PacketError, MAX_PACKET_SIZE};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum PacketConnError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Rejected datagram from {peer}: {source}")]
    Rejected {
        peer: SocketAddr,
        #[source]
        source: PacketError,
    },
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
}

impl PacketConnError {
    /// The codec error, if this failure came from pack/unpack.
    pub fn packet_error(&self) -> Option<&PacketError> {
        match self {
            Self::Rejected { source, .. } | Self::Packet(source) => Some(source),
            Self::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PacketConnError>;

/// UDP socket speaking the sealed packet format.
pub struct PacketConn {
    socket: UdpSocket,
    codec: PacketCodec,
    /// Send-side scratch buffer; the lock also serialises writers.
    scratch: Mutex<Vec<u8>>,
}

impl PacketConn {
    pub fn new(socket: UdpSocket, codec: PacketCodec) -> Self {
        Self {
            socket,
            codec,
            scratch: Mutex::new(vec![0u8; MAX_PACKET_SIZE]),
        }
    }

    /// Bind a fresh socket and wrap it.
    pub async fn bind<A: ToSocketAddrs>(addr: A, codec: PacketCodec) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        log::debug!("Encrypted UDP socket bound on {}", socket.local_addr()?);
        Ok(Self::new(socket, codec))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn codec(&self) -> &PacketCodec {
        &self.codec
    }

    pub fn get_ref(&self) -> &UdpSocket {
        &self.socket
    }

    pub fn into_inner(self) -> UdpSocket {
        self.socket
    }

    /// Seal `buf` and send it to `target`. Returns `buf.len()`.
    pub async fn send_to<A: ToSocketAddrs>(&self, buf: &[u8], target: A) -> Result<usize> {
        let mut scratch = self.scratch.lock().await;
        let packet = self.codec.pack(&mut scratch, buf)?;
        self.socket.send_to(packet, target).await?;
        Ok(buf.len())
    }

    /// Seal `buf` and send it to the connected peer.
    pub async fn send(&self, buf: &[u8]) -> Result<usize> {
        let mut scratch = self.scratch.lock().await;
        let packet = self.codec.pack(&mut scratch, buf)?;
        self.socket.send(packet).await?;
        Ok(buf.len())
    }

    /// Receive one datagram into `buf` and decrypt it in place.
    ///
    /// Returns the payload length and sender. A datagram that fails any
    /// check yields [`PacketConnError::Rejected`].
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let (n, peer) = self.socket.recv_from(buf).await?;
        match self.codec.unpack_in_place(buf, n) {
            Ok(len) => Ok((len, peer)),
            Err(source) => {
                log::debug!("Rejected {}-byte datagram from {}: {}", n, peer, source);
                Err(PacketConnError::Rejected { peer, source })
            }
        }
    }

    /// Receive one datagram from the connected peer.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let n = self.socket.recv(buf).await?;
        Ok(self.codec.unpack_in_place(buf, n)?)
    }

    /// Connect the underlying socket so [`send`](Self::send) and
    /// [`recv`](Self::recv) can be used.
    pub async fn connect<A: ToSocketAddrs>(&self, addr: A) -> Result<()> {
        Ok(self.socket.connect(addr).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AeadCipher, CipherKind, ReplayCache};
    use std::sync::Arc;
    use std::time::Duration;

    fn codec() -> PacketCodec {
        let cipher = AeadCipher::new(CipherKind::ChaCha20Poly1305, &[0x42u8; 32]).unwrap();
        PacketCodec::new(Arc::new(cipher), Arc::new(ReplayCache::default()))
    }

    async fn pair() -> (PacketConn, PacketConn) {
        let a = PacketConn::bind("127.0.0.1:0", codec()).await.unwrap();
        // Same secret, independent replay cache.
        let b = PacketConn::bind("127.0.0.1:0", codec()).await.unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn test_udp_roundtrip() {
        let (a, b) = pair().await;
        let b_addr = b.local_addr().unwrap();

        assert_eq!(a.send_to(b"hello over udp", b_addr).await.unwrap(), 14);

        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let (n, from) = tokio::time::timeout(Duration::from_secs(5), b.recv_from(&mut buf))
            .await
            .expect("timed out")
            .unwrap();
        assert_eq!(&buf[..n], b"hello over udp");
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_connected_roundtrip() {
        let (a, b) = pair().await;
        a.connect(b.local_addr().unwrap()).await.unwrap();
        b.connect(a.local_addr().unwrap()).await.unwrap();

        a.send(b"ping").await.unwrap();
        let mut buf = vec![0u8; 2048];
        let n = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        b.send(b"pong").await.unwrap();
        let n = a.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn test_garbage_datagram_surfaces_as_error() {
        let (_, b) = pair().await;
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(&[0xAB; 100], b.local_addr().unwrap()).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let err = b.recv_from(&mut buf).await.unwrap_err();
        assert_eq!(err.packet_error(), Some(&PacketError::InvalidPadding));
        match err {
            PacketConnError::Rejected { peer, .. } => {
                assert_eq!(peer, raw.local_addr().unwrap())
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_replayed_datagram_rejected_then_socket_still_usable() {
        let (a, b) = pair().await;
        let b_addr = b.local_addr().unwrap();

        // Capture a sealed packet and replay it from a raw socket.
        let packet = a.codec().pack_to_vec(b"once").unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(&packet, b_addr).await.unwrap();
        raw.send_to(&packet, b_addr).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let (n, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"once");

        let err = b.recv_from(&mut buf).await.unwrap_err();
        assert_eq!(err.packet_error(), Some(&PacketError::RepeatedSalt));

        a.send_to(b"after replay", b_addr).await.unwrap();
        let (n, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"after replay");
    }

    #[tokio::test]
    async fn test_oversized_payload_aborts_send() {
        let (a, b) = pair().await;
        let huge = vec![0u8; MAX_PACKET_SIZE];
        let err = a.send_to(&huge, b.local_addr().unwrap()).await.unwrap_err();
        assert_eq!(err.packet_error(), Some(&PacketError::ShortBuffer));
    }
}
