//! Transport-layer codecs.
//!
//! [`packet`] is transport-agnostic and works on byte buffers. The
//! `native` feature adds a tokio UDP wrapper ([`packet_conn`]) and async
//! stream framing ([`stream`]).

pub mod packet;
#[cfg(feature = "native")]
pub mod packet_conn;
#[cfg(feature = "native")]
pub mod stream;

pub use packet::{
    max_payload, pack, unpack, unpack_in_place, PacketCodec, PacketError, MAX_PACKET_SIZE,
};
#[cfg(feature = "native")]
pub use packet_conn::{PacketConn, PacketConnError};
#[cfg(feature = "native")]
pub use stream::{
    read_padding, read_salt_header, read_timestamp, write_padding, write_salt_header,
    write_timestamp, StreamError,
};
