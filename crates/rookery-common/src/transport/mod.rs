//! Rookery Transport Layer
//!
//! Frame-level I/O for the rookery protocol. Every message on the stream is
//! a 4-byte big-endian length prefix followed by that many payload bytes:
//!
//! ```text
//! [4-byte length] [payload]
//! ```
//!
//! [`FrameConnection`] wraps any `AsyncRead + AsyncWrite` byte stream, so
//! the same framing works over TCP sockets in production and in-memory
//! duplex pipes in tests.

mod frame;

pub use frame::{FrameConnection, DEFAULT_MAX_FRAME_BYTES};
