//! Rookery Common Types and Transport
//!
//! This crate provides the wire protocol and the framed transport layer for
//! the rookery coordination-service client.
//!
//! # Overview
//!
//! Rookery is a client for a hierarchical, strongly-consistent coordination
//! service. The service speaks a bespoke binary protocol over TCP: every
//! frame is a 4-byte big-endian length followed by that many payload bytes,
//! and every payload is a fixed-layout big-endian record. This crate contains
//! the pieces shared by the session engine and the user-facing client:
//!
//! - **Protocol Layer**: record encoding/decoding, opcodes, reserved
//!   transaction ids, server error codes, and the [`RookeryError`] type
//! - **Transport Layer**: length-prefixed frame I/O over any async byte
//!   stream, plus the connect handshake exchanged on a fresh socket
//!
//! # Components
//!
//! - [`protocol`] - Wire records (connect handshake, request/reply envelopes,
//!   operation bodies), error codes, and error types
//! - [`transport`] - Framed connection over `AsyncRead + AsyncWrite`
//!
//! # Example
//!
//! ```
//! use rookery_common::protocol::{ConnectRequest, RequestHeader, OpCode};
//!
//! // First frame on a fresh socket: the connect handshake
//! let connect = ConnectRequest::new(0, 10_000, 0, Vec::new());
//! let frame = connect.to_bytes();
//! assert_eq!(&frame[..4], &[0, 0, 0, 0]); // protocol version 0
//!
//! // Every subsequent request starts with (xid, opcode)
//! let header = RequestHeader::new(1, OpCode::Create);
//! assert_eq!(header.to_bytes().len(), 8);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::{ErrorCode, OpCode, Result, RookeryError};
pub use transport::FrameConnection;
