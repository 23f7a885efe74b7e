//! Length-prefixed frame I/O.
//!
//! This module is generic over the transport type - it works with any type
//! that implements `AsyncRead + AsyncWrite + Unpin`, including:
//! - `TcpStream` (TCP sockets)
//! - `tokio::io::DuplexStream` (in-process pipes, used by tests)
//!
//! Reads go through an internal buffer, so `read_frame` is safe to use
//! inside `select!`: a cancelled read never discards partially received
//! bytes.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::records::{ConnectRequest, ConnectResponse};
use crate::protocol::{Result, RookeryError};

/// Upper bound on a single frame unless the caller configures otherwise.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// A length-prefix framed connection.
///
/// Wire format: `[4-byte length as i32 big-endian] + [payload]`. Frames with
/// a negative length, or longer than the configured maximum, are rejected
/// with a protocol error before any allocation happens.
pub struct FrameConnection<S> {
    stream: S,
    max_frame_bytes: usize,
    recv_buf: Vec<u8>,
    unread_start: usize,
}

impl<S> FrameConnection<S> {
    /// Wraps a byte stream with the default frame-size limit.
    pub fn new(stream: S) -> Self {
        Self::with_max_frame(stream, DEFAULT_MAX_FRAME_BYTES)
    }

    /// Wraps a byte stream with an explicit frame-size limit.
    pub fn with_max_frame(stream: S, max_frame_bytes: usize) -> Self {
        FrameConnection {
            stream,
            max_frame_bytes,
            recv_buf: Vec::new(),
            unread_start: 0,
        }
    }

    /// Consumes the wrapper and returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Takes one complete frame out of the receive buffer, if present.
    fn try_take_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let available = self.recv_buf.len() - self.unread_start;
        if available < 4 {
            self.compact();
            return Ok(None);
        }

        let start = self.unread_start;
        let len = i32::from_be_bytes([
            self.recv_buf[start],
            self.recv_buf[start + 1],
            self.recv_buf[start + 2],
            self.recv_buf[start + 3],
        ]);
        if len < 0 {
            return Err(RookeryError::Protocol(format!(
                "impossible frame length {len}"
            )));
        }
        let len = len as usize;
        if len > self.max_frame_bytes {
            return Err(RookeryError::Protocol(format!(
                "frame of {len} bytes exceeds maximum {}",
                self.max_frame_bytes
            )));
        }

        if available < 4 + len {
            return Ok(None);
        }

        let frame = self.recv_buf[start + 4..start + 4 + len].to_vec();
        self.unread_start = start + 4 + len;
        self.compact();
        Ok(Some(frame))
    }

    fn compact(&mut self) {
        if self.unread_start == self.recv_buf.len() {
            self.recv_buf.clear();
            self.unread_start = 0;
        } else if self.unread_start >= 64 * 1024 {
            self.recv_buf.drain(..self.unread_start);
            self.unread_start = 0;
        }
    }
}

impl<S> FrameConnection<S>
where
    S: AsyncRead + Unpin,
{
    /// Reads the next frame, blocking until one is complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer closes the stream (including mid-frame),
    /// the length prefix is negative, or the frame exceeds the configured
    /// maximum.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(frame) = self.try_take_frame()? {
                return Ok(frame);
            }

            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                let trailing = self.recv_buf.len() - self.unread_start;
                if trailing != 0 {
                    return Err(RookeryError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("eof with {trailing} trailing bytes inside a frame"),
                    )));
                }
                return Err(RookeryError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )));
            }
            self.recv_buf.extend_from_slice(&tmp[..n]);
        }
    }
}

impl<S> FrameConnection<S>
where
    S: AsyncWrite + Unpin,
{
    /// Writes one frame: length prefix, payload, flush.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_frame_bytes {
            return Err(RookeryError::Protocol(format!(
                "refusing to send frame of {} bytes (max {})",
                payload.len(),
                self.max_frame_bytes
            )));
        }
        let len = payload.len() as u32;
        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

impl<S> FrameConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs the connect handshake: writes the connect request, reads and
    /// decodes the server's response.
    ///
    /// This is the first exchange on every fresh socket; interpretation of
    /// the response (session refusal, negotiated timeout) is the session
    /// engine's job.
    pub async fn connect_handshake(&mut self, request: &ConnectRequest) -> Result<ConnectResponse> {
        self.write_frame(&request.to_bytes()).await?;
        let frame = self.read_frame().await?;
        ConnectResponse::from_bytes(&frame)
    }
}
