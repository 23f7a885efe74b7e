//! Wire encoding primitives.
//!
//! Every record on the wire is a fixed-layout sequence of big-endian
//! integers, length-prefixed strings, and length-prefixed byte buffers.
//! [`WireWriter`] appends values to a growable buffer; [`WireReader`] walks
//! a received frame and fails with [`RookeryError::Protocol`] on truncation
//! or impossible lengths.

use super::error::{Result, RookeryError};

/// Appends big-endian primitives to an owned buffer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> WireWriter {
        WireWriter { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> WireWriter {
        WireWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    /// Writes an `i32` length prefix followed by the raw bytes.
    pub fn write_buffer(&mut self, data: &[u8]) {
        self.write_i32(data.len() as i32);
        self.buf.extend_from_slice(data);
    }

    /// Writes a UTF-8 string with an `i32` length prefix.
    pub fn write_string(&mut self, value: &str) {
        self.write_buffer(value.as_bytes());
    }

    /// Appends already-encoded bytes without a length prefix.
    ///
    /// Used to splice a pre-encoded record body after an envelope header.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Walks a received frame, decoding big-endian primitives.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> WireReader<'a> {
        WireReader { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(RookeryError::Protocol(format!(
                "truncated frame: needed {} bytes, {} remaining",
                n,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        Ok(i64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let bytes = self.take(1)?;
        Ok(bytes[0] != 0)
    }

    /// Reads an `i32`-length-prefixed buffer.
    ///
    /// A length of `-1` encodes an absent buffer and decodes to empty; any
    /// other negative length is a protocol error.
    pub fn read_buffer(&mut self) -> Result<Vec<u8>> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(Vec::new());
        }
        if len < 0 {
            return Err(RookeryError::Protocol(format!(
                "impossible buffer length {len}"
            )));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    /// Reads an `i32`-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_buffer()?;
        String::from_utf8(bytes)
            .map_err(|e| RookeryError::Protocol(format!("invalid UTF-8 in string: {e}")))
    }

    /// Consumes and returns everything not yet read.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    /// Reads an `i32` element count for a vector field.
    ///
    /// `-1` encodes an absent vector and decodes to zero elements.
    pub fn read_vector_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(0);
        }
        if len < 0 {
            return Err(RookeryError::Protocol(format!(
                "impossible vector length {len}"
            )));
        }
        Ok(len as usize)
    }
}
