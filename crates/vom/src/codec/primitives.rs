//! Primitive encoding/decoding for the binary value format.
//!
//! Implements the control-byte varint, zigzag signed varints, byte-reversed
//! floats and length-prefixed strings. Decoding works over either an
//! in-memory slice ([`Reader`]) or a buffered stream ([`StreamReader`]),
//! both exposed through the [`Source`] trait.

use std::io::{self, BufRead};

use crate::error::DecodeError;
use crate::limits::MAX_VARINT_BYTES;

// =============================================================================
// DECODING
// =============================================================================

/// Byte source the value decoder reads from.
///
/// Implementors supply single-byte and exact-length reads; every wire
/// primitive is built on top of those two.
pub trait Source {
    /// Reads a single byte.
    fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError>;

    /// Fills `buf` completely.
    fn read_exact_into(&mut self, buf: &mut [u8], context: &'static str) -> Result<(), DecodeError>;

    /// Reads an unsigned varint.
    ///
    /// Values up to 0x7f are a single byte. Anything larger is a control
    /// byte `0x100 - n` followed by `n` big-endian bytes, `n <= 8`.
    fn read_uint(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let first = self.read_byte(context)?;
        if first <= 0x7f {
            return Ok(first as u64);
        }
        let n = 0x100 - first as usize;
        if n > MAX_VARINT_BYTES {
            return Err(DecodeError::InvalidControlByte {
                byte: first,
                context,
            });
        }
        let mut buf = [0u8; MAX_VARINT_BYTES];
        self.read_exact_into(&mut buf[..n], context)?;
        Ok(buf[..n].iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    /// Reads a signed varint (zigzag encoded).
    fn read_int(&mut self, context: &'static str) -> Result<i64, DecodeError> {
        Ok(zigzag_decode(self.read_uint(context)?))
    }

    /// Reads a float: f64 bits, byte-reversed, as an unsigned varint.
    fn read_float(&mut self, context: &'static str) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_uint(context)?.swap_bytes()))
    }

    /// Reads a bool byte (0 or 1).
    fn read_bool(&mut self, context: &'static str) -> Result<bool, DecodeError> {
        match self.read_uint(context)? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::InvalidBool { value }),
        }
    }

    /// Reads an unsigned length, rejecting values above `max`.
    fn read_len(&mut self, max: usize, field: &'static str) -> Result<usize, DecodeError> {
        let len = self.read_uint(field)?;
        if len > max as u64 {
            return Err(DecodeError::LengthExceedsLimit { field, len, max });
        }
        Ok(len as usize)
    }

    /// Reads exactly `n` bytes into a fresh vector.
    fn read_vec(&mut self, n: usize, context: &'static str) -> Result<Vec<u8>, DecodeError> {
        let mut buf = vec![0u8; n];
        self.read_exact_into(&mut buf, context)?;
        Ok(buf)
    }

    /// Reads a length-prefixed byte string.
    fn read_bytes_prefixed(&mut self, max_len: usize, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_len(max_len, field)?;
        self.read_vec(len, field)
    }

    /// Reads a length-prefixed UTF-8 string.
    fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError> {
        let bytes = self.read_bytes_prefixed(max_len, field)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { field })
    }
}

/// Reader over an in-memory byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the current position in the data.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the remaining bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns the number of remaining bytes.
    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads exactly n bytes without copying.
    #[inline]
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining_len() {
            return Err(DecodeError::UnexpectedEof { context });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }
}

impl Source for Reader<'_> {
    #[inline]
    fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(DecodeError::UnexpectedEof { context })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_exact_into(&mut self, buf: &mut [u8], context: &'static str) -> Result<(), DecodeError> {
        buf.copy_from_slice(self.read_bytes(buf.len(), context)?);
        Ok(())
    }

    fn read_vec(&mut self, n: usize, context: &'static str) -> Result<Vec<u8>, DecodeError> {
        Ok(self.read_bytes(n, context)?.to_vec())
    }
}

/// Reader over a buffered byte stream.
#[derive(Debug)]
pub struct StreamReader<R> {
    inner: R,
    consumed: u64,
}

impl<R: BufRead> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, consumed: 0 }
    }

    /// Total number of bytes consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Returns true if the underlying stream has no more bytes.
    pub fn at_end(&mut self) -> Result<bool, DecodeError> {
        Ok(self.inner.fill_buf().map_err(io_error)?.is_empty())
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> Source for StreamReader<R> {
    fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let mut byte = [0u8; 1];
        self.read_exact_into(&mut byte, context)?;
        Ok(byte[0])
    }

    fn read_exact_into(&mut self, buf: &mut [u8], context: &'static str) -> Result<(), DecodeError> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => DecodeError::UnexpectedEof { context },
            _ => io_error(e),
        })?;
        self.consumed += buf.len() as u64;
        Ok(())
    }
}

fn io_error(e: io::Error) -> DecodeError {
    DecodeError::Io(e.to_string())
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writer for encoding binary data.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a reference to the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards everything written so far, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes an unsigned varint in minimal form.
    #[inline]
    pub fn write_uint(&mut self, value: u64) {
        if value <= 0x7f {
            self.buf.push(value as u8);
            return;
        }
        let bytes = value.to_be_bytes();
        let skip = (value.leading_zeros() / 8) as usize;
        let n = bytes.len() - skip;
        self.buf.push((0x100 - n) as u8);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    /// Writes a signed varint (zigzag encoded).
    pub fn write_int(&mut self, value: i64) {
        self.write_uint(zigzag_encode(value));
    }

    /// Writes a float as its byte-reversed f64 bits.
    pub fn write_float(&mut self, value: f64) {
        self.write_uint(value.to_bits().swap_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) {
        self.write_bytes_prefixed(s.as_bytes());
    }

    /// Writes a length-prefixed byte array.
    pub fn write_bytes_prefixed(&mut self, bytes: &[u8]) {
        self.write_uint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }
}

// =============================================================================
// ZIGZAG ENCODING
// =============================================================================

/// Encodes a signed integer using zigzag encoding.
///
/// Maps negative numbers to odd positive numbers:
/// 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, 2 -> 4, ...
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Decodes a zigzag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}
