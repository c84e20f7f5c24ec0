//! Low-level byte primitives shared by every decoder in the crate: a
//! forward-only cursor over an in-memory buffer, unsigned LEB128 varints,
//! and length-prefixed fields.
//!
//! The cursor never seeks backward; every decode advances it and the
//! position is the single source of truth for byte accounting.

use std::io::{self, Write};
use std::str;

use thiserror::Error;

/// A varint terminates within this many bytes or the input is rejected.
pub const MAX_VARINT_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    TruncatedInput,
    #[error("varint did not terminate within {MAX_VARINT_LEN} bytes")]
    VarintOverflow,
    #[error("zero-length frame")]
    MalformedFrame,
    #[error("unsupported CID version {0}")]
    UnsupportedCidVersion(u64),
    #[error("multihash digest length {0} exceeds remaining input")]
    UnsupportedMultihash(u64),
    #[error("length-prefixed string is not valid UTF-8")]
    InvalidString(#[from] str::Utf8Error),
}

// ── Cursor ───────────────────────────────────────────────────────────────────

/// Forward-only reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current byte position, monotonically increasing.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }

    /// Peeks at up to `n` bytes without consuming them. May return fewer
    /// near the end of input.
    pub fn up_to(&self, n: usize) -> &'a [u8] {
        &self.bytes[self.pos..self.bytes.len().min(self.pos + n)]
    }

    /// Consumes exactly `n` bytes.
    pub fn exactly(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::TruncatedInput);
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Advances past `n` bytes without looking at them.
    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.exactly(n).map(|_| ())
    }
}

// ── Varints ──────────────────────────────────────────────────────────────────

/// Decodes an unsigned LEB128 varint, consuming 1..=8 bytes.
pub fn read_varint(cur: &mut ByteCursor<'_>) -> Result<u64, DecodeError> {
    try_read_varint(cur)?.ok_or(DecodeError::TruncatedInput)
}

/// Like [`read_varint`] but returns `None` when the cursor is already
/// exhausted. Running out of input mid-varint is still an error.
pub fn try_read_varint(cur: &mut ByteCursor<'_>) -> Result<Option<u64>, DecodeError> {
    if cur.is_empty() {
        return Ok(None);
    }
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let byte = cur.exactly(1)?[0];
        value |= u64::from(byte & 0x7f) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok(Some(value));
        }
    }
    Err(DecodeError::VarintOverflow)
}

pub fn write_varint<W: Write>(w: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        w.write_all(&[byte])?;
        if value == 0 {
            return Ok(());
        }
    }
}

/// Encoded size of `value` as a varint.
pub fn varint_len(value: u64) -> usize {
    let bits = (64 - value.leading_zeros()) as usize;
    bits.div_ceil(7).max(1)
}

/// Infallible variant for in-memory encoding.
pub fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return;
        }
    }
}

// ── Length-prefixed fields ───────────────────────────────────────────────────

/// Reads a varint length followed by exactly that many bytes.
pub fn read_length_prefixed<'a>(cur: &mut ByteCursor<'a>) -> Result<&'a [u8], DecodeError> {
    let len = read_varint(cur)?;
    cur.exactly(len as usize)
}

/// Reads a length-prefixed field and validates it as UTF-8.
pub fn read_length_prefixed_str<'a>(cur: &mut ByteCursor<'a>) -> Result<&'a str, DecodeError> {
    Ok(str::from_utf8(read_length_prefixed(cur)?)?)
}

pub fn write_length_prefixed<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_varint(w, bytes.len() as u64)?;
    w.write_all(bytes)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn decode(bytes: &[u8]) -> Result<u64, DecodeError> {
        read_varint(&mut ByteCursor::new(bytes))
    }

    #[test]
    fn varint_single_byte() {
        assert_eq!(decode(&[0x00]).unwrap(), 0);
        assert_eq!(decode(&[0x7f]).unwrap(), 127);
    }

    #[test]
    fn varint_multi_byte() {
        assert_eq!(decode(&[0x80, 0x01]).unwrap(), 128);
        assert_eq!(decode(&[0xb9, 0x60]).unwrap(), 12345);
    }

    #[test]
    fn varint_truncated() {
        assert!(matches!(decode(&[0x80]), Err(DecodeError::TruncatedInput)));
        assert!(matches!(decode(&[]), Err(DecodeError::TruncatedInput)));
    }

    #[test]
    fn varint_overflow_past_eight_bytes() {
        let bytes = [0xff; 9];
        assert!(matches!(decode(&bytes), Err(DecodeError::VarintOverflow)));
    }

    #[test]
    fn try_read_distinguishes_clean_end() {
        let mut cur = ByteCursor::new(&[]);
        assert!(try_read_varint(&mut cur).unwrap().is_none());
    }

    #[test]
    fn length_prefixed_roundtrip() {
        let mut buf = Vec::new();
        write_length_prefixed(&mut buf, b"first.txt").unwrap();
        let mut cur = ByteCursor::new(&buf);
        assert_eq!(read_length_prefixed_str(&mut cur).unwrap(), "first.txt");
        assert!(cur.is_empty());
    }

    proptest! {
        #[test]
        fn varint_roundtrip(value in 0u64..(1 << 56)) {
            let mut buf = Vec::new();
            write_varint(&mut buf, value).unwrap();
            prop_assert!(buf.len() <= MAX_VARINT_LEN);
            prop_assert_eq!(buf.len(), varint_len(value));
            let mut cur = ByteCursor::new(&buf);
            prop_assert_eq!(read_varint(&mut cur).unwrap(), value);
            prop_assert!(cur.is_empty());
        }
    }
}
