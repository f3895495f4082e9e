#![forbid(unsafe_code)]
//! Varint, ZigZag and cursor utilities shared by the column codecs and the archive.

pub mod var {
    //! Unsigned varints and ZigZag signed integers.

    use crate::types::{Result, RoadGraphError};

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            } else {
                out.push(byte | 0x80);
            }
        }
    }

    /// Decodes a u64 varint from a slice, updating the offset.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..10 {
            let byte = *src
                .get(*off)
                .ok_or(RoadGraphError::Corruption("varint decode truncated"))?;
            *off += 1;
            let payload = (byte & 0x7f) as u64;
            if i == 9 && payload > 1 {
                return Err(RoadGraphError::Corruption("varint overflow"));
            }
            result |= payload << shift;
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(RoadGraphError::Corruption("varint too long"))
    }

    /// Encodes an i64 as a ZigZag-encoded varint.
    pub fn encode_i64(v: i64, out: &mut Vec<u8>) {
        let zigzag = ((v << 1) ^ (v >> 63)) as u64;
        encode_u64(zigzag, out);
    }

    /// Decodes a ZigZag-encoded i64 varint from a slice, updating the offset.
    pub fn decode_i64(src: &[u8], off: &mut usize) -> Result<i64> {
        let zigzag = decode_u64(src, off)?;
        Ok(((zigzag >> 1) as i64) ^ (-((zigzag & 1) as i64)))
    }

    /// Decodes a varint length and checks it against a sanity ceiling.
    pub fn decode_len(src: &[u8], off: &mut usize) -> Result<usize> {
        let len = decode_u64(src, off)?;
        if len > src.len() as u64 * 8 + 64 {
            return Err(RoadGraphError::Corruption("implausible length prefix"));
        }
        Ok(len as usize)
    }
}

pub mod buf {
    //! A slice-backed cursor for parsing archive records.

    use core::fmt;

    use crate::types::{Result, RoadGraphError};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        /// The underlying byte slice.
        pub buf: &'a [u8],
        /// Current read offset.
        pub off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes from the cursor, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .ok_or(RoadGraphError::Corruption("cursor offset overflow"))?;
            if end > self.buf.len() {
                return Err(RoadGraphError::Corruption("cursor take beyond buffer"));
            }
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Reads one byte.
        pub fn u8(&mut self) -> Result<u8> {
            Ok(self.take(1)?[0])
        }

        /// Reads a little-endian u16.
        pub fn u16_le(&mut self) -> Result<u16> {
            let bytes = self.take(2)?;
            Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
        }

        /// Reads a little-endian u32.
        pub fn u32_le(&mut self) -> Result<u32> {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(self.take(4)?);
            Ok(u32::from_le_bytes(raw))
        }

        /// Reads a little-endian u64.
        pub fn u64_le(&mut self) -> Result<u64> {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(self.take(8)?);
            Ok(u64::from_le_bytes(raw))
        }

        /// Reads an unsigned varint.
        pub fn var_u64(&mut self) -> Result<u64> {
            super::var::decode_u64(self.buf, &mut self.off)
        }

        /// Reads a ZigZag varint.
        pub fn var_i64(&mut self) -> Result<i64> {
            super::var::decode_i64(self.buf, &mut self.off)
        }

        /// Reads a varint-prefixed UTF-8 string.
        pub fn str(&mut self) -> Result<&'a str> {
            let len = super::var::decode_len(self.buf, &mut self.off)?;
            let bytes = self.take(len)?;
            core::str::from_utf8(bytes).map_err(|_| RoadGraphError::Corruption("string not UTF-8"))
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }

    /// Appends a varint-prefixed UTF-8 string.
    pub fn put_str(out: &mut Vec<u8>, s: &str) {
        super::var::encode_u64(s.len() as u64, out);
        out.extend_from_slice(s.as_bytes());
    }
}
