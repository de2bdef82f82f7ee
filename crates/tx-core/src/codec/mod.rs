//! Binary Reader/Writer
//!
//! Little-endian integer and Bitcoin VarInt codec shared by every wire
//! format in this crate (transactions, BUMPs, BEEF containers).

use thiserror::Error;

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The buffer ended before the announced field did.
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    /// A VarInt prefix announced a width the payload does not supply.
    #[error("malformed varint: prefix 0x{prefix:02x} with {remaining} bytes remaining")]
    MalformedVarInt { prefix: u8, remaining: usize },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Append-only byte buffer for wire serialization.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16_le(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write bytes in reversed order.
    ///
    /// TXIDs travel the wire little-endian while the engine keeps them in
    /// display order, so outpoints and BEEF subject fields go through here.
    pub fn write_reverse(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().rev());
    }

    /// Bitcoin VarInt encoding:
    /// - < 0xFD: 1 byte
    /// - <= 0xFFFF: 0xFD + 2 bytes (little-endian)
    /// - <= 0xFFFFFFFF: 0xFE + 4 bytes (little-endian)
    /// - > 0xFFFFFFFF: 0xFF + 8 bytes (little-endian)
    pub fn write_var_int(&mut self, n: u64) {
        if n < 0xFD {
            self.buf.push(n as u8);
        } else if n <= 0xFFFF {
            self.buf.push(0xFD);
            self.buf.extend_from_slice(&(n as u16).to_le_bytes());
        } else if n <= 0xFFFF_FFFF {
            self.buf.push(0xFE);
            self.buf.extend_from_slice(&(n as u32).to_le_bytes());
        } else {
            self.buf.push(0xFF);
            self.buf.extend_from_slice(&n.to_le_bytes());
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Byte length a value occupies when VarInt encoded.
pub fn var_int_size(n: u64) -> usize {
    if n < 0xFD {
        1
    } else if n <= 0xFFFF {
        3
    } else if n <= 0xFFFF_FFFF {
        5
    } else {
        9
    }
}

/// Cursor over a byte slice with length-checked reads.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current cursor offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    fn check(&self, needed: usize) -> CodecResult<()> {
        if self.remaining() < needed {
            return Err(CodecError::TruncatedInput {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        self.check(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16_le(&mut self) -> CodecResult<u16> {
        self.check(2)?;
        let v = u16::from_le_bytes(self.data[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32_le(&mut self) -> CodecResult<u32> {
        self.check(4)?;
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64_le(&mut self) -> CodecResult<u64> {
        self.check(8)?;
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    pub fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        self.check(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read `n` bytes and reverse them (wire little-endian to display order).
    pub fn read_reverse(&mut self, n: usize) -> CodecResult<Vec<u8>> {
        let slice = self.read_bytes(n)?;
        Ok(slice.iter().rev().copied().collect())
    }

    pub fn read_var_int(&mut self) -> CodecResult<u64> {
        let prefix = self.read_u8()?;
        let wide = |r: &Self, width: usize| CodecError::MalformedVarInt {
            prefix,
            remaining: r.remaining().min(width),
        };
        match prefix {
            0xFD => {
                if self.remaining() < 2 {
                    return Err(wide(self, 2));
                }
                Ok(self.read_u16_le()? as u64)
            }
            0xFE => {
                if self.remaining() < 4 {
                    return Err(wide(self, 4));
                }
                Ok(self.read_u32_le()? as u64)
            }
            0xFF => {
                if self.remaining() < 8 {
                    return Err(wide(self, 8));
                }
                Ok(self.read_u64_le()?)
            }
            n => Ok(n as u64),
        }
    }
}
