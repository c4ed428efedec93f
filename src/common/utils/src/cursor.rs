use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

/// Attempt to read past the end of a [`ByteCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    pub position: usize,
    pub needed: usize,
    pub available: usize,
}

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "needed {} bytes at position {} but only {} remain",
            self.needed, self.position, self.available
        )
    }
}

/// A bounded little-endian reader over a byte slice.
///
/// Every read checks the remaining length first, so a corrupt length prefix
/// produces an [`OutOfBounds`] instead of an over-read or a panic.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `n` bytes and advance past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], OutOfBounds> {
        if n > self.remaining() {
            return Err(OutOfBounds {
                position: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Check that `count` items of `width` bytes each could still be read.
    ///
    /// Used before allocating for a decoded count, so a hostile count cannot
    /// trigger a huge allocation.
    pub fn ensure(&self, count: usize, width: usize) -> Result<(), OutOfBounds> {
        let needed = count.saturating_mul(width);
        if needed > self.remaining() {
            return Err(OutOfBounds {
                position: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, OutOfBounds> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, OutOfBounds> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, OutOfBounds> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, OutOfBounds> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, OutOfBounds> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64, OutOfBounds> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn read_f64(&mut self) -> Result<f64, OutOfBounds> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    /// Read a `u32` length prefix followed by that many bytes.
    pub fn read_prefixed(&mut self) -> Result<&'a [u8], OutOfBounds> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }
}
