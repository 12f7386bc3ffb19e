//! Bounds-checked cursor over a borrowed byte buffer.
//!
//! Shared by the CBOR decoder, the DER parser and the authenticator data
//! parser. Every read either returns the requested bytes or a
//! [`DecodeError::UnexpectedEnd`]; the cursor never reads past the end of
//! the buffer and never panics.

use crate::error::DecodeError;

/// Cursor carrying `(buffer, position)`.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.overrun(1))
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = self.peek_u8()?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_array::<2>()?;
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_array::<4>()?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(self.overrun(len));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Borrow everything that is left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    /// Bytes consumed between `start` and the current position.
    ///
    /// `start` is clamped to the current position.
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.buf[start.min(self.pos)..self.pos]
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.read_bytes(len).map(|_| ())
    }

    fn overrun(&self, needed: usize) -> DecodeError {
        DecodeError::UnexpectedEnd {
            offset: self.pos,
            needed,
            available: self.remaining(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian_integers() {
        let data = [0x01, 0x02, 0x00, 0x00, 0x01, 0x00, 0xff];
        let mut reader = Reader::new(&data);

        assert_eq!(reader.read_u16_be().unwrap(), 0x0102);
        assert_eq!(reader.read_u32_be().unwrap(), 0x0000_0100);
        assert_eq!(reader.read_u8().unwrap(), 0xff);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_overrun_reports_offset_and_leaves_cursor() {
        let data = [0xaa, 0xbb, 0xcc];
        let mut reader = Reader::new(&data);
        reader.read_u8().unwrap();

        let err = reader.read_u32_be().unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedEnd {
                offset: 1,
                needed: 4,
                available: 2
            }
        );
        assert_eq!(reader.position(), 1, "failed read must not advance");
    }

    #[test]
    fn test_read_bytes_borrows_input() {
        let data = b"hello world";
        let mut reader = Reader::new(data);

        assert_eq!(reader.read_bytes(5).unwrap(), b"hello");
        reader.skip(1).unwrap();
        assert_eq!(reader.read_rest(), b"world");
        assert_eq!(reader.remaining(), 0);
        assert!(reader.peek_u8().is_err());
    }

    #[test]
    fn test_huge_length_is_rejected() {
        let data = [0u8; 4];
        let mut reader = Reader::new(&data);
        assert!(reader.read_bytes(usize::MAX).is_err());
    }
}
