//! Little-endian primitive reader over a byte slice.
//!
//! Every binary-format decoder in this crate reads through a `ByteCursor`
//! instead of indexing byte slices directly. All reads are bounds-checked;
//! a read that would run past the end of the buffer fails with
//! `ErrorKind::Truncated` rather than panicking, since the formats here are
//! untrusted, user-supplied game data.

use crate::error::{Error, ErrorKind, Result};

#[derive(Copy, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> ByteCursor<'a> {
        ByteCursor { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> ByteCursor<'a> {
        ByteCursor { buf, pos }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn take(&mut self, n: usize, component: &str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            Error::from(ErrorKind::Truncated(component.to_string(), self.pos))
        })?;
        if end > self.buf.len() {
            return Err(ErrorKind::Truncated(component.to_string(), self.pos).into());
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n, "bytes")
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        let b = self.take(2, "u16")?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        let b = self.take(4, "u32")?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32_le(&mut self) -> Result<i32> {
        Ok(self.u32_le()? as i32)
    }

    pub fn f32_le(&mut self) -> Result<f32> {
        let b = self.take(4, "f32")?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f64_le(&mut self) -> Result<f64> {
        let b = self.take(8, "f64")?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(f64::from_le_bytes(arr))
    }

    pub fn fourcc(&mut self) -> Result<[u8; 4]> {
        let b = self.take(4, "fourcc")?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// Reads bytes up to (and consuming) the next zero byte, optionally
    /// unmasking each byte first with `unmask`.
    pub fn cstr(&mut self, unmask: Option<fn(u8) -> u8>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let b = self.u8()?;
            let b = match unmask {
                Some(f) => f(b),
                None => b,
            };
            if b == 0 {
                break;
            }
            out.push(b);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_primitives() {
        let buf = [0x01, 0x00, 0x02, 0x00, 0x00, 0x00];
        let mut cur = ByteCursor::new(&buf);
        assert_eq!(cur.u16_le().unwrap(), 1);
        assert_eq!(cur.u32_le().unwrap(), 2);
    }

    #[test]
    fn truncated_read_fails() {
        let buf = [0x01];
        let mut cur = ByteCursor::new(&buf);
        assert!(cur.u32_le().is_err());
    }

    #[test]
    fn cstr_reads_until_nul_and_consumes_it() {
        let buf = b"hello\0world";
        let mut cur = ByteCursor::new(buf);
        let s = cur.cstr(None).unwrap();
        assert_eq!(s, b"hello");
        assert_eq!(cur.offset(), 6);
    }

    #[test]
    fn cstr_applies_unmask() {
        // 'h' + 0x60 = 0x68 + 0x60 = 0xc8, wraps mod 256.
        let masked: Vec<u8> = b"hello".iter().map(|&b| b.wrapping_add(0x60)).collect();
        let mut buf = masked;
        buf.push(0);
        let mut cur = ByteCursor::new(&buf);
        let s = cur.cstr(Some(|b| b.wrapping_sub(0x60))).unwrap();
        assert_eq!(s, b"hello");
    }
}
