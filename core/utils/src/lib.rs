use std::io::{self, Read, Write};

/// Extension trait for the string shapes used by PopCap containers
pub trait BinReadExt: Read {
    /// Read a null-terminated string (reads until 0x00)
    fn read_null_term_string(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        loop {
            let mut buf = [0u8; 1];
            self.read_exact(&mut buf)?;
            if buf[0] == 0 {
                break;
            }
            bytes.push(buf[0]);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a fixed-length slot and keep everything before the first null
    fn read_fixed_string(&mut self, len: usize) -> io::Result<String> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

/// Extension trait for writing binary data
pub trait BinWriteExt: Write {
    /// Write a string followed by a null terminator
    fn write_null_term_string(&mut self, s: &str) -> io::Result<()> {
        self.write_all(s.as_bytes())?;
        self.write_all(&[0u8])?;
        Ok(())
    }

    /// Write a string into a null-padded slot of `len` bytes.
    ///
    /// The slot always keeps at least one trailing null, so strings of
    /// `len` bytes or more are rejected instead of truncated.
    fn write_fixed_string(&mut self, s: &str, len: usize) -> io::Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() >= len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{s:?} does not fit a {len}-byte slot"),
            ));
        }
        self.write_all(bytes)?;
        self.write_zeros(len - bytes.len())
    }

    fn write_zeros(&mut self, count: usize) -> io::Result<()> {
        self.write_all(&vec![0u8; count])
    }
}

// Implement for all types that implement Read/Write
impl<R: Read + ?Sized> BinReadExt for R {}
impl<W: Write + ?Sized> BinWriteExt for W {}

/// Bytes needed to move `pos` up to the next multiple of `alignment`
pub fn padding_for(pos: u64, alignment: u64) -> u64 {
    let remainder = pos % alignment;
    if remainder == 0 { 0 } else { alignment - remainder }
}

pub fn align_up(pos: u64, alignment: u64) -> u64 {
    pos + padding_for(pos, alignment)
}

/// Pad a buffer with zeros up to the next multiple of `alignment`
pub fn pad_vec(buf: &mut Vec<u8>, alignment: usize) {
    let padding = padding_for(buf.len() as u64, alignment as u64) as usize;
    buf.resize(buf.len() + padding, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_fixed_string_roundtrip() {
        let mut buf = Vec::new();
        buf.write_fixed_string("PLANTS_1536", 16).unwrap();
        assert_eq!(buf.len(), 16);

        let mut cursor = Cursor::new(buf);
        assert_eq!(cursor.read_fixed_string(16).unwrap(), "PLANTS_1536");
    }

    #[test]
    fn test_fixed_string_rejects_full_slot() {
        let mut buf = Vec::new();
        let err = buf.write_fixed_string("ABCD", 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_fixed_string_ignores_bytes_after_null() {
        let mut cursor = Cursor::new(b"ID\0junk".to_vec());
        assert_eq!(cursor.read_fixed_string(7).unwrap(), "ID");
    }

    #[test]
    fn test_null_term_string() {
        let mut buf = Vec::new();
        buf.write_null_term_string("first").unwrap();
        buf.write_null_term_string("").unwrap();
        assert_eq!(buf, b"first\0\0");

        let mut cursor = Cursor::new(buf);
        assert_eq!(cursor.read_null_term_string().unwrap(), "first");
        assert_eq!(cursor.read_null_term_string().unwrap(), "");
        assert!(cursor.read_null_term_string().is_err());
    }

    #[test]
    fn test_padding() {
        assert_eq!(padding_for(0, 4096), 0);
        assert_eq!(padding_for(1, 4096), 4095);
        assert_eq!(align_up(4097, 4096), 8192);

        let mut buf = vec![1u8; 5];
        pad_vec(&mut buf, 4);
        assert_eq!(buf, vec![1, 1, 1, 1, 1, 0, 0, 0]);
    }
}
