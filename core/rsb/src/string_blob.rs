//! Offset-addressed run of null-terminated strings used by the manifest.

use crate::error::{FormatError, Result};
use shared_utils::{BinReadExt, BinWriteExt};
use std::collections::HashMap;
use std::io::Cursor;

/// Read-only view for random access by absolute blob offset.
pub struct StringBlob<'a> {
    data: &'a [u8],
}

impl<'a> StringBlob<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn get(&self, offset: u32) -> Result<String> {
        let out_of_range = || FormatError::StringOutOfRange {
            offset,
            len: self.data.len(),
        };
        if offset as usize >= self.data.len() {
            return Err(out_of_range().into());
        }
        let mut cursor = Cursor::new(&self.data[offset as usize..]);
        cursor
            .read_null_term_string()
            .map_err(|_| out_of_range().into())
    }
}

/// Builds a blob, sharing one copy of each distinct string.
pub struct StringBlobBuilder {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringBlobBuilder {
    /// Offset 0 always holds the empty string.
    pub fn new() -> Self {
        let mut offsets = HashMap::new();
        offsets.insert(String::new(), 0);
        Self {
            data: vec![0],
            offsets,
        }
    }

    pub fn intern(&mut self, s: &str) -> Result<u32> {
        if let Some(&offset) = self.offsets.get(s) {
            return Ok(offset);
        }
        if s.contains('\0') {
            return Err(FormatError::InvalidString(s.to_string()).into());
        }
        let offset = self.data.len() as u32;
        self.data.write_null_term_string(s)?;
        self.offsets.insert(s.to_string(), offset);
        Ok(offset)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl Default for StringBlobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RsbError;

    #[test]
    fn test_intern_shares_strings() {
        let mut builder = StringBlobBuilder::new();
        assert_eq!(builder.intern("").unwrap(), 0);
        let a = builder.intern("IMAGE_A").unwrap();
        let b = builder.intern("images/a").unwrap();
        assert_eq!(builder.intern("IMAGE_A").unwrap(), a);
        assert_eq!(a, 1);
        assert_eq!(b, 9);

        let bytes = builder.into_bytes();
        let blob = StringBlob::new(&bytes);
        assert_eq!(blob.get(a).unwrap(), "IMAGE_A");
        assert_eq!(blob.get(b).unwrap(), "images/a");
        assert_eq!(blob.get(0).unwrap(), "");
        // Offsets inside a string address its suffix.
        assert_eq!(blob.get(a + 6).unwrap(), "A");
    }

    #[test]
    fn test_out_of_range_offset() {
        let blob = StringBlob::new(b"\0abc\0");
        let err = blob.get(5).unwrap_err();
        assert!(matches!(
            err,
            RsbError::Format(FormatError::StringOutOfRange { offset: 5, len: 5 })
        ));
    }

    #[test]
    fn test_unterminated_string() {
        let blob = StringBlob::new(b"\0abc");
        assert!(blob.get(1).is_err());
    }
}
