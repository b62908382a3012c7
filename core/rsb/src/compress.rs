use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{self, Read, Write};

/// General-purpose compressor used for packet parts.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    fn decompress(&self, data: &[u8], raw_size: usize) -> io::Result<Vec<u8>>;

    /// Undo payload obfuscation before decompression. Plain payloads pass through.
    fn repair<'a>(&self, data: &'a [u8]) -> io::Result<std::borrow::Cow<'a, [u8]>> {
        Ok(std::borrow::Cow::Borrowed(data))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZlibCompressor {
    level: Compression,
}

impl ZlibCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for ZlibCompressor {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8], raw_size: usize) -> io::Result<Vec<u8>> {
        // `raw_size` is untrusted; never read more than one byte past it.
        let mut out = Vec::with_capacity(raw_size.min(data.len().saturating_mul(16)));
        ZlibDecoder::new(data)
            .take(raw_size as u64 + 1)
            .read_to_end(&mut out)?;
        Ok(out)
    }
}
