//! The per-subgroup packet container (`pgsr`).

pub mod pack;
pub mod process;
pub mod types;
pub mod unpack;

pub use pack::pack;
pub use types::{
    AtlasPlacement, CompressionFlags, Packet, PacketHeader, PacketResource, PartInfo, PartKind,
    ResourceKind, ResourceRecord,
};
pub use unpack::{PacketIndex, read_index, unpack};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{Compressor, ZlibCompressor};
    use crate::error::{FormatError, RsbError};
    use std::io;

    fn sample_packet(flags: u32) -> Packet {
        Packet {
            version: 4,
            compression_flags: flags,
            resource: vec![
                PacketResource::general("properties/resources.rton", b"RTON".repeat(100)),
                PacketResource::general("data/level.json", b"{}".to_vec()),
                PacketResource::atlas(
                    "images/atlas_0.ptx",
                    AtlasPlacement {
                        index: 0,
                        width: 64,
                        height: 64,
                    },
                    vec![0xAB; 5000],
                ),
            ],
        }
    }

    #[test]
    fn test_pack_unpack_all_flag_combinations() {
        let zlib = ZlibCompressor::default();
        for flags in 0..4 {
            let packet = sample_packet(flags);
            let bytes = pack(&packet, &zlib).unwrap();
            assert_eq!(bytes.len() % 4096, 0);

            let decoded = unpack(&bytes, &zlib).unwrap();
            assert_eq!(decoded, packet, "flags {flags}");
            assert_eq!(pack(&decoded, &zlib).unwrap(), bytes);
        }
    }

    #[test]
    fn test_uncompressed_parts_record_zero_compressed_size() {
        let zlib = ZlibCompressor::default();
        let bytes = pack(&sample_packet(0), &zlib).unwrap();
        let index = read_index(&bytes).unwrap();
        assert_eq!(index.header.general.compressed_size, 0);
        assert_eq!(index.header.general.raw_size, 2 * 4096);
        assert_eq!(index.header.texture.compressed_size, 0);
        assert_eq!(index.header.texture.raw_size, 2 * 4096);
        assert_eq!(index.header.general.position, 4096);
        assert_eq!(index.header.texture.position, 3 * 4096);
        assert_eq!(index.header.packet_size() as usize, bytes.len());
    }

    #[test]
    fn test_index_is_in_placement_order() {
        let zlib = ZlibCompressor::default();
        let bytes = pack(&sample_packet(3), &zlib).unwrap();
        let index = read_index(&bytes).unwrap();
        let paths: Vec<&str> = index.records.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            [
                "properties/resources.rton",
                "data/level.json",
                "images/atlas_0.ptx"
            ]
        );
        assert_eq!(index.texture_count().unwrap(), 1);
    }

    #[test]
    fn test_texture_count_rejects_index_overflow() {
        let zlib = ZlibCompressor::default();
        let bytes = pack(&sample_packet(3), &zlib).unwrap();
        let mut index = read_index(&bytes).unwrap();
        for (_, record) in &mut index.records {
            if let Some(atlas) = &mut record.atlas {
                atlas.index = u32::MAX;
            }
        }
        assert!(matches!(
            index.texture_count(),
            Err(RsbError::Format(FormatError::AtlasIndexOverflow { ref path, index: u32::MAX }))
                if path == "images/atlas_0.ptx"
        ));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let zlib = ZlibCompressor::default();
        let mut bytes = pack(&sample_packet(0), &zlib).unwrap();
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            read_index(&bytes),
            Err(RsbError::Format(FormatError::UnsupportedVersion { version: 2, .. }))
        ));

        bytes[..4].copy_from_slice(b"1bsr");
        assert!(matches!(
            read_index(&bytes),
            Err(RsbError::Format(FormatError::InvalidMagic { .. }))
        ));
    }

    #[test]
    fn test_resource_outside_part() {
        let zlib = ZlibCompressor::default();
        let mut bytes = pack(&sample_packet(0), &zlib).unwrap();
        // Shrink the general part so the first resource no longer fits.
        bytes[0x20..0x24].copy_from_slice(&16u32.to_le_bytes());
        assert!(matches!(
            read_index(&bytes),
            Err(RsbError::Format(FormatError::ResourceOutOfBounds {
                part: "general",
                ..
            }))
        ));
    }

    #[test]
    fn test_truncated_packet() {
        let zlib = ZlibCompressor::default();
        let bytes = pack(&sample_packet(0), &zlib).unwrap();
        let err = unpack(&bytes[..4096 + 100], &zlib).unwrap_err();
        assert!(matches!(
            err,
            RsbError::Format(FormatError::SectionOutOfBounds { .. })
        ));
    }

    struct XorCompressor {
        inner: ZlibCompressor,
        key: u8,
    }

    impl Compressor for XorCompressor {
        fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
            let mut out = self.inner.compress(data)?;
            out.iter_mut().for_each(|b| *b ^= self.key);
            Ok(out)
        }

        fn decompress(&self, data: &[u8], raw_size: usize) -> io::Result<Vec<u8>> {
            self.inner.decompress(data, raw_size)
        }

        fn repair<'a>(&self, data: &'a [u8]) -> io::Result<std::borrow::Cow<'a, [u8]>> {
            Ok(data.iter().map(|b| b ^ self.key).collect::<Vec<u8>>().into())
        }
    }

    #[test]
    fn test_repair_hook_runs_before_decompression() {
        let xor = XorCompressor {
            inner: ZlibCompressor::default(),
            key: 0x5A,
        };
        let packet = sample_packet(3);
        let bytes = pack(&packet, &xor).unwrap();
        assert_eq!(unpack(&bytes, &xor).unwrap(), packet);
        assert!(unpack(&bytes, &ZlibCompressor::default()).is_err());
    }
}
