use crate::error::{FormatError, Result};
use crate::path_table::PathTableValue;
use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const PACKET_MAGIC: &[u8; 4] = b"pgsr";
pub const PACKET_VERSIONS: [u32; 2] = [3, 4];
pub const PACKET_HEADER_SIZE: u32 = 0x5C;
/// Header bytes `0x10..0x48`, copied into the owning subgroup record.
pub const MIRROR_RANGE: std::ops::Range<usize> = 0x10..0x48;
pub const MIRROR_SIZE: usize = 0x38;
pub const PART_ALIGNMENT: usize = 4096;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompressionFlags: u32 {
        const TEXTURE = 0b01;
        const GENERAL = 0b10;
    }
}

impl CompressionFlags {
    pub fn parse(bits: u32) -> Result<Self> {
        Self::from_bits(bits).ok_or_else(|| FormatError::UnknownCompressionFlags(bits).into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    General,
    Texture,
}

impl PartKind {
    pub fn name(self) -> &'static str {
        match self {
            PartKind::General => "general",
            PartKind::Texture => "texture",
        }
    }

    pub fn flag(self) -> CompressionFlags {
        match self {
            PartKind::General => CompressionFlags::GENERAL,
            PartKind::Texture => CompressionFlags::TEXTURE,
        }
    }
}

/// `(position, compressed size, raw size)` of one data part.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PartInfo {
    pub position: u32,
    pub compressed_size: u32,
    pub raw_size: u32,
}

impl PartInfo {
    /// Compressed when the flag asks for it and a compressed length was recorded.
    pub fn is_compressed(&self, flags: CompressionFlags, kind: PartKind) -> bool {
        flags.contains(kind.flag()) && self.compressed_size != 0
    }

    pub fn stored_size(&self, flags: CompressionFlags, kind: PartKind) -> u32 {
        if self.is_compressed(flags, kind) {
            self.compressed_size
        } else {
            self.raw_size
        }
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(PartInfo {
            position: reader.read_u32::<LE>()?,
            compressed_size: reader.read_u32::<LE>()?,
            raw_size: reader.read_u32::<LE>()?,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LE>(self.position)?;
        writer.write_u32::<LE>(self.compressed_size)?;
        writer.write_u32::<LE>(self.raw_size)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: u32,
    pub flags: CompressionFlags,
    pub general: PartInfo,
    pub texture: PartInfo,
    pub resource_list_size: u32,
    pub resource_list_offset: u32,
}

impl PacketHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != PACKET_MAGIC {
            return Err(FormatError::InvalidMagic {
                section: "packet",
                expected: String::from_utf8_lossy(PACKET_MAGIC).to_string(),
                actual: String::from_utf8_lossy(&magic).to_string(),
            }
            .into());
        }

        let version = reader.read_u32::<LE>()?;
        if !PACKET_VERSIONS.contains(&version) {
            return Err(FormatError::UnsupportedVersion {
                section: "packet",
                version,
            }
            .into());
        }
        reader.read_u64::<LE>()?; // reserved

        let flags = CompressionFlags::parse(reader.read_u32::<LE>()?)?;
        let data_offset = reader.read_u32::<LE>()?;
        let general = PartInfo::read(reader)?;
        reader.read_u32::<LE>()?;
        let texture = PartInfo::read(reader)?;
        let mut reserved = [0u8; 20];
        reader.read_exact(&mut reserved)?;
        let resource_list_size = reader.read_u32::<LE>()?;
        let resource_list_offset = reader.read_u32::<LE>()?;
        let mut reserved = [0u8; 12];
        reader.read_exact(&mut reserved)?;

        if data_offset != general.position {
            return Err(FormatError::UnexpectedValue {
                section: "packet",
                field: "data offset",
                expected: general.position,
                actual: data_offset,
            }
            .into());
        }

        Ok(PacketHeader {
            version,
            flags,
            general,
            texture,
            resource_list_size,
            resource_list_offset,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(PACKET_MAGIC)?;
        writer.write_u32::<LE>(self.version)?;
        writer.write_u64::<LE>(0)?;
        writer.write_u32::<LE>(self.flags.bits())?;
        writer.write_u32::<LE>(self.general.position)?;
        self.general.write(writer)?;
        writer.write_u32::<LE>(0)?;
        self.texture.write(writer)?;
        writer.write_all(&[0u8; 20])?;
        writer.write_u32::<LE>(self.resource_list_size)?;
        writer.write_u32::<LE>(self.resource_list_offset)?;
        writer.write_all(&[0u8; 12])?;
        Ok(())
    }

    pub fn part(&self, kind: PartKind) -> &PartInfo {
        match kind {
            PartKind::General => &self.general,
            PartKind::Texture => &self.texture,
        }
    }

    /// Total packet length: the texture part is always laid out last.
    pub fn packet_size(&self) -> u32 {
        self.texture.position + self.texture.stored_size(self.flags, PartKind::Texture)
    }
}

/// Value record of the packet resource list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRecord {
    pub part: PartKind,
    pub offset: u32,
    pub size: u32,
    pub atlas: Option<AtlasPlacement>,
}

impl PathTableValue for ResourceRecord {
    fn read(reader: &mut impl Read) -> Result<Self> {
        let kind = reader.read_u32::<LE>()?;
        let offset = reader.read_u32::<LE>()?;
        let size = reader.read_u32::<LE>()?;
        match kind {
            0 => Ok(ResourceRecord {
                part: PartKind::General,
                offset,
                size,
                atlas: None,
            }),
            1 => {
                let index = reader.read_u32::<LE>()?;
                reader.read_u64::<LE>()?; // reserved
                let width = reader.read_u32::<LE>()?;
                let height = reader.read_u32::<LE>()?;
                Ok(ResourceRecord {
                    part: PartKind::Texture,
                    offset,
                    size,
                    atlas: Some(AtlasPlacement {
                        index,
                        width,
                        height,
                    }),
                })
            }
            other => Err(FormatError::UnknownResourceKind(other).into()),
        }
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        let kind = match self.part {
            PartKind::General => 0,
            PartKind::Texture => 1,
        };
        writer.write_u32::<LE>(kind)?;
        writer.write_u32::<LE>(self.offset)?;
        writer.write_u32::<LE>(self.size)?;
        if let Some(atlas) = &self.atlas {
            writer.write_u32::<LE>(atlas.index)?;
            writer.write_u64::<LE>(0)?;
            writer.write_u32::<LE>(atlas.width)?;
            writer.write_u32::<LE>(atlas.height)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub version: u32,
    pub compression_flags: u32,
    pub resource: Vec<PacketResource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    General,
    Atlas,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketResource {
    /// Posix-style path, also the file name under `resource/`.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    #[serde(rename = "additional", default, skip_serializing_if = "Option::is_none")]
    pub atlas: Option<AtlasPlacement>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl PacketResource {
    pub fn general(path: impl Into<String>, data: Vec<u8>) -> Self {
        PacketResource {
            path: path.into(),
            kind: ResourceKind::General,
            atlas: None,
            data,
        }
    }

    pub fn atlas(path: impl Into<String>, placement: AtlasPlacement, data: Vec<u8>) -> Self {
        PacketResource {
            path: path.into(),
            kind: ResourceKind::Atlas,
            atlas: Some(placement),
            data,
        }
    }

    pub fn uses_atlas(&self) -> bool {
        self.kind == ResourceKind::Atlas
    }

    /// The placement of an atlas resource; rejects a type that disagrees with it.
    pub fn placement(&self) -> Result<Option<&AtlasPlacement>> {
        match (self.kind, &self.atlas) {
            (ResourceKind::Atlas, Some(atlas)) => Ok(Some(atlas)),
            (ResourceKind::General, None) => Ok(None),
            _ => Err(FormatError::ResourceKindMismatch {
                path: self.path.clone(),
            }
            .into()),
        }
    }

    pub(crate) fn from_record(path: String, record: &ResourceRecord, data: Vec<u8>) -> Self {
        match record.atlas {
            Some(atlas) => PacketResource::atlas(path, atlas, data),
            None => PacketResource::general(path, data),
        }
    }
}

/// Where an atlas resource sits: its texture inside the subgroup window and its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasPlacement {
    pub index: u32,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RsbError;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = PacketHeader {
            version: 4,
            flags: CompressionFlags::GENERAL | CompressionFlags::TEXTURE,
            general: PartInfo {
                position: 0x1000,
                compressed_size: 0x1000,
                raw_size: 0x2000,
            },
            texture: PartInfo {
                position: 0x2000,
                compressed_size: 0,
                raw_size: 0,
            },
            resource_list_size: 0x40,
            resource_list_offset: PACKET_HEADER_SIZE,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), PACKET_HEADER_SIZE as usize);
        assert_eq!(&buf[0x10..0x14], &3u32.to_le_bytes());
        assert_eq!(&buf[0x14..0x18], &0x1000u32.to_le_bytes());
        assert_eq!(&buf[0x48..0x4C], &0x40u32.to_le_bytes());
        assert_eq!(&buf[0x4C..0x50], &0x5Cu32.to_le_bytes());

        assert_eq!(PacketHeader::read(&mut Cursor::new(&buf)).unwrap(), header);
        assert_eq!(header.packet_size(), 0x2000);
    }

    #[test]
    fn test_unknown_flags_rejected() {
        assert!(matches!(
            CompressionFlags::parse(0b100),
            Err(RsbError::Format(FormatError::UnknownCompressionFlags(4)))
        ));
    }

    #[test]
    fn test_compressed_size_zero_means_stored() {
        let part = PartInfo {
            position: 0x1000,
            compressed_size: 0,
            raw_size: 0x1000,
        };
        assert!(!part.is_compressed(CompressionFlags::all(), PartKind::General));
        assert_eq!(
            part.stored_size(CompressionFlags::all(), PartKind::General),
            0x1000
        );
    }

    #[test]
    fn test_resource_record_sizes() {
        let general = ResourceRecord {
            part: PartKind::General,
            offset: 0,
            size: 10,
            atlas: None,
        };
        let texture = ResourceRecord {
            part: PartKind::Texture,
            offset: 0x1000,
            size: 64,
            atlas: Some(AtlasPlacement {
                index: 2,
                width: 512,
                height: 256,
            }),
        };
        let mut buf = Vec::new();
        general.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 12);
        texture.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 12 + 32);

        let mut cursor = Cursor::new(&buf);
        assert_eq!(ResourceRecord::read(&mut cursor).unwrap(), general);
        assert_eq!(ResourceRecord::read(&mut cursor).unwrap(), texture);
    }

    #[test]
    fn test_resource_json_shape() {
        let resource = PacketResource::atlas(
            "images/a.ptx",
            AtlasPlacement {
                index: 0,
                width: 64,
                height: 32,
            },
            vec![1, 2, 3],
        );
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["type"], "atlas");
        assert_eq!(json["additional"]["width"], 64);
        assert!(json.get("data").is_none());

        let general: PacketResource =
            serde_json::from_str(r#"{"path":"a.rton","type":"general"}"#).unwrap();
        assert!(!general.uses_atlas());
        assert!(general.placement().unwrap().is_none());
    }

    #[test]
    fn test_placement_mismatch() {
        let mut resource = PacketResource::general("a.ptx", Vec::new());
        resource.kind = ResourceKind::Atlas;
        assert!(matches!(
            resource.placement(),
            Err(RsbError::Format(FormatError::ResourceKindMismatch { .. }))
        ));
    }
}
