use crate::error::{FormatError, Result};
use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const RSB_MAGIC: &[u8; 4] = b"1bsr";

pub const GROUP_RECORD_SIZE: u32 = 1156;
pub const POOL_RECORD_SIZE: u32 = 152;
pub const GROUP_SUBGROUP_CAPACITY: u32 = 64;
pub const TEXTURE_RECORD_SIZES: [u32; 3] = [0x10, 0x14, 0x18];

/// Per-version shape of the header and the version-gated records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatLayout {
    pub version: u32,
    pub header_size: u32,
    pub subgroup_record_size: u32,
    pub group_record_size: u32,
    pub pool_record_size: u32,
    pub group_capacity: u32,
    /// Subgroup records end with `(texture count, texture begin)`.
    pub texture_window: bool,
    /// Header ends with the information-size-without-manifest field.
    pub info_size_field: bool,
}

const LAYOUTS: [FormatLayout; 3] = [
    FormatLayout {
        version: 1,
        header_size: 0x6C,
        subgroup_record_size: 196,
        group_record_size: GROUP_RECORD_SIZE,
        pool_record_size: POOL_RECORD_SIZE,
        group_capacity: GROUP_SUBGROUP_CAPACITY,
        texture_window: false,
        info_size_field: false,
    },
    FormatLayout {
        version: 3,
        header_size: 0x6C,
        subgroup_record_size: 204,
        group_record_size: GROUP_RECORD_SIZE,
        pool_record_size: POOL_RECORD_SIZE,
        group_capacity: GROUP_SUBGROUP_CAPACITY,
        texture_window: true,
        info_size_field: false,
    },
    FormatLayout {
        version: 4,
        header_size: 0x70,
        subgroup_record_size: 204,
        group_record_size: GROUP_RECORD_SIZE,
        pool_record_size: POOL_RECORD_SIZE,
        group_capacity: GROUP_SUBGROUP_CAPACITY,
        texture_window: true,
        info_size_field: true,
    },
];

impl FormatLayout {
    pub fn for_version(version: u32) -> Result<&'static FormatLayout> {
        LAYOUTS
            .iter()
            .find(|layout| layout.version == version)
            .ok_or_else(|| {
                FormatError::UnsupportedVersion {
                    section: "bundle",
                    version,
                }
                .into()
            })
    }

    pub fn supported_versions() -> impl Iterator<Item = u32> {
        LAYOUTS.iter().map(|layout| layout.version)
    }
}

pub fn check_texture_record_size(size: u32) -> Result<()> {
    if TEXTURE_RECORD_SIZES.contains(&size) {
        Ok(())
    } else {
        Err(FormatError::InvalidRecordSize {
            section: "texture descriptor",
            expected: "16, 20 or 24".to_string(),
            actual: size,
        }
        .into())
    }
}

/// A byte run located by `(size, offset)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub offset: u32,
    pub size: u32,
}

/// An array of fixed-size records located by `(count, offset, record size)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordSection {
    pub count: u32,
    pub offset: u32,
    pub record_size: u32,
}

impl RecordSection {
    pub fn byte_len(&self) -> u64 {
        self.count as u64 * self.record_size as u64
    }

    pub fn record_offset(&self, index: u32) -> u64 {
        self.offset as u64 + index as u64 * self.record_size as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestOffsets {
    pub group: u32,
    pub resource: u32,
    pub string: u32,
}

impl ManifestOffsets {
    /// All zero means no manifest; any other mix of zero and non-zero is corrupt.
    pub fn from_raw(group: u32, resource: u32, string: u32) -> Result<Option<Self>> {
        match (group, resource, string) {
            (0, 0, 0) => Ok(None),
            _ if group != 0 && resource != 0 && string != 0 => Ok(Some(ManifestOffsets {
                group,
                resource,
                string,
            })),
            _ => Err(FormatError::PartialManifest {
                group,
                resource,
                string,
            }
            .into()),
        }
    }

    fn to_raw(manifest: Option<&ManifestOffsets>) -> Result<(u32, u32, u32)> {
        match manifest {
            None => Ok((0, 0, 0)),
            Some(m) => {
                ManifestOffsets::from_raw(m.group, m.resource, m.string)?;
                Ok((m.group, m.resource, m.string))
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RsbHeader {
    pub version: u32,
    /// Start of the packet data region.
    pub data_offset: u32,
    pub resource_paths: Section,
    pub subgroup_ids: Section,
    pub subgroups: RecordSection,
    pub groups: RecordSection,
    pub group_ids: Section,
    pub pools: RecordSection,
    pub textures: RecordSection,
    pub manifest: Option<ManifestOffsets>,
    pub info_size_without_manifest: Option<u32>,
}

impl RsbHeader {
    pub fn layout(&self) -> Result<&'static FormatLayout> {
        FormatLayout::for_version(self.version)
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != RSB_MAGIC {
            return Err(FormatError::InvalidMagic {
                section: "bundle",
                expected: String::from_utf8_lossy(RSB_MAGIC).to_string(),
                actual: String::from_utf8_lossy(&magic).to_string(),
            }
            .into());
        }

        let version = reader.read_u32::<LE>()?;
        let layout = FormatLayout::for_version(version)?;
        reader.read_u32::<LE>()?; // reserved

        let mut header = RsbHeader {
            version,
            ..Default::default()
        };
        header.data_offset = reader.read_u32::<LE>()?;
        header.resource_paths = read_section(reader)?;
        reader.read_u64::<LE>()?; // reserved
        header.subgroup_ids = read_section(reader)?;
        header.subgroups = read_record_section(reader)?;
        header.groups = read_record_section(reader)?;
        header.group_ids = read_section(reader)?;
        header.pools = read_record_section(reader)?;
        header.textures = read_record_section(reader)?;

        let group = reader.read_u32::<LE>()?;
        let resource = reader.read_u32::<LE>()?;
        let string = reader.read_u32::<LE>()?;
        header.manifest = ManifestOffsets::from_raw(group, resource, string)?;

        if layout.info_size_field {
            header.info_size_without_manifest = Some(reader.read_u32::<LE>()?);
        }

        header.check_record_sizes(layout)?;
        Ok(header)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let layout = self.layout()?;
        self.check_record_sizes(layout)?;
        let (group, resource, string) = ManifestOffsets::to_raw(self.manifest.as_ref())?;

        writer.write_all(RSB_MAGIC)?;
        writer.write_u32::<LE>(self.version)?;
        writer.write_u32::<LE>(0)?;
        writer.write_u32::<LE>(self.data_offset)?;
        write_section(writer, &self.resource_paths)?;
        writer.write_u64::<LE>(0)?;
        write_section(writer, &self.subgroup_ids)?;
        write_record_section(writer, &self.subgroups)?;
        write_record_section(writer, &self.groups)?;
        write_section(writer, &self.group_ids)?;
        write_record_section(writer, &self.pools)?;
        write_record_section(writer, &self.textures)?;
        writer.write_u32::<LE>(group)?;
        writer.write_u32::<LE>(resource)?;
        writer.write_u32::<LE>(string)?;

        if layout.info_size_field {
            writer.write_u32::<LE>(self.info_size_without_manifest.unwrap_or(0))?;
        }
        Ok(())
    }

    fn check_record_sizes(&self, layout: &FormatLayout) -> Result<()> {
        let fixed = [
            ("subgroup", self.subgroups.record_size, layout.subgroup_record_size),
            ("group", self.groups.record_size, layout.group_record_size),
            ("pool", self.pools.record_size, layout.pool_record_size),
        ];
        for (section, actual, expected) in fixed {
            if actual != expected {
                return Err(FormatError::InvalidRecordSize {
                    section,
                    expected: expected.to_string(),
                    actual,
                }
                .into());
            }
        }
        check_texture_record_size(self.textures.record_size)
    }

    /// Every section the header declares, as `(name, offset, size)`.
    pub fn sections(&self) -> Vec<(&'static str, u64, u64)> {
        let mut sections = vec![
            (
                "resource path table",
                self.resource_paths.offset as u64,
                self.resource_paths.size as u64,
            ),
            (
                "subgroup id table",
                self.subgroup_ids.offset as u64,
                self.subgroup_ids.size as u64,
            ),
            (
                "subgroup records",
                self.subgroups.offset as u64,
                self.subgroups.byte_len(),
            ),
            (
                "group records",
                self.groups.offset as u64,
                self.groups.byte_len(),
            ),
            (
                "group id table",
                self.group_ids.offset as u64,
                self.group_ids.size as u64,
            ),
            (
                "pool records",
                self.pools.offset as u64,
                self.pools.byte_len(),
            ),
            (
                "texture descriptors",
                self.textures.offset as u64,
                self.textures.byte_len(),
            ),
        ];
        if let Some(m) = &self.manifest {
            let (group, resource, string) = (m.group as u64, m.resource as u64, m.string as u64);
            sections.push((
                "group manifest",
                group,
                resource.saturating_sub(group),
            ));
            sections.push((
                "resource manifest",
                resource,
                string.saturating_sub(resource),
            ));
            sections.push((
                "string blob",
                string,
                (self.data_offset as u64).saturating_sub(string),
            ));
        }
        sections
    }

    /// Reject headers whose sections run past the end of the stream.
    pub fn check_bounds(&self, stream_len: u64) -> Result<()> {
        for (section, offset, size) in self.sections() {
            if offset + size > stream_len {
                return Err(FormatError::SectionOutOfBounds {
                    section: section.to_string(),
                    offset,
                    size,
                    len: stream_len,
                }
                .into());
            }
        }
        Ok(())
    }
}

fn read_section<R: Read>(reader: &mut R) -> Result<Section> {
    let size = reader.read_u32::<LE>()?;
    let offset = reader.read_u32::<LE>()?;
    Ok(Section { offset, size })
}

fn write_section<W: Write>(writer: &mut W, section: &Section) -> Result<()> {
    writer.write_u32::<LE>(section.size)?;
    writer.write_u32::<LE>(section.offset)?;
    Ok(())
}

fn read_record_section<R: Read>(reader: &mut R) -> Result<RecordSection> {
    let count = reader.read_u32::<LE>()?;
    let offset = reader.read_u32::<LE>()?;
    let record_size = reader.read_u32::<LE>()?;
    Ok(RecordSection {
        count,
        offset,
        record_size,
    })
}

fn write_record_section<W: Write>(writer: &mut W, section: &RecordSection) -> Result<()> {
    writer.write_u32::<LE>(section.count)?;
    writer.write_u32::<LE>(section.offset)?;
    writer.write_u32::<LE>(section.record_size)?;
    Ok(())
}
