use crate::compress::Compressor;
use crate::error::{FormatError, Result, RsbError};
use crate::packet::types::{Packet, PacketHeader, PacketResource, PartKind, ResourceRecord};
use crate::path_table;
use std::io::Cursor;

/// Header and resource list of a packet, read without touching the data parts.
#[derive(Debug, Clone)]
pub struct PacketIndex {
    pub header: PacketHeader,
    /// Entries in placement order: general part first, then by offset.
    pub records: Vec<(String, ResourceRecord)>,
}

impl PacketIndex {
    pub fn atlas_records(&self) -> impl Iterator<Item = (&str, &ResourceRecord)> {
        self.records
            .iter()
            .filter(|(_, record)| record.atlas.is_some())
            .map(|(path, record)| (path.as_str(), record))
    }

    /// Number of textures the packet addresses: highest atlas index plus one.
    pub fn texture_count(&self) -> Result<u32> {
        self.atlas_records().try_fold(0u32, |count, (path, record)| {
            let Some(atlas) = record.atlas else {
                return Ok(count);
            };
            let needed = atlas.index.checked_add(1).ok_or_else(|| {
                FormatError::AtlasIndexOverflow {
                    path: path.to_string(),
                    index: atlas.index,
                }
            })?;
            Ok(count.max(needed))
        })
    }
}

pub fn read_index(data: &[u8]) -> Result<PacketIndex> {
    let header = PacketHeader::read(&mut Cursor::new(data))?;

    let list = slice(
        data,
        "packet resource list",
        header.resource_list_offset,
        header.resource_list_size,
    )?;
    let mut records: Vec<(String, ResourceRecord)> = path_table::decode(list, 0)?;

    for (path, record) in &records {
        let raw_size = header.part(record.part).raw_size;
        if record.offset as u64 + record.size as u64 > raw_size as u64 {
            return Err(FormatError::ResourceOutOfBounds {
                path: path.clone(),
                part: record.part.name(),
                offset: record.offset,
                size: record.size,
                len: raw_size as usize,
            }
            .into());
        }
    }
    records.sort_by_key(|(_, record)| (record.part == PartKind::Texture, record.offset));

    Ok(PacketIndex { header, records })
}

/// Decode a whole packet, decompressing both parts.
pub fn unpack(data: &[u8], compressor: &dyn Compressor) -> Result<Packet> {
    let index = read_index(data)?;
    let general = read_part(data, &index.header, PartKind::General, compressor)?;
    let texture = read_part(data, &index.header, PartKind::Texture, compressor)?;

    let resource = index
        .records
        .iter()
        .map(|(path, record)| {
            let part = match record.part {
                PartKind::General => &general,
                PartKind::Texture => &texture,
            };
            let start = record.offset as usize;
            let bytes = part[start..start + record.size as usize].to_vec();
            PacketResource::from_record(path.clone(), record, bytes)
        })
        .collect();

    Ok(Packet {
        version: index.header.version,
        compression_flags: index.header.flags.bits(),
        resource,
    })
}

pub(crate) fn read_part(
    data: &[u8],
    header: &PacketHeader,
    kind: PartKind,
    compressor: &dyn Compressor,
) -> Result<Vec<u8>> {
    let part = header.part(kind);
    if part.raw_size == 0 {
        return Ok(Vec::new());
    }

    let section = match kind {
        PartKind::General => "packet general part",
        PartKind::Texture => "packet texture part",
    };
    let stored = slice(
        data,
        section,
        part.position,
        part.stored_size(header.flags, kind),
    )?;
    if !part.is_compressed(header.flags, kind) {
        return Ok(stored.to_vec());
    }

    let compression_error = |source| RsbError::Compression {
        part: kind.name(),
        source,
    };
    let repaired = compressor.repair(stored).map_err(compression_error)?;
    let raw = compressor
        .decompress(&repaired, part.raw_size as usize)
        .map_err(compression_error)?;
    if raw.len() != part.raw_size as usize {
        return Err(FormatError::PartSizeMismatch {
            part: kind.name(),
            expected: part.raw_size,
            actual: raw.len(),
        }
        .into());
    }
    Ok(raw)
}

fn slice<'a>(data: &'a [u8], section: &str, offset: u32, size: u32) -> Result<&'a [u8]> {
    let end = offset as u64 + size as u64;
    if end > data.len() as u64 {
        return Err(FormatError::SectionOutOfBounds {
            section: section.to_string(),
            offset: offset as u64,
            size: size as u64,
            len: data.len() as u64,
        }
        .into());
    }
    Ok(&data[offset as usize..end as usize])
}
