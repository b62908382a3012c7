use crate::compress::Compressor;
use crate::error::{FormatError, Result, RsbError};
use crate::packet::types::{
    CompressionFlags, PACKET_HEADER_SIZE, PACKET_VERSIONS, PART_ALIGNMENT, Packet, PacketHeader,
    PartInfo, PartKind, ResourceRecord,
};
use crate::path_table::{self, to_wire_path};
use shared_utils::{align_up, pad_vec};

/// Serialize a packet. Resources are laid out in the order given.
pub fn pack(packet: &Packet, compressor: &dyn Compressor) -> Result<Vec<u8>> {
    if !PACKET_VERSIONS.contains(&packet.version) {
        return Err(FormatError::UnsupportedVersion {
            section: "packet",
            version: packet.version,
        }
        .into());
    }
    let flags = CompressionFlags::parse(packet.compression_flags)?;

    let mut general = Vec::new();
    let mut texture = Vec::new();
    let mut entries = Vec::with_capacity(packet.resource.len());
    for resource in &packet.resource {
        let atlas = resource.placement()?.copied();
        let (part, buffer) = match atlas {
            Some(_) => (PartKind::Texture, &mut texture),
            None => (PartKind::General, &mut general),
        };
        let offset = buffer.len() as u32;
        buffer.extend_from_slice(&resource.data);
        pad_vec(buffer, PART_ALIGNMENT);
        entries.push((
            to_wire_path(&resource.path),
            ResourceRecord {
                part,
                offset,
                size: resource.data.len() as u32,
                atlas,
            },
        ));
    }

    let list = path_table::encode(entries)?;
    let general_position = align_up(
        PACKET_HEADER_SIZE as u64 + list.len() as u64,
        PART_ALIGNMENT as u64,
    ) as u32;

    let (general_info, general_stored) =
        store_part(general, flags, PartKind::General, general_position, compressor)?;
    let texture_position = general_position + general_stored.len() as u32;
    let (texture_info, texture_stored) =
        store_part(texture, flags, PartKind::Texture, texture_position, compressor)?;

    let header = PacketHeader {
        version: packet.version,
        flags,
        general: general_info,
        texture: texture_info,
        resource_list_size: list.len() as u32,
        resource_list_offset: PACKET_HEADER_SIZE,
    };

    let mut out = Vec::with_capacity(texture_position as usize + texture_stored.len());
    header.write(&mut out)?;
    out.extend_from_slice(&list);
    out.resize(general_position as usize, 0);
    out.extend_from_slice(&general_stored);
    out.extend_from_slice(&texture_stored);
    Ok(out)
}

fn store_part(
    raw: Vec<u8>,
    flags: CompressionFlags,
    kind: PartKind,
    position: u32,
    compressor: &dyn Compressor,
) -> Result<(PartInfo, Vec<u8>)> {
    let raw_size = raw.len() as u32;
    if raw.is_empty() || !flags.contains(kind.flag()) {
        let info = PartInfo {
            position,
            compressed_size: 0,
            raw_size,
        };
        return Ok((info, raw));
    }

    let mut stored = compressor
        .compress(&raw)
        .map_err(|source| RsbError::Compression {
            part: kind.name(),
            source,
        })?;
    pad_vec(&mut stored, PART_ALIGNMENT);
    let info = PartInfo {
        position,
        compressed_size: stored.len() as u32,
        raw_size,
    };
    Ok((info, stored))
}
