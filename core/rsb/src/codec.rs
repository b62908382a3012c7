//! Whole-bundle decode and encode.
//!
//! Decode runs header, id tables, records, manifest and then the packets.
//! Encode goes the other way: packets first, then the tables and records
//! they index, then the manifest, and the header last once every section
//! offset is known.

use crate::compress::Compressor;
use crate::error::{ConsistencyError, FormatError, Result};
use crate::header::{
    FormatLayout, ManifestOffsets, RecordSection, RsbHeader, Section, check_texture_record_size,
};
use crate::manifest::Manifest;
use crate::packet::types::{MIRROR_RANGE, MIRROR_SIZE};
use crate::packet::{self, Packet, PacketIndex, PacketResource};
use crate::path_table::{self, to_wire_path};
use crate::pool::{GroupRef, Pool, PoolRegistry, SubgroupRef, check_id_table};
use crate::types::{Bundle, Group, Subgroup, TextureWindow};
use rayon::prelude::*;
use shared_utils::{align_up, pad_vec};
use std::borrow::Cow;
use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, info, warn};

pub const DATA_ALIGNMENT: u64 = 4096;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UnpackMode {
    /// Keep each subgroup's packet as stored; only its resource list is decoded.
    #[default]
    Packet,
    /// Decompress every packet into per-resource bytes.
    Expand,
}

/// What to do when a single packet cannot be decoded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PacketFailurePolicy {
    #[default]
    Abort,
    /// Drop the subgroup from the result and log the failure.
    Skip,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnpackOptions {
    pub mode: UnpackMode,
    pub packet_failure: PacketFailurePolicy,
}

/// Decoded contents of the three id tables.
#[derive(Debug, Clone, Default)]
pub struct IdTables {
    pub groups: Vec<(String, u32)>,
    pub subgroups: Vec<(String, u32)>,
    pub resource_paths: Vec<(String, u32)>,
}

pub struct BundleReader<R> {
    reader: R,
    pub header: RsbHeader,
    stream_len: u64,
}

impl<R: Read + Seek> BundleReader<R> {
    pub fn open(mut reader: R) -> Result<Self> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let header = RsbHeader::read(&mut reader)?;
        header.check_bounds(stream_len)?;
        debug!(
            version = header.version,
            data_offset = header.data_offset,
            "read bundle header"
        );
        Ok(BundleReader {
            reader,
            header,
            stream_len,
        })
    }

    pub fn read_id_tables(&mut self) -> Result<IdTables> {
        let header = &self.header;
        Ok(IdTables {
            groups: path_table::read_table(
                &mut self.reader,
                header.group_ids.offset as u64,
                header.group_ids.size as u64,
                header.groups.count as usize,
            )?,
            subgroups: path_table::read_table(
                &mut self.reader,
                header.subgroup_ids.offset as u64,
                header.subgroup_ids.size as u64,
                header.subgroups.count as usize,
            )?,
            resource_paths: path_table::read_table(
                &mut self.reader,
                header.resource_paths.offset as u64,
                header.resource_paths.size as u64,
                0,
            )?,
        })
    }

    pub fn read_registry(&mut self) -> Result<PoolRegistry> {
        PoolRegistry::read(&mut self.reader, &self.header)
    }

    pub fn read_manifest(&mut self) -> Result<Option<Manifest>> {
        let Some(offsets) = self.header.manifest else {
            return Ok(None);
        };
        let end = (self.header.data_offset as u64).max(offsets.string as u64);
        let bytes = self.read_range("manifest", offsets.group as u64, end)?;

        if offsets.resource < offsets.group || offsets.string < offsets.resource {
            return Err(FormatError::UnexpectedValue {
                section: "bundle header",
                field: "manifest offset order",
                expected: offsets.group,
                actual: offsets.resource.min(offsets.string),
            }
            .into());
        }
        let resource = (offsets.resource - offsets.group) as usize;
        let string = (offsets.string - offsets.group) as usize;
        Manifest::decode(
            &bytes[..resource],
            &bytes[resource..string],
            &bytes[string..],
        )
        .map(Some)
    }

    pub fn read_packet(&mut self, subgroup: &SubgroupRef) -> Result<Vec<u8>> {
        let start = subgroup.byte_offset as u64;
        self.read_range(
            &format!("packet {}", subgroup.id),
            start,
            start + subgroup.byte_length as u64,
        )
    }

    fn read_range(&mut self, section: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        if start > end || end > self.stream_len {
            return Err(FormatError::SectionOutOfBounds {
                section: section.to_string(),
                offset: start,
                size: end.saturating_sub(start),
                len: self.stream_len,
            }
            .into());
        }
        self.reader.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; (end - start) as usize];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

struct DecodedPacket {
    raw: Vec<u8>,
    index: PacketIndex,
    texture_count: u32,
    packet: Packet,
}

fn decode_packet(raw: Vec<u8>, mode: UnpackMode, compressor: &dyn Compressor) -> Result<DecodedPacket> {
    let index = packet::read_index(&raw)?;
    let texture_count = index.texture_count()?;
    let packet = match mode {
        UnpackMode::Expand => packet::unpack(&raw, compressor)?,
        UnpackMode::Packet => Packet {
            version: index.header.version,
            compression_flags: index.header.flags.bits(),
            resource: index
                .records
                .iter()
                .map(|(path, record)| PacketResource::from_record(path.clone(), record, Vec::new()))
                .collect(),
        },
    };
    Ok(DecodedPacket {
        raw,
        index,
        texture_count,
        packet,
    })
}

pub fn unpack<R: Read + Seek>(
    reader: R,
    options: &UnpackOptions,
    compressor: &dyn Compressor,
) -> Result<Bundle> {
    let mut bundle = BundleReader::open(reader)?;
    let tables = bundle.read_id_tables()?;
    let mut registry = bundle.read_registry()?;
    check_tables(&tables, &registry)?;
    let manifest = bundle.read_manifest()?;
    debug!(
        groups = registry.groups.len(),
        subgroups = registry.subgroups.len(),
        textures = registry.textures.len(),
        manifest_resources = manifest.as_ref().map_or(0, Manifest::resource_count),
        "read bundle index"
    );

    let raws: Vec<Result<Vec<u8>>> = registry
        .subgroups
        .iter()
        .map(|subgroup| bundle.read_packet(subgroup))
        .collect();
    let decoded: Vec<Result<DecodedPacket>> = raws
        .into_par_iter()
        .zip(registry.subgroups.par_iter())
        .map(|(raw, subgroup)| {
            raw.and_then(|raw| decode_packet(raw, options.mode, compressor))
                .map_err(|e| e.in_packet(&subgroup.id))
        })
        .collect();

    let mut packets = Vec::with_capacity(decoded.len());
    for (result, subgroup) in decoded.into_iter().zip(&registry.subgroups) {
        match result {
            Ok(decoded) => packets.push(Some(decoded)),
            Err(err) if options.packet_failure == PacketFailurePolicy::Skip => {
                warn!(subgroup = %subgroup.id, error = %err, "skipping packet");
                packets.push(None);
            }
            Err(err) => return Err(err),
        }
    }

    if !registry.layout.texture_window {
        let counts = derived_texture_counts(&packets, &registry.subgroups)?;
        registry.derive_windows(&counts)?;
    }
    registry.check_texture_windows()?;

    for group in &registry.groups {
        for &i in &group.subgroups {
            let Some(decoded) = &packets[i as usize] else {
                continue;
            };
            let subgroup = &registry.subgroups[i as usize];
            if decoded.raw[MIRROR_RANGE] != subgroup.packet_header[..] {
                return Err(ConsistencyError::PacketHeaderMismatch {
                    subgroup: subgroup.id.clone(),
                }
                .into());
            }
            registry.check_atlas(
                &group.id,
                i as usize,
                decoded
                    .index
                    .atlas_records()
                    .filter_map(|(path, record)| record.atlas.as_ref().map(|a| (path, a))),
            )?;
        }
    }

    let mut group = Vec::with_capacity(registry.groups.len());
    for g in &registry.groups {
        let mut subgroup = Vec::with_capacity(g.subgroups.len());
        for &i in &g.subgroups {
            let Some(decoded) = packets[i as usize].take() else {
                continue;
            };
            let sub = &registry.subgroups[i as usize];
            subgroup.push(Subgroup {
                id: sub.id.clone(),
                resolution: sub.resolution,
                locale: sub.locale.clone(),
                texture: registry.window_textures(i as usize).to_vec(),
                packet: decoded.packet,
                packet_data: Some(decoded.raw),
            });
        }
        group.push(Group {
            id: g.id.clone(),
            composite: g.composite,
            subgroup,
        });
    }

    info!(
        version = bundle.header.version,
        groups = group.len(),
        subgroups = registry.subgroups.len(),
        "unpacked bundle"
    );
    Ok(Bundle {
        version: bundle.header.version,
        texture_record_size: registry.texture_record_size,
        group,
        manifest,
    })
}

/// Texture counts for layouts without stored windows. A skipped packet hides
/// its count, so no later subgroup that owns textures can be placed.
fn derived_texture_counts(
    packets: &[Option<DecodedPacket>],
    subgroups: &[SubgroupRef],
) -> Result<Vec<u32>> {
    let mut skipped: Option<&str> = None;
    let mut counts = Vec::with_capacity(packets.len());
    for (packet, subgroup) in packets.iter().zip(subgroups) {
        let count = match packet {
            Some(decoded) => decoded.texture_count,
            None => {
                skipped.get_or_insert(subgroup.id.as_str());
                0
            }
        };
        if let (Some(skipped), true) = (skipped, count > 0) {
            return Err(ConsistencyError::SkippedTextureWindow {
                subgroup: subgroup.id.clone(),
                skipped: skipped.to_string(),
            }
            .into());
        }
        counts.push(count);
    }
    Ok(counts)
}

fn check_tables(tables: &IdTables, registry: &PoolRegistry) -> Result<()> {
    let group_ids: Vec<String> = registry.groups.iter().map(GroupRef::stored_id).collect();
    let group_ids: Vec<&str> = group_ids.iter().map(String::as_str).collect();
    check_id_table("group id", &tables.groups, &group_ids)?;

    let subgroup_ids: Vec<&str> = registry.subgroups.iter().map(|s| s.id.as_str()).collect();
    check_id_table("subgroup id", &tables.subgroups, &subgroup_ids)?;

    for (path, index) in &tables.resource_paths {
        if *index as usize >= registry.pools.len() {
            return Err(FormatError::ResourcePoolOutOfRange {
                path: path.clone(),
                index: *index,
                count: registry.pools.len(),
            }
            .into());
        }
    }
    Ok(())
}

struct EncodedPacket<'a> {
    bytes: Cow<'a, [u8]>,
    index: PacketIndex,
}

fn encode_packet<'a>(subgroup: &'a Subgroup, compressor: &dyn Compressor) -> Result<EncodedPacket<'a>> {
    let bytes = match &subgroup.packet_data {
        Some(raw) => Cow::Borrowed(raw.as_slice()),
        None => Cow::Owned(packet::pack(&subgroup.packet, compressor)?),
    };
    let index = packet::read_index(&bytes)?;
    Ok(EncodedPacket { bytes, index })
}

pub fn pack<W: Write>(writer: &mut W, bundle: &Bundle, compressor: &dyn Compressor) -> Result<()> {
    let layout = FormatLayout::for_version(bundle.version)?;
    check_texture_record_size(bundle.texture_record_size)?;

    let flat: Vec<&Subgroup> = bundle.group.iter().flat_map(|g| &g.subgroup).collect();
    let packets: Vec<EncodedPacket> = flat
        .par_iter()
        .map(|&subgroup| {
            encode_packet(subgroup, compressor).map_err(|e| e.in_packet(&subgroup.id))
        })
        .collect::<Result<_>>()?;
    debug!(packets = packets.len(), "serialized packets");

    let mut registry = build_registry(bundle, layout, &packets)?;
    for group in &registry.groups {
        for &i in &group.subgroups {
            registry.check_atlas(
                &group.id,
                i as usize,
                packets[i as usize]
                    .index
                    .atlas_records()
                    .filter_map(|(path, record)| record.atlas.as_ref().map(|a| (path, a))),
            )?;
        }
    }

    let tables = build_tables(&registry, &packets)?;
    let manifest = bundle.manifest.as_ref().map(Manifest::encode).transpose()?;
    debug!("built id tables");

    // Record sizes are fixed, so the packet data start is known before any
    // subgroup record is written.
    let manifest_len = manifest
        .as_ref()
        .map_or(0, |m| m.group.len() + m.resource.len() + m.string.len());
    let info_len = tables.resource_paths.len()
        + tables.subgroup_ids.len()
        + tables.group_ids.len()
        + registry.groups.len() * layout.group_record_size as usize
        + registry.subgroups.len() * layout.subgroup_record_size as usize
        + registry.pools.len() * layout.pool_record_size as usize
        + registry.textures.len() * bundle.texture_record_size as usize
        + manifest_len;
    let data_offset = align_up(layout.header_size as u64 + info_len as u64, DATA_ALIGNMENT);
    for subgroup in &mut registry.subgroups {
        let offset = data_offset + subgroup.byte_offset as u64;
        subgroup.byte_offset = u32::try_from(offset).map_err(|_| FormatError::SectionOutOfBounds {
            section: format!("packet {}", subgroup.id),
            offset,
            size: subgroup.byte_length as u64,
            len: u32::MAX as u64,
        })?;
    }

    let mut info = InfoWriter::new(layout.header_size);
    let resource_paths = info.place(&tables.resource_paths);
    let subgroup_ids = info.place(&tables.subgroup_ids);
    let groups = info.records(registry.groups.len(), layout.group_record_size, |w| {
        registry.write_groups(w)
    })?;
    let group_ids = info.place(&tables.group_ids);
    let subgroups = info.records(registry.subgroups.len(), layout.subgroup_record_size, |w| {
        registry.write_subgroups(w)
    })?;
    let pools = info.records(registry.pools.len(), layout.pool_record_size, |w| {
        registry.write_pools(w)
    })?;
    let textures = info.records(registry.textures.len(), bundle.texture_record_size, |w| {
        registry.write_textures(w)
    })?;
    let info_end = info.position();
    let manifest = manifest.map(|sections| ManifestOffsets {
        group: info.place(&sections.group).offset,
        resource: info.place(&sections.resource).offset,
        string: info.place(&sections.string).offset,
    });
    debug_assert_eq!(
        align_up(info.position() as u64, DATA_ALIGNMENT),
        data_offset
    );

    let header = RsbHeader {
        version: bundle.version,
        data_offset: data_offset as u32,
        resource_paths,
        subgroup_ids,
        subgroups,
        groups,
        group_ids,
        pools,
        textures,
        manifest,
        info_size_without_manifest: layout.info_size_field.then_some(info_end),
    };

    header.write(writer)?;
    let mut body = info.into_bytes();
    body.resize(data_offset as usize - layout.header_size as usize, 0);
    writer.write_all(&body)?;

    let mut size = data_offset;
    for encoded in &packets {
        let mut bytes = encoded.bytes.to_vec();
        pad_vec(&mut bytes, DATA_ALIGNMENT as usize);
        writer.write_all(&bytes)?;
        size += bytes.len() as u64;
    }

    info!(
        version = bundle.version,
        groups = registry.groups.len(),
        subgroups = registry.subgroups.len(),
        size,
        "packed bundle"
    );
    Ok(())
}

/// Sections between the header and the packet data, addressed from file start.
struct InfoWriter {
    base: u32,
    bytes: Vec<u8>,
}

impl InfoWriter {
    fn new(base: u32) -> Self {
        InfoWriter {
            base,
            bytes: Vec::new(),
        }
    }

    fn position(&self) -> u32 {
        self.base + self.bytes.len() as u32
    }

    fn place(&mut self, data: &[u8]) -> Section {
        let offset = self.position();
        self.bytes.extend_from_slice(data);
        Section {
            offset,
            size: data.len() as u32,
        }
    }

    fn records(
        &mut self,
        count: usize,
        record_size: u32,
        write: impl FnOnce(&mut Vec<u8>) -> Result<()>,
    ) -> Result<RecordSection> {
        let offset = self.position();
        write(&mut self.bytes)?;
        debug_assert_eq!(self.position() - offset, count as u32 * record_size);
        Ok(RecordSection {
            count: count as u32,
            offset,
            record_size,
        })
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

struct Tables {
    group_ids: Vec<u8>,
    subgroup_ids: Vec<u8>,
    resource_paths: Vec<u8>,
}

fn build_tables(registry: &PoolRegistry, packets: &[EncodedPacket]) -> Result<Tables> {
    let group_ids = path_table::encode(
        registry
            .groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.stored_id(), i as u32))
            .collect(),
    )?;
    let subgroup_ids = path_table::encode(
        registry
            .subgroups
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i as u32))
            .collect(),
    )?;

    // A path shipped by several subgroups is indexed once, by the first.
    let mut seen = HashSet::new();
    let mut paths = Vec::new();
    for (subgroup, encoded) in registry.subgroups.iter().zip(packets) {
        for (path, _) in &encoded.index.records {
            let wire = to_wire_path(path);
            if seen.insert(wire.clone()) {
                paths.push((wire, subgroup.pool_index));
            }
        }
    }
    let resource_paths = path_table::encode(paths)?;

    Ok(Tables {
        group_ids,
        subgroup_ids,
        resource_paths,
    })
}

/// Lay out subgroups, pools and texture windows in traversal order.
///
/// Packet offsets are relative to the packet data start until `pack` shifts them.
fn build_registry(
    bundle: &Bundle,
    layout: &'static FormatLayout,
    packets: &[EncodedPacket],
) -> Result<PoolRegistry> {
    let mut groups = Vec::with_capacity(bundle.group.len());
    let mut subgroups = Vec::with_capacity(packets.len());
    let mut pools = Vec::with_capacity(packets.len());
    let mut textures = Vec::new();
    let mut byte_offset = 0u64;

    for group in &bundle.group {
        let mut members = Vec::with_capacity(group.subgroup.len());
        for subgroup in &group.subgroup {
            let index = subgroups.len() as u32;
            let packet = &packets[index as usize];
            let header = &packet.index.header;
            let mut packet_header = [0u8; MIRROR_SIZE];
            packet_header.copy_from_slice(&packet.bytes[MIRROR_RANGE]);
            let texture_window = TextureWindow {
                begin: textures.len() as u32,
                count: subgroup.texture.len() as u32,
            };
            textures.extend_from_slice(&subgroup.texture);

            subgroups.push(SubgroupRef {
                id: subgroup.id.clone(),
                byte_offset: byte_offset as u32,
                byte_length: packet.bytes.len() as u32,
                pool_index: index,
                resolution: subgroup.resolution,
                locale: subgroup.locale.clone(),
                packet_header,
                texture_window,
            });
            pools.push(Pool::for_subgroup(
                &subgroup.id,
                header.general.position + header.general.raw_size,
                header.texture.raw_size,
            ));
            members.push(index);
            byte_offset = align_up(byte_offset + packet.bytes.len() as u64, DATA_ALIGNMENT);
        }
        groups.push(GroupRef {
            id: group.id.clone(),
            composite: group.composite,
            subgroups: members,
        });
    }

    let registry = PoolRegistry {
        layout,
        texture_record_size: bundle.texture_record_size,
        groups,
        subgroups,
        pools,
        textures,
    };
    registry.check_unique_ids()?;
    registry.check_texture_windows()?;
    Ok(registry)
}
