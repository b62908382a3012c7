//! Group, subgroup, pool and texture descriptor records.
//!
//! Every subgroup owns one pool slot and a window into the global texture
//! descriptor table. Subgroups whose packets share a byte offset are aliases of
//! the same physical payload and may share a window.

use crate::error::{ConsistencyError, FormatError, Result};
use crate::header::{FormatLayout, RecordSection, RsbHeader};
use crate::packet::AtlasPlacement;
use crate::packet::types::MIRROR_SIZE;
use crate::types::{
    TextureDescriptor, TextureWindow, locale_from_bytes, locale_to_bytes, split_group_id,
    stored_group_id,
};
use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use shared_utils::{BinReadExt, BinWriteExt};
use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom, Write};

pub const ID_SLOT_SIZE: usize = 128;
pub const AUTO_POOL_SUFFIX: &str = "_AutoPool";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRef {
    pub id: String,
    pub composite: bool,
    /// Indices into [`PoolRegistry::subgroups`].
    pub subgroups: Vec<u32>,
}

impl GroupRef {
    pub fn stored_id(&self) -> String {
        stored_group_id(&self.id, self.composite)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgroupRef {
    pub id: String,
    pub byte_offset: u32,
    pub byte_length: u32,
    pub pool_index: u32,
    pub resolution: u32,
    pub locale: Option<String>,
    /// Copy of the embedded packet's header bytes `0x10..0x48`.
    pub packet_header: [u8; MIRROR_SIZE],
    pub texture_window: TextureWindow,
}

impl SubgroupRef {
    pub fn compression_flags(&self) -> u32 {
        u32::from_le_bytes([
            self.packet_header[0],
            self.packet_header[1],
            self.packet_header[2],
            self.packet_header[3],
        ])
    }

    pub fn is_alias_of(&self, other: &SubgroupRef) -> bool {
        self.byte_offset == other.byte_offset
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub id: String,
    pub general_capacity: u32,
    pub texture_capacity: u32,
    pub instance_count: u32,
    pub flags: u32,
}

impl Pool {
    pub fn for_subgroup(subgroup: &str, general_capacity: u32, texture_capacity: u32) -> Self {
        Pool {
            id: format!("{subgroup}{AUTO_POOL_SUFFIX}"),
            general_capacity,
            texture_capacity,
            instance_count: 1,
            flags: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolRegistry {
    pub layout: &'static FormatLayout,
    pub texture_record_size: u32,
    pub groups: Vec<GroupRef>,
    pub subgroups: Vec<SubgroupRef>,
    pub pools: Vec<Pool>,
    pub textures: Vec<TextureDescriptor>,
}

impl PoolRegistry {
    pub fn read<R: Read + Seek>(reader: &mut R, header: &RsbHeader) -> Result<Self> {
        let layout = header.layout()?;
        let textures = read_textures(reader, &header.textures)?;
        let pools = read_pools(reader, &header.pools)?;
        let mut subgroups = read_subgroups(reader, &header.subgroups, layout, pools.len())?;
        let groups = read_groups(reader, &header.groups, layout, &mut subgroups)?;

        let registry = PoolRegistry {
            layout,
            texture_record_size: header.textures.record_size,
            groups,
            subgroups,
            pools,
            textures,
        };
        registry.check_unique_ids()?;
        Ok(registry)
    }

    /// Reject duplicate ids and subgroups that no group or several groups list.
    pub fn check_unique_ids(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            if !seen.insert(group.id.as_str()) {
                return Err(ConsistencyError::DuplicateId {
                    kind: "group",
                    id: group.id.clone(),
                }
                .into());
            }
        }

        let mut seen = HashSet::new();
        for subgroup in &self.subgroups {
            if !seen.insert(subgroup.id.as_str()) {
                return Err(ConsistencyError::DuplicateId {
                    kind: "subgroup",
                    id: subgroup.id.clone(),
                }
                .into());
            }
        }

        let mut owners: Vec<Option<&str>> = vec![None; self.subgroups.len()];
        for group in &self.groups {
            for &index in &group.subgroups {
                let slot = owners.get_mut(index as usize).ok_or_else(|| {
                    FormatError::SubgroupIndexOutOfRange {
                        group: group.id.clone(),
                        index,
                        count: self.subgroups.len(),
                    }
                })?;
                if let Some(first) = *slot {
                    return Err(ConsistencyError::SharedSubgroup {
                        subgroup: self.subgroups[index as usize].id.clone(),
                        first: first.to_string(),
                        second: group.id.clone(),
                    }
                    .into());
                }
                *slot = Some(group.id.as_str());
            }
        }
        if let Some(orphan) = owners.iter().position(Option::is_none) {
            return Err(ConsistencyError::OrphanSubgroup(self.subgroups[orphan].id.clone()).into());
        }
        Ok(())
    }

    /// Assign consecutive windows from per-subgroup texture counts.
    pub fn derive_windows(&mut self, counts: &[u32]) -> Result<()> {
        let total = self.textures.len();
        let mut begin = 0u32;
        for (&count, subgroup) in counts.iter().zip(self.subgroups.iter_mut()) {
            subgroup.texture_window = TextureWindow { begin, count };
            begin = begin.checked_add(count).ok_or_else(|| {
                ConsistencyError::TextureWindowOutOfRange {
                    subgroup: subgroup.id.clone(),
                    begin,
                    count,
                    total,
                }
            })?;
        }
        Ok(())
    }

    /// Windows must lie inside the descriptor table and only aliases may overlap.
    pub fn check_texture_windows(&self) -> Result<()> {
        let total = self.textures.len();
        for subgroup in &self.subgroups {
            let window = subgroup.texture_window;
            if window.end() > total as u64 {
                return Err(ConsistencyError::TextureWindowOutOfRange {
                    subgroup: subgroup.id.clone(),
                    begin: window.begin,
                    count: window.count,
                    total,
                }
                .into());
            }
        }

        let mut order: Vec<&SubgroupRef> = self
            .subgroups
            .iter()
            .filter(|s| s.texture_window.count != 0)
            .collect();
        order.sort_by_key(|s| (s.texture_window.begin, s.texture_window.count));

        let mut widest: Option<&SubgroupRef> = None;
        for current in order {
            if let Some(previous) = widest {
                if previous.texture_window.overlaps(&current.texture_window)
                    && !previous.is_alias_of(current)
                {
                    return Err(ConsistencyError::TextureWindowOverlap {
                        first: previous.id.clone(),
                        first_begin: previous.texture_window.begin,
                        first_count: previous.texture_window.count,
                        second: current.id.clone(),
                        second_begin: current.texture_window.begin,
                        second_count: current.texture_window.count,
                    }
                    .into());
                }
                if current.texture_window.end() <= previous.texture_window.end() {
                    continue;
                }
            }
            widest = Some(current);
        }
        Ok(())
    }

    /// Descriptors of one subgroup's window. Call after [`Self::check_texture_windows`].
    pub fn window_textures(&self, subgroup: usize) -> &[TextureDescriptor] {
        let window = self.subgroups[subgroup].texture_window;
        let end = (window.end() as usize).min(self.textures.len());
        let begin = (window.begin as usize).min(end);
        &self.textures[begin..end]
    }

    /// Resolve atlas placements through the subgroup's window and compare sizes.
    pub fn check_atlas<'a>(
        &self,
        group: &str,
        subgroup: usize,
        placements: impl IntoIterator<Item = (&'a str, &'a AtlasPlacement)>,
    ) -> Result<()> {
        let sub = &self.subgroups[subgroup];
        let window = sub.texture_window;
        for (path, atlas) in placements {
            if atlas.index >= window.count {
                return Err(ConsistencyError::TextureIndexOutOfWindow {
                    group: group.to_string(),
                    subgroup: sub.id.clone(),
                    path: path.to_string(),
                    local_index: atlas.index,
                    begin: window.begin,
                    count: window.count,
                }
                .into());
            }
            let index = (window.begin + atlas.index) as usize;
            let Some(texture) = self.textures.get(index) else {
                return Err(ConsistencyError::TextureWindowOutOfRange {
                    subgroup: sub.id.clone(),
                    begin: window.begin,
                    count: window.count,
                    total: self.textures.len(),
                }
                .into());
            };
            if (texture.width, texture.height) != (atlas.width, atlas.height) {
                return Err(ConsistencyError::DimensionMismatch {
                    group: group.to_string(),
                    subgroup: sub.id.clone(),
                    path: path.to_string(),
                    index,
                    resource_width: atlas.width,
                    resource_height: atlas.height,
                    texture_width: texture.width,
                    texture_height: texture.height,
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn write_groups<W: Write>(&self, writer: &mut W) -> Result<()> {
        let capacity = self.layout.group_capacity;
        for group in &self.groups {
            let stored = group.stored_id();
            if group.subgroups.len() > capacity as usize {
                return Err(FormatError::TooManySubgroups {
                    group: group.id.clone(),
                    count: group.subgroups.len() as u32,
                    capacity,
                }
                .into());
            }
            write_id(writer, &stored)?;
            for &index in &group.subgroups {
                let subgroup = self.subgroups.get(index as usize).ok_or_else(|| {
                    FormatError::SubgroupIndexOutOfRange {
                        group: group.id.clone(),
                        index,
                        count: self.subgroups.len(),
                    }
                })?;
                writer.write_u32::<LE>(index)?;
                writer.write_u32::<LE>(subgroup.resolution)?;
                writer.write_all(&locale_to_bytes(subgroup.locale.as_deref())?)?;
                writer.write_u32::<LE>(0)?;
            }
            writer.write_zeros((capacity as usize - group.subgroups.len()) * 16)?;
            writer.write_u32::<LE>(group.subgroups.len() as u32)?;
        }
        Ok(())
    }

    pub fn write_subgroups<W: Write>(&self, writer: &mut W) -> Result<()> {
        for subgroup in &self.subgroups {
            write_id(writer, &subgroup.id)?;
            writer.write_u32::<LE>(subgroup.byte_offset)?;
            writer.write_u32::<LE>(subgroup.byte_length)?;
            writer.write_u32::<LE>(subgroup.pool_index)?;
            writer.write_all(&subgroup.packet_header)?;
            if self.layout.texture_window {
                writer.write_u32::<LE>(subgroup.texture_window.count)?;
                writer.write_u32::<LE>(subgroup.texture_window.begin)?;
            }
        }
        Ok(())
    }

    pub fn write_pools<W: Write>(&self, writer: &mut W) -> Result<()> {
        for pool in &self.pools {
            write_id(writer, &pool.id)?;
            writer.write_u32::<LE>(pool.general_capacity)?;
            writer.write_u32::<LE>(pool.texture_capacity)?;
            writer.write_u32::<LE>(pool.instance_count)?;
            writer.write_u32::<LE>(pool.flags)?;
            writer.write_u32::<LE>(0)?; // texture begin
            writer.write_u32::<LE>(0)?; // texture count
        }
        Ok(())
    }

    pub fn write_textures<W: Write>(&self, writer: &mut W) -> Result<()> {
        for texture in &self.textures {
            writer.write_u32::<LE>(texture.width)?;
            writer.write_u32::<LE>(texture.height)?;
            writer.write_u32::<LE>(texture.pitch)?;
            writer.write_u32::<LE>(texture.format)?;
            if self.texture_record_size >= 0x14 {
                writer.write_u32::<LE>(texture.alpha_size.unwrap_or(0))?;
            }
            if self.texture_record_size >= 0x18 {
                writer.write_u32::<LE>(texture.scale.unwrap_or(0))?;
            }
        }
        Ok(())
    }
}

/// Entries of an id table must name exactly the records they index.
pub fn check_id_table(table: &'static str, entries: &[(String, u32)], ids: &[&str]) -> Result<()> {
    if entries.len() != ids.len() {
        return Err(ConsistencyError::TableSize {
            table,
            entries: entries.len(),
            records: ids.len(),
        }
        .into());
    }
    for (key, index) in entries {
        match ids.get(*index as usize) {
            Some(id) if id.eq_ignore_ascii_case(key) => {}
            record => {
                return Err(ConsistencyError::TableMismatch {
                    table,
                    key: key.clone(),
                    index: *index,
                    record: record.map(|id| id.to_string()).unwrap_or_default(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn write_id<W: Write>(writer: &mut W, id: &str) -> Result<()> {
    if id.len() >= ID_SLOT_SIZE {
        return Err(FormatError::IdTooLong {
            id: id.to_string(),
            capacity: ID_SLOT_SIZE,
        }
        .into());
    }
    writer.write_fixed_string(id, ID_SLOT_SIZE)?;
    Ok(())
}

fn read_textures<R: Read + Seek>(
    reader: &mut R,
    section: &RecordSection,
) -> Result<Vec<TextureDescriptor>> {
    reader.seek(SeekFrom::Start(section.offset as u64))?;
    let mut textures = Vec::with_capacity(section.count as usize);
    for _ in 0..section.count {
        let mut texture = TextureDescriptor {
            width: reader.read_u32::<LE>()?,
            height: reader.read_u32::<LE>()?,
            pitch: reader.read_u32::<LE>()?,
            format: reader.read_u32::<LE>()?,
            ..Default::default()
        };
        if section.record_size >= 0x14 {
            texture.alpha_size = Some(reader.read_u32::<LE>()?);
        }
        if section.record_size >= 0x18 {
            texture.scale = Some(reader.read_u32::<LE>()?);
        }
        textures.push(texture);
    }
    Ok(textures)
}

fn read_pools<R: Read + Seek>(reader: &mut R, section: &RecordSection) -> Result<Vec<Pool>> {
    let mut pools = Vec::with_capacity(section.count as usize);
    for i in 0..section.count {
        reader.seek(SeekFrom::Start(section.record_offset(i)))?;
        let id = reader.read_fixed_string(ID_SLOT_SIZE)?;
        let general_capacity = reader.read_u32::<LE>()?;
        let texture_capacity = reader.read_u32::<LE>()?;
        let instance_count = reader.read_u32::<LE>()?;
        let flags = reader.read_u32::<LE>()?;
        let begin = reader.read_u32::<LE>()?;
        let count = reader.read_u32::<LE>()?;
        if begin != 0 || count != 0 {
            return Err(FormatError::PoolTextureWindow {
                pool: id,
                begin,
                count,
            }
            .into());
        }
        pools.push(Pool {
            id,
            general_capacity,
            texture_capacity,
            instance_count,
            flags,
        });
    }
    Ok(pools)
}

fn read_subgroups<R: Read + Seek>(
    reader: &mut R,
    section: &RecordSection,
    layout: &FormatLayout,
    pool_count: usize,
) -> Result<Vec<SubgroupRef>> {
    let mut subgroups = Vec::with_capacity(section.count as usize);
    for i in 0..section.count {
        reader.seek(SeekFrom::Start(section.record_offset(i)))?;
        let id = reader.read_fixed_string(ID_SLOT_SIZE)?;
        let byte_offset = reader.read_u32::<LE>()?;
        let byte_length = reader.read_u32::<LE>()?;
        let pool_index = reader.read_u32::<LE>()?;
        if pool_index as usize >= pool_count {
            return Err(FormatError::PoolIndexOutOfRange {
                subgroup: id,
                index: pool_index,
                count: pool_count,
            }
            .into());
        }
        let mut packet_header = [0u8; MIRROR_SIZE];
        reader.read_exact(&mut packet_header)?;

        let mut texture_window = TextureWindow::default();
        if layout.texture_window {
            texture_window.count = reader.read_u32::<LE>()?;
            texture_window.begin = reader.read_u32::<LE>()?;
        }

        subgroups.push(SubgroupRef {
            id,
            byte_offset,
            byte_length,
            pool_index,
            resolution: 0,
            locale: None,
            packet_header,
            texture_window,
        });
    }
    Ok(subgroups)
}

/// Reads group records and copies each entry's resolution and locale onto its subgroup.
fn read_groups<R: Read + Seek>(
    reader: &mut R,
    section: &RecordSection,
    layout: &FormatLayout,
    subgroups: &mut [SubgroupRef],
) -> Result<Vec<GroupRef>> {
    let mut groups = Vec::with_capacity(section.count as usize);
    for i in 0..section.count {
        let start = section.record_offset(i);
        reader.seek(SeekFrom::Start(start))?;
        let stored = reader.read_fixed_string(ID_SLOT_SIZE)?;
        let (id, composite) = split_group_id(&stored);

        reader.seek(SeekFrom::Start(start + section.record_size as u64 - 4))?;
        let count = reader.read_u32::<LE>()?;
        if count > layout.group_capacity {
            return Err(FormatError::TooManySubgroups {
                group: id,
                count,
                capacity: layout.group_capacity,
            }
            .into());
        }

        reader.seek(SeekFrom::Start(start + ID_SLOT_SIZE as u64))?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = reader.read_u32::<LE>()?;
            let resolution = reader.read_u32::<LE>()?;
            let mut locale = [0u8; 4];
            reader.read_exact(&mut locale)?;
            reader.read_u32::<LE>()?; // reserved

            let total = subgroups.len();
            let subgroup = subgroups.get_mut(index as usize).ok_or_else(|| {
                FormatError::SubgroupIndexOutOfRange {
                    group: id.clone(),
                    index,
                    count: total,
                }
            })?;
            subgroup.resolution = resolution;
            subgroup.locale = locale_from_bytes(locale)?;
            members.push(index);
        }

        groups.push(GroupRef {
            id,
            composite,
            subgroups: members,
        });
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RsbError;
    use crate::header::{GROUP_RECORD_SIZE, POOL_RECORD_SIZE};
    use std::io::Cursor;

    fn subgroup(id: &str, byte_offset: u32, begin: u32, count: u32) -> SubgroupRef {
        SubgroupRef {
            id: id.to_string(),
            byte_offset,
            byte_length: 4096,
            pool_index: 0,
            resolution: 1536,
            locale: None,
            packet_header: [0; MIRROR_SIZE],
            texture_window: TextureWindow { begin, count },
        }
    }

    fn texture(width: u32, height: u32) -> TextureDescriptor {
        TextureDescriptor {
            width,
            height,
            pitch: width * 4,
            format: 0,
            alpha_size: Some(0),
            scale: Some(100),
        }
    }

    fn registry(version: u32, subgroups: Vec<SubgroupRef>) -> PoolRegistry {
        let members = (0..subgroups.len() as u32).collect();
        PoolRegistry {
            layout: FormatLayout::for_version(version).unwrap(),
            texture_record_size: 0x18,
            groups: vec![GroupRef {
                id: "Foo".to_string(),
                composite: false,
                subgroups: members,
            }],
            pools: subgroups
                .iter()
                .map(|s| Pool::for_subgroup(&s.id, 4096, 0))
                .collect(),
            subgroups,
            textures: vec![texture(64, 64), texture(128, 32), texture(16, 16)],
        }
    }

    fn header_for(registry: &PoolRegistry, record_size: u32) -> RsbHeader {
        let layout = registry.layout;
        let textures = RecordSection {
            count: registry.textures.len() as u32,
            offset: 0,
            record_size,
        };
        let pools = RecordSection {
            count: registry.pools.len() as u32,
            offset: textures.byte_len() as u32,
            record_size: POOL_RECORD_SIZE,
        };
        let subgroups = RecordSection {
            count: registry.subgroups.len() as u32,
            offset: pools.offset + pools.byte_len() as u32,
            record_size: layout.subgroup_record_size,
        };
        let groups = RecordSection {
            count: registry.groups.len() as u32,
            offset: subgroups.offset + subgroups.byte_len() as u32,
            record_size: GROUP_RECORD_SIZE,
        };
        RsbHeader {
            version: layout.version,
            textures,
            pools,
            subgroups,
            groups,
            ..Default::default()
        }
    }

    fn write_all(registry: &PoolRegistry) -> Vec<u8> {
        let mut buf = Vec::new();
        registry.write_textures(&mut buf).unwrap();
        registry.write_pools(&mut buf).unwrap();
        registry.write_subgroups(&mut buf).unwrap();
        registry.write_groups(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_records_roundtrip() {
        for version in FormatLayout::supported_versions() {
            let mut a = subgroup("Foo_1536", 0x1000, 0, 2);
            a.locale = Some("EN".to_string());
            a.packet_header[0] = 3;
            let mut b = subgroup("Foo_768", 0x2000, 2, 1);
            b.pool_index = 1;
            b.resolution = 768;
            let mut expected = registry(version, vec![a, b]);
            if !expected.layout.texture_window {
                expected.derive_windows(&[2, 1]).unwrap();
            }

            let bytes = write_all(&expected);
            let header = header_for(&expected, 0x18);
            let mut decoded = PoolRegistry::read(&mut Cursor::new(&bytes), &header).unwrap();
            if !decoded.layout.texture_window {
                decoded.derive_windows(&[2, 1]).unwrap();
            }
            assert_eq!(decoded, expected);
            assert_eq!(decoded.subgroups[0].compression_flags(), 3);
            decoded.check_texture_windows().unwrap();
        }
    }

    #[test]
    fn test_record_sizes_match_layout() {
        let reg = registry(3, vec![subgroup("Foo_1536", 0, 0, 1)]);
        let mut buf = Vec::new();
        reg.write_groups(&mut buf).unwrap();
        assert_eq!(buf.len() as u32, GROUP_RECORD_SIZE);
        buf.clear();
        reg.write_pools(&mut buf).unwrap();
        assert_eq!(buf.len() as u32, POOL_RECORD_SIZE);
        buf.clear();
        reg.write_subgroups(&mut buf).unwrap();
        assert_eq!(buf.len(), 204);

        let v1 = registry(1, vec![subgroup("Foo_1536", 0, 0, 1)]);
        buf.clear();
        v1.write_subgroups(&mut buf).unwrap();
        assert_eq!(buf.len(), 196);
    }

    #[test]
    fn test_texture_record_size_gates_optional_fields() {
        let mut reg = registry(3, vec![subgroup("Foo_1536", 0, 0, 3)]);
        for (size, has_alpha, has_scale) in [(0x10, false, false), (0x14, true, false), (0x18, true, true)] {
            reg.texture_record_size = size;
            let bytes = write_all(&reg);
            let header = header_for(&reg, size);
            let decoded = PoolRegistry::read(&mut Cursor::new(&bytes), &header).unwrap();
            for texture in &decoded.textures {
                assert_eq!(texture.alpha_size.is_some(), has_alpha);
                assert_eq!(texture.scale.is_some(), has_scale);
            }
        }
    }

    #[test]
    fn test_pool_texture_window_must_be_empty() {
        let reg = registry(3, vec![subgroup("Foo_1536", 0, 0, 1)]);
        let mut bytes = write_all(&reg);
        let header = header_for(&reg, 0x18);
        let pool_start = header.pools.offset as usize;
        bytes[pool_start + 148..pool_start + 152].copy_from_slice(&1u32.to_le_bytes());
        let err = PoolRegistry::read(&mut Cursor::new(&bytes), &header).unwrap_err();
        assert!(matches!(
            err,
            RsbError::Format(FormatError::PoolTextureWindow { count: 1, .. })
        ));
    }

    #[test]
    fn test_orphan_and_shared_subgroups() {
        let mut reg = registry(3, vec![subgroup("A", 0, 0, 1), subgroup("B", 4096, 1, 1)]);
        reg.groups[0].subgroups = vec![0];
        assert!(matches!(
            reg.check_unique_ids(),
            Err(RsbError::Consistency(ConsistencyError::OrphanSubgroup(ref id))) if id == "B"
        ));

        reg.groups.push(GroupRef {
            id: "Bar".to_string(),
            composite: true,
            subgroups: vec![0, 1],
        });
        assert!(matches!(
            reg.check_unique_ids(),
            Err(RsbError::Consistency(ConsistencyError::SharedSubgroup { .. }))
        ));
    }

    #[test]
    fn test_window_checks() {
        let reg = registry(3, vec![subgroup("A", 0, 0, 2), subgroup("B", 4096, 1, 2)]);
        assert!(matches!(
            reg.check_texture_windows(),
            Err(RsbError::Consistency(ConsistencyError::TextureWindowOverlap { .. }))
        ));

        let aliases = registry(3, vec![subgroup("A", 0, 0, 2), subgroup("B", 0, 0, 2)]);
        aliases.check_texture_windows().unwrap();

        let out_of_range = registry(3, vec![subgroup("A", 0, 2, 5)]);
        assert!(matches!(
            out_of_range.check_texture_windows(),
            Err(RsbError::Consistency(ConsistencyError::TextureWindowOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_derived_windows_reject_overflow() {
        let mut reg = registry(1, vec![subgroup("A", 0, 0, 0), subgroup("B", 4096, 0, 0)]);
        assert!(matches!(
            reg.derive_windows(&[u32::MAX, 1]),
            Err(RsbError::Consistency(ConsistencyError::TextureWindowOutOfRange { ref subgroup, .. }))
                if subgroup == "B"
        ));
    }

    #[test]
    fn test_atlas_dimension_mismatch() {
        let reg = registry(3, vec![subgroup("Foo_1536", 0, 1, 2)]);
        let good = AtlasPlacement {
            index: 0,
            width: 128,
            height: 32,
        };
        reg.check_atlas("Foo", 0, [("images/a.ptx", &good)]).unwrap();

        let bad = AtlasPlacement {
            index: 1,
            width: 32,
            height: 32,
        };
        let err = reg.check_atlas("Foo", 0, [("images/b.ptx", &bad)]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Foo"));
        assert!(message.contains("Foo_1536"));
        assert!(message.contains("32x32"));
        assert!(message.contains("16x16"));

        let outside = AtlasPlacement {
            index: 2,
            width: 16,
            height: 16,
        };
        assert!(matches!(
            reg.check_atlas("Foo", 0, [("images/c.ptx", &outside)]),
            Err(RsbError::Consistency(ConsistencyError::TextureIndexOutOfWindow { .. }))
        ));
    }

    #[test]
    fn test_id_table_cross_check() {
        let entries = vec![("FOO_1536".to_string(), 0), ("Foo_768".to_string(), 1)];
        check_id_table("subgroup", &entries, &["Foo_1536", "Foo_768"]).unwrap();
        assert!(matches!(
            check_id_table("subgroup", &entries, &["Foo_768", "Foo_1536"]),
            Err(RsbError::Consistency(ConsistencyError::TableMismatch { .. }))
        ));
        assert!(matches!(
            check_id_table("subgroup", &entries, &["Foo_1536"]),
            Err(RsbError::Consistency(ConsistencyError::TableSize { .. }))
        ));
    }
}
