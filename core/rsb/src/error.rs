use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RsbError>;

#[derive(Error, Debug)]
pub enum RsbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error(transparent)]
    Trie(#[from] TrieError),
    #[error("{part} part compression failed: {source}")]
    Compression {
        part: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("packet {subgroup}: {source}")]
    Packet {
        subgroup: String,
        #[source]
        source: Box<RsbError>,
    },
}

impl RsbError {
    pub(crate) fn in_packet(self, subgroup: &str) -> Self {
        match self {
            RsbError::Packet { .. } => self,
            other => RsbError::Packet {
                subgroup: subgroup.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Layout violations: wrong magic, unknown versions, malformed records.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("invalid {section} magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        section: &'static str,
        expected: String,
        actual: String,
    },
    #[error("unsupported {section} version {version}")]
    UnsupportedVersion { section: &'static str, version: u32 },
    #[error("invalid {section} record size: expected {expected}, got {actual}")]
    InvalidRecordSize {
        section: &'static str,
        expected: String,
        actual: u32,
    },
    #[error(
        "partial manifest offsets (group={group:#x}, resource={resource:#x}, string={string:#x}): all three must be zero or all non-zero"
    )]
    PartialManifest { group: u32, resource: u32, string: u32 },
    #[error("{section} at {offset:#x} (+{size:#x}) exceeds stream length {len:#x}")]
    SectionOutOfBounds {
        section: String,
        offset: u64,
        size: u64,
        len: u64,
    },
    #[error("unexpected {field} in {section}: expected {expected:#x}, got {actual:#x}")]
    UnexpectedValue {
        section: &'static str,
        field: &'static str,
        expected: u32,
        actual: u32,
    },
    #[error("group {group}: {count} subgroups exceed the record capacity of {capacity}")]
    TooManySubgroups {
        group: String,
        count: u32,
        capacity: u32,
    },
    #[error("id {id:?} does not fit a {capacity}-byte slot")]
    IdTooLong { id: String, capacity: usize },
    #[error("invalid locale code {0:?}")]
    InvalidLocale(String),
    #[error("unknown compression flags {0:#x}")]
    UnknownCompressionFlags(u32),
    #[error("unknown packet resource kind {0}")]
    UnknownResourceKind(u32),
    #[error("resource {path}: atlas index {index} is out of range")]
    AtlasIndexOverflow { path: String, index: u32 },
    #[error("resource {path}: atlas resources need an atlas placement and general resources must not have one")]
    ResourceKindMismatch { path: String },
    #[error("{part} part decompressed to {actual} bytes, header says {expected}")]
    PartSizeMismatch {
        part: &'static str,
        expected: u32,
        actual: usize,
    },
    #[error("resource {path}: {offset:#x}+{size:#x} lies outside the {part} part ({len:#x} bytes)")]
    ResourceOutOfBounds {
        path: String,
        part: &'static str,
        offset: u32,
        size: u32,
        len: usize,
    },
    #[error("string offset {offset:#x} is outside the string blob ({len:#x} bytes)")]
    StringOutOfRange { offset: u32, len: usize },
    #[error("string {0:?} contains a null byte")]
    InvalidString(String),
    #[error("group {group}: subgroup index {index} out of range ({count} subgroups)")]
    SubgroupIndexOutOfRange {
        group: String,
        index: u32,
        count: usize,
    },
    #[error("subgroup {subgroup}: pool index {index} out of range ({count} pools)")]
    PoolIndexOutOfRange {
        subgroup: String,
        index: u32,
        count: usize,
    },
    #[error("pool {pool}: texture window ({begin}, {count}) must be empty")]
    PoolTextureWindow { pool: String, begin: u32, count: u32 },
    #[error("resource path {path:?}: pool index {index} out of range ({count} pools)")]
    ResourcePoolOutOfRange {
        path: String,
        index: u32,
        count: usize,
    },
}

/// Cross-table disagreements; treated as corruption and never repaired.
#[derive(Error, Debug)]
pub enum ConsistencyError {
    #[error(
        "group {group} / subgroup {subgroup}: atlas resource {path} is {resource_width}x{resource_height} but texture descriptor {index} is {texture_width}x{texture_height}"
    )]
    DimensionMismatch {
        group: String,
        subgroup: String,
        path: String,
        index: usize,
        resource_width: u32,
        resource_height: u32,
        texture_width: u32,
        texture_height: u32,
    },
    #[error(
        "group {group} / subgroup {subgroup}: atlas resource {path} uses texture {local_index} outside the window ({begin}, {count})"
    )]
    TextureIndexOutOfWindow {
        group: String,
        subgroup: String,
        path: String,
        local_index: u32,
        begin: u32,
        count: u32,
    },
    #[error(
        "subgroup {subgroup}: texture window depends on the texture count of skipped packet {skipped}"
    )]
    SkippedTextureWindow { subgroup: String, skipped: String },
    #[error("subgroup {subgroup}: texture window ({begin}, {count}) exceeds {total} descriptors")]
    TextureWindowOutOfRange {
        subgroup: String,
        begin: u32,
        count: u32,
        total: usize,
    },
    #[error("texture windows of subgroups {first} ({first_begin}, {first_count}) and {second} ({second_begin}, {second_count}) overlap")]
    TextureWindowOverlap {
        first: String,
        first_begin: u32,
        first_count: u32,
        second: String,
        second_begin: u32,
        second_count: u32,
    },
    #[error("subgroup {subgroup}: packet header mirror in the subgroup record differs from the embedded packet")]
    PacketHeaderMismatch { subgroup: String },
    #[error("subgroup {0} is not referenced by any group")]
    OrphanSubgroup(String),
    #[error("subgroup {subgroup} is referenced by both {first} and {second}")]
    SharedSubgroup {
        subgroup: String,
        first: String,
        second: String,
    },
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("{table} table maps {key:?} to index {index}, but that record is {record:?}")]
    TableMismatch {
        table: &'static str,
        key: String,
        index: u32,
        record: String,
    },
    #[error("{table} table has {entries} entries for {records} records")]
    TableSize {
        table: &'static str,
        entries: usize,
        records: usize,
    },
}

/// Corruption inside a serialized path table.
#[derive(Error, Debug)]
pub enum TrieError {
    #[error("path table ends at word {position} with an open key or {pending} unresolved branches")]
    Unterminated { position: u32, pending: usize },
    #[error("path table unit at word {position} points back to word {target}")]
    BackwardOffset { position: u32, target: u32 },
    #[error("path table units at word {position} and earlier both branch to word {target}")]
    ConflictingBranch { position: u32, target: u32 },
    #[error("path table unit at word {position} is not reachable from any branch")]
    Unreachable { position: u32 },
    #[error("path table length {0} is not a multiple of 4")]
    Misaligned(usize),
    #[error("path table offset {0} does not fit 24 bits")]
    OffsetOverflow(usize),
    #[error("path table key {0:?} must be ASCII without null bytes")]
    NonAsciiKey(String),
    #[error("duplicate path table key {0:?}")]
    DuplicateKey(String),
}
