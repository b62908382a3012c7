//! Prefix-sharing string table used by every id and path index.
//!
//! A table is a run of 4-byte units `{ u8 char, u24 offset }`. The offset of a
//! unit, when non-zero, is the word position (byte offset / 4 from the table
//! start) of the next sibling branch: the key continues there from the prefix
//! that was accumulated *before* this unit's char. A unit with char `0` ends a
//! key and is followed by that key's fixed-size value record.
//!
//! Keys are assembled into an in-memory trie first; serialization is a separate
//! preorder pass over that trie, and decoding rebuilds the trie from a single
//! forward scan before flattening it back into `(key, value)` pairs.

use crate::error::{Result, TrieError};
use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

const ROOT: usize = 0;
const MAX_OFFSET: usize = 0x00FF_FFFF;

/// Fixed-size record stored after each terminal unit.
pub trait PathTableValue: Sized {
    fn read(reader: &mut impl Read) -> Result<Self>;
    fn write(&self, writer: &mut impl Write) -> Result<()>;
}

impl PathTableValue for u32 {
    fn read(reader: &mut impl Read) -> Result<Self> {
        Ok(reader.read_u32::<LE>()?)
    }

    fn write(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_u32::<LE>(*self)?;
        Ok(())
    }
}

struct Node<V> {
    byte: u8,
    value: Option<V>,
    children: Vec<usize>,
}

struct Trie<V> {
    nodes: Vec<Node<V>>,
}

impl<V: PathTableValue> Trie<V> {
    fn new() -> Self {
        Trie {
            nodes: vec![Node {
                byte: 0,
                value: None,
                children: Vec::new(),
            }],
        }
    }

    fn push(&mut self, parent: usize, byte: u8, value: Option<V>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            byte,
            value,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Share the prefix of the most recently inserted key only, so a sorted
    /// key sequence produces the canonical layout.
    fn insert(&mut self, key: &[u8], value: V) {
        let mut parent = ROOT;
        let mut depth = 0;
        while depth < key.len() {
            match self.nodes[parent].children.last() {
                Some(&child) if self.nodes[child].byte == key[depth] => {
                    parent = child;
                    depth += 1;
                }
                _ => break,
            }
        }
        for &byte in &key[depth..] {
            parent = self.push(parent, byte, None);
        }
        self.push(parent, 0, Some(value));
    }

    fn linearize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.emit_children(ROOT, &mut out)?;
        Ok(out)
    }

    fn emit_children(&self, parent: usize, out: &mut Vec<u8>) -> Result<()> {
        let mut previous_unit: Option<usize> = None;
        for &child in &self.nodes[parent].children {
            let position = out.len();
            if let Some(unit) = previous_unit {
                patch_offset(out, unit, position / 4)?;
            }
            previous_unit = Some(position);

            let node = &self.nodes[child];
            out.write_u8(node.byte)?;
            out.write_u24::<LE>(0)?;
            if let Some(value) = &node.value {
                value.write(out)?;
            }
            self.emit_children(child, out)?;
        }
        Ok(())
    }

    fn into_entries(mut self, count_hint: usize) -> Vec<(String, V)> {
        let mut entries = Vec::with_capacity(count_hint);
        let mut path = String::new();
        self.collect(ROOT, &mut path, &mut entries);
        entries
    }

    fn collect(&mut self, node: usize, path: &mut String, out: &mut Vec<(String, V)>) {
        let children = std::mem::take(&mut self.nodes[node].children);
        for child in children {
            let byte = self.nodes[child].byte;
            if byte == 0 {
                if let Some(value) = self.nodes[child].value.take() {
                    out.push((path.clone(), value));
                }
            } else {
                path.push(if byte == b'\\' { '/' } else { byte as char });
                self.collect(child, path, out);
                path.pop();
            }
        }
    }
}

fn patch_offset(out: &mut [u8], unit: usize, target: usize) -> Result<()> {
    if target > MAX_OFFSET {
        return Err(TrieError::OffsetOverflow(target).into());
    }
    let mut slot = &mut out[unit + 1..unit + 4];
    slot.write_u24::<LE>(target as u32)?;
    Ok(())
}

/// Table order: ASCII-uppercase first, raw bytes as the tie-break.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_uppercase())
        .cmp(b.bytes().map(|c| c.to_ascii_uppercase()))
        .then_with(|| a.cmp(b))
}

/// Convert a logical `/` path to the `\` form stored on the wire.
pub fn to_wire_path(path: &str) -> String {
    path.replace('/', "\\")
}

pub fn encode<V: PathTableValue>(mut entries: Vec<(String, V)>) -> Result<Vec<u8>> {
    for (key, _) in &entries {
        if !key.is_ascii() || key.contains('\0') {
            return Err(TrieError::NonAsciiKey(key.clone()).into());
        }
    }
    entries.sort_by(|a, b| compare_keys(&a.0, &b.0));
    if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(TrieError::DuplicateKey(pair[0].0.clone()).into());
    }

    let mut trie = Trie::new();
    for (key, value) in entries {
        trie.insert(key.as_bytes(), value);
    }
    trie.linearize()
}

pub fn decode<V: PathTableValue>(data: &[u8], count_hint: usize) -> Result<Vec<(String, V)>> {
    if data.len() % 4 != 0 {
        return Err(TrieError::Misaligned(data.len()).into());
    }

    let mut trie: Trie<V> = Trie::new();
    let mut pending: HashMap<u32, usize> = HashMap::new();
    let mut cursor = Cursor::new(data);
    let mut parent = ROOT;
    let mut open = false;

    while (cursor.position() as usize) < data.len() {
        let position = (cursor.position() / 4) as u32;
        match pending.remove(&position) {
            Some(_) if open => {
                return Err(TrieError::Unterminated {
                    position,
                    pending: pending.len() + 1,
                }
                .into());
            }
            Some(branch) => parent = branch,
            None if !open && position != 0 => {
                return Err(TrieError::Unreachable { position }.into());
            }
            None => {}
        }

        let byte = cursor.read_u8()?;
        let target = cursor.read_u24::<LE>()?;
        if target != 0 {
            if target <= position {
                return Err(TrieError::BackwardOffset { position, target }.into());
            }
            if pending.insert(target, parent).is_some() {
                return Err(TrieError::ConflictingBranch { position, target }.into());
            }
        }

        if byte == 0 {
            let value = V::read(&mut cursor)?;
            trie.push(parent, 0, Some(value));
            open = false;
        } else {
            parent = trie.push(parent, byte, None);
            open = true;
        }
    }

    if open || !pending.is_empty() {
        return Err(TrieError::Unterminated {
            position: (data.len() / 4) as u32,
            pending: pending.len(),
        }
        .into());
    }

    Ok(trie.into_entries(count_hint))
}

/// Read a table of `size` bytes located at `offset`.
pub fn read_table<V: PathTableValue, R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    size: u64,
    count_hint: usize,
) -> Result<Vec<(String, V)>> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut data = vec![0u8; size as usize];
    reader.read_exact(&mut data)?;
    decode(&data, count_hint)
}
