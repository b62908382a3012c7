use crate::error::{FormatError, Result};
use crate::manifest::Manifest;
use crate::packet::Packet;
use serde::{Deserialize, Serialize};

/// Stored group ids with this suffix belong to non-composite groups.
pub const COMPOSITE_SHELL_SUFFIX: &str = "_CompositeShell";

/// Logical view of a bundle; serialized as `data.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub version: u32,
    /// 16, 20 or 24; decides which optional descriptor fields exist.
    pub texture_record_size: u32,
    pub group: Vec<Group>,
    #[serde(skip)]
    pub manifest: Option<Manifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub composite: bool,
    pub subgroup: Vec<Subgroup>,
}

impl Group {
    /// The id as written to the group record and id table.
    pub fn stored_id(&self) -> String {
        stored_group_id(&self.id, self.composite)
    }
}

pub fn stored_group_id(id: &str, composite: bool) -> String {
    if composite {
        id.to_string()
    } else {
        format!("{id}{COMPOSITE_SHELL_SUFFIX}")
    }
}

/// Split a stored group id into its logical id and composite flag.
pub fn split_group_id(stored: &str) -> (String, bool) {
    match stored.strip_suffix(COMPOSITE_SHELL_SUFFIX) {
        Some(id) => (id.to_string(), false),
        None => (stored.to_string(), true),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgroup {
    pub id: String,
    pub resolution: u32,
    pub locale: Option<String>,
    /// Descriptors of this subgroup's texture window, in window order.
    #[serde(default)]
    pub texture: Vec<TextureDescriptor>,
    pub packet: Packet,
    /// Embedded packet bytes exactly as stored; used as-is when packing.
    #[serde(skip)]
    pub packet_data: Option<Vec<u8>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub format: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

/// Half-open range `[begin, begin + count)` into the global descriptor table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TextureWindow {
    pub begin: u32,
    pub count: u32,
}

impl TextureWindow {
    pub fn end(&self) -> u64 {
        self.begin as u64 + self.count as u64
    }

    pub fn overlaps(&self, other: &TextureWindow) -> bool {
        self.count != 0
            && other.count != 0
            && (self.begin as u64) < other.end()
            && (other.begin as u64) < self.end()
    }
}

/// Decode a packed locale code. Zero means no locale.
pub fn locale_from_bytes(raw: [u8; 4]) -> Result<Option<String>> {
    if raw == [0; 4] {
        return Ok(None);
    }
    let end = raw.iter().position(|&b| b == 0).unwrap_or(4);
    let code = &raw[..end];
    if !code.is_ascii() || raw[end..].iter().any(|&b| b != 0) {
        return Err(FormatError::InvalidLocale(String::from_utf8_lossy(&raw).to_string()).into());
    }
    Ok(Some(String::from_utf8_lossy(code).to_string()))
}

pub fn locale_to_bytes(locale: Option<&str>) -> Result<[u8; 4]> {
    let mut raw = [0u8; 4];
    if let Some(code) = locale {
        let bytes = code.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 || !code.is_ascii() || bytes.contains(&0) {
            return Err(FormatError::InvalidLocale(code.to_string()).into());
        }
        raw[..bytes.len()].copy_from_slice(bytes);
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RsbError;

    #[test]
    fn test_composite_suffix() {
        assert_eq!(
            split_group_id("Foo_CompositeShell"),
            ("Foo".to_string(), false)
        );
        assert_eq!(split_group_id("Foo"), ("Foo".to_string(), true));

        let group = Group {
            id: "Foo".to_string(),
            composite: false,
            subgroup: Vec::new(),
        };
        assert_eq!(group.stored_id(), "Foo_CompositeShell");
    }

    #[test]
    fn test_locale_codes() {
        assert_eq!(locale_from_bytes([0; 4]).unwrap(), None);
        assert_eq!(
            locale_from_bytes(*b"ENUS").unwrap(),
            Some("ENUS".to_string())
        );
        assert_eq!(locale_from_bytes(*b"EN\0\0").unwrap(), Some("EN".to_string()));
        assert_eq!(locale_to_bytes(Some("EN")).unwrap(), *b"EN\0\0");
        assert_eq!(locale_to_bytes(None).unwrap(), [0; 4]);
    }

    #[test]
    fn test_invalid_locale() {
        assert!(matches!(
            locale_to_bytes(Some("ENGLISH")),
            Err(RsbError::Format(FormatError::InvalidLocale(_)))
        ));
        assert!(matches!(
            locale_from_bytes([b'E', 0, b'N', 0]),
            Err(RsbError::Format(FormatError::InvalidLocale(_)))
        ));
    }

    #[test]
    fn test_window_overlap() {
        let a = TextureWindow { begin: 0, count: 2 };
        let b = TextureWindow { begin: 1, count: 1 };
        let c = TextureWindow { begin: 2, count: 3 };
        let empty = TextureWindow { begin: 1, count: 0 };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&empty));
    }
}
