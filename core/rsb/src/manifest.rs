//! Optional per-resource property tree stored after the texture descriptors.
//!
//! Three sections: group entries, resource records and the string blob they
//! both point into. `parent` names are kept as written; nothing here checks
//! that they resolve.

use crate::error::{FormatError, Result};
use crate::string_blob::{StringBlob, StringBlobBuilder};
use crate::types::{locale_from_bytes, locale_to_bytes};
use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Seek, SeekFrom};

const SUBGROUP_ENTRY_SIZE: u32 = 0x10;
const RESOURCE_HEADER_SIZE: u16 = 0x1C;
const IMAGE_PROPERTY_SIZE: u32 = 0x18;

/// Serialized as `resource.json`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub group: Vec<ManifestGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestGroup {
    pub id: String,
    pub subgroup: Vec<ManifestSubgroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSubgroup {
    pub id: String,
    pub resolution: u32,
    pub locale: Option<String>,
    pub resource: Vec<ManifestResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestResource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u16,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_property: Option<ImageProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub property: Vec<ManifestProperty>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageProperty {
    #[serde(rename = "type")]
    pub kind: u16,
    pub flags: u16,
    pub x: u16,
    pub y: u16,
    pub ax: u16,
    pub ay: u16,
    pub aw: u16,
    pub ah: u16,
    pub rows: u16,
    pub cols: u16,
    /// Id of the image this one is cut from; may name nothing.
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestProperty {
    pub key: String,
    pub value: String,
}

/// The three serialized sections, each starting at offset 0.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ManifestSections {
    pub group: Vec<u8>,
    pub resource: Vec<u8>,
    pub string: Vec<u8>,
}

impl Manifest {
    pub fn resource_count(&self) -> usize {
        self.group
            .iter()
            .flat_map(|g| &g.subgroup)
            .map(|s| s.resource.len())
            .sum()
    }

    pub fn decode(group: &[u8], resource: &[u8], string: &[u8]) -> Result<Self> {
        let strings = StringBlob::new(string);
        let mut cursor = Cursor::new(group);
        let mut groups = Vec::new();

        while (cursor.position() as usize) < group.len() {
            let id = strings.get(cursor.read_u32::<LE>()?)?;
            let subgroup_count = cursor.read_u32::<LE>()?;
            let entry_size = cursor.read_u32::<LE>()?;
            if entry_size != SUBGROUP_ENTRY_SIZE {
                return Err(FormatError::UnexpectedValue {
                    section: "group manifest",
                    field: "subgroup entry size",
                    expected: SUBGROUP_ENTRY_SIZE,
                    actual: entry_size,
                }
                .into());
            }

            let mut subgroups = Vec::with_capacity(subgroup_count as usize);
            for _ in 0..subgroup_count {
                let resolution = cursor.read_u32::<LE>()?;
                let mut locale = [0u8; 4];
                cursor.read_exact(&mut locale)?;
                let id = strings.get(cursor.read_u32::<LE>()?)?;
                let resource_count = cursor.read_u32::<LE>()?;

                let mut resources = Vec::with_capacity(resource_count as usize);
                for _ in 0..resource_count {
                    let offset = cursor.read_u32::<LE>()?;
                    resources.push(decode_resource(resource, offset, &strings)?);
                }
                subgroups.push(ManifestSubgroup {
                    id,
                    resolution,
                    locale: locale_from_bytes(locale)?,
                    resource: resources,
                });
            }
            groups.push(ManifestGroup {
                id,
                subgroup: subgroups,
            });
        }

        Ok(Manifest { group: groups })
    }

    pub fn encode(&self) -> Result<ManifestSections> {
        let mut strings = StringBlobBuilder::new();
        let mut group = Vec::new();
        let mut resource = Vec::new();

        for g in &self.group {
            group.write_u32::<LE>(strings.intern(&g.id)?)?;
            group.write_u32::<LE>(g.subgroup.len() as u32)?;
            group.write_u32::<LE>(SUBGROUP_ENTRY_SIZE)?;
            for s in &g.subgroup {
                group.write_u32::<LE>(s.resolution)?;
                group.extend_from_slice(&locale_to_bytes(s.locale.as_deref())?);
                group.write_u32::<LE>(strings.intern(&s.id)?)?;
                group.write_u32::<LE>(s.resource.len() as u32)?;
                for r in &s.resource {
                    group.write_u32::<LE>(resource.len() as u32)?;
                    encode_resource(&mut resource, r, &mut strings)?;
                }
            }
        }

        Ok(ManifestSections {
            group,
            resource,
            string: strings.into_bytes(),
        })
    }
}

fn decode_resource(section: &[u8], offset: u32, strings: &StringBlob) -> Result<ManifestResource> {
    if offset as usize >= section.len() {
        return Err(FormatError::SectionOutOfBounds {
            section: "resource manifest record".to_string(),
            offset: offset as u64,
            size: RESOURCE_HEADER_SIZE as u64,
            len: section.len() as u64,
        }
        .into());
    }
    let mut cursor = Cursor::new(section);
    cursor.seek(SeekFrom::Start(offset as u64))?;

    cursor.read_u32::<LE>()?; // reserved
    let kind = cursor.read_u16::<LE>()?;
    let header_size = cursor.read_u16::<LE>()?;
    if header_size != RESOURCE_HEADER_SIZE {
        return Err(FormatError::UnexpectedValue {
            section: "resource manifest",
            field: "header size",
            expected: RESOURCE_HEADER_SIZE as u32,
            actual: header_size as u32,
        }
        .into());
    }
    let image_end = cursor.read_u32::<LE>()?;
    let image_begin = cursor.read_u32::<LE>()?;
    let id = strings.get(cursor.read_u32::<LE>()?)?;
    let path = strings.get(cursor.read_u32::<LE>()?)?;
    let property_count = cursor.read_u32::<LE>()?;

    let mut image_property = None;
    if image_begin != 0 && image_end != 0 {
        cursor.seek(SeekFrom::Start(offset as u64 + image_begin as u64))?;
        image_property = Some(ImageProperty {
            kind: cursor.read_u16::<LE>()?,
            flags: cursor.read_u16::<LE>()?,
            x: cursor.read_u16::<LE>()?,
            y: cursor.read_u16::<LE>()?,
            ax: cursor.read_u16::<LE>()?,
            ay: cursor.read_u16::<LE>()?,
            aw: cursor.read_u16::<LE>()?,
            ah: cursor.read_u16::<LE>()?,
            rows: cursor.read_u16::<LE>()?,
            cols: cursor.read_u16::<LE>()?,
            parent: strings.get(cursor.read_u32::<LE>()?)?,
        });
        cursor.seek(SeekFrom::Start(offset as u64 + image_end as u64))?;
    }

    let mut property = Vec::with_capacity(property_count as usize);
    for _ in 0..property_count {
        let key = strings.get(cursor.read_u32::<LE>()?)?;
        cursor.read_u32::<LE>()?; // reserved
        let value = strings.get(cursor.read_u32::<LE>()?)?;
        property.push(ManifestProperty { key, value });
    }

    Ok(ManifestResource {
        id,
        kind,
        path,
        image_property,
        property,
    })
}

fn encode_resource(
    out: &mut Vec<u8>,
    resource: &ManifestResource,
    strings: &mut StringBlobBuilder,
) -> Result<()> {
    let (image_end, image_begin) = match resource.image_property {
        Some(_) => (
            RESOURCE_HEADER_SIZE as u32 + IMAGE_PROPERTY_SIZE,
            RESOURCE_HEADER_SIZE as u32,
        ),
        None => (0, 0),
    };

    out.write_u32::<LE>(0)?;
    out.write_u16::<LE>(resource.kind)?;
    out.write_u16::<LE>(RESOURCE_HEADER_SIZE)?;
    out.write_u32::<LE>(image_end)?;
    out.write_u32::<LE>(image_begin)?;
    out.write_u32::<LE>(strings.intern(&resource.id)?)?;
    out.write_u32::<LE>(strings.intern(&resource.path)?)?;
    out.write_u32::<LE>(resource.property.len() as u32)?;

    if let Some(image) = &resource.image_property {
        for field in [
            image.kind, image.flags, image.x, image.y, image.ax, image.ay, image.aw, image.ah,
            image.rows, image.cols,
        ] {
            out.write_u16::<LE>(field)?;
        }
        out.write_u32::<LE>(strings.intern(&image.parent)?)?;
    }

    for property in &resource.property {
        out.write_u32::<LE>(strings.intern(&property.key)?)?;
        out.write_u32::<LE>(0)?;
        out.write_u32::<LE>(strings.intern(&property.value)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RsbError;

    fn sample() -> Manifest {
        Manifest {
            group: vec![ManifestGroup {
                id: "Foo".to_string(),
                subgroup: vec![ManifestSubgroup {
                    id: "Foo_1536".to_string(),
                    resolution: 1536,
                    locale: Some("EN".to_string()),
                    resource: vec![
                        ManifestResource {
                            id: "IMAGE_FOO_ATLAS".to_string(),
                            kind: 0,
                            path: "images/foo_atlas".to_string(),
                            image_property: None,
                            property: vec![],
                        },
                        ManifestResource {
                            id: "IMAGE_FOO_BUTTON".to_string(),
                            kind: 0,
                            path: "images/foo/button".to_string(),
                            image_property: Some(ImageProperty {
                                kind: 1,
                                flags: 0,
                                x: 10,
                                y: 20,
                                ax: 0,
                                ay: 0,
                                aw: 64,
                                ah: 32,
                                rows: 1,
                                cols: 1,
                                parent: "IMAGE_FOO_ATLAS".to_string(),
                            }),
                            property: vec![ManifestProperty {
                                key: "forceOriginalVectorSymbolSize".to_string(),
                                value: "true".to_string(),
                            }],
                        },
                    ],
                }],
            }],
        }
    }

    #[test]
    fn test_manifest_roundtrip() {
        let manifest = sample();
        let sections = manifest.encode().unwrap();
        assert_eq!(sections.string[0], 0);
        // 0x1C header, then 0x1C header + 0x18 image property + 12-byte property.
        assert_eq!(sections.resource.len(), 0x1C + 0x1C + 0x18 + 12);

        let decoded =
            Manifest::decode(&sections.group, &sections.resource, &sections.string).unwrap();
        assert_eq!(decoded, manifest);
        assert_eq!(decoded.resource_count(), 2);
        assert_eq!(decoded.encode().unwrap(), sections);
    }

    #[test]
    fn test_dangling_parent_is_kept() {
        let mut manifest = sample();
        let image = manifest.group[0].subgroup[0].resource[1]
            .image_property
            .as_mut()
            .unwrap();
        image.parent = "IMAGE_THAT_DOES_NOT_EXIST".to_string();

        let sections = manifest.encode().unwrap();
        let decoded =
            Manifest::decode(&sections.group, &sections.resource, &sections.string).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_bad_subgroup_entry_size() {
        let mut sections = sample().encode().unwrap();
        sections.group[8..12].copy_from_slice(&0x14u32.to_le_bytes());
        let err = Manifest::decode(&sections.group, &sections.resource, &sections.string)
            .unwrap_err();
        assert!(matches!(
            err,
            RsbError::Format(FormatError::UnexpectedValue {
                actual: 0x14,
                ..
            })
        ));
    }

    #[test]
    fn test_string_offset_outside_blob() {
        let mut sections = sample().encode().unwrap();
        sections.group[0..4].copy_from_slice(&0xFFFFu32.to_le_bytes());
        let err = Manifest::decode(&sections.group, &sections.resource, &sections.string)
            .unwrap_err();
        assert!(matches!(
            err,
            RsbError::Format(FormatError::StringOutOfRange { offset: 0xFFFF, .. })
        ));
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        let resource = &json["group"][0]["subgroup"][0]["resource"][1];
        assert_eq!(resource["type"], 0);
        assert_eq!(resource["image_property"]["parent"], "IMAGE_FOO_ATLAS");
        assert_eq!(resource["property"][0]["key"], "forceOriginalVectorSymbolSize");
        assert!(json["group"][0]["subgroup"][0]["resource"][0]
            .get("property")
            .is_none());
    }
}
