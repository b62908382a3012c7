//! On-disk unpack and pack of whole bundles.
//!
//! ```text
//! <dir>/data.json               bundle metadata
//! <dir>/resource.json           manifest, when the bundle has one
//! <dir>/packet/<id>.rsg         packet mode: one stored packet per subgroup
//! <dir>/resource/<id>/<path>    expand mode: one tree per subgroup
//! ```

use crate::codec::{self, UnpackMode, UnpackOptions};
use crate::compress::ZlibCompressor;
use crate::error::Result;
use crate::packet::PacketResource;
use crate::types::{Bundle, Subgroup};
use rayon::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const DATA_JSON: &str = "data.json";
pub const RESOURCE_JSON: &str = "resource.json";
pub const PACKET_DIR: &str = "packet";
pub const RESOURCE_DIR: &str = "resource";
pub const PACKET_EXTENSION: &str = "rsg";

pub fn unpack_bundle(input: &Path, output: &Path, options: &UnpackOptions) -> Result<Bundle> {
    info!(input = %input.display(), output = %output.display(), "unpacking bundle");
    let reader = BufReader::new(File::open(input)?);
    let bundle = codec::unpack(reader, options, &ZlibCompressor::default())?;

    fs::create_dir_all(output)?;
    write_json(&output.join(DATA_JSON), &bundle)?;
    if let Some(manifest) = &bundle.manifest {
        write_json(&output.join(RESOURCE_JSON), manifest)?;
    }

    let subgroups: Vec<&Subgroup> = bundle.group.iter().flat_map(|g| &g.subgroup).collect();
    match options.mode {
        UnpackMode::Packet => {
            let dir = output.join(PACKET_DIR);
            subgroups.par_iter().try_for_each(|subgroup| {
                let path = packet_file_path(&dir, &subgroup.id)?;
                let data = subgroup.packet_data.as_deref().unwrap_or_default();
                write_file(&path, data)
            })?;
        }
        UnpackMode::Expand => {
            let dir = output.join(RESOURCE_DIR);
            subgroups.par_iter().try_for_each(|subgroup| {
                let root = subgroup_resource_dir(&dir, &subgroup.id)?;
                write_resources(&root, &subgroup.packet.resource)
            })?;
        }
    }

    debug!(subgroups = subgroups.len(), "wrote bundle contents");
    Ok(bundle)
}

/// Rebuild a bundle from an unpacked directory. A stored packet under
/// `packet/` takes precedence over loose files under `resource/`.
pub fn pack_bundle(input: &Path, output: &Path) -> Result<()> {
    info!(input = %input.display(), output = %output.display(), "packing bundle");
    let mut bundle: Bundle = read_json(&input.join(DATA_JSON))?;
    let manifest = input.join(RESOURCE_JSON);
    if manifest.is_file() {
        bundle.manifest = Some(read_json(&manifest)?);
    }

    let packet_dir = input.join(PACKET_DIR);
    let resource_dir = input.join(RESOURCE_DIR);
    bundle
        .group
        .par_iter_mut()
        .flat_map(|g| g.subgroup.par_iter_mut())
        .try_for_each(|subgroup| {
            let stored = packet_file_path(&packet_dir, &subgroup.id)?;
            if stored.is_file() {
                subgroup.packet_data = Some(fs::read(&stored)?);
                Ok(())
            } else {
                let root = subgroup_resource_dir(&resource_dir, &subgroup.id)?;
                read_resources(&root, &mut subgroup.packet.resource)
            }
        })?;

    write_atomic(output, |writer| {
        codec::pack(writer, &bundle, &ZlibCompressor::default())
    })
}

pub(crate) fn packet_file_path(dir: &Path, subgroup: &str) -> Result<PathBuf> {
    resource_file_path(dir, &format!("{subgroup}.{PACKET_EXTENSION}"))
}

/// Subgroups may ship the same path with different bytes, so each gets its own tree.
pub(crate) fn subgroup_resource_dir(dir: &Path, subgroup: &str) -> Result<PathBuf> {
    resource_file_path(dir, subgroup)
}

/// Join a resource path onto `root`, refusing anything that would escape it.
pub(crate) fn resource_file_path(root: &Path, path: &str) -> Result<PathBuf> {
    let relative = Path::new(path);
    let safe = !path.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !safe {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("resource path {path:?} leaves the output directory"),
        )
        .into());
    }
    Ok(root.join(relative))
}

pub(crate) fn write_resources(root: &Path, resources: &[PacketResource]) -> Result<()> {
    for resource in resources {
        write_file(&resource_file_path(root, &resource.path)?, &resource.data)?;
    }
    Ok(())
}

pub(crate) fn read_resources(root: &Path, resources: &mut [PacketResource]) -> Result<()> {
    for resource in resources {
        resource.data = fs::read(resource_file_path(root, &resource.path)?)?;
    }
    Ok(())
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_file(path, json.as_bytes())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write through a temporary file in the destination directory and rename
/// it into place only once `write` succeeded.
pub(crate) fn write_atomic(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
