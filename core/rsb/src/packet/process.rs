//! Standalone packet files: `<dir>/packet.json` plus `<dir>/resource/<path>`.

use crate::compress::ZlibCompressor;
use crate::error::Result;
use crate::packet::{Packet, pack, unpack};
use crate::process::{RESOURCE_DIR, read_json, read_resources, write_atomic, write_json, write_resources};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const PACKET_JSON: &str = "packet.json";

pub fn unpack_packet(input: &Path, output: &Path) -> Result<Packet> {
    let data = fs::read(input)?;
    let packet = unpack(&data, &ZlibCompressor::default())?;

    fs::create_dir_all(output)?;
    write_resources(&output.join(RESOURCE_DIR), &packet.resource)?;
    write_json(&output.join(PACKET_JSON), &packet)?;
    info!(
        input = %input.display(),
        resources = packet.resource.len(),
        "unpacked packet"
    );
    Ok(packet)
}

pub fn pack_packet(input: &Path, output: &Path) -> Result<()> {
    let mut packet: Packet = read_json(&input.join(PACKET_JSON))?;
    read_resources(&input.join(RESOURCE_DIR), &mut packet.resource)?;
    let bytes = pack(&packet, &ZlibCompressor::default())?;

    write_atomic(output, |writer| Ok(writer.write_all(&bytes)?))?;
    info!(
        output = %output.display(),
        resources = packet.resource.len(),
        size = bytes.len(),
        "packed packet"
    );
    Ok(())
}
