//! Skippers for the parameter blocks shared by every hierarchy node.
//!
//! Nothing in these blocks is needed to resolve events, but they sit between a record's ID and the
//! child lists that are, so each one has to be stepped over exactly. Every function consumes the
//! fields its block has in the given version and nothing else.

use super::version::BankVersion;
use crate::read::{ReadResult, Reader};
use bitflags::bitflags;
use tap::Pipe;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct PositioningBits: u8 {
        const OVERRIDE_PARENT = 0x01;
        const HAS_3D = 0x02;
        const AUTOMATION_MASK = 0x60;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct AuxBits: u8 {
        const OVERRIDE_USER_AUX = 0x08;
    }
}

// plugin IDs whose low nibble is 2 are source plugins, which carry an inline parameter block
const SOURCE_PLUGIN: u32 = 2;

pub(crate) fn skip_base_params(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<()> {
    skip_fx_params(reader)?;
    if version.has_metadata_fx() {
        skip_metadata_fx(reader)?;
    }
    if version.has_override_attachment() {
        reader.skip(1)?;
    }

    // override bus and direct parent
    reader.skip(8)?;

    // priority flags
    reader.skip(if version.has_bit_vectors() { 1 } else { 2 })?;

    skip_prop_bundle(reader)?;
    skip_ranged_prop_bundle(reader)?;
    skip_positioning(reader)?;
    skip_aux(reader, version)?;
    skip_adv_settings(reader, version)?;
    skip_state_chunk(reader, version)?;
    skip_rtpc(reader, version)
}

fn skip_fx_params(reader: &mut Reader<'_>) -> ReadResult<()> {
    let _override_parent = reader.u8()?;
    let count = reader.u8()?;

    if count > 0 {
        // bypass bits, then index, plugin ID, share set and rendered flags per effect
        reader.skip(1 + 7 * usize::from(count))?;
    }

    Ok(())
}

fn skip_metadata_fx(reader: &mut Reader<'_>) -> ReadResult<()> {
    let _override_parent = reader.u8()?;
    let count = reader.u8()?;
    reader.skip(6 * usize::from(count))
}

pub(crate) fn skip_prop_bundle(reader: &mut Reader<'_>) -> ReadResult<()> {
    let count = usize::from(reader.u8()?);
    reader.skip(count * (1 + 4))
}

pub(crate) fn skip_ranged_prop_bundle(reader: &mut Reader<'_>) -> ReadResult<()> {
    let count = usize::from(reader.u8()?);
    reader.skip(count * (1 + 8))
}

fn skip_positioning(reader: &mut Reader<'_>) -> ReadResult<()> {
    let bits = reader.u8()?.pipe(PositioningBits::from_bits_retain);

    if !bits.contains(PositioningBits::OVERRIDE_PARENT | PositioningBits::HAS_3D) {
        return Ok(());
    }

    let _bits_3d = reader.u8()?;

    if bits.intersects(PositioningBits::AUTOMATION_MASK) {
        // path mode and transition time
        reader.skip(1 + 4)?;

        let vertices = count(reader.u32()?);
        reader.skip(vertices.saturating_mul(16))?;

        let items = count(reader.u32()?);
        // vertex ranges, then one set of axis ranges per item
        reader.skip(items.saturating_mul(8 + 12))?;
    }

    Ok(())
}

fn skip_aux(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<()> {
    let bits = reader.u8()?.pipe(AuxBits::from_bits_retain);

    if bits.contains(AuxBits::OVERRIDE_USER_AUX) {
        reader.skip(4 * 4)?;
    }
    if version.has_reflections_aux() {
        reader.skip(4)?;
    }

    Ok(())
}

fn skip_adv_settings(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<()> {
    if version.has_bit_vectors() {
        // flags, virtual queue behaviour, max instances, below-threshold behaviour, flags
        reader.skip(1 + 1 + 2 + 1 + 1)
    } else {
        reader.skip(1 + 1 + 1 + 2 + 1 + 1 + 1 + 1)
    }
}

fn skip_state_chunk(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<()> {
    if !version.has_var_state_chunk() {
        let groups = reader.u32()?;
        for _ in 0..groups {
            // group ID and sync type
            reader.skip(4 + 1)?;
            let states = usize::from(reader.u16()?);
            reader.skip(states * 8)?;
        }
        return Ok(());
    }

    let props = reader.var_u32()?;
    for _ in 0..props {
        let _property = reader.var_u32()?;
        reader.skip(if version.has_state_prop_db_flag() { 2 } else { 1 })?;
    }

    let groups = reader.var_u32()?;
    for _ in 0..groups {
        reader.skip(4 + 1)?;

        let states = reader.var_u32()?;
        for _ in 0..states {
            if version.has_inline_state_props() {
                reader.skip(4)?;
                let values = usize::from(reader.u16()?);
                reader.skip(values * (2 + 4))?;
            } else {
                // state ID and state instance ID
                reader.skip(8)?;
            }
        }
    }

    Ok(())
}

fn skip_rtpc(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<()> {
    let curves = reader.u16()?;

    for _ in 0..curves {
        // RTPC ID, then type and accumulation mode
        reader.skip(4)?;
        if version.has_bit_vectors() {
            reader.skip(2)?;
        }

        if version.has_var_rtpc_param() {
            let _parameter = reader.var_u32()?;
        } else {
            reader.skip(4)?;
        }

        // curve ID and scaling
        reader.skip(4 + 1)?;
        let points = usize::from(reader.u16()?);
        reader.skip(points * 12)?;
    }

    Ok(())
}

/// Reads a source description and returns the ID of the media it plays.
pub(crate) fn read_source(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<u32> {
    let plugin = reader.u32()?;

    let file_id = if version.has_compact_sources() {
        let _stream_type = reader.u8()?;
        let source_id = reader.u32()?;
        let _media_size = reader.u32()?;
        source_id
    } else {
        let stream_type = reader.u32()?;
        let _source_id = reader.u32()?;
        let file_id = reader.u32()?;
        if stream_type != 2 {
            // file offset and in-memory size of media stored in the bank
            reader.skip(8)?;
        }
        file_id
    };

    let _source_bits = reader.u8()?;

    if plugin & 0x0F == SOURCE_PLUGIN {
        let size = count(reader.u32()?);
        reader.skip(size)?;
    }

    Ok(file_id)
}

pub(crate) fn read_children(reader: &mut Reader<'_>) -> ReadResult<Vec<u32>> {
    let len = reader.u32()?;
    // a corrupt count must not reserve more than the record could hold
    let mut children = Vec::with_capacity(count(len).min(reader.remaining() / 4));

    for _ in 0..len {
        children.push(reader.u32()?);
    }

    Ok(children)
}

pub(crate) fn count(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[cfg(test)]
pub(crate) mod fixture {
    use crate::graph::version::BankVersion;

    // base parameters with every optional block empty, for the given version
    pub(crate) fn empty_base_params(version: u32) -> Vec<u8> {
        let version = BankVersion::new(version);
        let mut bytes = vec![0, 0];
        if version.has_metadata_fx() {
            bytes.extend_from_slice(&[0, 0]);
        }
        if version.has_override_attachment() {
            bytes.push(0);
        }
        bytes.extend_from_slice(&[0; 8]);
        bytes.push(0);
        // two empty prop bundles, no positioning, no aux
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        if version.has_reflections_aux() {
            bytes.extend_from_slice(&[0; 4]);
        }
        bytes.extend_from_slice(&[0; 6]);
        // no state properties or groups
        if version.has_var_state_chunk() {
            bytes.extend_from_slice(&[0, 0]);
        } else {
            bytes.extend_from_slice(&[0; 4]);
        }
        // no RTPC curves
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }
}
