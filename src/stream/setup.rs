//! Regeneration of the three Vorbis header packets.

use super::audio::{read_packet, Packet};
use super::error::{ReconstructError, ReconstructErrorKind, SetupTable};
use super::{CodebookSource, ReconstructOptions, StreamDescriptor, VariantFlags};
use crate::bits::{ilog, BitReader, BitWriter};
use crate::codebook::{copy_codebook, CodebookLibrary, CodebookShape};

const IDENT_PACKET: u8 = 1;
const COMMENT_PACKET: u8 = 3;
const SETUP_PACKET: u8 = 5;
const PREAMBLE_LEN: usize = 7;

const VENDOR: &str = concat!("reconstructed by bnkex ", env!("CARGO_PKG_VERSION"));

pub(super) struct Headers {
    pub(super) ident: Vec<u8>,
    pub(super) comment: Vec<u8>,
    pub(super) setup: Vec<u8>,
    pub(super) modes: ModeTable,
}

/// Block flags of the modes declared by a setup packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct ModeTable {
    long_blocks: Vec<bool>,
    bits: u8,
}

impl ModeTable {
    /// Width of the mode number at the start of each audio packet.
    pub(super) fn bits(&self) -> u8 {
        self.bits
    }

    pub(super) fn is_long(&self, mode: u32) -> Result<bool, ReconstructError> {
        self.long_blocks
            .get(mode as usize)
            .copied()
            .ok_or_else(|| reference_error(SetupTable::Mode, mode, self.long_blocks.len()))
    }
}

#[cfg(test)]
impl ModeTable {
    pub(super) fn from_parts(long_blocks: Vec<bool>, bits: u8) -> Self {
        Self { long_blocks, bits }
    }
}

/// Builds all three header packets for a stream that only stores a compact (or full-width)
/// setup packet.
pub(super) fn synthesize(
    chunk: &[u8],
    descriptor: &StreamDescriptor,
    flags: VariantFlags,
    library: &CodebookLibrary,
    options: &ReconstructOptions,
) -> Result<Headers, ReconstructError> {
    let offset = descriptor.setup_packet_offset as usize;
    let packet = read_header_packet(chunk, offset, descriptor, flags)?;

    let codebooks = match options.codebooks {
        CodebookSource::External => Codebooks::External(library),
        CodebookSource::Inline => Codebooks::Inline,
    };
    let layout = if options.full_setup {
        Layout::Standard
    } else {
        Layout::Compact
    };

    let mut sink = BitWriter::new();
    write_preamble(&mut sink, SETUP_PACKET);

    let mut copier = SetupCopier {
        source: BitReader::new(packet.payload),
        sink: &mut sink,
        layout,
    };
    let modes = walk_setup(&mut copier, u32::from(descriptor.channels), codebooks)?;
    check_consumed(&copier.source, packet.payload)?;
    check_audio_start(&packet, descriptor)?;

    Ok(Headers {
        ident: build_ident(descriptor),
        comment: build_comment(descriptor),
        setup: sink.into_bytes(),
        modes,
    })
}

/// Copies the three header packets of a stream that stores them whole, checking their types and
/// every setup table along the way.
pub(super) fn copy_triad(
    chunk: &[u8],
    descriptor: &StreamDescriptor,
    flags: VariantFlags,
) -> Result<Headers, ReconstructError> {
    let mut offset = descriptor.setup_packet_offset as usize;

    let ident = read_header_packet(chunk, offset, descriptor, flags)?;
    check_packet_type(ident.payload, IDENT_PACKET)?;
    offset = ident.next;

    let comment = read_header_packet(chunk, offset, descriptor, flags)?;
    check_packet_type(comment.payload, COMMENT_PACKET)?;
    offset = comment.next;

    let setup = read_header_packet(chunk, offset, descriptor, flags)?;
    check_packet_type(setup.payload, SETUP_PACKET)?;

    let body = setup
        .payload
        .get(PREAMBLE_LEN..)
        .ok_or_else(|| ReconstructError::new(ReconstructErrorKind::SetupTruncated))?;

    let mut sink = BitWriter::new();
    sink.write_bytes(&setup.payload[..PREAMBLE_LEN]);

    // channel count of the identification packet, right after its preamble and version
    let channels = ident.payload.get(11).copied().unwrap_or_default();

    let mut copier = SetupCopier {
        source: BitReader::new(body),
        sink: &mut sink,
        layout: Layout::Standard,
    };
    let modes = walk_setup(&mut copier, u32::from(channels), Codebooks::Inline)?;
    check_consumed(&copier.source, body)?;
    check_audio_start(&setup, descriptor)?;

    Ok(Headers {
        ident: ident.payload.to_vec(),
        comment: comment.payload.to_vec(),
        setup: sink.into_bytes(),
        modes,
    })
}

fn read_header_packet<'data>(
    chunk: &'data [u8],
    offset: usize,
    descriptor: &StreamDescriptor,
    flags: VariantFlags,
) -> Result<Packet<'data>, ReconstructError> {
    let packet = read_packet(chunk, offset, flags, descriptor.endian).map_err(
        ReconstructError::factory(ReconstructErrorKind::HeaderPacket { offset }),
    )?;

    match packet.granule {
        Some(granule) if granule != 0 => Err(ReconstructError::new(
            ReconstructErrorKind::HeaderGranule { granule },
        )),
        _ => Ok(packet),
    }
}

fn check_packet_type(payload: &[u8], expected: u8) -> Result<(), ReconstructError> {
    let found = payload.first().copied().unwrap_or_default();

    if found == expected {
        Ok(())
    } else {
        Err(ReconstructError::new(ReconstructErrorKind::PacketType {
            expected,
            found,
        }))
    }
}

// the setup packet is padded to whole bytes, so at most 7 bits may be left unread
fn check_consumed(source: &BitReader<'_>, payload: &[u8]) -> Result<(), ReconstructError> {
    let actual = source.total_bits_read().div_ceil(8);

    if actual == payload.len() {
        Ok(())
    } else {
        Err(ReconstructError::new(ReconstructErrorKind::SetupSize {
            expected: payload.len(),
            actual,
        }))
    }
}

fn check_audio_start(
    setup: &Packet<'_>,
    descriptor: &StreamDescriptor,
) -> Result<(), ReconstructError> {
    let expected = descriptor.first_audio_packet_offset as usize;

    if setup.next == expected {
        Ok(())
    } else {
        Err(ReconstructError::new(ReconstructErrorKind::AudioStart {
            expected,
            found: setup.next,
        }))
    }
}

fn write_preamble(sink: &mut BitWriter, packet_type: u8) {
    sink.write(u32::from(packet_type), 8);
    sink.write_bytes(b"vorbis");
}

fn build_ident(descriptor: &StreamDescriptor) -> Vec<u8> {
    let (short_block, long_block) = descriptor.block_size_exponents;
    let mut sink = BitWriter::new();

    write_preamble(&mut sink, IDENT_PACKET);
    sink.write(0, 32); // version
    sink.write(u32::from(descriptor.channels), 8);
    sink.write(descriptor.sample_rate, 32);
    sink.write(0, 32); // maximum bitrate
    sink.write(descriptor.bitrate(), 32);
    sink.write(0, 32); // minimum bitrate
    sink.write(u32::from(short_block), 4);
    sink.write(u32::from(long_block), 4);
    sink.write_bool(true);

    sink.into_bytes()
}

fn build_comment(descriptor: &StreamDescriptor) -> Vec<u8> {
    let comments = descriptor
        .loop_points
        .map(|loop_points| {
            vec![
                format!("LoopStart={}", loop_points.start),
                format!("LoopEnd={}", loop_points.end),
            ]
        })
        .unwrap_or_default();

    let mut sink = BitWriter::new();
    write_preamble(&mut sink, COMMENT_PACKET);
    write_string(&mut sink, VENDOR);
    write_length(&mut sink, comments.len());
    for comment in &comments {
        write_string(&mut sink, comment);
    }
    sink.write_bool(true);

    sink.into_bytes()
}

fn write_string(sink: &mut BitWriter, text: &str) {
    write_length(sink, text.len());
    sink.write_bytes(text.as_bytes());
}

// only used for short, locally built strings and lists
#[allow(clippy::cast_possible_truncation)]
fn write_length(sink: &mut BitWriter, len: usize) {
    sink.write(len as u32, 32);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Layout {
    // fields narrowed, fixed fields dropped
    Compact,
    // fields as in a standard setup header
    Standard,
}

#[derive(Clone, Copy)]
enum Codebooks<'lib> {
    External(&'lib CodebookLibrary),
    Inline,
}

struct SetupCopier<'data, 'sink> {
    source: BitReader<'data>,
    sink: &'sink mut BitWriter,
    layout: Layout,
}

impl SetupCopier<'_, '_> {
    fn read(&mut self, bits: u8) -> Result<u32, ReconstructError> {
        self.source
            .read(bits)
            .map_err(ReconstructError::factory(ReconstructErrorKind::SetupTruncated))
    }

    fn copy(&mut self, bits: u8) -> Result<u32, ReconstructError> {
        let value = self.read(bits)?;
        self.sink.write(value, bits);
        Ok(value)
    }

    fn copy_field(&mut self, bits: u8) -> Result<(), ReconstructError> {
        self.copy(bits).map(drop)
    }

    fn copy_flag(&mut self) -> Result<bool, ReconstructError> {
        self.copy(1).map(|bit| bit == 1)
    }

    fn copy_u8(&mut self, bits: u8) -> Result<u8, ReconstructError> {
        let value = self
            .source
            .read_u8(bits)
            .map_err(ReconstructError::factory(ReconstructErrorKind::SetupTruncated))?;
        self.sink.write(u32::from(value), bits);
        Ok(value)
    }

    // stored in `compact` bits by compact setups
    fn widen(&mut self, compact: u8, full: u8) -> Result<u32, ReconstructError> {
        let value = match self.layout {
            Layout::Compact => self.read(compact)?,
            Layout::Standard => self.read(full)?,
        };
        self.sink.write(value, full);
        Ok(value)
    }

    // left out of compact setups, where it always holds `implied`
    fn implied(&mut self, bits: u8, implied: u32) -> Result<u32, ReconstructError> {
        let value = match self.layout {
            Layout::Compact => implied,
            Layout::Standard => self.read(bits)?,
        };
        self.sink.write(value, bits);
        Ok(value)
    }

    fn implied_field(&mut self, bits: u8, implied: u32) -> Result<(), ReconstructError> {
        self.implied(bits, implied).map(drop)
    }

    fn reference(
        &mut self,
        bits: u8,
        table: SetupTable,
        count: u32,
    ) -> Result<(), ReconstructError> {
        let index = self.copy(bits)?;
        check_reference(table, index, count)
    }
}

fn check_reference(table: SetupTable, index: u32, count: u32) -> Result<(), ReconstructError> {
    if index < count {
        Ok(())
    } else {
        Err(ReconstructError::new(ReconstructErrorKind::SetupReference {
            table,
            index,
            count,
        }))
    }
}

fn reference_error(table: SetupTable, index: u32, count: usize) -> ReconstructError {
    ReconstructError::new(ReconstructErrorKind::SetupReference {
        table,
        index,
        count: u32::try_from(count).unwrap_or(u32::MAX),
    })
}

/// Walks a setup packet body (everything after its preamble), writing the standard form of every
/// table and checking each reference against the tables written before it.
fn walk_setup(
    copier: &mut SetupCopier<'_, '_>,
    channels: u32,
    codebooks: Codebooks<'_>,
) -> Result<ModeTable, ReconstructError> {
    let codebook_count = copier.copy(8)? + 1;
    let mut shapes: Vec<CodebookShape> = Vec::with_capacity(codebook_count as usize);

    for _ in 0..codebook_count {
        let shape = match codebooks {
            Codebooks::External(library) => {
                let id = copier.read(10)?;
                library.rebuild_from_id(id as usize, copier.sink)?
            }
            Codebooks::Inline => copy_codebook(&mut copier.source, copier.sink)?,
        };
        shapes.push(shape);
    }

    log::debug!(
        "setup holds {} codebooks, {} with lookup tables",
        shapes.len(),
        shapes.iter().filter(|shape| shape.lookup_type() != 0).count()
    );

    // time domain transforms are unused placeholders
    let time_count = copier.implied(6, 0)? + 1;
    for _ in 0..time_count {
        copier.implied_field(16, 0)?;
    }

    let floor_count = copier.copy(6)? + 1;
    for _ in 0..floor_count {
        match copier.implied(16, 1)? {
            0 => copy_floor0(copier, codebook_count)?,
            1 => copy_floor1(copier, codebook_count)?,
            value => {
                return Err(ReconstructError::new(ReconstructErrorKind::SetupValue {
                    table: SetupTable::Floor,
                    value,
                }))
            }
        }
    }

    let residue_count = copier.copy(6)? + 1;
    for _ in 0..residue_count {
        copy_residue(copier, codebook_count)?;
    }

    let mapping_count = copier.copy(6)? + 1;
    for _ in 0..mapping_count {
        copy_mapping(copier, channels, floor_count, residue_count)?;
    }

    let mode_count = copier.copy(6)? + 1;
    let mut long_blocks = Vec::with_capacity(mode_count as usize);
    for _ in 0..mode_count {
        long_blocks.push(copier.copy_flag()?);
        copier.implied_field(16, 0)?; // window type
        copier.implied_field(16, 0)?; // transform type
        copier.reference(8, SetupTable::Mapping, mapping_count)?;
    }

    // framing bit
    if copier.layout == Layout::Standard {
        copier.read(1).map(drop)?;
    }
    copier.sink.write_bool(true);

    Ok(ModeTable {
        long_blocks,
        bits: ilog(mode_count - 1),
    })
}

fn copy_floor0(
    copier: &mut SetupCopier<'_, '_>,
    codebook_count: u32,
) -> Result<(), ReconstructError> {
    copier.copy_field(8)?; // order
    copier.copy_field(16)?; // rate
    copier.copy_field(16)?; // bark map size
    copier.copy_field(6)?; // amplitude bits
    copier.copy_field(8)?; // amplitude offset

    let books = copier.copy(4)? + 1;
    for _ in 0..books {
        copier.reference(8, SetupTable::Codebook, codebook_count)?;
    }

    Ok(())
}

fn copy_floor1(
    copier: &mut SetupCopier<'_, '_>,
    codebook_count: u32,
) -> Result<(), ReconstructError> {
    let partitions = copier.copy(5)?;
    let mut partition_classes = Vec::with_capacity(partitions as usize);
    for _ in 0..partitions {
        partition_classes.push(copier.copy_u8(4)?);
    }

    let class_count = partition_classes
        .iter()
        .max()
        .map_or(0, |&max| usize::from(max) + 1);
    let mut class_dimensions = Vec::with_capacity(class_count);

    for _ in 0..class_count {
        class_dimensions.push(copier.copy(3)? + 1);

        let subclasses = copier.copy(2)?;
        if subclasses != 0 {
            copier.reference(8, SetupTable::Codebook, codebook_count)?; // master book
        }

        for _ in 0..1u32 << subclasses {
            // stored plus one, 0 meaning no book
            let book = copier.copy(8)?;
            if book != 0 {
                check_reference(SetupTable::Codebook, book - 1, codebook_count)?;
            }
        }
    }

    copier.copy_field(2)?; // multiplier - 1
    let range_bits = copier.copy_u8(4)?;

    for &class in &partition_classes {
        for _ in 0..class_dimensions[usize::from(class)] {
            copier.copy_field(range_bits)?;
        }
    }

    Ok(())
}

fn copy_residue(
    copier: &mut SetupCopier<'_, '_>,
    codebook_count: u32,
) -> Result<(), ReconstructError> {
    let residue_type = copier.widen(2, 16)?;
    if residue_type > 2 {
        return Err(ReconstructError::new(ReconstructErrorKind::SetupValue {
            table: SetupTable::Residue,
            value: residue_type,
        }));
    }

    copier.copy_field(24)?; // begin
    copier.copy_field(24)?; // end
    copier.copy_field(24)?; // partition size - 1
    let classifications = copier.copy(6)? + 1;
    copier.reference(8, SetupTable::Codebook, codebook_count)?; // class book

    let mut cascades = Vec::with_capacity(classifications as usize);
    for _ in 0..classifications {
        let low_bits = copier.copy(3)?;
        let high_bits = if copier.copy_flag()? { copier.copy(5)? } else { 0 };
        cascades.push((high_bits << 3) | low_bits);
    }

    for cascade in cascades {
        for pass in 0..8 {
            if cascade & (1 << pass) != 0 {
                copier.reference(8, SetupTable::Codebook, codebook_count)?;
            }
        }
    }

    Ok(())
}

fn copy_mapping(
    copier: &mut SetupCopier<'_, '_>,
    channels: u32,
    floor_count: u32,
    residue_count: u32,
) -> Result<(), ReconstructError> {
    let mapping_type = copier.implied(16, 0)?;
    if mapping_type != 0 {
        return Err(ReconstructError::new(ReconstructErrorKind::SetupValue {
            table: SetupTable::Mapping,
            value: mapping_type,
        }));
    }

    let submaps = if copier.copy_flag()? {
        copier.copy(4)? + 1
    } else {
        1
    };

    if copier.copy_flag()? {
        let coupling_steps = copier.copy(8)? + 1;
        let channel_bits = ilog(channels.saturating_sub(1));

        for _ in 0..coupling_steps {
            let magnitude = copier.copy(channel_bits)?;
            let angle = copier.copy(channel_bits)?;
            check_reference(SetupTable::Channel, magnitude, channels)?;
            check_reference(SetupTable::Channel, angle, channels)?;

            if magnitude == angle {
                return Err(ReconstructError::new(ReconstructErrorKind::SetupValue {
                    table: SetupTable::Channel,
                    value: angle,
                }));
            }
        }
    }

    let reserved = copier.copy(2)?;
    if reserved != 0 {
        return Err(ReconstructError::new(ReconstructErrorKind::SetupValue {
            table: SetupTable::Mapping,
            value: reserved,
        }));
    }

    if submaps > 1 {
        for _ in 0..channels {
            copier.reference(4, SetupTable::Submap, submaps)?;
        }
    }

    for _ in 0..submaps {
        copier.copy_field(8)?; // time configuration, unused
        copier.reference(8, SetupTable::Floor, floor_count)?;
        copier.reference(8, SetupTable::Residue, residue_count)?;
    }

    Ok(())
}
