//! Audio packet headers and first-byte repair.

use super::error::{ReconstructError, ReconstructErrorKind};
use super::setup::ModeTable;
use super::VariantFlags;
use crate::bits::{BitReader, BitWriter};
use crate::read::{Endian, ReadResult, Reader};

// written by encoders that did not track positions
const UNKNOWN_GRANULE: u32 = 0xFFFF_FFFF;

/// One packet of the data chunk.
pub(super) struct Packet<'data> {
    pub(super) payload: &'data [u8],
    pub(super) granule: Option<u32>,
    // offset of the following packet header
    pub(super) next: usize,
}

pub(super) fn read_packet(
    chunk: &[u8],
    offset: usize,
    flags: VariantFlags,
    endian: Endian,
) -> ReadResult<Packet<'_>> {
    let mut reader = Reader::with_endian(chunk, endian);
    reader.seek(offset)?;

    let (size, granule) = if flags.contains(VariantFlags::LEGACY_PACKET_HEADERS) {
        let size = reader.u32()?;
        (size as usize, Some(reader.u32()?))
    } else if flags.contains(VariantFlags::NO_GRANULE) {
        (usize::from(reader.u16()?), None)
    } else {
        let size = reader.u16()?;
        (usize::from(size), Some(reader.u32()?))
    };

    let payload = reader.take(size)?;

    Ok(Packet {
        payload,
        granule,
        next: reader.position(),
    })
}

/// Reads every audio packet from `first_audio` to the end of the chunk, restoring the first byte of
/// modified packets and filling in granule positions.
pub(super) fn rebuild_packets(
    chunk: &[u8],
    first_audio: usize,
    flags: VariantFlags,
    endian: Endian,
    modes: &ModeTable,
    block_size_exponents: (u8, u8),
    sample_count: u32,
) -> Result<Vec<(Vec<u8>, u64)>, ReconstructError> {
    let modified = flags.contains(VariantFlags::MODIFIED_PACKETS);
    let block_size = |long: bool| {
        let exponent = if long {
            block_size_exponents.1
        } else {
            block_size_exponents.0
        };
        1u64 << exponent
    };

    let mut packets = Vec::new();
    let mut offset = first_audio;
    let mut previous_long: Option<bool> = None;
    let mut granule = 0u64;

    while offset < chunk.len() {
        let packet = read_packet(chunk, offset, flags, endian).map_err(ReconstructError::factory(
            ReconstructErrorKind::AudioPacket { offset },
        ))?;

        if packet.payload.is_empty() {
            packets.push((Vec::new(), granule));
            offset = packet.next;
            continue;
        }

        let long = if modified {
            let mode = read_mode(packet.payload, modes.bits(), true).map_err(
                ReconstructError::factory(ReconstructErrorKind::AudioPacket { offset }),
            )?;
            modes.is_long(mode)?
        } else {
            // intact packets are copied even when their mode cannot be looked up
            let Some(long) = read_mode(packet.payload, modes.bits(), false)
                .ok()
                .and_then(|mode| modes.is_long(mode).ok())
            else {
                log::debug!("copying audio packet at 0x{offset:x} with an unknown mode");
                granule = packet.granule.map_or(granule, stored_granule);
                packets.push((packet.payload.to_vec(), granule));
                offset = packet.next;
                continue;
            };
            long
        };

        let payload = if modified {
            let next_long = peek_long(chunk, packet.next, flags, endian, modes);
            reinsert_header_bits(
                packet.payload,
                modes.bits(),
                long,
                previous_long.unwrap_or_default(),
                next_long,
            )
            .map_err(ReconstructError::factory(ReconstructErrorKind::AudioPacket { offset }))?
        } else {
            packet.payload.to_vec()
        };

        granule = match packet.granule {
            Some(granule) => stored_granule(granule),
            // each block overlaps half of its neighbor, so a packet completes a quarter of both
            None => match previous_long {
                Some(previous) => {
                    let granule = granule + block_size(previous) / 4 + block_size(long) / 4;
                    if sample_count > 0 {
                        granule.min(u64::from(sample_count))
                    } else {
                        granule
                    }
                }
                None => 0,
            },
        };

        packets.push((payload, granule));
        previous_long = Some(long);
        offset = packet.next;
    }

    Ok(packets)
}

fn stored_granule(granule: u32) -> u64 {
    if granule == UNKNOWN_GRANULE {
        1
    } else {
        u64::from(granule)
    }
}

fn read_mode(payload: &[u8], mode_bits: u8, modified: bool) -> ReadResult<u32> {
    let mut reader = BitReader::new(payload);

    if !modified {
        let _packet_type = reader.read(1)?;
    }

    reader.read(mode_bits)
}

// a missing or unreadable next packet counts as a short block
fn peek_long(
    chunk: &[u8],
    offset: usize,
    flags: VariantFlags,
    endian: Endian,
    modes: &ModeTable,
) -> bool {
    read_packet(chunk, offset, flags, endian)
        .ok()
        .filter(|packet| !packet.payload.is_empty())
        .and_then(|packet| read_mode(packet.payload, modes.bits(), true).ok())
        .and_then(|mode| modes.is_long(mode).ok())
        .unwrap_or_default()
}

/// Rebuilds a packet whose first byte holds only the mode number and the start of the audio data:
/// the packet type bit is restored, and long blocks regain their previous and next window flags.
fn reinsert_header_bits(
    payload: &[u8],
    mode_bits: u8,
    long: bool,
    previous_long: bool,
    next_long: bool,
) -> ReadResult<Vec<u8>> {
    let mut reader = BitReader::new(payload);
    let mode = reader.read(mode_bits)?;
    let remainder = reader.read(8 - mode_bits)?;

    let mut writer = BitWriter::new();
    writer.write(0, 1); // audio packet
    writer.write(mode, mode_bits);
    if long {
        writer.write_bool(previous_long);
        writer.write_bool(next_long);
    }
    writer.write(remainder, 8 - mode_bits);
    writer.write_bytes(&payload[1..]);

    Ok(writer.into_bytes())
}

#[cfg(test)]
mod test {
    use super::{read_packet, rebuild_packets, reinsert_header_bits};
    use crate::read::Endian;
    use crate::stream::{setup::ModeTable, VariantFlags};

    #[test]
    fn read_packet_headers() {
        let legacy = [2, 0, 0, 0, 0x10, 0, 0, 0, 0xAB, 0xCD, 0xFF];
        let packet = read_packet(&legacy, 0, VariantFlags::LEGACY_PACKET_HEADERS, Endian::Little)
            .unwrap();
        assert_eq!(packet.payload, [0xAB, 0xCD]);
        assert_eq!(packet.granule, Some(0x10));
        assert_eq!(packet.next, 10);

        let compact = [0, 1, 0xEE];
        let packet = read_packet(&compact, 0, VariantFlags::NO_GRANULE, Endian::Big).unwrap();
        assert_eq!(packet.payload, [0xEE]);
        assert_eq!(packet.granule, None);

        assert!(read_packet(&compact, 0, VariantFlags::empty(), Endian::Big).is_err());
        assert!(read_packet(&compact, 4, VariantFlags::NO_GRANULE, Endian::Big).is_err());
    }

    #[test]
    fn reinsert_mode_and_window_bits() {
        // 2 mode bits: mode 3, then 6 bits of audio data
        let payload = [0b1011_0111, 0x01];

        let short = reinsert_header_bits(&payload, 2, false, true, true).unwrap();
        assert_eq!(short, [0b0110_1110, 0x03, 0x00]);

        let long = reinsert_header_bits(&payload, 2, true, true, false).unwrap();
        assert_eq!(long, [0b1010_1110, 0x0D, 0x00]);
    }

    #[test]
    fn copy_intact_packets_with_unknown_modes() {
        let modes = ModeTable::from_parts(vec![false, true, false], 2);
        // size, granule, then the type bit followed by mode 1 and mode 3
        let chunk = [
            1, 0, 0x40, 0, 0, 0, 0b0000_0010,
            1, 0, 0x80, 0, 0, 0, 0b0000_0110,
            1, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0b0000_0110,
        ];

        let packets = rebuild_packets(
            &chunk,
            0,
            VariantFlags::empty(),
            Endian::Little,
            &modes,
            (8, 11),
            0,
        )
        .unwrap();
        assert_eq!(
            packets,
            [(vec![0x02], 0x40), (vec![0x06], 0x80), (vec![0x06], 1)]
        );

        // modified packets cannot be repaired without their mode
        let modified = [1, 0, 0, 0, 0, 0, 0b0000_0011];
        assert!(rebuild_packets(
            &modified,
            0,
            VariantFlags::MODIFIED_PACKETS,
            Endian::Little,
            &modes,
            (8, 11),
            0,
        )
        .is_err());
    }
}
