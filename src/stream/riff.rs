use super::error::{ReconstructError, ReconstructErrorKind};
use super::{LoopPoints, StreamCodec, StreamDescriptor, VariantFlags};
use crate::read::{Endian, ReadResult, Reader};
use phf::{phf_map, phf_set};
use tap::Pipe;

const FORMAT_TAG: [u8; 4] = *b"fmt ";
const DATA_TAG: [u8; 4] = *b"data";
const VORB_TAG: [u8; 4] = *b"vorb";
const SAMPLE_TAG: [u8; 4] = *b"smpl";
const LIST_TAG: [u8; 4] = *b"LIST";

const VORBIS_CODEC: u16 = 0xFFFF;
const PCM_CODEC: u16 = 0x0001;
const EXTENSIBLE_CODEC: u16 = 0xFFFE;
const PCM_FORMAT_SIZE: u32 = 0x10;

// older encoders fold the vorb chunk into a 0x42-byte format chunk
const EMBEDDED_VORB_FORMAT_SIZE: u32 = 0x42;
const EMBEDDED_VORB_OFFSET: usize = 0x18;
const EMBEDDED_VORB_SIZE: u32 = 0x2A;

#[derive(Clone, Copy)]
struct VorbLayout {
    flags: VariantFlags,
    // whether a packet framing signal follows the sample count
    framing_signal: bool,
    packet_offsets_at: usize,
    // stream UID followed by the two block size exponents
    block_sizes_at: Option<usize>,
}

static VORB_LAYOUTS: phf::Map<u32, VorbLayout> = phf_map! {
    0x28u32 => VorbLayout {
        flags: VariantFlags::HEADER_TRIAD.union(VariantFlags::LEGACY_PACKET_HEADERS),
        framing_signal: false,
        packet_offsets_at: 0x18,
        block_sizes_at: None,
    },
    0x2Au32 => VorbLayout {
        flags: VariantFlags::NO_GRANULE,
        framing_signal: true,
        packet_offsets_at: 0x10,
        block_sizes_at: Some(0x24),
    },
    0x2Cu32 => VorbLayout {
        flags: VariantFlags::HEADER_TRIAD.union(VariantFlags::LEGACY_PACKET_HEADERS),
        framing_signal: false,
        packet_offsets_at: 0x18,
        block_sizes_at: None,
    },
    0x32u32 => VorbLayout {
        flags: VariantFlags::empty(),
        framing_signal: false,
        packet_offsets_at: 0x18,
        block_sizes_at: Some(0x2C),
    },
    0x34u32 => VorbLayout {
        flags: VariantFlags::empty(),
        framing_signal: false,
        packet_offsets_at: 0x18,
        block_sizes_at: Some(0x2C),
    },
};

// signal values seen on streams whose packets are not modified; anything else means modified
static STANDARD_FRAMING_SIGNALS: phf::Set<u32> = phf_set! {
    0x4Au32,
    0x4Bu32,
    0x69u32,
    0x70u32,
};

#[derive(Clone, Copy)]
struct Chunk {
    offset: usize,
    size: u32,
}

#[derive(Default)]
struct Chunks {
    format: Option<Chunk>,
    data: Option<Chunk>,
    vorb: Option<Chunk>,
    sample: Option<Chunk>,
    list: Option<Chunk>,
}

impl StreamDescriptor {
    /// Parses the RIFF chunks of a stripped stream.
    ///
    /// # Errors
    ///
    /// Fails if the data is not a RIFF/RIFX WAVE file, a chunk is truncated or missing, or the
    /// format or vorb chunks hold values that are not understood.
    pub fn parse(data: &[u8]) -> Result<Self, ReconstructError> {
        let endian = match data.get(..4) {
            Some(b"RIFF") => Endian::Little,
            Some(b"RIFX") => Endian::Big,
            _ => return Err(ReconstructError::new(ReconstructErrorKind::RiffMagic)),
        };

        let mut reader = Reader::with_endian(data, endian);
        reader
            .skip(4)
            .map_err(ReconstructError::factory(ReconstructErrorKind::RiffMagic))?;

        let riff_size = reader
            .u32()
            .map_err(ReconstructError::factory(ReconstructErrorKind::RiffMagic))?;
        let riff_end = (riff_size as usize)
            .checked_add(8)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                ReconstructError::new(ReconstructErrorKind::RiffSize { size: riff_size })
            })?;

        match reader.take_const() {
            Ok(magic) if magic == *b"WAVE" => Ok(()),
            Err(e) => Err(ReconstructError::new_with_source(
                ReconstructErrorKind::WaveMagic,
                e,
            )),
            _ => Err(ReconstructError::new(ReconstructErrorKind::WaveMagic)),
        }?;

        let chunks = scan_chunks(&mut reader, riff_end)?;

        let format = chunks.format.ok_or_else(|| {
            ReconstructError::new(ReconstructErrorKind::MissingChunk { tag: FORMAT_TAG })
        })?;
        let data_chunk = chunks.data.ok_or_else(|| {
            ReconstructError::new(ReconstructErrorKind::MissingChunk { tag: DATA_TAG })
        })?;

        reader
            .seek(format.offset)
            .map_err(ReconstructError::factory(ReconstructErrorKind::FormatChunk))?;
        let fields = read_format(&mut reader)
            .map_err(ReconstructError::factory(ReconstructErrorKind::FormatChunk))?;

        let mut descriptor = Self {
            endian,
            codec: StreamCodec::Vorbis,
            channels: fields.channels,
            sample_rate: fields.sample_rate,
            avg_bytes_per_second: fields.avg_bytes_per_second,
            sample_count: 0,
            block_size_exponents: (0, 0),
            loop_points: None,
            setup_packet_offset: 0,
            first_audio_packet_offset: 0,
            flags: VariantFlags::empty(),
            data_offset: data_chunk.offset,
            data_len: data_chunk.size as usize,
            labels: Vec::new(),
        };

        if let Some(list) = chunks.list {
            descriptor.labels = read_labels(data, list, endian);
        }

        if format.size == PCM_FORMAT_SIZE
            || fields.codec == PCM_CODEC
            || fields.codec == EXTENSIBLE_CODEC
        {
            if !matches!(fields.bits_per_sample, 8 | 16 | 24 | 32) {
                return Err(ReconstructError::new(ReconstructErrorKind::SampleWidth {
                    bits: fields.bits_per_sample,
                }));
            }

            descriptor.codec = StreamCodec::Pcm {
                bits_per_sample: fields.bits_per_sample,
            };
            log::debug!("stream is plain PCM, skipping codec setup");
            return Ok(descriptor);
        }

        if fields.codec != VORBIS_CODEC {
            return Err(ReconstructError::new(ReconstructErrorKind::UnknownCodec {
                codec: fields.codec,
            }));
        }

        let extra_size = reader
            .u16()
            .map_err(ReconstructError::factory(ReconstructErrorKind::FormatChunk))?;
        let expected = format.size.saturating_sub(0x12);
        if u32::from(extra_size) != expected {
            return Err(ReconstructError::new(
                ReconstructErrorKind::FormatExtraSize {
                    expected,
                    found: extra_size,
                },
            ));
        }

        let (vorb_offset, vorb_size) = match chunks.vorb {
            Some(vorb) => (vorb.offset, vorb.size),
            None if format.size == EMBEDDED_VORB_FORMAT_SIZE => {
                (format.offset + EMBEDDED_VORB_OFFSET, EMBEDDED_VORB_SIZE)
            }
            None => {
                return Err(ReconstructError::new(ReconstructErrorKind::MissingChunk {
                    tag: VORB_TAG,
                }))
            }
        };

        let layout = *VORB_LAYOUTS.get(&vorb_size).ok_or_else(|| {
            ReconstructError::new(ReconstructErrorKind::VorbSize { size: vorb_size })
        })?;

        read_vorb(&mut reader, vorb_offset, layout, &mut descriptor)
            .map_err(ReconstructError::factory(ReconstructErrorKind::VorbChunk))?;

        if let Some(sample) = chunks.sample {
            descriptor.loop_points = read_loop(&mut reader, sample, descriptor.sample_count)?;
        }

        log::debug!(
            "vorb chunk of 0x{vorb_size:x} bytes, {} samples, flags {:?}",
            descriptor.sample_count,
            descriptor.flags
        );

        Ok(descriptor)
    }
}

fn scan_chunks(reader: &mut Reader<'_>, riff_end: usize) -> Result<Chunks, ReconstructError> {
    let mut chunks = Chunks::default();

    while reader.position() + 8 <= riff_end {
        let offset = reader.position();
        let (tag, size) = reader
            .take_const::<4>()
            .and_then(|tag| reader.u32().map(|size| (tag, size)))
            .map_err(ReconstructError::factory(ReconstructErrorKind::ChunkHeader {
                offset,
            }))?;

        let chunk = Chunk {
            offset: reader.position(),
            size,
        };

        let end = chunk.offset.checked_add(size as usize);
        if end.map_or(true, |end| end > riff_end) {
            return Err(ReconstructError::new(
                ReconstructErrorKind::ChunkTruncated { tag, size },
            ));
        }

        let slot = match tag {
            FORMAT_TAG => Some(&mut chunks.format),
            DATA_TAG => Some(&mut chunks.data),
            VORB_TAG => Some(&mut chunks.vorb),
            SAMPLE_TAG => Some(&mut chunks.sample),
            LIST_TAG => Some(&mut chunks.list),
            _ => None,
        };
        // the first chunk of each kind wins
        if let Some(slot) = slot {
            if slot.is_none() {
                *slot = Some(chunk);
            }
        }

        reader
            .skip(size as usize)
            .map_err(ReconstructError::factory(ReconstructErrorKind::ChunkTruncated {
                tag,
                size,
            }))?;
    }

    Ok(chunks)
}

struct FormatFields {
    codec: u16,
    channels: u16,
    sample_rate: u32,
    avg_bytes_per_second: u32,
    bits_per_sample: u16,
}

fn read_format(reader: &mut Reader<'_>) -> ReadResult<FormatFields> {
    let codec = reader.u16()?;
    let channels = reader.u16()?;
    let sample_rate = reader.u32()?;
    let avg_bytes_per_second = reader.u32()?;
    let _block_align = reader.u16()?;
    let bits_per_sample = reader.u16()?;

    Ok(FormatFields {
        codec,
        channels,
        sample_rate,
        avg_bytes_per_second,
        bits_per_sample,
    })
}

fn read_vorb(
    reader: &mut Reader<'_>,
    offset: usize,
    layout: VorbLayout,
    descriptor: &mut StreamDescriptor,
) -> ReadResult<()> {
    reader.seek(offset)?;
    descriptor.sample_count = reader.u32()?;
    descriptor.flags = layout.flags;

    if layout.framing_signal {
        let signal = reader.u32()?;
        descriptor
            .flags
            .set(VariantFlags::MODIFIED_PACKETS, !STANDARD_FRAMING_SIGNALS.contains(&signal));
    }

    reader.seek(offset + layout.packet_offsets_at)?;
    descriptor.setup_packet_offset = reader.u32()?;
    descriptor.first_audio_packet_offset = reader.u32()?;

    if let Some(position) = layout.block_sizes_at {
        reader.seek(offset + position)?;
        let _uid = reader.u32()?;
        descriptor.block_size_exponents = (reader.u8()?, reader.u8()?);
    }

    Ok(())
}

// loop end 0 stands for the end of the stream; any other end is the last sample of the loop
fn read_loop(
    reader: &mut Reader<'_>,
    chunk: Chunk,
    samples: u32,
) -> Result<Option<LoopPoints>, ReconstructError> {
    let factory = || ReconstructError::factory(ReconstructErrorKind::SampleChunk);

    reader.seek(chunk.offset + 0x1C).map_err(factory())?;
    let count = reader.u32().map_err(factory())?;

    match count {
        0 => return Ok(None),
        1 => {}
        _ => return Err(ReconstructError::new(ReconstructErrorKind::LoopCount { count })),
    }

    reader.seek(chunk.offset + 0x2C).map_err(factory())?;
    let start = reader.u32().map_err(factory())?;
    let end = reader
        .u32()
        .map_err(factory())?
        .pipe(|end| if end == 0 { samples } else { end.saturating_add(1) });

    if start >= samples || end > samples || start > end {
        return Err(ReconstructError::new(ReconstructErrorKind::LoopRange {
            start,
            end,
            samples,
        }));
    }

    Ok(Some(LoopPoints { start, end }))
}

// Cue labels live in "labl" entries of an "adtl" list. They are informational, so a damaged
// list yields whatever labels were read before the damage.
fn read_labels(data: &[u8], list: Chunk, endian: Endian) -> Vec<(u32, Box<str>)> {
    let mut labels = Vec::new();
    let body = &data[list.offset..list.offset + list.size as usize];
    let mut reader = Reader::with_endian(body, endian);

    if !matches!(reader.take_const(), Ok(form) if form == *b"adtl") {
        return labels;
    }

    while reader.remaining() >= 8 {
        let Ok((tag, size)) = reader
            .take_const::<4>()
            .and_then(|tag| reader.u32().map(|size| (tag, size as usize)))
        else {
            break;
        };
        let Ok(entry) = reader.take(size) else {
            break;
        };
        // entries are padded to an even size
        if size % 2 == 1 && reader.skip(1).is_err() {
            break;
        }

        if tag == *b"labl" {
            let mut entry = Reader::with_endian(entry, endian);
            if let (Ok(cue), Ok(text)) = (entry.u32(), entry.cstr_until_nul()) {
                labels.push((cue, String::from_utf8_lossy(text).into()));
            }
        }
    }

    labels
}

#[cfg(test)]
mod test {
    use super::super::error::ReconstructErrorKind;
    use super::super::fixture::{riff, StreamBuilder};
    use super::super::{LoopPoints, StreamCodec, StreamDescriptor, VariantFlags};
    use crate::error::ErrorKind;
    use crate::read::Endian;

    #[test]
    fn detect_variants_by_vorb_size() {
        let cases = [
            (0x2A, 0x4A, VariantFlags::NO_GRANULE),
            (
                0x2A,
                0xCB,
                VariantFlags::NO_GRANULE | VariantFlags::MODIFIED_PACKETS,
            ),
            (0x32, 0xCB, VariantFlags::empty()),
            (0x34, 0xD9, VariantFlags::empty()),
        ];

        for (vorb_size, mod_signal, flags) in cases {
            let stream = StreamBuilder {
                vorb_size,
                mod_signal,
                ..StreamBuilder::default()
            }
            .build(&[0; 4], &[]);

            let descriptor = StreamDescriptor::parse(&stream).unwrap();
            assert_eq!(descriptor.flags(), flags, "vorb size 0x{vorb_size:x}");
            assert_eq!(descriptor.block_size_exponents(), (8, 11));
            assert_eq!(descriptor.sample_count(), 512);
            assert_eq!(descriptor.setup_packet_offset(), 0);
        }
    }

    #[test]
    fn read_format_fields() {
        let stream = StreamBuilder::default().build(&[0; 4], &[(&[0; 3], 0)]);
        let descriptor = StreamDescriptor::parse(&stream).unwrap();

        assert_eq!(descriptor.endian(), Endian::Little);
        assert_eq!(descriptor.codec(), StreamCodec::Vorbis);
        assert_eq!(descriptor.channels(), 1);
        assert_eq!(descriptor.sample_rate(), 44100);
        assert_eq!(descriptor.avg_bytes_per_second(), 16000);
        assert_eq!(descriptor.bitrate(), 128_000);
        // 6-byte header + 4-byte setup packet
        assert_eq!(descriptor.first_audio_packet_offset(), 10);
        assert_eq!(descriptor.loop_points(), None);
    }

    #[test]
    fn read_loops() {
        let parse = |loop_points| {
            let stream = StreamBuilder {
                loop_points: Some(loop_points),
                ..StreamBuilder::default()
            }
            .build(&[0; 4], &[]);
            StreamDescriptor::parse(&stream)
        };

        assert_eq!(
            parse((5, 99)).unwrap().loop_points(),
            Some(LoopPoints { start: 5, end: 100 })
        );
        assert_eq!(
            parse((0, 0)).unwrap().loop_points(),
            Some(LoopPoints { start: 0, end: 512 })
        );
        assert!(parse((600, 0)).is_err_and(|e| e.kind() == ErrorKind::ReconstructionFailed));
        assert!(parse((5, 512)).is_err_and(|e| e.detail()
            == ReconstructErrorKind::LoopRange {
                start: 5,
                end: 513,
                samples: 512
            }));
    }

    #[test]
    fn read_embedded_vorb() {
        let mut fmt = 0xFFFFu16.to_le_bytes().to_vec();
        fmt.extend_from_slice(&2u16.to_le_bytes());
        fmt.extend_from_slice(&48000u32.to_le_bytes());
        fmt.extend_from_slice(&12000u32.to_le_bytes());
        fmt.extend_from_slice(&[0; 4]);
        fmt.extend_from_slice(&0x30u16.to_le_bytes());
        fmt.extend_from_slice(&[0; 6]);
        // embedded vorb data
        let mut vorb = vec![0; 0x2A];
        vorb[..4].copy_from_slice(&96u32.to_le_bytes());
        vorb[4..8].copy_from_slice(&0x69u32.to_le_bytes());
        vorb[0x14..0x18].copy_from_slice(&20u32.to_le_bytes());
        vorb[0x28] = 7;
        vorb[0x29] = 10;
        fmt.extend_from_slice(&vorb);
        assert_eq!(fmt.len(), 0x42);

        let stream = riff(b"RIFF", &[(*b"fmt ", fmt), (*b"data", vec![0; 20])]);
        let descriptor = StreamDescriptor::parse(&stream).unwrap();

        assert_eq!(descriptor.channels(), 2);
        assert_eq!(descriptor.sample_count(), 96);
        assert_eq!(descriptor.flags(), VariantFlags::NO_GRANULE);
        assert_eq!(descriptor.first_audio_packet_offset(), 20);
        assert_eq!(descriptor.block_size_exponents(), (7, 10));
    }

    #[test]
    fn read_big_endian_streams() {
        let mut fmt = 1u16.to_be_bytes().to_vec();
        fmt.extend_from_slice(&1u16.to_be_bytes());
        fmt.extend_from_slice(&22050u32.to_be_bytes());
        fmt.extend_from_slice(&44100u32.to_be_bytes());
        fmt.extend_from_slice(&2u16.to_be_bytes());
        fmt.extend_from_slice(&16u16.to_be_bytes());

        let mut body = b"WAVE".to_vec();
        for (tag, payload) in [(*b"fmt ", fmt), (*b"data", vec![0; 4])] {
            body.extend_from_slice(&tag);
            body.extend_from_slice(&u32::try_from(payload.len()).unwrap().to_be_bytes());
            body.extend_from_slice(&payload);
        }
        let mut stream = b"RIFX".to_vec();
        stream.extend_from_slice(&u32::try_from(body.len()).unwrap().to_be_bytes());
        stream.extend_from_slice(&body);

        let descriptor = StreamDescriptor::parse(&stream).unwrap();
        assert_eq!(descriptor.endian(), Endian::Big);
        assert_eq!(descriptor.sample_rate(), 22050);
        assert_eq!(
            descriptor.codec(),
            StreamCodec::Pcm {
                bits_per_sample: 16
            }
        );
    }

    #[test]
    fn read_cue_labels() {
        let mut list = b"adtl".to_vec();
        list.extend_from_slice(b"labl");
        list.extend_from_slice(&9u32.to_le_bytes());
        list.extend_from_slice(&3u32.to_le_bytes());
        list.extend_from_slice(b"Hit\0\0");
        list.push(0); // pad byte

        let mut stream = StreamBuilder::default().build(&[0; 4], &[]);
        let mut chunk = b"LIST".to_vec();
        chunk.extend_from_slice(&u32::try_from(list.len()).unwrap().to_le_bytes());
        chunk.extend_from_slice(&list);
        stream.extend_from_slice(&chunk);
        let riff_size = u32::try_from(stream.len() - 8).unwrap();
        stream[4..8].copy_from_slice(&riff_size.to_le_bytes());

        let descriptor = StreamDescriptor::parse(&stream).unwrap();
        assert_eq!(descriptor.labels(), [(3, Box::<str>::from("Hit"))]);
    }

    #[test]
    fn reject_malformed_riff() {
        let stream = StreamBuilder::default().build(&[0; 4], &[]);

        let mut truncated = stream.clone();
        truncated.truncate(stream.len() - 1);
        assert!(StreamDescriptor::parse(&truncated)
            .is_err_and(|e| e.kind() == ErrorKind::OutOfBounds));

        let mut bad_size = stream.clone();
        let data_size_at = bad_size.len() - 4 - 6 - 4;
        bad_size[data_size_at..data_size_at + 4].copy_from_slice(&0x100u32.to_le_bytes());
        assert!(StreamDescriptor::parse(&bad_size).is_err_and(|e| e.detail()
            == ReconstructErrorKind::ChunkTruncated {
                tag: *b"data",
                size: 0x100
            }));

        let mut not_wave = stream.clone();
        not_wave[8..12].copy_from_slice(b"AVI ");
        assert!(StreamDescriptor::parse(&not_wave)
            .is_err_and(|e| e.kind() == ErrorKind::MalformedMagic));

        let mut odd_vorb = stream;
        let vorb_size_at = odd_vorb.windows(4).position(|tag| tag == b"vorb").unwrap() + 4;
        odd_vorb[vorb_size_at..vorb_size_at + 4].copy_from_slice(&0x30u32.to_le_bytes());
        assert!(StreamDescriptor::parse(&odd_vorb).is_err());
    }

    #[test]
    fn reject_unknown_codecs() {
        let mut fmt = 0x0002u16.to_le_bytes().to_vec();
        fmt.extend_from_slice(&[0; 16]);
        let stream = riff(b"RIFF", &[(*b"fmt ", fmt), (*b"data", Vec::new())]);

        assert!(StreamDescriptor::parse(&stream).is_err_and(|e| e.kind() == ErrorKind::UnknownFormat
            && e.detail() == ReconstructErrorKind::UnknownCodec { codec: 2 }));
    }
}
