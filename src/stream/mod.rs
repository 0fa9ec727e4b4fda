//! Reconstruction of standard Ogg Vorbis (or WAV) files from stripped Wwise streams.
//!
//! Stripped streams are RIFF files whose Vorbis headers have been cut down: the identification
//! and comment packets are dropped, codebooks are replaced by references into a shared
//! [`CodebookLibrary`], every setup field is narrowed, and packets lose their Ogg framing.
//! Reconstruction reverses all of this in a single pass and fails without output on any
//! inconsistency.

mod audio;
pub(crate) mod error;
mod riff;
mod setup;

use crate::codebook::CodebookLibrary;
use crate::encode::pcm;
use crate::ogg::OggWriter;
use crate::read::Endian;
use bitflags::bitflags;
use error::{ReconstructError, ReconstructErrorKind};
use lewton::header::{
    read_header_comment, read_header_ident, read_header_setup, IdentHeader, SetupHeader,
};

// every reconstructed file holds a single logical stream
const OGG_SERIAL: u32 = 1;

bitflags! {
    /// Format variants of a stripped stream. Each flag is detected from its own evidence and
    /// any combination may occur.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct VariantFlags: u8 {
        /// The identification, comment and setup packets are stored whole in the stream.
        const HEADER_TRIAD = 0x01;
        /// Packets are preceded by 8-byte headers (32-bit size and granule).
        const LEGACY_PACKET_HEADERS = 0x02;
        /// Packet headers carry no granule position.
        const NO_GRANULE = 0x04;
        /// The first byte of each audio packet lacks its packet type and window shape bits.
        const MODIFIED_PACKETS = 0x08;
    }
}

/// The audio coding of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StreamCodec {
    /// Stripped Vorbis.
    Vorbis,
    /// Uncompressed integer PCM.
    Pcm {
        /// Width of each sample: 8, 16, 24 or 32.
        bits_per_sample: u16,
    },
}

/// A loop region, in samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopPoints {
    /// First sample of the loop.
    pub start: u32,
    /// Sample just past the end of the loop.
    pub end: u32,
}

/// Metadata of one stripped stream, parsed from its RIFF chunks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamDescriptor {
    endian: Endian,
    codec: StreamCodec,
    channels: u16,
    sample_rate: u32,
    avg_bytes_per_second: u32,
    sample_count: u32,
    block_size_exponents: (u8, u8),
    loop_points: Option<LoopPoints>,
    setup_packet_offset: u32,
    first_audio_packet_offset: u32,
    flags: VariantFlags,
    data_offset: usize,
    data_len: usize,
    labels: Vec<(u32, Box<str>)>,
}

impl StreamDescriptor {
    /// Returns the byte order of the stream (`RIFF` is little-endian, `RIFX` big-endian).
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Returns the audio coding.
    #[must_use]
    pub fn codec(&self) -> StreamCodec {
        self.codec
    }

    /// Returns the number of channels.
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the sample rate in Hz.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the average number of bytes per second declared by the format chunk.
    #[must_use]
    pub fn avg_bytes_per_second(&self) -> u32 {
        self.avg_bytes_per_second
    }

    /// Returns the nominal bitrate in bits per second.
    #[must_use]
    pub fn bitrate(&self) -> u32 {
        self.avg_bytes_per_second.saturating_mul(8)
    }

    /// Returns the number of samples per channel (0 for PCM streams).
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Returns the short and long block size exponents. Both are 0 when the stream stores its own
    /// identification packet.
    #[must_use]
    pub fn block_size_exponents(&self) -> (u8, u8) {
        self.block_size_exponents
    }

    /// Returns the loop region, if the stream declares one.
    #[must_use]
    pub fn loop_points(&self) -> Option<LoopPoints> {
        self.loop_points
    }

    /// Returns the offset of the setup packet (or of the first header packet), relative to the
    /// start of the data chunk.
    #[must_use]
    pub fn setup_packet_offset(&self) -> u32 {
        self.setup_packet_offset
    }

    /// Returns the offset of the first audio packet, relative to the start of the data chunk.
    #[must_use]
    pub fn first_audio_packet_offset(&self) -> u32 {
        self.first_audio_packet_offset
    }

    /// Returns the detected format variants.
    #[must_use]
    pub fn flags(&self) -> VariantFlags {
        self.flags
    }

    /// Returns the cue labels of the stream as `(cue ID, text)` pairs.
    #[must_use]
    pub fn labels(&self) -> &[(u32, Box<str>)] {
        &self.labels
    }

    fn data<'data>(&self, stream: &'data [u8]) -> &'data [u8] {
        &stream[self.data_offset..self.data_offset + self.data_len]
    }
}

/// Where the codebooks of a stream's setup packet come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CodebookSource {
    /// The stream stores 10-bit indices into a shared [`CodebookLibrary`].
    #[default]
    External,
    /// The stream stores full codebooks.
    Inline,
}

/// How the first byte of each audio packet is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PacketFraming {
    /// Trust the signal value in the vorb chunk.
    #[default]
    Detect,
    /// Always reinsert the packet type and window shape bits.
    Modified,
    /// Never reinsert bits; packets are copied verbatim.
    Standard,
}

/// Options for [`reconstruct`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ReconstructOptions {
    /// Where codebooks come from. Ignored for streams that store their own header packets.
    pub codebooks: CodebookSource,
    /// Whether floor, residue, mapping and mode tables are stored at full width.
    pub full_setup: bool,
    /// Overrides the detection of modified packet framing.
    pub packet_framing: PacketFraming,
}

/// A reconstructed, standard audio file.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Reconstructed {
    /// An Ogg Vorbis file.
    Ogg(Vec<u8>),
    /// A canonical WAV file.
    Wav(Vec<u8>),
}

impl Reconstructed {
    /// Returns the file contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Ogg(bytes) | Self::Wav(bytes) => bytes,
        }
    }

    /// Consumes the output, returning the file contents.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Ogg(bytes) | Self::Wav(bytes) => bytes,
        }
    }

    /// Returns the customary file extension of the output.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ogg(_) => "ogg",
            Self::Wav(_) => "wav",
        }
    }
}

/// Reconstructs a standard file from one stripped stream.
///
/// Vorbis streams become Ogg Vorbis files; PCM streams are re-wrapped as canonical WAV files.
/// `library` is only consulted for Vorbis streams that reference external codebooks.
///
/// # Errors
///
/// Fails if the stream is malformed, refers to missing codebooks or table entries, or yields
/// headers a Vorbis decoder would reject. No partial output is ever returned.
pub fn reconstruct(
    data: &[u8],
    library: &CodebookLibrary,
    options: &ReconstructOptions,
) -> Result<Reconstructed, ReconstructError> {
    let descriptor = StreamDescriptor::parse(data)?;

    match descriptor.codec {
        StreamCodec::Pcm { bits_per_sample } => {
            let wav = pcm::repackage(
                descriptor.data(data),
                descriptor.endian,
                descriptor.channels,
                descriptor.sample_rate,
                bits_per_sample,
            )?;
            Ok(Reconstructed::Wav(wav))
        }
        StreamCodec::Vorbis => {
            let stream = rebuild_vorbis(data, &descriptor, library, options)?;
            Ok(Reconstructed::Ogg(stream.into_ogg()))
        }
    }
}

/// The packets of a reconstructed Vorbis stream, before Ogg framing.
pub(crate) struct VorbisStream {
    pub(crate) ident_header: IdentHeader,
    pub(crate) setup_header: SetupHeader,
    pub(crate) sample_count: u32,
    headers: [Vec<u8>; 3],
    // (packet, granule position)
    pub(crate) packets: Vec<(Vec<u8>, u64)>,
}

impl VorbisStream {
    fn into_ogg(self) -> Vec<u8> {
        let mut writer = OggWriter::new(OGG_SERIAL);
        let [ident, comment, setup] = &self.headers;

        // the identification header sits alone on the first page, and audio starts a fresh page
        writer.write_packet(ident, 0, false);
        writer.flush_page();
        writer.write_packet(comment, 0, false);
        writer.write_packet(setup, 0, self.packets.is_empty());
        writer.flush_page();

        let last = self.packets.len().saturating_sub(1);
        for (index, (packet, granule)) in self.packets.iter().enumerate() {
            writer.write_packet(packet, *granule, index == last);
        }

        writer.finish()
    }
}

pub(crate) fn rebuild_vorbis(
    data: &[u8],
    descriptor: &StreamDescriptor,
    library: &CodebookLibrary,
    options: &ReconstructOptions,
) -> Result<VorbisStream, ReconstructError> {
    let mut flags = descriptor.flags;
    match options.packet_framing {
        PacketFraming::Detect => {}
        PacketFraming::Modified => flags.insert(VariantFlags::MODIFIED_PACKETS),
        PacketFraming::Standard => flags.remove(VariantFlags::MODIFIED_PACKETS),
    }

    log::debug!(
        "reconstructing {}-channel Vorbis stream at {} Hz with flags {flags:?}",
        descriptor.channels,
        descriptor.sample_rate
    );

    let chunk = descriptor.data(data);
    let headers = if flags.contains(VariantFlags::HEADER_TRIAD) {
        setup::copy_triad(chunk, descriptor, flags)?
    } else {
        setup::synthesize(chunk, descriptor, flags, library, options)?
    };

    let ident_header = read_header_ident(&headers.ident)
        .map_err(Into::into)
        .map_err(ReconstructError::from_lewton(
            ReconstructErrorKind::InvalidHeader { packet_type: 1 },
        ))?;

    let _comment_header = read_header_comment(&headers.comment)
        .map_err(Into::into)
        .map_err(ReconstructError::from_lewton(
            ReconstructErrorKind::InvalidHeader { packet_type: 3 },
        ))?;

    let setup_header = read_header_setup(
        &headers.setup,
        ident_header.audio_channels,
        (ident_header.blocksize_0, ident_header.blocksize_1),
    )
    .map_err(Into::into)
    .map_err(ReconstructError::from_lewton(
        ReconstructErrorKind::InvalidHeader { packet_type: 5 },
    ))?;

    let block_sizes = (ident_header.blocksize_0, ident_header.blocksize_1);
    let packets = audio::rebuild_packets(
        chunk,
        descriptor.first_audio_packet_offset as usize,
        flags,
        descriptor.endian,
        &headers.modes,
        block_sizes,
        descriptor.sample_count,
    )?;

    log::debug!("rebuilt {} audio packets", packets.len());

    Ok(VorbisStream {
        ident_header,
        setup_header,
        sample_count: descriptor.sample_count,
        headers: [headers.ident, headers.comment, headers.setup],
        packets,
    })
}
