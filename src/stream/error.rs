use crate::codebook::CodebookError;
use crate::encode::pcm::PcmError;
use crate::error::ErrorKind;
use crate::read::ReadError;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// An error raised while reconstructing a stripped stream. No output is produced when this occurs.
#[derive(Debug)]
pub struct ReconstructError {
    kind: ReconstructErrorKind,
    source: Option<ReconstructErrorSource>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReconstructErrorKind {
    RiffMagic,
    WaveMagic,
    RiffSize { size: u32 },
    ChunkHeader { offset: usize },
    ChunkTruncated { tag: [u8; 4], size: u32 },
    MissingChunk { tag: [u8; 4] },
    FormatChunk,
    UnknownCodec { codec: u16 },
    FormatExtraSize { expected: u32, found: u16 },
    SampleWidth { bits: u16 },
    VorbSize { size: u32 },
    VorbChunk,
    SampleChunk,
    LoopCount { count: u32 },
    LoopRange { start: u32, end: u32, samples: u32 },
    HeaderPacket { offset: usize },
    HeaderGranule { granule: u32 },
    PacketType { expected: u8, found: u8 },
    Codebook,
    SetupTruncated,
    SetupReference { table: SetupTable, index: u32, count: u32 },
    SetupValue { table: SetupTable, value: u32 },
    SetupSize { expected: usize, actual: usize },
    AudioStart { expected: usize, found: usize },
    InvalidHeader { packet_type: u8 },
    AudioPacket { offset: usize },
    Repackage,
}

/// The setup header tables whose entries refer to each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SetupTable {
    Codebook,
    Floor,
    Residue,
    Mapping,
    Mode,
    Channel,
    Submap,
}

impl Display for SetupTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Codebook => "codebook",
            Self::Floor => "floor",
            Self::Residue => "residue",
            Self::Mapping => "mapping",
            Self::Mode => "mode",
            Self::Channel => "channel",
            Self::Submap => "submap",
        })
    }
}

#[derive(Debug)]
enum ReconstructErrorSource {
    Read(ReadError),
    Codebook(CodebookError),
    Lewton(lewton::VorbisError),
    Pcm(PcmError),
}

impl ReconstructError {
    pub(crate) fn new(kind: ReconstructErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn new_with_source(kind: ReconstructErrorKind, source: ReadError) -> Self {
        Self {
            kind,
            source: Some(ReconstructErrorSource::Read(source)),
        }
    }

    pub(crate) fn factory(kind: ReconstructErrorKind) -> impl FnOnce(ReadError) -> Self {
        move |source| Self::new_with_source(kind, source)
    }

    pub(crate) fn from_lewton(
        kind: ReconstructErrorKind,
    ) -> impl FnOnce(lewton::VorbisError) -> Self {
        move |source| Self {
            kind,
            source: Some(ReconstructErrorSource::Lewton(source)),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        use ReconstructErrorKind::*;

        match self.kind {
            RiffMagic | WaveMagic => ErrorKind::MalformedMagic,
            RiffSize { .. }
            | ChunkHeader { .. }
            | ChunkTruncated { .. }
            | FormatChunk
            | VorbChunk
            | SampleChunk
            | HeaderPacket { .. }
            | SetupTruncated
            | AudioPacket { .. } => ErrorKind::OutOfBounds,
            MissingChunk { .. }
            | UnknownCodec { .. }
            | FormatExtraSize { .. }
            | SampleWidth { .. }
            | VorbSize { .. }
            | LoopCount { .. }
            | PacketType { .. }
            | SetupValue { .. } => ErrorKind::UnknownFormat,
            SetupReference { .. } => ErrorKind::OutOfRangeReference,
            Codebook => match &self.source {
                Some(ReconstructErrorSource::Codebook(source)) => source.kind(),
                _ => ErrorKind::ReconstructionFailed,
            },
            LoopRange { .. }
            | HeaderGranule { .. }
            | SetupSize { .. }
            | AudioStart { .. }
            | InvalidHeader { .. }
            | Repackage => ErrorKind::ReconstructionFailed,
        }
    }
}

#[cfg(test)]
impl ReconstructError {
    pub(crate) fn detail(&self) -> ReconstructErrorKind {
        self.kind
    }
}

impl From<CodebookError> for ReconstructError {
    fn from(value: CodebookError) -> Self {
        Self {
            kind: ReconstructErrorKind::Codebook,
            source: Some(ReconstructErrorSource::Codebook(value)),
        }
    }
}

impl From<PcmError> for ReconstructError {
    fn from(value: PcmError) -> Self {
        Self {
            kind: ReconstructErrorKind::Repackage,
            source: Some(ReconstructErrorSource::Pcm(value)),
        }
    }
}

impl Display for ReconstructError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use ReconstructErrorKind::*;

        match self.kind {
            RiffMagic => f.write_str("stream did not start with RIFF or RIFX"),
            WaveMagic => f.write_str("stream was not a WAVE file"),
            RiffSize { size } => f.write_str(&format!(
                "RIFF size was larger than the stream (0x{size:x})"
            )),
            ChunkHeader { offset } => f.write_str(&format!(
                "failed to read chunk header at 0x{offset:x}"
            )),
            ChunkTruncated { tag, size } => f.write_str(&format!(
                "chunk {} was truncated (declared size 0x{size:x})",
                String::from_utf8_lossy(&tag)
            )),
            MissingChunk { tag } => f.write_str(&format!(
                "stream had no {} chunk",
                String::from_utf8_lossy(&tag).trim_end()
            )),
            FormatChunk => f.write_str("failed to read format chunk"),
            UnknownCodec { codec } => f.write_str(&format!(
                "codec of stream was not recognized (0x{codec:04x})"
            )),
            FormatExtraSize { expected, found } => f.write_str(&format!(
                "extra format size was 0x{found:x}, expected 0x{expected:x}"
            )),
            SampleWidth { bits } => f.write_str(&format!(
                "PCM sample width was not supported ({bits} bits)"
            )),
            VorbSize { size } => f.write_str(&format!(
                "vorb chunk size was not recognized (0x{size:x})"
            )),
            VorbChunk => f.write_str("failed to read vorb chunk"),
            SampleChunk => f.write_str("failed to read smpl chunk"),
            LoopCount { count } => f.write_str(&format!(
                "stream declared {count} loops, only one is supported"
            )),
            LoopRange {
                start,
                end,
                samples,
            } => f.write_str(&format!(
                "loop {start}..{end} was outside the stream's {samples} samples"
            )),
            HeaderPacket { offset } => f.write_str(&format!(
                "failed to read header packet at data offset 0x{offset:x}"
            )),
            HeaderGranule { granule } => f.write_str(&format!(
                "header packet had a non-zero granule position ({granule})"
            )),
            PacketType { expected, found } => f.write_str(&format!(
                "header packet type was {found}, expected {expected}"
            )),
            Codebook => f.write_str("failed to rebuild a codebook"),
            SetupTruncated => f.write_str("setup packet ended unexpectedly"),
            SetupReference {
                table,
                index,
                count,
            } => f.write_str(&format!(
                "setup packet referred to {table} {index}, but only {count} exist"
            )),
            SetupValue { table, value } => f.write_str(&format!(
                "{table} field held a value that is not allowed ({value})"
            )),
            SetupSize { expected, actual } => f.write_str(&format!(
                "setup packet was {expected} bytes, but {actual} bytes were read"
            )),
            AudioStart { expected, found } => f.write_str(&format!(
                "first audio packet was expected at 0x{expected:x}, but setup ends at 0x{found:x}"
            )),
            InvalidHeader { packet_type } => f.write_str(&format!(
                "regenerated header packet of type {packet_type} was rejected by the decoder"
            )),
            AudioPacket { offset } => f.write_str(&format!(
                "failed to read audio packet at data offset 0x{offset:x}"
            )),
            Repackage => f.write_str("failed to repackage PCM samples"),
        }?;

        if let Some(ReconstructErrorSource::Read(source)) = &self.source {
            f.write_str(&format!(" - {source}"))?;
        }

        Ok(())
    }
}

impl Error for ReconstructError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => match source {
                ReconstructErrorSource::Read(e) => Some(e),
                ReconstructErrorSource::Codebook(e) => Some(e),
                ReconstructErrorSource::Lewton(e) => Some(e),
                ReconstructErrorSource::Pcm(e) => Some(e),
            },
            None => None,
        }
    }
}
