use super::pcm::PcmError;
use super::vorbis::VorbisError;
use crate::error::ErrorKind;
use crate::stream::error::ReconstructError;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// An error raised while decoding a stream or transcoding a blob.
#[derive(Debug)]
pub struct EncodeError {
    kind: EncodeErrorKind,
    source: EncodeErrorSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EncodeErrorKind {
    Reconstruct,
    Decode,
    WriteWav,
    Transcode { blob_id: u32 },
}

#[derive(Debug)]
enum EncodeErrorSource {
    Reconstruct(ReconstructError),
    Vorbis(VorbisError),
    Pcm(PcmError),
    Transcoder(Box<dyn Error + Send + Sync>),
}

impl EncodeError {
    pub(crate) fn transcoder(blob_id: u32, source: Box<dyn Error + Send + Sync>) -> Self {
        Self {
            kind: EncodeErrorKind::Transcode { blob_id },
            source: EncodeErrorSource::Transcoder(source),
        }
    }

    /// Returns the classification of this error. Failures of the decoder, the WAV writer or an
    /// external transcoder count as [`ErrorKind::ReconstructionFailed`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match &self.source {
            EncodeErrorSource::Reconstruct(source) => source.kind(),
            _ => ErrorKind::ReconstructionFailed,
        }
    }
}

#[cfg(test)]
impl EncodeError {
    pub(crate) fn detail(&self) -> EncodeErrorKind {
        self.kind
    }
}

impl From<ReconstructError> for EncodeError {
    fn from(value: ReconstructError) -> Self {
        Self {
            kind: EncodeErrorKind::Reconstruct,
            source: EncodeErrorSource::Reconstruct(value),
        }
    }
}

impl From<VorbisError> for EncodeError {
    fn from(value: VorbisError) -> Self {
        Self {
            kind: EncodeErrorKind::Decode,
            source: EncodeErrorSource::Vorbis(value),
        }
    }
}

impl From<PcmError> for EncodeError {
    fn from(value: PcmError) -> Self {
        Self {
            kind: EncodeErrorKind::WriteWav,
            source: EncodeErrorSource::Pcm(value),
        }
    }
}

impl Display for EncodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            EncodeErrorKind::Reconstruct => f.write_str("failed to reconstruct stream"),
            EncodeErrorKind::Decode => f.write_str("failed to decode Vorbis stream"),
            EncodeErrorKind::WriteWav => f.write_str("failed to write decoded samples"),
            EncodeErrorKind::Transcode { blob_id } => f.write_str(&format!(
                "external transcoder failed on blob {blob_id}"
            )),
        }
    }
}

impl Error for EncodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            EncodeErrorSource::Reconstruct(e) => Some(e),
            EncodeErrorSource::Vorbis(e) => Some(e),
            EncodeErrorSource::Pcm(e) => Some(e),
            EncodeErrorSource::Transcoder(e) => Some(e.as_ref()),
        }
    }
}
