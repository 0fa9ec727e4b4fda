//! Playback and export paths built on top of reconstruction.

pub(crate) mod error;
pub(crate) mod pcm;
mod vorbis;

use crate::codebook::CodebookLibrary;
use crate::container::AudioBlob;
use crate::stream::{self, ReconstructOptions, StreamCodec, StreamDescriptor};
use error::EncodeError;
use std::error::Error;

/// Decodes one stripped stream into a 16-bit WAV file.
///
/// PCM streams are repackaged as-is. Vorbis streams are reconstructed, decoded and trimmed to the
/// sample count declared by the stream.
///
/// # Errors
///
/// Fails if the stream cannot be reconstructed, or if a rebuilt packet does not decode.
pub fn decode_to_wav(
    data: &[u8],
    library: &CodebookLibrary,
    options: &ReconstructOptions,
) -> Result<Vec<u8>, EncodeError> {
    let descriptor = StreamDescriptor::parse(data)?;

    match descriptor.codec() {
        StreamCodec::Pcm { .. } => Ok(stream::reconstruct(data, library, options)?.into_bytes()),
        StreamCodec::Vorbis => {
            let stream = stream::rebuild_vorbis(data, &descriptor, library, options)?;
            let samples = vorbis::decode(&stream)?;

            log::debug!(
                "decoded {} samples from {} packets",
                samples.len(),
                stream.packets.len()
            );

            Ok(pcm::write_samples(
                descriptor.channels(),
                descriptor.sample_rate(),
                &samples,
            )?)
        }
    }
}

/// The codings an external transcoder may be asked to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SampleEncoding {
    /// Uncompressed integer PCM.
    Pcm,
    /// Platform ADPCM.
    Adpcm,
    /// Wwise Vorbis.
    Vorbis,
    /// Opus.
    Opus,
}

/// A conversion this crate does not implement itself, such as a lossy re-encode, delegated to a
/// native tool.
pub trait Transcoder {
    /// The error returned by the tool.
    type Error: Error + Send + Sync + 'static;

    /// Converts a complete input file to `encoding`, returning the complete output file.
    ///
    /// # Errors
    ///
    /// Any failure of the tool.
    fn transcode(&mut self, input: &[u8], encoding: SampleEncoding) -> Result<Vec<u8>, Self::Error>;
}

/// Replaces the payload of `blob` with the output of `transcoder`, marking the blob as modified.
///
/// # Errors
///
/// Fails if the transcoder fails, in which case the blob is left untouched.
pub fn transcode_blob<T: Transcoder>(
    blob: &mut AudioBlob,
    transcoder: &mut T,
    encoding: SampleEncoding,
) -> Result<(), EncodeError> {
    let output = transcoder
        .transcode(blob.data(), encoding)
        .map_err(|e| EncodeError::transcoder(blob.id(), Box::new(e)))?;

    log::debug!(
        "transcoded blob {} to {encoding:?} ({} -> {} bytes)",
        blob.id(),
        blob.length(),
        output.len()
    );

    blob.replace(&output);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::error::EncodeErrorKind;
    use super::{decode_to_wav, transcode_blob, SampleEncoding, Transcoder};
    use crate::codebook::{fixture, CodebookLibrary};
    use crate::container::AudioBlob;
    use crate::error::ErrorKind;
    use crate::stream::fixture::{compact_setup, StreamBuilder};
    use crate::stream::ReconstructOptions;
    use hound::WavReader;
    use std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    };

    #[test]
    fn decode_silent_stream() {
        let library =
            CodebookLibrary::load(&fixture::library(&[&fixture::two_entry_codebook()])).unwrap();
        let stream = StreamBuilder {
            sample_count: 100,
            ..StreamBuilder::default()
        }
        .build(&compact_setup(0), &[(&[0x00], 0), (&[0x00], 128), (&[0x00], 256)]);

        let wav = decode_to_wav(&stream, &library, &ReconstructOptions::default()).unwrap();
        let mut reader = WavReader::new(wav.as_slice()).unwrap();

        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 44100);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.duration(), 100);
        assert!(reader.samples::<i16>().all(|sample| sample.unwrap() == 0));
    }

    #[test]
    fn decode_needs_a_valid_stream() {
        let library = CodebookLibrary::load(&fixture::library(&[])).unwrap();

        assert!(decode_to_wav(b"OggS", &library, &ReconstructOptions::default())
            .is_err_and(|e| e.kind() == ErrorKind::MalformedMagic
                && e.detail() == EncodeErrorKind::Reconstruct));
    }

    #[derive(Debug)]
    struct ToolFailed;

    impl Display for ToolFailed {
        fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
            f.write_str("tool failed")
        }
    }

    impl Error for ToolFailed {}

    struct Reverse {
        calls: Vec<SampleEncoding>,
        fail: bool,
    }

    impl Transcoder for Reverse {
        type Error = ToolFailed;

        fn transcode(
            &mut self,
            input: &[u8],
            encoding: SampleEncoding,
        ) -> Result<Vec<u8>, Self::Error> {
            self.calls.push(encoding);

            if self.fail {
                Err(ToolFailed)
            } else {
                Ok(input.iter().rev().copied().collect())
            }
        }
    }

    #[test]
    fn replace_blob_with_transcoder_output() {
        let mut blob = AudioBlob::parsed(7, b"abc", None);
        let mut transcoder = Reverse {
            calls: Vec::new(),
            fail: false,
        };

        transcode_blob(&mut blob, &mut transcoder, SampleEncoding::Opus).unwrap();
        assert_eq!(blob.data(), b"cba");
        assert!(blob.is_modified());
        assert_eq!(transcoder.calls, [SampleEncoding::Opus]);
    }

    #[test]
    fn keep_blob_on_transcoder_failure() {
        let mut blob = AudioBlob::parsed(7, b"abc", None);
        let mut transcoder = Reverse {
            calls: Vec::new(),
            fail: true,
        };

        let result = transcode_blob(&mut blob, &mut transcoder, SampleEncoding::Adpcm);
        assert!(result.is_err_and(|e| e.kind() == ErrorKind::ReconstructionFailed
            && e.detail() == EncodeErrorKind::Transcode { blob_id: 7 }
            && e.source().is_some()));
        assert_eq!(blob.data(), b"abc");
        assert!(!blob.is_modified());
    }
}
