use crate::read::Endian;
use hound::{Sample, SampleFormat, WavSpec, WavWriter};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::Cursor,
};

/// Re-wraps raw integer PCM samples as a canonical WAV file.
pub(crate) fn repackage(
    data: &[u8],
    endian: Endian,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
) -> Result<Vec<u8>, PcmError> {
    let width = match bits_per_sample {
        8 | 16 | 24 | 32 => usize::from(bits_per_sample / 8),
        bits => return Err(PcmError::new(PcmErrorKind::SampleWidth { bits })),
    };
    let samples = data.chunks_exact(width);

    if !samples.remainder().is_empty() {
        log::warn!(
            "dropping {} trailing bytes that do not form a whole sample",
            samples.remainder().len()
        );
    }

    match bits_per_sample {
        8 => write(
            channels,
            sample_rate,
            bits_per_sample,
            samples.map(|sample| i8::from_ne_bytes([sample[0] ^ 0x80])),
        ),
        16 => write(
            channels,
            sample_rate,
            bits_per_sample,
            samples.map(|sample| {
                let bytes = [sample[0], sample[1]];
                match endian {
                    Endian::Little => i16::from_le_bytes(bytes),
                    Endian::Big => i16::from_be_bytes(bytes),
                }
            }),
        ),
        // sign-extended by the arithmetic shift
        24 => write(
            channels,
            sample_rate,
            bits_per_sample,
            samples.map(|sample| match endian {
                Endian::Little => i32::from_le_bytes([0, sample[0], sample[1], sample[2]]) >> 8,
                Endian::Big => i32::from_be_bytes([sample[0], sample[1], sample[2], 0]) >> 8,
            }),
        ),
        _ => write(
            channels,
            sample_rate,
            bits_per_sample,
            samples.map(|sample| {
                let bytes = [sample[0], sample[1], sample[2], sample[3]];
                match endian {
                    Endian::Little => i32::from_le_bytes(bytes),
                    Endian::Big => i32::from_be_bytes(bytes),
                }
            }),
        ),
    }
}

/// Writes interleaved 16-bit samples as a WAV file.
pub(crate) fn write_samples(
    channels: u16,
    sample_rate: u32,
    samples: &[i16],
) -> Result<Vec<u8>, PcmError> {
    write(channels, sample_rate, 16, samples.iter().copied())
}

fn write<S: Sample>(
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    samples: impl Iterator<Item = S>,
) -> Result<Vec<u8>, PcmError> {
    let mut sink = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(
        &mut sink,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample,
            sample_format: SampleFormat::Int,
        },
    )
    .map_err(PcmError::from_hound(PcmErrorKind::CreateWriter))?;

    for sample in samples {
        writer
            .write_sample(sample)
            .map_err(PcmError::from_hound(PcmErrorKind::WriteSample))?;
    }

    writer
        .finalize()
        .map_err(PcmError::from_hound(PcmErrorKind::Finish))?;

    Ok(sink.into_inner())
}

#[derive(Debug)]
pub(crate) struct PcmError {
    kind: PcmErrorKind,
    source: Option<hound::Error>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PcmErrorKind {
    SampleWidth { bits: u16 },
    CreateWriter,
    WriteSample,
    Finish,
}

impl PcmError {
    fn new(kind: PcmErrorKind) -> Self {
        Self { kind, source: None }
    }

    fn from_hound(kind: PcmErrorKind) -> impl FnOnce(hound::Error) -> Self {
        move |source| Self {
            kind,
            source: Some(source),
        }
    }
}

impl Display for PcmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            PcmErrorKind::SampleWidth { bits } => {
                f.write_str(&format!("PCM sample width was not supported ({bits} bits)"))
            }
            PcmErrorKind::CreateWriter => f.write_str("failed to create WAV writer"),
            PcmErrorKind::WriteSample => f.write_str("failed to write PCM sample"),
            PcmErrorKind::Finish => f.write_str("failed to finish WAV file"),
        }
    }
}

impl Error for PcmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{repackage, write_samples};
    use crate::read::Endian;
    use hound::WavReader;

    #[test]
    fn convert_unsigned_bytes() {
        let wav = repackage(&[0x00, 0x80, 0xFF], Endian::Little, 1, 8000, 8).unwrap();
        let mut reader = WavReader::new(wav.as_slice()).unwrap();

        assert_eq!(reader.spec().bits_per_sample, 8);
        let samples: Vec<i8> = reader.samples::<i8>().map(Result::unwrap).collect();
        assert_eq!(samples, [-128, 0, 127]);
    }

    #[test]
    fn sign_extend_big_endian_triples() {
        let data = [0xFF, 0xFF, 0xFE, 0x00, 0x01, 0x00];
        let wav = repackage(&data, Endian::Big, 1, 8000, 24).unwrap();
        let mut reader = WavReader::new(wav.as_slice()).unwrap();

        let samples: Vec<i32> = reader.samples::<i32>().map(Result::unwrap).collect();
        assert_eq!(samples, [-2, 256]);
    }

    #[test]
    fn write_interleaved_samples() {
        let wav = write_samples(2, 22050, &[1, 2, 3, 4]).unwrap();
        let reader = WavReader::new(wav.as_slice()).unwrap();

        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.duration(), 2);
    }

    #[test]
    fn reject_unsupported_widths() {
        assert!(repackage(&[0; 4], Endian::Little, 1, 8000, 12).is_err());
        assert!(repackage(&[0; 4], Endian::Little, 1, 8000, 0).is_err());
    }
}
