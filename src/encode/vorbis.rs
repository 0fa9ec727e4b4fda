use crate::stream::VorbisStream;
use lewton::{
    audio::{read_audio_packet_generic, PreviousWindowRight},
    samples::Samples,
};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Decodes every audio packet of a reconstructed stream into interleaved 16-bit samples, trimmed
/// to the declared sample count.
pub(super) fn decode(stream: &VorbisStream) -> Result<Vec<i16>, VorbisError> {
    let channels = usize::from(stream.ident_header.audio_channels);
    let limit = (stream.sample_count > 0).then(|| stream.sample_count as usize * channels);

    let mut window = PreviousWindowRight::new();
    let mut samples = Vec::new();

    for (index, (packet, _)) in stream.packets.iter().enumerate() {
        if packet.is_empty() {
            continue;
        }

        let block: Block = read_audio_packet_generic(
            &stream.ident_header,
            &stream.setup_header,
            packet,
            &mut window,
        )
        .map_err(Into::into)
        .map_err(VorbisError::from_lewton(VorbisErrorKind::DecodePacket {
            index,
        }))?;

        block.interleave_into(&mut samples);

        if limit.is_some_and(|limit| samples.len() >= limit) {
            break;
        }
    }

    if let Some(limit) = limit {
        samples.truncate(limit);
    }

    Ok(samples)
}

struct Block(Vec<Vec<f32>>);

impl Block {
    // saturating conversion of [-1.0, 1.0] floats
    #[allow(clippy::cast_possible_truncation)]
    fn interleave_into(&self, sink: &mut Vec<i16>) {
        for frame in 0..self.num_samples() {
            for channel in &self.0 {
                let sample = (channel[frame] * 32768.0).clamp(-32768.0, 32767.0);
                sink.push(sample as i16);
            }
        }
    }
}

impl Samples for Block {
    fn from_floats(floats: Vec<Vec<f32>>) -> Self {
        Self(floats)
    }

    fn num_samples(&self) -> usize {
        self.0.first().map_or(0, Vec::len)
    }

    fn truncate(&mut self, limit: usize) {
        for channel in &mut self.0 {
            if limit < channel.len() {
                channel.truncate(limit);
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct VorbisError {
    kind: VorbisErrorKind,
    source: lewton::VorbisError,
}

#[derive(Clone, Copy, Debug)]
enum VorbisErrorKind {
    DecodePacket { index: usize },
}

impl VorbisError {
    fn from_lewton(kind: VorbisErrorKind) -> impl FnOnce(lewton::VorbisError) -> Self {
        move |source| Self { kind, source }
    }
}

impl Display for VorbisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            VorbisErrorKind::DecodePacket { index } => f.write_str(&format!(
                "failed to decode audio packet {index} of Vorbis stream"
            )),
        }
    }
}

impl Error for VorbisError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}
