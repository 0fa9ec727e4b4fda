use super::{
    error::{ContainerError, ContainerErrorKind},
    AudioBlob, BankChunk, Container, ContainerKind,
};
use crate::error::{ErrorKind, Warning};
use crate::read::{Endian, Reader};
use crate::write::{align_up, Writer};
use tap::Pipe;

const HEADER_TAG: [u8; 4] = *b"BKHD";
const INDEX_TAG: [u8; 4] = *b"DIDX";
const DATA_TAG: [u8; 4] = *b"DATA";

const INDEX_RECORD_SIZE: usize = 12;
const DATA_ALIGNMENT: usize = 16;

// header chunk payload length minus the version field
pub(super) const DEFAULT_HEADER_TAIL: usize = 0x18;

pub(super) fn parse(data: &[u8]) -> Result<Container, ContainerError> {
    let endian = detect_endian(data)?;
    let mut reader = Reader::with_endian(data, endian);

    let mut version = None;
    let mut layout = Vec::new();
    let mut warnings = Vec::new();
    let mut index: Option<&[u8]> = None;
    let mut payloads: Option<(&[u8], usize)> = None;

    while reader.remaining() > 0 {
        let position = reader.position();

        let Some((tag, payload)) = read_chunk(&mut reader) else {
            warnings.push(Warning::new(
                ErrorKind::OutOfBounds,
                position,
                "truncated chunk at end of bank",
            ));
            break;
        };

        log::debug!(
            "bank chunk {} at 0x{position:x}, {} bytes",
            tag.escape_ascii(),
            payload.len()
        );

        match tag {
            HEADER_TAG if version.is_none() => {
                let (value, tail) = split_version(payload, endian)?;
                version = Some(value);
                layout.push(BankChunk::Header {
                    tail: tail.into(),
                });
            }
            _ if version.is_none() => return Err(ContainerError::new(ContainerErrorKind::Magic)),
            INDEX_TAG if index.is_none() => {
                index = Some(payload);
                layout.push(BankChunk::Index);
            }
            DATA_TAG if payloads.is_none() => {
                payloads = Some((payload, reader.position() - payload.len()));
                layout.push(BankChunk::Data);
            }
            tag => layout.push(BankChunk::Other {
                tag,
                payload: payload.into(),
            }),
        }
    }

    let version = version.ok_or_else(|| ContainerError::new(ContainerErrorKind::Version))?;

    let mut blobs = match (index, payloads) {
        (Some(index), Some((payloads, base))) => {
            read_index(index, payloads, base, endian, &mut warnings)
        }
        (Some(index), None) if !index.is_empty() => {
            warnings.push(Warning::new(
                ErrorKind::OutOfBounds,
                0,
                "bank has an index chunk but no data chunk",
            ));
            Vec::new()
        }
        _ => Vec::new(),
    };

    // stable, so duplicate IDs keep their index order
    blobs.sort_by_key(AudioBlob::id);

    Ok(Container {
        kind: ContainerKind::Bank,
        version,
        endian,
        blobs,
        layout,
        warnings,
    })
}

// The header length must fit the file; whichever byte order makes it fit is the bank's order.
fn detect_endian(data: &[u8]) -> Result<Endian, ContainerError> {
    let raw: [u8; 4] = data
        .get(4..8)
        .and_then(|len| len.try_into().ok())
        .ok_or_else(|| ContainerError::new(ContainerErrorKind::Magic))?;

    let available = data.len() - 8;
    let fits = |len: u32| usize::try_from(len).is_ok_and(|len| len >= 4 && len <= available);

    if fits(u32::from_le_bytes(raw)) {
        Ok(Endian::Little)
    } else if fits(u32::from_be_bytes(raw)) {
        Ok(Endian::Big)
    } else {
        Err(ContainerError::new(ContainerErrorKind::HeaderLength {
            len: u32::from_le_bytes(raw),
        }))
    }
}

fn read_chunk<'data>(reader: &mut Reader<'data>) -> Option<([u8; 4], &'data [u8])> {
    let tag = reader.take_const().ok()?;
    let len = reader.u32().ok()?.pipe(usize::try_from).ok()?;
    let payload = reader.take(len).ok()?;
    Some((tag, payload))
}

fn split_version(payload: &[u8], endian: Endian) -> Result<(u32, &[u8]), ContainerError> {
    let mut reader = Reader::with_endian(payload, endian);
    let version = reader
        .u32()
        .map_err(ContainerError::factory(ContainerErrorKind::Version))?;

    Ok((version, &payload[reader.position()..]))
}

fn read_index(
    index: &[u8],
    payloads: &[u8],
    base: usize,
    endian: Endian,
    warnings: &mut Vec<Warning>,
) -> Vec<AudioBlob> {
    let records = index.chunks_exact(INDEX_RECORD_SIZE);

    if !records.remainder().is_empty() {
        warnings.push(Warning::new(
            ErrorKind::OutOfBounds,
            0,
            format!(
                "index chunk length {} is not a multiple of {INDEX_RECORD_SIZE}",
                index.len()
            ),
        ));
    }

    let mut blobs = Vec::with_capacity(index.len() / INDEX_RECORD_SIZE);

    for record in records {
        let mut reader = Reader::with_endian(record, endian);
        let (Ok(id), Ok(offset), Ok(len)) = (reader.u32(), reader.u32(), reader.u32()) else {
            continue;
        };

        let data = usize::try_from(offset)
            .ok()
            .zip(usize::try_from(len).ok())
            .and_then(|(offset, len)| payloads.get(offset..offset.checked_add(len)?));

        match data {
            Some(data) => blobs.push(AudioBlob::parsed(id, data, None)),
            None => warnings.push(Warning::new(
                ErrorKind::OutOfBounds,
                base,
                format!(
                    "blob {id} at data offset 0x{offset:x} (0x{len:x} bytes) lies outside the data chunk"
                ),
            )),
        }
    }

    blobs
}

pub(super) fn write(container: &Container) -> Result<Vec<u8>, ContainerError> {
    let (index_slot, data_slot) = (BankChunk::Index, BankChunk::Data);
    let mut layout: Vec<&BankChunk> = container.layout.iter().collect();

    // fresh banks gain index and data slots right after the header
    if !container.blobs.is_empty() && !layout.contains(&&index_slot) {
        let at = usize::from(!layout.is_empty());
        layout.insert(at, &index_slot);
    }
    if !container.blobs.is_empty() && !layout.contains(&&data_slot) {
        let at = layout
            .iter()
            .position(|chunk| **chunk == index_slot)
            .map_or(0, |index| index + 1);
        layout.insert(at, &data_slot);
    }

    let offsets = data_offsets(&container.blobs);
    let mut writer = Writer::new(container.endian);

    for chunk in layout {
        match chunk {
            BankChunk::Header { tail } => {
                writer.bytes(&HEADER_TAG);
                writer.u32(chunk_length(4 + tail.len(), 0)?);
                writer.u32(container.version);
                writer.bytes(tail);
            }
            BankChunk::Index => {
                writer.bytes(&INDEX_TAG);
                writer.u32(chunk_length(INDEX_RECORD_SIZE * container.blobs.len(), 0)?);

                for (blob, &offset) in container.blobs.iter().zip(&offsets) {
                    writer.u32(blob.id);
                    writer.u32(chunk_length(offset, blob.id)?);
                    writer.u32(chunk_length(blob.data.len(), blob.id)?);
                }
            }
            BankChunk::Data => {
                let len = container
                    .blobs
                    .last()
                    .zip(offsets.last())
                    .map_or(0, |(blob, offset)| offset + blob.data.len());

                writer.bytes(&DATA_TAG);
                writer.u32(chunk_length(
                    len,
                    container.blobs.last().map_or(0, AudioBlob::id),
                )?);

                let start = writer.position();
                for (blob, &offset) in container.blobs.iter().zip(&offsets) {
                    writer.pad(start, DATA_ALIGNMENT);
                    debug_assert_eq!(writer.position() - start, offset);
                    writer.bytes(&blob.data);
                }
            }
            BankChunk::Other { tag, payload } => {
                writer.bytes(tag);
                writer.u32(chunk_length(payload.len(), 0)?);
                writer.bytes(payload);
            }
        }
    }

    Ok(writer.into_bytes())
}

fn data_offsets(blobs: &[AudioBlob]) -> Vec<usize> {
    let mut end = 0;

    blobs
        .iter()
        .map(|blob| {
            let offset = align_up(end, DATA_ALIGNMENT);
            end = offset + blob.data.len();
            offset
        })
        .collect()
}

fn chunk_length(len: usize, id: u32) -> Result<u32, ContainerError> {
    u32::try_from(len).map_err(|_| ContainerError::new(ContainerErrorKind::TooLarge { id }))
}

#[cfg(test)]
mod test {
    use super::{super::AudioBlob, Container, ContainerKind};
    use crate::error::ErrorKind;
    use crate::read::Endian;

    fn chunk(tag: &[u8; 4], payload: &[u8], big_endian: bool) -> Vec<u8> {
        let len = u32::try_from(payload.len()).unwrap();
        let mut bytes = tag.to_vec();
        if big_endian {
            bytes.extend_from_slice(&len.to_be_bytes());
        } else {
            bytes.extend_from_slice(&len.to_le_bytes());
        }
        bytes.extend_from_slice(payload);
        bytes
    }

    fn header(version: u32) -> Vec<u8> {
        let mut payload = version.to_le_bytes().to_vec();
        payload.extend_from_slice(&[0xAB; 0x18]);
        chunk(b"BKHD", &payload, false)
    }

    fn record(id: u32, offset: u32, len: u32) -> Vec<u8> {
        [id, offset, len].iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    // blobs 7 (5 bytes), 3 (3 bytes) and 7 again (2 bytes), listed out of ID order
    fn sample_bank() -> Vec<u8> {
        let mut index = record(7, 0, 5);
        index.extend(record(3, 16, 3));
        index.extend(record(7, 32, 2));

        let mut data = vec![1; 5];
        data.resize(16, 0);
        data.extend_from_slice(&[2; 3]);
        data.resize(32, 0);
        data.extend_from_slice(&[3; 2]);

        let mut bank = header(134);
        bank.extend(chunk(b"DIDX", &index, false));
        bank.extend(chunk(b"DATA", &data, false));
        bank.extend(chunk(b"HIRC", &0u32.to_le_bytes(), false));
        bank
    }

    #[test]
    fn parse_bank() {
        let container = Container::parse(&sample_bank()).unwrap();

        assert_eq!(container.kind(), ContainerKind::Bank);
        assert_eq!(container.version(), 134);
        assert_eq!(container.endian(), Endian::Little);
        assert_eq!(container.header_tail(), Some([0xAB; 0x18].as_slice()));
        assert!(container.warnings().is_empty());

        let blobs: Vec<_> = container
            .blobs()
            .iter()
            .map(|blob| (blob.id(), blob.data().to_vec()))
            .collect();
        assert_eq!(
            blobs,
            [(3, vec![2; 3]), (7, vec![1; 5]), (7, vec![3; 2])]
        );
        assert!(container
            .blobs()
            .iter()
            .all(|blob| blob.length() as usize == blob.data().len() && !blob.is_modified()));

        let graph = container.object_graph().unwrap().unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn rewrite_is_byte_identical() {
        let mut bank = header(134);
        let mut index = record(3, 0, 3);
        index.extend(record(7, 16, 5));
        let mut data = vec![2; 3];
        data.resize(16, 0);
        data.extend_from_slice(&[1; 5]);
        bank.extend(chunk(b"STID", b"names", false));
        bank.extend(chunk(b"DIDX", &index, false));
        bank.extend(chunk(b"DATA", &data, false));

        let container = Container::parse(&bank).unwrap();
        assert_eq!(container.write().unwrap(), bank);
    }

    #[test]
    fn rewrite_keeps_blob_set() {
        let original = Container::parse(&sample_bank()).unwrap();
        let rewritten = Container::parse(&original.write().unwrap()).unwrap();

        let summary = |container: &Container| -> Vec<(u32, u32)> {
            container
                .blobs()
                .iter()
                .map(|blob| (blob.id(), blob.length()))
                .collect()
        };
        assert_eq!(summary(&original), summary(&rewritten));
        assert_eq!(rewritten.write().unwrap(), original.write().unwrap());
    }

    #[test]
    fn write_aligned_data() {
        let mut container = Container::new(ContainerKind::Bank);
        container.push_blob(AudioBlob::new(9, &[9; 20]));
        container.push_blob(AudioBlob::new(4, &[4; 3]));
        let bytes = container.write().unwrap();

        // header chunk, then index, then data
        assert_eq!(&bytes[..4], b"BKHD");
        assert_eq!(&bytes[4..8], &0x1Cu32.to_le_bytes());
        let index = 8 + 0x1C;
        assert_eq!(&bytes[index..index + 4], b"DIDX");
        assert_eq!(&bytes[index + 4..index + 8], &24u32.to_le_bytes());
        assert_eq!(&bytes[index + 8..index + 20], record(4, 0, 3).as_slice());
        assert_eq!(&bytes[index + 20..index + 32], record(9, 16, 20).as_slice());
        let data = index + 32;
        assert_eq!(&bytes[data..data + 4], b"DATA");
        assert_eq!(&bytes[data + 4..data + 8], &36u32.to_le_bytes());
        assert_eq!(bytes.len(), data + 8 + 36);

        let reparsed = Container::parse(&bytes).unwrap();
        assert_eq!(reparsed.blobs()[1].data(), &[9; 20]);
    }

    #[test]
    fn parse_big_endian_bank() {
        let mut payload = 120u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&[0; 0x18]);
        let mut bank = chunk(b"BKHD", &payload, true);
        let index: Vec<u8> = [5u32, 0, 4].iter().flat_map(|v| v.to_be_bytes()).collect();
        bank.extend(chunk(b"DIDX", &index, true));
        bank.extend(chunk(b"DATA", b"wxyz", true));

        let container = Container::parse(&bank).unwrap();
        assert_eq!(container.endian(), Endian::Big);
        assert_eq!(container.version(), 120);
        assert_eq!(container.blobs()[0].id(), 5);
        assert_eq!(container.blobs()[0].data(), b"wxyz");
        assert_eq!(container.write().unwrap(), bank);
    }

    #[test]
    fn report_damaged_records() {
        let mut index = record(1, 0, 4);
        index.extend(record(2, 2, 10));
        let mut bank = header(134);
        bank.extend(chunk(b"DIDX", &index, false));
        bank.extend(chunk(b"DATA", b"abcd", false));
        bank.extend(b"DAT");

        let container = Container::parse(&bank).unwrap();
        assert_eq!(container.blobs().len(), 1);
        assert_eq!(container.warnings().len(), 2);
        assert!(container
            .warnings()
            .iter()
            .all(|warning| warning.kind() == ErrorKind::OutOfBounds));
    }

    #[test]
    fn reject_bad_headers() {
        assert!(Container::parse(b"BKHD\xFF\xFF\xFF\x7F")
            .is_err_and(|e| e.kind() == ErrorKind::OutOfBounds));
        assert!(Container::parse(b"BKHD\x00\x00\x00\x00")
            .is_err_and(|e| e.kind() == ErrorKind::OutOfBounds));
    }
}
