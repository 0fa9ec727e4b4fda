use super::{
    error::{ContainerError, ContainerErrorKind},
    AudioBlob, Container, ContainerKind,
};
use crate::error::{ErrorKind, Warning};
use crate::read::{Endian, Reader};
use crate::write::{align_up, Writer};
use std::borrow::Cow;

const PACK_MAGIC: [u8; 4] = *b"r3d2";
pub(super) const PACK_VERSION: u32 = 1;

const ENTRY_ALIGNMENT: usize = 8;
const ENTRY_FIXED_SIZE: usize = 12;

// stands in for the ID of an entry whose name does not start with a number
const SENTINEL_ID: u32 = u32::MAX;

pub(super) fn parse(data: &[u8]) -> Result<Container, ContainerError> {
    let mut reader = Reader::new(data);
    reader
        .skip(PACK_MAGIC.len())
        .map_err(ContainerError::factory(ContainerErrorKind::Magic))?;

    let version = reader
        .u32()
        .map_err(ContainerError::factory(ContainerErrorKind::Version))?;

    let count = reader
        .u32()
        .map_err(ContainerError::factory(ContainerErrorKind::EntryCount))?;

    let offsets = (0..count)
        .map(|_| reader.u32())
        .collect::<Result<Vec<_>, _>>()
        .map_err(ContainerError::factory(ContainerErrorKind::OffsetTable { count }))?;

    let mut blobs = Vec::with_capacity(offsets.len());
    let mut warnings = Vec::new();

    for (offset, index) in offsets.into_iter().zip(0u32..) {
        if offset == 0 {
            log::debug!("pack slot {index} is unused");
            continue;
        }

        match read_entry(&mut reader, offset, &mut warnings) {
            Some(blob) => blobs.push(blob),
            None => warnings.push(Warning::new(
                ErrorKind::OutOfBounds,
                offset as usize,
                format!("pack entry {index} is truncated or points outside the file"),
            )),
        }
    }

    blobs.sort_by_key(AudioBlob::id);

    Ok(Container {
        kind: ContainerKind::Pack,
        version,
        endian: Endian::Little,
        blobs,
        layout: Vec::new(),
        warnings,
    })
}

fn read_entry(
    reader: &mut Reader<'_>,
    offset: u32,
    warnings: &mut Vec<Warning>,
) -> Option<AudioBlob> {
    reader.seek(usize::try_from(offset).ok()?).ok()?;

    let data_offset = usize::try_from(reader.u32().ok()?).ok()?;
    let data_len = usize::try_from(reader.u32().ok()?).ok()?;
    let name_len = usize::try_from(reader.u32().ok()?).ok()?;
    let name = reader.wide_ascii(name_len).ok()?;

    reader.seek(data_offset).ok()?;
    let data = reader.take(data_len).ok()?;

    let id = id_from_name(&name).unwrap_or_else(|| {
        warnings.push(Warning::new(
            ErrorKind::UnknownFormat,
            offset as usize,
            format!("pack entry name {name:?} does not start with a numeric ID"),
        ));
        SENTINEL_ID
    });

    Some(AudioBlob::parsed(id, data, Some(name.into())))
}

/// Parses the leading digits of an entry name, after dropping a `.wem` extension.
fn id_from_name(name: &str) -> Option<u32> {
    let stem = match name.rsplit_once('.') {
        Some((stem, extension)) if extension.eq_ignore_ascii_case("wem") => stem,
        _ => name,
    };

    let digits = stem.find(|c: char| !c.is_ascii_digit()).unwrap_or(stem.len());
    stem[..digits].parse().ok()
}

pub(super) fn write(container: &Container) -> Result<Vec<u8>, ContainerError> {
    let names: Vec<Cow<'_, str>> = container
        .blobs
        .iter()
        .map(|blob| match &blob.name {
            Some(name) => Cow::Borrowed(&**name),
            None => Cow::Owned(format!("{}.wem", blob.id)),
        })
        .collect();

    // every offset in the file follows from the entry and name sizes, so lay it out up front
    let table_end = align_up(12 + 4 * names.len(), ENTRY_ALIGNMENT);

    let mut entry_offsets = Vec::with_capacity(names.len());
    let mut position = table_end;
    for name in &names {
        entry_offsets.push(position);
        position += align_up(ENTRY_FIXED_SIZE + 2 * name.chars().count(), ENTRY_ALIGNMENT);
    }

    let mut data_offsets = Vec::with_capacity(names.len());
    for blob in &container.blobs {
        position = align_up(position, ENTRY_ALIGNMENT);
        data_offsets.push(position);
        position += blob.data.len();
    }

    let length = |value: usize, id: u32| {
        u32::try_from(value).map_err(|_| ContainerError::new(ContainerErrorKind::TooLarge { id }))
    };

    let mut writer = Writer::new(Endian::Little);
    writer.bytes(&PACK_MAGIC);
    writer.u32(PACK_VERSION);
    writer.u32(length(names.len(), 0)?);

    for (&offset, blob) in entry_offsets.iter().zip(&container.blobs) {
        writer.u32(length(offset, blob.id)?);
    }
    writer.pad(0, ENTRY_ALIGNMENT);

    for ((name, blob), &data_offset) in names.iter().zip(&container.blobs).zip(&data_offsets) {
        let start = writer.position();
        writer.u32(length(data_offset, blob.id)?);
        writer.u32(length(blob.data.len(), blob.id)?);
        writer.u32(length(name.chars().count(), blob.id)?);

        for character in name.chars() {
            writer.bytes(&[u8::try_from(character).unwrap_or(b'?'), 0]);
        }
        writer.pad(start, ENTRY_ALIGNMENT);
    }

    for blob in &container.blobs {
        writer.pad(0, ENTRY_ALIGNMENT);
        writer.bytes(&blob.data);
    }

    Ok(writer.into_bytes())
}

#[cfg(test)]
mod test {
    use super::{id_from_name, SENTINEL_ID};
    use crate::container::{error::ContainerErrorKind, AudioBlob, Container, ContainerKind};
    use crate::error::ErrorKind;

    fn wide(name: &str) -> Vec<u8> {
        name.bytes().flat_map(|byte| [byte, 0]).collect()
    }

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|value| value.to_le_bytes()).collect()
    }

    // header with offsets [0, 24], one entry at 24 naming 9 bytes of data at 64
    fn sample_pack() -> Vec<u8> {
        let mut pack = b"r3d2".to_vec();
        pack.extend(words(&[1, 2, 0, 24]));
        pack.resize(24, 0);
        pack.extend(words(&[64, 9, 9]));
        pack.extend(wide("12345.wem"));
        pack.resize(64, 0);
        pack.extend_from_slice(b"audiodata");
        pack
    }

    #[test]
    fn skip_unused_slots() {
        let container = Container::parse(&sample_pack()).unwrap();

        assert_eq!(container.kind(), ContainerKind::Pack);
        assert_eq!(container.version(), 1);
        assert_eq!(container.blobs().len(), 1);
        assert!(container.warnings().is_empty());

        let blob = &container.blobs()[0];
        assert_eq!(blob.id(), 12345);
        assert_eq!(blob.length(), 9);
        assert_eq!(blob.data(), b"audiodata");
        assert_eq!(blob.name(), Some("12345.wem"));
    }

    #[test]
    fn parse_ids_from_names() {
        assert_eq!(id_from_name("12345.wem"), Some(12345));
        assert_eq!(id_from_name("678.WEM"), Some(678));
        assert_eq!(id_from_name("42_old.wem"), Some(42));
        assert_eq!(id_from_name("99"), Some(99));
        assert_eq!(id_from_name("music.wem"), None);
        assert_eq!(id_from_name(""), None);
        assert_eq!(id_from_name("99999999999.wem"), None);
    }

    #[test]
    fn keep_entries_with_bad_names() {
        let mut pack = b"r3d2".to_vec();
        pack.extend(words(&[1, 2, 20, 40]));
        pack.extend(words(&[58, 2, 4]));
        pack.extend(wide("kick"));
        pack.extend(words(&[60, 1, 3]));
        pack.extend(wide("7.x"));
        pack.extend_from_slice(b"abc");

        let container = Container::parse(&pack).unwrap();
        let ids: Vec<_> = container.blobs().iter().map(AudioBlob::id).collect();
        assert_eq!(ids, [7, SENTINEL_ID]);
        assert_eq!(container.blobs()[1].data(), b"ab");
        assert_eq!(container.warnings().len(), 1);
        assert_eq!(container.warnings()[0].kind(), ErrorKind::UnknownFormat);
    }

    #[test]
    fn report_entries_out_of_bounds() {
        let mut pack = b"r3d2".to_vec();
        pack.extend(words(&[1, 1, 16]));
        pack.extend(words(&[100, 5, 0]));

        let container = Container::parse(&pack).unwrap();
        assert!(container.blobs().is_empty());
        assert_eq!(container.warnings()[0].kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn reject_truncated_offset_table() {
        let mut pack = b"r3d2".to_vec();
        pack.extend(words(&[1, 3, 16]));

        assert!(Container::parse(&pack).is_err_and(|e| e.kind() == ErrorKind::OutOfBounds
            && e.detail() == ContainerErrorKind::OffsetTable { count: 3 }));
    }

    #[test]
    fn rewrite_is_byte_identical() {
        let mut pack = b"r3d2".to_vec();
        pack.extend(words(&[1, 1, 16]));
        pack.extend(words(&[48, 9, 9]));
        pack.extend(wide("12345.wem"));
        pack.resize(48, 0);
        pack.extend_from_slice(b"audiodata");

        let container = Container::parse(&pack).unwrap();
        assert_eq!(container.write().unwrap(), pack);
    }

    #[test]
    fn write_aligned_entries() {
        let mut container = Container::new(ContainerKind::Pack);
        container.push_blob(AudioBlob::new(5, b"12345"));
        container.push_blob(AudioBlob::new(100, b"xyz"));
        let bytes = container.write().unwrap();

        // header and table take 20 bytes, padded to 24
        assert_eq!(&bytes[..4], b"r3d2");
        assert_eq!(&bytes[4..12], &words(&[1, 2]));
        assert_eq!(&bytes[12..20], &words(&[24, 48]));
        // "5.wem" entry is 22 bytes, padded to 24; "100.wem" is 26, padded to 32
        assert_eq!(&bytes[24..36], &words(&[80, 5, 5]));
        assert_eq!(&bytes[36..46], &wide("5.wem"));
        assert_eq!(&bytes[48..60], &words(&[88, 3, 7]));
        assert_eq!(&bytes[80..85], b"12345");
        assert_eq!(&bytes[88..], b"xyz");

        let reparsed = Container::parse(&bytes).unwrap();
        let summary: Vec<_> = reparsed
            .blobs()
            .iter()
            .map(|blob| (blob.id(), blob.length()))
            .collect();
        assert_eq!(summary, [(5, 5), (100, 3)]);
        assert_eq!(reparsed.write().unwrap(), bytes);
    }
}
