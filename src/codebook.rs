use crate::bits::{ilog, BitReader, BitWriter};
use crate::error::ErrorKind;
use crate::read::{ReadError, Reader};
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    sync::{Arc, Mutex, PoisonError},
};

/// Sync pattern opening every codebook in a standard Vorbis setup header ("BCV").
const CODEBOOK_SYNC: u32 = 0x0056_4342;

/// A shared table of packed codebooks, referenced by index from stripped streams.
///
/// The table is immutable once loaded.
pub struct CodebookLibrary {
    raw: Box<[u8]>,
    offsets: Box<[u32]>,
}

impl CodebookLibrary {
    /// Loads a codebook table.
    ///
    /// The final 4 bytes hold the little-endian position of an offset table, which runs to the end
    /// of the data. Each offset marks where a codebook begins; the last one marks where the
    /// final codebook ends.
    ///
    /// # Errors
    ///
    /// Fails if the offset table lies outside the data or its offsets are not in ascending order.
    pub fn load(data: &[u8]) -> Result<Self, CodebookError> {
        let mut reader = Reader::new(data);

        let table_position = data.len().checked_sub(4).ok_or_else(|| {
            CodebookError::new(CodebookErrorKind::TableOffset { offset: data.len() })
        })?;

        let table_start = reader
            .seek(table_position)
            .and_then(|()| reader.le_u32())
            .map_err(CodebookError::factory(CodebookErrorKind::TableOffset {
                offset: table_position,
            }))? as usize;

        if table_start > data.len() - 4 || (data.len() - table_start) % 4 != 0 {
            return Err(CodebookError::new(CodebookErrorKind::TableOffset {
                offset: table_start,
            }));
        }

        reader
            .seek(table_start)
            .map_err(CodebookError::factory(CodebookErrorKind::TableOffset {
                offset: table_start,
            }))?;

        let count = (data.len() - table_start) / 4;
        let mut offsets = Vec::with_capacity(count);

        for index in 0..count {
            let offset = reader
                .le_u32()
                .map_err(CodebookError::factory(CodebookErrorKind::TableOrder { index }))?;

            let in_order = offsets.last().map_or(true, |&previous| previous <= offset);

            if !in_order || offset as usize > table_start {
                return Err(CodebookError::new(CodebookErrorKind::TableOrder { index }));
            }

            offsets.push(offset);
        }

        log::debug!(
            "loaded codebook library with {} codebooks",
            count.saturating_sub(1)
        );

        Ok(Self {
            raw: data[..table_start].into(),
            offsets: offsets.into_boxed_slice(),
        })
    }

    /// Returns the number of codebooks in the library.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Returns `true` if the library holds no codebooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the packed bytes of codebook `id`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidCodebookId`] if `id` is not below [`CodebookLibrary::len`].
    pub fn get_codebook(&self, id: usize) -> Result<&[u8], CodebookError> {
        if id >= self.len() {
            return Err(CodebookError::new(CodebookErrorKind::InvalidId {
                id,
                count: self.len(),
            }));
        }

        let start = self.offsets[id] as usize;
        let end = self.offsets[id + 1] as usize;
        Ok(&self.raw[start..end])
    }

    /// Expands codebook `id` from its packed form into a standard Vorbis codebook appended to
    /// `sink`.
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown, or if the packed data is malformed or does not exactly fill its
    /// slot.
    pub fn rebuild_from_id(
        &self,
        id: usize,
        sink: &mut BitWriter,
    ) -> Result<CodebookShape, CodebookError> {
        let codebook = self.get_codebook(id)?;
        let mut source = BitReader::new(codebook);
        let shape = rebuild_codebook(&mut source, sink)?;

        // packed codebooks are padded to the next byte, with at least one bit of padding
        let expected = codebook.len();
        let actual = source.total_bits_read() / 8 + 1;

        if expected == actual {
            Ok(shape)
        } else {
            Err(CodebookError::new(CodebookErrorKind::SizeMismatch {
                id,
                expected,
                actual,
            }))
        }
    }
}

impl Debug for CodebookLibrary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CodebookLibrary")
            .field("codebooks", &self.len())
            .field("size", &self.raw.len())
            .finish()
    }
}

/// The structural fields of a codebook, as recovered while rebuilding or copying it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CodebookShape {
    dimensions: u16,
    entries: u32,
    ordered: bool,
    lookup_type: u8,
}

impl CodebookShape {
    /// Returns the number of scalars per vector-quantized entry.
    #[must_use]
    pub fn dimensions(&self) -> u16 {
        self.dimensions
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn entries(&self) -> u32 {
        self.entries
    }

    /// Returns `true` if codeword lengths are stored as ascending runs.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Returns the vector lookup type (0 for none).
    #[must_use]
    pub fn lookup_type(&self) -> u8 {
        self.lookup_type
    }
}

/// Expands one packed codebook read from `source` into a standard Vorbis codebook appended to
/// `sink`.
///
/// Packed codebooks drop the sync pattern and narrow every width: dimensions take 4 bits,
/// entries 14, codeword lengths are stored with a per-codebook width, and the lookup type takes 1.
///
/// # Errors
///
/// Fails if `source` runs out or holds a value that has no standard encoding.
pub fn rebuild_codebook(
    source: &mut BitReader<'_>,
    sink: &mut BitWriter,
) -> Result<CodebookShape, CodebookError> {
    let truncated = || CodebookError::factory(CodebookErrorKind::Truncated);

    let dimensions = source.read_u8(4).map_err(truncated())?;
    let entries = source.read(14).map_err(truncated())?;

    sink.write(CODEBOOK_SYNC, 24);
    sink.write(u32::from(dimensions), 16);
    sink.write(entries, 24);

    let ordered = copy_codeword_lengths(source, sink, entries, Layout::Packed)?;

    let lookup_type = source.read_u8(1).map_err(truncated())?;
    sink.write(u32::from(lookup_type), 4);

    let shape = CodebookShape {
        dimensions: dimensions.into(),
        entries,
        ordered,
        lookup_type,
    };
    copy_lookup_values(source, sink, &shape)?;

    Ok(shape)
}

/// Copies one standard Vorbis codebook from `source` to `sink` bit for bit, checking its structure.
///
/// # Errors
///
/// Fails on a bad sync pattern, a truncated codebook, or an unknown lookup type.
pub fn copy_codebook(
    source: &mut BitReader<'_>,
    sink: &mut BitWriter,
) -> Result<CodebookShape, CodebookError> {
    let truncated = || CodebookError::factory(CodebookErrorKind::Truncated);

    let sync = source.read(24).map_err(truncated())?;
    if sync != CODEBOOK_SYNC {
        return Err(CodebookError::new(CodebookErrorKind::Sync { found: sync }));
    }

    let dimensions = source.read_u16(16).map_err(truncated())?;
    let entries = source.read(24).map_err(truncated())?;

    sink.write(sync, 24);
    sink.write(u32::from(dimensions), 16);
    sink.write(entries, 24);

    let ordered = copy_codeword_lengths(source, sink, entries, Layout::Standard)?;

    let lookup_type = source.read_u8(4).map_err(truncated())?;
    sink.write(u32::from(lookup_type), 4);

    let shape = CodebookShape {
        dimensions,
        entries,
        ordered,
        lookup_type,
    };
    copy_lookup_values(source, sink, &shape)?;

    Ok(shape)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Layout {
    Packed,
    Standard,
}

// returns the "ordered" flag
fn copy_codeword_lengths(
    source: &mut BitReader<'_>,
    sink: &mut BitWriter,
    entries: u32,
    layout: Layout,
) -> Result<bool, CodebookError> {
    let truncated = || CodebookError::factory(CodebookErrorKind::Truncated);

    let ordered = source.read_bool().map_err(truncated())?;
    sink.write_bool(ordered);

    if ordered {
        let mut length = source.read(5).map_err(truncated())? + 1;
        sink.write(length - 1, 5);

        let mut current = 0;
        while current < entries {
            if length > 32 {
                return Err(CodebookError::new(CodebookErrorKind::LengthOverflow));
            }

            let width = ilog(entries - current);
            let run = source.read(width).map_err(truncated())?;
            sink.write(run, width);

            current += run;
            length += 1;
        }

        if current > entries {
            return Err(CodebookError::new(CodebookErrorKind::LengthOverflow));
        }

        return Ok(true);
    }

    let width = match layout {
        Layout::Packed => {
            let width = source.read_u8(3).map_err(truncated())?;

            if width == 0 || width > 5 {
                return Err(CodebookError::new(CodebookErrorKind::CodewordLengthWidth {
                    width,
                }));
            }

            width
        }
        Layout::Standard => 5,
    };

    let sparse = source.read_bool().map_err(truncated())?;
    sink.write_bool(sparse);

    for _ in 0..entries {
        let present = if sparse {
            let present = source.read_bool().map_err(truncated())?;
            sink.write_bool(present);
            present
        } else {
            true
        };

        if present {
            let length = source.read(width).map_err(truncated())?;
            sink.write(length, 5);
        }
    }

    Ok(false)
}

fn copy_lookup_values(
    source: &mut BitReader<'_>,
    sink: &mut BitWriter,
    shape: &CodebookShape,
) -> Result<(), CodebookError> {
    let count = match shape.lookup_type {
        0 => return Ok(()),
        1 => quantvals(shape.entries, shape.dimensions)?,
        2 => shape.entries.saturating_mul(u32::from(shape.dimensions)),
        lookup_type => {
            return Err(CodebookError::new(CodebookErrorKind::LookupType {
                lookup_type,
            }))
        }
    };

    let truncated = || CodebookError::factory(CodebookErrorKind::Truncated);

    // minimum value, delta value
    for _ in 0..2 {
        sink.write(source.read(32).map_err(truncated())?, 32);
    }

    let value_bits = source.read_u8(4).map_err(truncated())? + 1;
    let sequence_flag = source.read_bool().map_err(truncated())?;
    sink.write(u32::from(value_bits - 1), 4);
    sink.write_bool(sequence_flag);

    for _ in 0..count {
        sink.write(source.read(value_bits).map_err(truncated())?, value_bits);
    }

    Ok(())
}

/// Finds the largest `v` with `v^dimensions <= entries`.
fn quantvals(entries: u32, dimensions: u16) -> Result<u32, CodebookError> {
    if dimensions == 0 {
        return Err(CodebookError::new(CodebookErrorKind::ZeroDimensions));
    }

    let dimensions = u32::from(dimensions);
    let bits = u32::from(ilog(entries));
    let mut vals = entries >> (bits.saturating_sub(1) * (dimensions - 1) / dimensions);
    let entries = u64::from(entries);

    loop {
        let low = u64::from(vals).saturating_pow(dimensions);
        let high = u64::from(vals + 1).saturating_pow(dimensions);

        if low <= entries && high > entries {
            return Ok(vals);
        } else if low > entries {
            vals -= 1;
        } else {
            vals += 1;
        }
    }
}

/// A process-wide store of loaded codebook libraries, keyed by where they came from.
///
/// Each key is loaded at most once, even when several callers ask for it at the same time.
/// Declare one as a `static` and pass it by reference.
#[derive(Debug, Default)]
pub struct CodebookCache {
    entries: Mutex<Vec<(Box<str>, Arc<CodebookLibrary>)>>,
}

impl CodebookCache {
    /// Creates an empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Returns the library stored under `key`, calling `load` for its bytes if it is not cached
    /// yet.
    ///
    /// # Errors
    ///
    /// Fails if the loaded bytes are not a valid library. Nothing is cached in that case.
    pub fn get_or_load<F, B>(
        &self,
        key: &str,
        load: F,
    ) -> Result<Arc<CodebookLibrary>, CodebookError>
    where
        F: FnOnce() -> B,
        B: AsRef<[u8]>,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((_, library)) = entries.iter().find(|(cached, _)| &**cached == key) {
            return Ok(Arc::clone(library));
        }

        let library = CodebookLibrary::load(load().as_ref()).map(Arc::new)?;
        entries.push((key.into(), Arc::clone(&library)));
        Ok(library)
    }
}

/// An error raised while loading, rebuilding or copying codebooks.
#[derive(Debug)]
pub struct CodebookError {
    kind: CodebookErrorKind,
    source: Option<ReadError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CodebookErrorKind {
    TableOffset { offset: usize },
    TableOrder { index: usize },
    InvalidId { id: usize, count: usize },
    Truncated,
    Sync { found: u32 },
    ZeroDimensions,
    CodewordLengthWidth { width: u8 },
    LengthOverflow,
    LookupType { lookup_type: u8 },
    SizeMismatch { id: usize, expected: usize, actual: usize },
}

impl CodebookError {
    pub(crate) fn new(kind: CodebookErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn new_with_source(kind: CodebookErrorKind, source: ReadError) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn factory(kind: CodebookErrorKind) -> impl FnOnce(ReadError) -> Self {
        move |source| Self::new_with_source(kind, source)
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        use CodebookErrorKind::*;

        match self.kind {
            TableOffset { .. } | TableOrder { .. } | Truncated => ErrorKind::OutOfBounds,
            InvalidId { .. } => ErrorKind::InvalidCodebookId,
            Sync { .. } => ErrorKind::MalformedMagic,
            ZeroDimensions
            | CodewordLengthWidth { .. }
            | LengthOverflow
            | LookupType { .. }
            | SizeMismatch { .. } => ErrorKind::ReconstructionFailed,
        }
    }
}

#[cfg(test)]
impl CodebookError {
    pub(crate) fn detail(&self) -> CodebookErrorKind {
        self.kind
    }
}

impl Display for CodebookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use CodebookErrorKind::*;

        match self.kind {
            TableOffset { offset } => f.write_str(&format!(
                "codebook offset table position was out of bounds (0x{offset:x})"
            )),
            TableOrder { index } => f.write_str(&format!(
                "codebook offset {index} was out of order or out of bounds"
            )),
            InvalidId { id, count } => f.write_str(&format!(
                "codebook {id} was requested, but the library only holds {count}"
            )),
            Truncated => f.write_str("codebook data ended unexpectedly"),
            Sync { found } => f.write_str(&format!(
                "codebook sync pattern was not found (0x{found:06x})"
            )),
            ZeroDimensions => f.write_str("codebook with a lookup table had 0 dimensions"),
            CodewordLengthWidth { width } => f.write_str(&format!(
                "width of packed codeword lengths was out of range ({width})"
            )),
            LengthOverflow => f.write_str("ordered codeword lengths overran the entry count"),
            LookupType { lookup_type } => f.write_str(&format!(
                "codebook lookup type was not recognized ({lookup_type})"
            )),
            SizeMismatch {
                id,
                expected,
                actual,
            } => f.write_str(&format!(
                "codebook {id} used {actual} bytes, but its slot is {expected} bytes"
            )),
        }
    }
}

impl Error for CodebookError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => Some(source),
            None => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use crate::bits::BitWriter;

    /// A packed codebook with one dimension, two entries of codeword length 1 and no lookup table.
    pub(crate) fn two_entry_codebook() -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.write(1, 4); // dimensions
        writer.write(2, 14); // entries
        writer.write_bool(false); // unordered
        writer.write(1, 3); // codeword length width
        writer.write_bool(false); // not sparse
        writer.write(0, 1);
        writer.write(0, 1);
        writer.write(0, 1); // lookup type
        writer.into_bytes()
    }

    /// A packed codebook with two dimensions and four entries, stored as ordered lengths with a
    /// type 1 lookup.
    pub(crate) fn ordered_lookup_codebook() -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.write(2, 4);
        writer.write(4, 14);
        writer.write_bool(true); // ordered
        writer.write(1, 5); // initial length - 1
        writer.write(4, 3); // all 4 entries share the first length
        writer.write(1, 1); // lookup type
        writer.write(0x3F80_0000, 32);
        writer.write(0x3F00_0000, 32);
        writer.write(1, 4); // value bits - 1
        writer.write_bool(false);
        writer.write(0b10, 2);
        writer.write(0b01, 2);
        writer.into_bytes()
    }

    /// Lays codebooks out as a library: packed data, offset table, then the table's position.
    pub(crate) fn library(codebooks: &[&[u8]]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offsets = Vec::new();

        for codebook in codebooks {
            offsets.push(u32::try_from(data.len()).unwrap());
            data.extend_from_slice(codebook);
        }

        let table_start = u32::try_from(data.len()).unwrap();
        for offset in offsets {
            data.extend_from_slice(&offset.to_le_bytes());
        }
        data.extend_from_slice(&table_start.to_le_bytes());
        data
    }
}

#[cfg(test)]
mod test {
    use super::fixture::{library, ordered_lookup_codebook, two_entry_codebook};
    use super::{copy_codebook, quantvals, CodebookCache, CodebookErrorKind, CodebookLibrary};
    use crate::bits::{BitReader, BitWriter};
    use crate::error::ErrorKind;
    use std::cell::Cell;

    #[test]
    fn load_library() {
        let first = two_entry_codebook();
        let second = ordered_lookup_codebook();
        let data = library(&[&first, &second]);

        let library = CodebookLibrary::load(&data).unwrap();
        assert_eq!(library.len(), 2);
        assert_eq!(library.get_codebook(0).unwrap(), first.as_slice());
        assert_eq!(library.get_codebook(1).unwrap(), second.as_slice());
        assert!(library
            .get_codebook(2)
            .is_err_and(|e| e.kind() == ErrorKind::InvalidCodebookId));
    }

    #[test]
    fn reject_bad_tables() {
        assert!(CodebookLibrary::load(b"\x00\x00")
            .is_err_and(|e| e.detail() == CodebookErrorKind::TableOffset { offset: 2 }));

        assert!(CodebookLibrary::load(b"\x00\x00\x00\x00\x10\x00\x00\x00")
            .is_err_and(|e| e.detail() == CodebookErrorKind::TableOffset { offset: 16 }));

        // offsets 0, 2, 1, 3
        let data = b"\xAA\xBB\xCC\x00\x00\x00\x00\x02\x00\x00\x00\x01\x00\x00\x00\x03\x00\x00\x00";
        assert!(CodebookLibrary::load(data)
            .is_err_and(|e| e.detail() == CodebookErrorKind::TableOrder { index: 2 }));
    }

    #[test]
    fn empty_library() {
        let data = library(&[]);
        let library = CodebookLibrary::load(&data).unwrap();

        assert!(library.is_empty());
        assert!(library
            .get_codebook(0)
            .is_err_and(|e| e.kind() == ErrorKind::InvalidCodebookId));
    }

    #[test]
    fn rebuilt_codebook_reparses_with_same_shape() {
        let data = library(&[&two_entry_codebook(), &ordered_lookup_codebook()]);
        let library = CodebookLibrary::load(&data).unwrap();

        for id in 0..library.len() {
            let mut rebuilt = BitWriter::new();
            let shape = library.rebuild_from_id(id, &mut rebuilt).unwrap();
            let rebuilt = rebuilt.into_bytes();

            let mut copied = BitWriter::new();
            let copied_shape = copy_codebook(&mut BitReader::new(&rebuilt), &mut copied).unwrap();

            assert_eq!(shape, copied_shape);
            assert_eq!(copied.into_bytes(), rebuilt);
        }
    }

    #[test]
    fn rebuild_expected_fields() {
        let data = library(&[&two_entry_codebook(), &ordered_lookup_codebook()]);
        let library = CodebookLibrary::load(&data).unwrap();

        let mut sink = BitWriter::new();
        let shape = library.rebuild_from_id(0, &mut sink).unwrap();
        assert_eq!(
            (shape.dimensions(), shape.entries(), shape.is_ordered(), shape.lookup_type()),
            (1, 2, false, 0)
        );
        // sync + dimensions + entries + ordered + sparse + two 5-bit lengths + lookup type
        assert_eq!(sink.bit_len(), 24 + 16 + 24 + 1 + 1 + 10 + 4);

        let bytes = sink.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read(24).unwrap(), 0x0056_4342);
        assert_eq!(reader.read(16).unwrap(), 1);
        assert_eq!(reader.read(24).unwrap(), 2);

        let mut sink = BitWriter::new();
        let shape = library.rebuild_from_id(1, &mut sink).unwrap();
        assert_eq!(
            (shape.dimensions(), shape.entries(), shape.is_ordered(), shape.lookup_type()),
            (2, 4, true, 1)
        );
        // header, ordered flag, initial length, run, lookup type, min/max, value bits,
        // sequence flag, 2 values
        assert_eq!(sink.bit_len(), 64 + 1 + 5 + 3 + 4 + 64 + 4 + 1 + 4);
    }

    #[test]
    fn reject_slot_size_mismatch() {
        let mut padded = two_entry_codebook();
        padded.push(0);
        let data = library(&[&padded]);
        let library = CodebookLibrary::load(&data).unwrap();

        assert!(library
            .rebuild_from_id(0, &mut BitWriter::new())
            .is_err_and(|e| e.detail()
                == CodebookErrorKind::SizeMismatch {
                    id: 0,
                    expected: 5,
                    actual: 4
                }));
    }

    #[test]
    fn reject_malformed_codebooks() {
        let mut writer = BitWriter::new();
        writer.write(1, 4);
        writer.write(2, 14);
        writer.write_bool(false);
        writer.write(0, 3); // zero codeword length width
        writer.write(0, 8);
        let data = library(&[&writer.into_bytes()]);
        let library = CodebookLibrary::load(&data).unwrap();

        assert!(library
            .rebuild_from_id(0, &mut BitWriter::new())
            .is_err_and(|e| e.detail() == CodebookErrorKind::CodewordLengthWidth { width: 0 }));

        assert!(copy_codebook(&mut BitReader::new(b"\x00\x00\x00\x00"), &mut BitWriter::new())
            .is_err_and(|e| e.kind() == ErrorKind::MalformedMagic));

        assert!(copy_codebook(&mut BitReader::new(b"BCV"), &mut BitWriter::new())
            .is_err_and(|e| e.kind() == ErrorKind::OutOfBounds));
    }

    #[test]
    fn compute_quantvals() {
        assert_eq!(quantvals(4, 2).unwrap(), 2);
        assert_eq!(quantvals(8, 3).unwrap(), 2);
        assert_eq!(quantvals(9, 2).unwrap(), 3);
        assert_eq!(quantvals(10, 2).unwrap(), 3);
        assert_eq!(quantvals(1, 1).unwrap(), 1);
        assert_eq!(quantvals(81, 4).unwrap(), 3);
        assert!(quantvals(4, 0).is_err_and(|e| e.detail() == CodebookErrorKind::ZeroDimensions));
    }

    #[test]
    fn cache_loads_each_key_once() {
        static CACHE: CodebookCache = CodebookCache::new();

        let data = library(&[&two_entry_codebook()]);
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            data.clone()
        };

        let first = CACHE.get_or_load("packed_codebooks.bin", load).unwrap();
        let second = CACHE.get_or_load("packed_codebooks.bin", load).unwrap();
        assert_eq!(loads.get(), 1);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);

        assert!(CACHE
            .get_or_load("broken.bin", || vec![0u8; 2])
            .is_err_and(|e| e.kind() == ErrorKind::OutOfBounds));
        let _library = CACHE.get_or_load("broken.bin", || data.clone()).unwrap();
    }
}
