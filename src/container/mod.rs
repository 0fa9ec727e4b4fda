mod bank;
pub(crate) mod error;
mod pack;

use crate::error::Warning;
use crate::graph::{error::GraphError, BankVersion, ObjectGraph};
use crate::read::Endian;
use error::{ContainerError, ContainerErrorKind};
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// The two on-disk container formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ContainerKind {
    /// A chunked sound bank (`BKHD` signature), optionally carrying an object directory.
    Bank,
    /// A flat pack of named streams (`r3d2` signature).
    Pack,
}

static MAGIC_KINDS: phf::Map<&'static [u8], ContainerKind> = phf::phf_map! {
    b"BKHD" => ContainerKind::Bank,
    b"r3d2" => ContainerKind::Pack,
};

pub(crate) const OBJECT_DIRECTORY_TAG: [u8; 4] = *b"HIRC";

/// One chunk slot of a bank, kept in file order so a rewrite reproduces the original layout.
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum BankChunk {
    Header { tail: Box<[u8]> },
    Index,
    Data,
    Other { tag: [u8; 4], payload: Box<[u8]> },
}

/// A parsed container: its format, version and the audio blobs it holds.
///
/// Blobs are kept sorted by ID, with duplicate IDs left in the order they were found.
/// Anything the parser does not model (unknown bank chunks, the rest of the bank header) is kept
/// verbatim and written back unchanged by [`Container::write`].
pub struct Container {
    kind: ContainerKind,
    version: u32,
    endian: Endian,
    blobs: Vec<AudioBlob>,
    layout: Vec<BankChunk>,
    warnings: Vec<Warning>,
}

impl Container {
    /// Creates an empty container of the given kind.
    ///
    /// New banks get an all-zero header of the common 0x1C-byte length and version 0;
    /// new packs get version 1.
    #[must_use]
    pub fn new(kind: ContainerKind) -> Self {
        let (version, layout) = match kind {
            ContainerKind::Bank => (
                0,
                vec![BankChunk::Header {
                    tail: vec![0; bank::DEFAULT_HEADER_TAIL].into_boxed_slice(),
                }],
            ),
            ContainerKind::Pack => (pack::PACK_VERSION, Vec::new()),
        };

        Self {
            kind,
            version,
            endian: Endian::Little,
            blobs: Vec::new(),
            layout,
            warnings: Vec::new(),
        }
    }

    /// Parses a bank or pack, choosing the format from the file signature.
    ///
    /// # Errors
    ///
    /// Fails if the signature is missing or unknown, or if the headers needed to locate any blob
    /// are unreadable. Problems confined to single records are reported through
    /// [`Container::warnings`] instead.
    pub fn parse(data: &[u8]) -> Result<Self, ContainerError> {
        let magic: [u8; 4] = data
            .get(..4)
            .and_then(|magic| magic.try_into().ok())
            .ok_or_else(|| ContainerError::new(ContainerErrorKind::Magic))?;

        let container = match MAGIC_KINDS.get(magic.as_slice()) {
            Some(ContainerKind::Bank) => bank::parse(data),
            Some(ContainerKind::Pack) => pack::parse(data),
            None => Err(ContainerError::new(ContainerErrorKind::UnknownFormat {
                magic,
            })),
        }?;

        log::debug!(
            "parsed {:?} version {} with {} blobs",
            container.kind,
            container.version,
            container.blobs.len()
        );

        Ok(container)
    }

    /// Serializes the container back into its on-disk format.
    ///
    /// # Errors
    ///
    /// Fails if any offset or length would not fit in 32 bits.
    pub fn write(&self) -> Result<Vec<u8>, ContainerError> {
        match self.kind {
            ContainerKind::Bank => bank::write(self),
            ContainerKind::Pack => pack::write(self),
        }
    }

    /// Returns the container format.
    #[must_use]
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Returns the format version read from the header.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the byte order of the container. Packs are always little-endian.
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Returns the blobs, sorted by ID.
    #[must_use]
    pub fn blobs(&self) -> &[AudioBlob] {
        &self.blobs
    }

    /// Returns the blobs for in-place editing.
    pub fn blobs_mut(&mut self) -> &mut [AudioBlob] {
        &mut self.blobs
    }

    /// Inserts a blob after every blob with an ID less than or equal to its own.
    pub fn push_blob(&mut self, blob: AudioBlob) {
        let index = self.blobs.partition_point(|existing| existing.id <= blob.id);
        self.blobs.insert(index, blob);
    }

    /// Replaces the contents of every blob with the given ID by a copy of `data`.
    /// Returns `false` if no blob has that ID.
    pub fn replace_blob(&mut self, id: u32, data: &[u8]) -> bool {
        let mut found = false;

        for blob in self.blobs.iter_mut().filter(|blob| blob.id == id) {
            blob.replace(data);
            found = true;
        }

        found
    }

    /// Returns the problems met while parsing that did not stop the parse.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Returns the opaque remainder of a bank's header chunk (everything after the version).
    #[must_use]
    pub fn header_tail(&self) -> Option<&[u8]> {
        self.layout.iter().find_map(|chunk| match chunk {
            BankChunk::Header { tail } => Some(&**tail),
            _ => None,
        })
    }

    /// Parses the bank's object directory, if it has one.
    ///
    /// # Errors
    ///
    /// Fails if the directory's object count cannot be read. Damaged records are skipped and
    /// reported as warnings on the returned graph.
    pub fn object_graph(&self) -> Result<Option<ObjectGraph>, GraphError> {
        let directory = self.layout.iter().find_map(|chunk| match chunk {
            BankChunk::Other { tag, payload } if *tag == OBJECT_DIRECTORY_TAG => Some(payload),
            _ => None,
        });

        directory
            .map(|payload| ObjectGraph::parse(payload, BankVersion::new(self.version), self.endian))
            .transpose()
    }
}

impl Debug for Container {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Container")
            .field("kind", &self.kind)
            .field("version", &self.version)
            .field("endian", &self.endian)
            .field("blobs", &self.blobs)
            .field("chunks", &self.layout.len())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

/// One embedded audio payload.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioBlob {
    id: u32,
    data: Vec<u8>,
    modified: bool,
    name: Option<Box<str>>,
}

impl AudioBlob {
    /// Creates a blob from a copy of `data`. New blobs count as modified.
    #[must_use]
    pub fn new(id: u32, data: &[u8]) -> Self {
        Self {
            id,
            data: data.to_vec(),
            modified: true,
            name: None,
        }
    }

    pub(crate) fn parsed(id: u32, data: &[u8], name: Option<Box<str>>) -> Self {
        Self {
            id,
            data: data.to_vec(),
            modified: false,
            name,
        }
    }

    /// Returns the blob ID. IDs are not guaranteed to be unique within a container.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the payload length in bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn length(&self) -> u32 {
        // payloads come from 32-bit length fields, and oversized ones are rejected on write
        self.data.len() as u32
    }

    /// Returns the payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns whether the payload changed since the container was parsed.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Returns the entry name stored in a pack, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Replaces the payload with a copy of `data` and marks the blob as modified.
    pub fn replace(&mut self, data: &[u8]) {
        data.clone_into(&mut self.data);
        self.modified = true;
    }
}

impl Debug for AudioBlob {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AudioBlob")
            .field("id", &self.id)
            .field("length", &self.data.len())
            .field("modified", &self.modified)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{error::ContainerErrorKind, AudioBlob, Container, ContainerKind};
    use crate::error::ErrorKind;

    #[test]
    fn reject_unknown_magic() {
        assert!(Container::parse(b"RIFF\x00\x00\x00\x00")
            .is_err_and(|e| e.kind() == ErrorKind::UnknownFormat
                && e.detail() == ContainerErrorKind::UnknownFormat { magic: *b"RIFF" }));
        assert!(Container::parse(b"BK").is_err_and(|e| e.kind() == ErrorKind::MalformedMagic));
    }

    #[test]
    fn edit_blobs() {
        let mut container = Container::new(ContainerKind::Pack);
        container.push_blob(AudioBlob::new(20, b"b"));
        container.push_blob(AudioBlob::new(10, b"a"));
        container.push_blob(AudioBlob::new(20, b"c"));

        let ids: Vec<_> = container.blobs().iter().map(AudioBlob::id).collect();
        assert_eq!(ids, [10, 20, 20]);
        assert_eq!(container.blobs()[2].data(), b"c");

        assert!(container.replace_blob(20, b"new"));
        assert!(!container.replace_blob(30, b"new"));
        assert!(container.blobs()[1..]
            .iter()
            .all(|blob| blob.data() == b"new" && blob.length() == 3 && blob.is_modified()));

        container.blobs_mut()[0].replace(b"xyz");
        assert_eq!(container.blobs()[0].data(), b"xyz");
    }

    #[test]
    fn new_bank_has_default_header() {
        let container = Container::new(ContainerKind::Bank);
        assert_eq!(container.header_tail(), Some([0; 0x18].as_slice()));
        assert!(container.object_graph().is_ok_and(|graph| graph.is_none()));
        assert!(Container::new(ContainerKind::Pack).header_tail().is_none());
    }
}
