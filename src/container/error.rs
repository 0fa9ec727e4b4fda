use crate::error::ErrorKind;
use crate::read::ReadError;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// An error raised while parsing or writing a [`Container`](crate::Container).
#[derive(Debug)]
pub struct ContainerError {
    kind: ContainerErrorKind,
    source: Option<ReadError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ContainerErrorKind {
    Magic,
    UnknownFormat { magic: [u8; 4] },
    HeaderLength { len: u32 },
    Version,
    EntryCount,
    OffsetTable { count: u32 },
    TooLarge { id: u32 },
}

impl ContainerError {
    pub(crate) fn new(kind: ContainerErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn new_with_source(kind: ContainerErrorKind, source: ReadError) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn factory(kind: ContainerErrorKind) -> impl FnOnce(ReadError) -> Self {
        move |source| Self::new_with_source(kind, source)
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        use ContainerErrorKind::*;

        match self.kind {
            Magic => ErrorKind::MalformedMagic,
            UnknownFormat { .. } => ErrorKind::UnknownFormat,
            HeaderLength { .. } | Version | EntryCount | OffsetTable { .. } | TooLarge { .. } => {
                ErrorKind::OutOfBounds
            }
        }
    }
}

#[cfg(test)]
impl ContainerError {
    pub(crate) fn detail(&self) -> ContainerErrorKind {
        self.kind
    }
}

impl Display for ContainerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use ContainerErrorKind::*;

        match self.kind {
            Magic => f.write_str("no file signature found"),
            UnknownFormat { magic } => f.write_str(&format!(
                "file signature was not recognized ({})",
                magic.escape_ascii()
            )),
            HeaderLength { len } => f.write_str(&format!(
                "bank header length did not fit the file in either byte order (0x{len:08x})"
            )),
            Version => f.write_str("failed to read container version"),
            EntryCount => f.write_str("failed to read number of pack entries"),
            OffsetTable { count } => {
                f.write_str(&format!("failed to read offset table of {count} pack entries"))
            }
            TooLarge { id } => f.write_str(&format!(
                "container would exceed 4 GiB while writing blob {id}"
            )),
        }
    }
}

impl Error for ContainerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => Some(source),
            None => None,
        }
    }
}
