use std::fmt::{Display, Formatter, Result as FmtResult};

/// Broad classification shared by every error and warning in this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A file signature or sync pattern did not match.
    MalformedMagic,
    /// Data was truncated, or an offset pointed outside its buffer.
    OutOfBounds,
    /// The data is not in any supported container or codec format.
    UnknownFormat,
    /// A codebook was requested that the shared library does not contain.
    InvalidCodebookId,
    /// A bank version falls outside the range of known record layouts.
    UnsupportedVersion,
    /// A decoded index exceeds a table built earlier in the same pass.
    OutOfRangeReference,
    /// A stream could not be reconstructed because of an internal inconsistency.
    ReconstructionFailed,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::MalformedMagic => "malformed magic",
            Self::OutOfBounds => "out of bounds",
            Self::UnknownFormat => "unknown format",
            Self::InvalidCodebookId => "invalid codebook ID",
            Self::UnsupportedVersion => "unsupported version",
            Self::OutOfRangeReference => "out-of-range reference",
            Self::ReconstructionFailed => "reconstruction failed",
        })
    }
}

/// A recoverable problem met while parsing. The affected record was skipped or
/// approximated, and parsing carried on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Warning {
    kind: ErrorKind,
    position: usize,
    message: Box<str>,
}

impl Warning {
    pub(crate) fn new(kind: ErrorKind, position: usize, message: impl Into<Box<str>>) -> Self {
        let warning = Self {
            kind,
            position,
            message: message.into(),
        };
        log::warn!("{warning}");
        warning
    }

    /// Returns the classification of the problem.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the byte position the problem relates to. Warnings from the event resolver carry
    /// an object ID instead.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns a human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&format!(
            "{} ({}) - at 0x{:x}",
            self.message, self.kind, self.position
        ))
    }
}
