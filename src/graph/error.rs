use crate::error::ErrorKind;
use crate::read::ReadError;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// An error raised while decoding an object directory or one of its records.
#[derive(Debug)]
pub struct GraphError {
    kind: GraphErrorKind,
    source: Option<ReadError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GraphErrorKind {
    ObjectCount,
    RecordHeader { index: u32 },
    RecordBody { id: u32, object_type: u8 },
    DecisionTree { id: u32 },
    UnsupportedRecord { id: u32, object_type: u8, version: u32 },
}

impl GraphError {
    pub(crate) fn new(kind: GraphErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn new_with_source(kind: GraphErrorKind, source: ReadError) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn factory(kind: GraphErrorKind) -> impl FnOnce(ReadError) -> Self {
        move |source| Self::new_with_source(kind, source)
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        use GraphErrorKind::*;

        match self.kind {
            ObjectCount | RecordHeader { .. } | RecordBody { .. } => ErrorKind::OutOfBounds,
            DecisionTree { .. } => ErrorKind::OutOfRangeReference,
            UnsupportedRecord { .. } => ErrorKind::UnsupportedVersion,
        }
    }
}

#[cfg(test)]
impl GraphError {
    pub(crate) fn detail(&self) -> GraphErrorKind {
        self.kind
    }
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use GraphErrorKind::*;

        match self.kind {
            ObjectCount => f.write_str("failed to read number of objects in directory"),
            RecordHeader { index } => {
                f.write_str(&format!("failed to read header of object record {index}"))
            }
            RecordBody { id, object_type } => f.write_str(&format!(
                "failed to decode object {id} (type {object_type})"
            )),
            DecisionTree { id } => f.write_str(&format!(
                "decision tree of music switch {id} refers to nodes past its end"
            )),
            UnsupportedRecord {
                id,
                object_type,
                version,
            } => f.write_str(&format!(
                "layout of object {id} (type {object_type}) is unknown for bank version {version}"
            )),
        }?;

        if let Some(source) = &self.source {
            f.write_str(&format!(" - {source}"))?;
        }

        Ok(())
    }
}

impl Error for GraphError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => Some(source),
            None => None,
        }
    }
}
