use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::RangeInclusive;

/// Bank format version, as stored in the bank header.
///
/// Object record layouts change at a number of version thresholds. Each predicate here names one
/// such change, so decoders ask about the feature instead of comparing raw numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BankVersion(u32);

const SUPPORTED: RangeInclusive<u32> = 88..=154;

impl BankVersion {
    /// Wraps a raw version number.
    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Returns the raw version number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns whether every object layout of this version is known.
    #[must_use]
    pub fn is_supported(self) -> bool {
        SUPPORTED.contains(&self.0)
    }

    /// Versions before the supported window only get records without base parameters decoded.
    pub(crate) fn has_known_base_params(self) -> bool {
        self.0 >= *SUPPORTED.start()
    }

    // sound sources: stream type shrank to one byte and the separate file ID went away
    pub(crate) fn has_compact_sources(self) -> bool {
        self.0 > 88
    }

    // several runs of bool bytes were folded into single bit-vector bytes
    pub(crate) fn has_bit_vectors(self) -> bool {
        self.0 > 89
    }

    pub(crate) fn has_var_action_count(self) -> bool {
        self.0 > 122
    }

    pub(crate) fn has_var_state_chunk(self) -> bool {
        self.0 > 122
    }

    pub(crate) fn has_state_prop_db_flag(self) -> bool {
        self.0 > 126
    }

    pub(crate) fn has_inline_state_props(self) -> bool {
        self.0 > 144
    }

    pub(crate) fn has_var_rtpc_param(self) -> bool {
        self.0 > 112
    }

    pub(crate) fn has_music_jump_type(self) -> bool {
        self.0 > 132
    }

    pub(crate) fn has_playlist_cache_id(self) -> bool {
        self.0 > 132
    }

    pub(crate) fn has_reflections_aux(self) -> bool {
        self.0 > 135
    }

    pub(crate) fn has_metadata_fx(self) -> bool {
        self.0 > 136
    }

    pub(crate) fn has_override_attachment(self) -> bool {
        self.0 > 89 && self.0 <= 145
    }
}

impl Display for BankVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&format!("v{}", self.0))
    }
}
