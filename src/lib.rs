//! # bnkex
//!
//! `bnkex` is a library for reading, rewriting and extracting audio from Wwise sound banks.
//!
//! - [`Container`] parses and rebuilds sound banks (`BKHD`) and flat stream packs (`r3d2`).
//! - [`ObjectGraph`] decodes the hierarchy section of a bank, and [`resolve_events`] walks it to
//!   map event names onto the audio files they play.
//! - [`reconstruct`] turns stripped Wwise Vorbis streams back into standard Ogg Vorbis files,
//!   with codebooks taken from a shared [`CodebookLibrary`].
//! - [`decode_to_wav`] and [`transcode_blob`] cover playback and external re-encodes.

#![warn(clippy::pedantic, future_incompatible)]
#![deny(
    let_underscore_drop,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_abi,
    missing_debug_implementations,
    missing_docs,
    non_ascii_idents,
    nonstandard_style,
    noop_method_call,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_op_in_unsafe_fn,
    unused,
    unused_crate_dependencies,
    unused_import_braces,
    unused_lifetimes,
    unused_macro_rules,
    unused_qualifications,
    unused_results
)]

mod bits;
mod codebook;
mod container;
mod encode;
mod error;
mod event;
mod graph;
mod hash;
mod ogg;
mod read;
mod stream;
mod write;

pub use bits::{BitReader, BitWriter};
pub use codebook::{
    copy_codebook, rebuild_codebook, CodebookCache, CodebookError, CodebookLibrary, CodebookShape,
};
pub use container::{error::ContainerError, AudioBlob, Container, ContainerKind};
pub use encode::{decode_to_wav, error::EncodeError, transcode_blob, SampleEncoding, Transcoder};
pub use error::{ErrorKind, Warning};
pub use event::{resolve_events, EventMapping, Resolution, ResolveOptions};
pub use graph::{
    error::GraphError, ActionKind, BankVersion, DecisionArgument, DecisionNode, DecisionTarget,
    DecisionTree, EventAction, GraphObject, MusicSwitch, MusicTrack, ObjectGraph,
};
pub use hash::fnv1_hash;
pub use read::{Endian, ReadError};
pub use stream::{
    error::ReconstructError, reconstruct, CodebookSource, LoopPoints, PacketFraming,
    ReconstructOptions, Reconstructed, StreamCodec, StreamDescriptor, VariantFlags,
};
