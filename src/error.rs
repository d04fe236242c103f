//! Typed errors surfaced by session construction and replay.
//!
//! Everything else in the crate propagates [`anyhow::Error`]; callers that
//! need to tell these cases apart recover them with
//! `err.downcast_ref::<QuantError>()`.

use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

/// Which declared input a [`QuantError::MissingInput`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Alignment,
    Transcript,
}

impl Display for InputKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            InputKind::Alignment => write!(f, "alignment"),
            InputKind::Transcript => write!(f, "transcript"),
        }
    }
}

#[derive(Error, Debug)]
pub enum QuantError {
    /// A declared input path does not exist.
    #[error("The provided {kind} file: {} does not exist!", path.display())]
    MissingInput {
        /// Whether the alignment or the transcript input is missing
        kind: InputKind,
        /// The offending path
        path: PathBuf,
    },

    /// Several alignment files disagree on their reference sequences.
    #[error(
        "The multiple alignment files provided had inconsistent headers \
         ({reason}). If multiple SAM/BAM files are provided, they must have \
         identical @SQ records."
    )]
    HeaderMismatch {
        /// First difference found
        reason: String,
    },

    /// A bound alignment file is no longer a regular file.
    #[error("Alignment file {} is no longer a regular file and cannot be re-read", path.display())]
    StaleSource {
        /// The offending path
        path: PathBuf,
    },

    /// A library format code could not be parsed.
    #[error("Invalid library format '{0}'")]
    InvalidLibraryFormat(String),
}
