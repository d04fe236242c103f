//! This module contains the core data structures shared by the alignment
//! sources, the statistical models and the session controller.
//!
//! - [`Transcript`] and [`TranscriptRegistry`]: the reference sequences being
//!   quantified, with their length classes and effective lengths.
//! - [`AlignmentGroup`], [`Alignment`], [`AlignedRead`]: one fragment with all
//!   of its candidate placements, as handed to consumer workers.
//! - [`RawFragment`] and [`ParsedRecord`]: the parse-stage representation of
//!   a fragment, before mate pairing.
//! - [`ReferenceHeader`]: the reference sequence table of an alignment file.
//! - [`LibraryFormat`]: the expected layout of the sequencing library.

mod alignment;
mod header;
mod library_format;
mod transcript;

pub use alignment::{
    AlignedRead,
    Alignment,
    AlignmentGroup,
    BaseCall,
    CigarKind,
    CigarOp,
    ParsedRecord,
    RawFragment,
};
pub use header::{
    first_header_difference,
    headers_are_consistent,
    HeaderDifference,
    ReferenceHeader,
};
pub use library_format::{
    LibraryFormat,
    MateOrientation,
    ReadType,
    Strandedness,
};
pub use transcript::{
    compute_effective_length,
    Transcript,
    TranscriptId,
    TranscriptRegistry,
    TranscriptSummary,
};
