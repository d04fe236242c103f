//! Alignment and transcript inputs.
//!
//! [`AlignmentSource`] is the producer side of a session: it owns the
//! parsing and grouping workers and exposes the two bounded queues they
//! feed. [`AlignmentQueue`] implements it over SAM/BAM files with `noodles`.
//! [`TranscriptSource`] fills in transcript sequences; [`FastaTranscriptSource`]
//! reads them from a FASTA file.

mod alignment_queue;
mod alignment_source;
mod transcript_source;

pub use alignment_queue::AlignmentQueue;
pub use alignment_source::{
    AlignmentSource,
    FragmentCounters,
    FragmentFilter,
};
pub use transcript_source::{
    FastaTranscriptSource,
    TranscriptSource,
};
