//! Statistical models aggregated while alignments stream through a session.
//!
//! Every model is updated through [`StatModel::observe`], which takes `&self`
//! and may be called from any number of consumer threads at once. All
//! synchronization is internal (atomics), so callers never lock. A
//! [`StatModel::snapshot`] can be taken at any time; it is a point-in-time
//! copy that is not guaranteed to be linearizable with concurrent updates.
//!
//! - [`FragmentLengthDistribution`]: kernel-smoothed, log-domain fragment
//!   length posterior.
//! - [`FragmentStartDistribution`]: relative start positions, one instance
//!   per transcript length class.
//! - [`ErrorModel`]: substitution counts binned by read position.
//! - [`ReadKmerDist`]: k-mer context counts around fragment 5' ends.
//! - [`GcBiasModel`]: fragment GC content histogram.

mod error_model;
mod fragment_length;
mod fragment_start;
mod gc_bias;
mod seq_bias;

pub use error_model::{
    ErrorEvidence,
    ErrorModel,
    ErrorModelSnapshot,
};
pub use fragment_length::{
    FragmentLengthDistribution,
    FragmentLengthSnapshot,
};
pub use fragment_start::{
    FragmentStart,
    FragmentStartDistribution,
    FragmentStartSnapshot,
};
pub use gc_bias::{
    GcBiasModel,
    GcEvidence,
    GC_BINS,
};
pub use seq_bias::{
    context_window,
    kmer_rank,
    ReadKmerDist,
    READ_BIAS_K,
};

/// A concurrently updatable model.
pub trait StatModel: Send + Sync {
    /// What a single observation carries.
    type Evidence<'a>;
    /// Immutable view returned by [`StatModel::snapshot`].
    type Snapshot;

    /// Folds one observation into the model. Never fails; evidence outside
    /// the model's range is clamped or ignored.
    fn observe(
        &self,
        evidence: Self::Evidence<'_>,
    );

    fn snapshot(&self) -> Self::Snapshot;
}

/// Maps a nucleotide to 0..4 (`A`, `C`, `G`, `T`), anything else to `None`.
#[inline]
pub fn base_index(base: u8) -> Option<usize> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}
