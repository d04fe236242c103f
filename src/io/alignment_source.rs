use std::path::PathBuf;
use std::sync::atomic::{
    AtomicU64,
    Ordering,
};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::data_structs::{
    AlignmentGroup,
    RawFragment,
    ReferenceHeader,
};

/// Per-fragment predicate applied by the grouping workers. Groups for which
/// it returns false are counted but not forwarded.
pub type FragmentFilter = Arc<dyn Fn(&AlignmentGroup) -> bool + Send + Sync>;

/// Running fragment counts of the current pass.
#[derive(Debug, Default)]
pub struct FragmentCounters {
    observed:        AtomicU64,
    mapped:          AtomicU64,
    uniquely_mapped: AtomicU64,
}

impl FragmentCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one fragment. Unmapped fragments only count as observed.
    pub fn record(
        &self,
        group: &AlignmentGroup,
    ) {
        self.observed.fetch_add(1, Ordering::Relaxed);
        if group.is_empty() {
            return;
        }
        self.mapped.fetch_add(1, Ordering::Relaxed);
        if group.is_unique() {
            self.uniquely_mapped
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn num_observed(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }

    pub fn num_mapped(&self) -> u64 {
        self.mapped.load(Ordering::Relaxed)
    }

    pub fn num_uniquely_mapped(&self) -> u64 {
        self.uniquely_mapped
            .load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.observed.store(0, Ordering::Relaxed);
        self.mapped.store(0, Ordering::Relaxed);
        self.uniquely_mapped
            .store(0, Ordering::Relaxed);
    }
}

/// Producer side of a quantification session.
///
/// A source parses its inputs on its own worker threads and publishes
/// [`AlignmentGroup`]s on a bounded queue that consumers poll with
/// [`AlignmentSource::get_alignment_group`]. Dropping a source must stop and
/// join every worker.
pub trait AlignmentSource: Send + Sync {
    /// Files the source reads, in order.
    fn files(&self) -> &[PathBuf];

    /// Reference header of every file, in the order of [`Self::files`].
    fn headers(&self) -> &[ReferenceHeader];

    /// Reference header of the first file.
    fn header(&self) -> &ReferenceHeader;

    /// Starts the workers. `only_ambiguous` forwards only fragments with more
    /// than one alignment.
    fn start(
        &mut self,
        filter: Option<FragmentFilter>,
        only_ambiguous: bool,
    ) -> anyhow::Result<()>;

    /// Stops and joins the workers, drains both queues and zeroes the
    /// counters, so that a following [`Self::start`] replays the inputs
    /// from the beginning.
    fn reset(&mut self) -> anyhow::Result<()>;

    /// Pops the next group without blocking.
    fn get_alignment_group(&self) -> Option<AlignmentGroup>;

    /// True once every worker has finished and the group queue is empty.
    fn is_exhausted(&self) -> bool;

    fn fragment_queue(&self) -> &ArrayQueue<RawFragment>;

    fn alignment_group_queue(&self) -> &ArrayQueue<AlignmentGroup>;

    fn counters(&self) -> &FragmentCounters;
}
