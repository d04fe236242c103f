use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

use serde::Serialize;

use super::StatModel;
use crate::utils::{
    log_sum,
    AtomicF64,
    LOG_1,
};

/// Where a fragment starts on its transcript.
#[derive(Debug, Clone, Copy)]
pub struct FragmentStart {
    /// 0-based start of the fragment.
    pub pos:            u32,
    pub transcript_len: u32,
    pub log_mass:       f64,
}

/// Histogram of fragment start positions relative to transcript length.
///
/// Starts with a uniform pseudo-mass of 1 spread over the bins.
#[derive(Debug)]
pub struct FragmentStartDistribution {
    bins:         Vec<AtomicF64>,
    total_mass:   AtomicF64,
    num_observed: AtomicU64,
    num_ignored:  AtomicU64,
}

impl FragmentStartDistribution {
    pub fn new(num_bins: usize) -> Self {
        let num_bins = num_bins.max(1);
        let uniform = -(num_bins as f64).ln();
        Self {
            bins:         (0..num_bins).map(|_| AtomicF64::new(uniform)).collect(),
            total_mass:   AtomicF64::new(LOG_1),
            num_observed: AtomicU64::new(0),
            num_ignored:  AtomicU64::new(0),
        }
    }

    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn num_observed(&self) -> u64 {
        self.num_observed.load(Ordering::Relaxed)
    }

    /// Starts outside the transcript are not counted here, only in this.
    pub fn num_ignored(&self) -> u64 {
        self.num_ignored.load(Ordering::Relaxed)
    }
}

/// Bin of relative position `pos / len`.
fn bin_of(
    pos: u32,
    len: u32,
    num_bins: usize,
) -> usize {
    ((pos as u64 * num_bins as u64) / len as u64) as usize
}

impl StatModel for FragmentStartDistribution {
    type Evidence<'a> = FragmentStart;
    type Snapshot = FragmentStartSnapshot;

    fn observe(
        &self,
        evidence: FragmentStart,
    ) {
        if evidence.transcript_len == 0 || evidence.pos >= evidence.transcript_len {
            self.num_ignored.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let bin = bin_of(evidence.pos, evidence.transcript_len, self.bins.len());
        self.bins[bin].log_add_assign(evidence.log_mass);
        self.total_mass
            .log_add_assign(evidence.log_mass);
        self.num_observed
            .fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> FragmentStartSnapshot {
        let log_bins: Vec<f64> = self.bins.iter().map(AtomicF64::load).collect();
        let norm = log_sum(log_bins.iter().copied());
        FragmentStartSnapshot {
            probs: log_bins
                .into_iter()
                .map(|v| (v - norm).exp())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FragmentStartSnapshot {
    /// Probability of each relative-position bin.
    pub probs: Vec<f64>,
}

impl FragmentStartSnapshot {
    /// Positional bias weight of a start at `pos`: the bin probability
    /// relative to a uniform distribution. 1.0 outside the transcript.
    pub fn bias_weight(
        &self,
        pos: u32,
        transcript_len: u32,
    ) -> f64 {
        if transcript_len == 0 || pos >= transcript_len || self.probs.is_empty() {
            return 1.0;
        }
        let bin = bin_of(pos, transcript_len, self.probs.len());
        self.probs[bin] * self.probs.len() as f64
    }

    /// Probability mass of starting at or before `pos`.
    pub fn cdf(
        &self,
        pos: u32,
        transcript_len: u32,
    ) -> f64 {
        if transcript_len == 0 {
            return 1.0;
        }
        if pos >= transcript_len {
            return 1.0;
        }
        let bin = bin_of(pos, transcript_len, self.probs.len());
        self.probs[..=bin].iter().sum()
    }
}
