use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

use itertools::Itertools;
use serde::Serialize;

use super::{
    base_index,
    StatModel,
};
use crate::data_structs::BaseCall;
use crate::utils::AtomicF64;

/// Aligned columns of one read, weighted by the alignment's mass.
#[derive(Debug, Clone, Copy)]
pub struct ErrorEvidence<'a> {
    pub calls:    &'a [BaseCall],
    pub read_len: usize,
    /// Linear weight of the alignment.
    pub mass:     f64,
}

/// Substitution counts `ref base -> read base`, binned by relative position
/// in the read.
#[derive(Debug)]
pub struct ErrorModel {
    num_bins:      usize,
    /// `num_bins * 4 * 4`, row-major `[bin][ref][read]`.
    counts:        Vec<AtomicF64>,
    num_observed:  AtomicU64,
    num_skipped:   AtomicU64,
}

impl ErrorModel {
    pub fn new(num_bins: usize) -> Self {
        let num_bins = num_bins.max(1);
        Self {
            num_bins,
            counts: (0..num_bins * 16)
                .map(|_| AtomicF64::default())
                .collect(),
            num_observed: AtomicU64::new(0),
            num_skipped: AtomicU64::new(0),
        }
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Number of reads folded in.
    pub fn num_observed(&self) -> u64 {
        self.num_observed.load(Ordering::Relaxed)
    }

    /// Columns with an ambiguous base on either side.
    pub fn num_skipped(&self) -> u64 {
        self.num_skipped.load(Ordering::Relaxed)
    }

    #[inline]
    fn cell(
        &self,
        bin: usize,
        ref_base: usize,
        read_base: usize,
    ) -> usize {
        (bin * 4 + ref_base) * 4 + read_base
    }

    fn bin_of(
        &self,
        read_pos: usize,
        read_len: usize,
    ) -> usize {
        (read_pos * self.num_bins / read_len).min(self.num_bins - 1)
    }
}

impl StatModel for ErrorModel {
    type Evidence<'a> = ErrorEvidence<'a>;
    type Snapshot = ErrorModelSnapshot;

    fn observe(
        &self,
        evidence: ErrorEvidence<'_>,
    ) {
        if evidence.read_len == 0 || evidence.calls.is_empty() {
            return;
        }
        for call in evidence.calls {
            let (Some(r), Some(q)) = (base_index(call.ref_base), base_index(call.read_base))
            else {
                self.num_skipped
                    .fetch_add(1, Ordering::Relaxed);
                continue;
            };
            let bin = self.bin_of(call.read_pos, evidence.read_len);
            self.counts[self.cell(bin, r, q)].fetch_add(evidence.mass);
        }
        self.num_observed
            .fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ErrorModelSnapshot {
        let raw = self
            .counts
            .iter()
            .map(AtomicF64::load)
            .collect_vec();
        // One pseudo-count per cell.
        let probs = raw
            .chunks(4)
            .flat_map(|row| {
                let total: f64 = row.iter().map(|c| c + 1.0).sum();
                row.iter()
                    .map(move |c| (c + 1.0) / total)
                    .collect_vec()
            })
            .collect();
        ErrorModelSnapshot {
            num_bins: self.num_bins,
            counts: raw,
            probs,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorModelSnapshot {
    pub num_bins: usize,
    /// Raw weighted counts, `[bin][ref][read]`.
    pub counts:   Vec<f64>,
    /// Row-normalized substitution probabilities, same layout.
    pub probs:    Vec<f64>,
}

impl ErrorModelSnapshot {
    /// `P(read_base | ref_base)` in `bin`.
    pub fn substitution_prob(
        &self,
        bin: usize,
        ref_base: u8,
        read_base: u8,
    ) -> Option<f64> {
        if bin >= self.num_bins {
            return None;
        }
        let r = base_index(ref_base)?;
        let q = base_index(read_base)?;
        Some(self.probs[(bin * 4 + r) * 4 + q])
    }

    /// Weighted fraction of mismatching columns in `bin`, from raw counts.
    pub fn mismatch_rate(
        &self,
        bin: usize,
    ) -> f64 {
        if bin >= self.num_bins {
            return f64::NAN;
        }
        let block = &self.counts[bin * 16..(bin + 1) * 16];
        let total: f64 = block.iter().sum();
        let matches: f64 = (0..4).map(|b| block[b * 4 + b]).sum();
        if total > 0.0 {
            (total - matches) / total
        }
        else {
            0.0
        }
    }
}
