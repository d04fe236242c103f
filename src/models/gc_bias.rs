use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

use anyhow::bail;

use super::StatModel;
use crate::utils::AtomicF64;

/// Number of GC-content bins: 0%, 1%, ..., 100%.
pub const GC_BINS: usize = 101;

/// Initial mass of every observed GC bin.
const GC_PSEUDO_COUNT: f64 = 1e-5;

#[derive(Debug, Clone, Copy)]
pub struct GcEvidence {
    /// Fraction of G/C in the fragment, in `[0, 1]`.
    pub gc_fraction: f64,
    pub mass:        f64,
}

/// Histogram of observed fragment GC content.
#[derive(Debug)]
pub struct GcBiasModel {
    bins:         Vec<AtomicF64>,
    num_observed: AtomicU64,
}

impl Default for GcBiasModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GcBiasModel {
    pub fn new() -> Self {
        Self {
            bins:         (0..GC_BINS)
                .map(|_| AtomicF64::new(GC_PSEUDO_COUNT))
                .collect(),
            num_observed: AtomicU64::new(0),
        }
    }

    pub fn bin_of(gc_fraction: f64) -> usize {
        ((gc_fraction.clamp(0.0, 1.0) * 100.0).round() as usize).min(GC_BINS - 1)
    }

    pub fn num_observed(&self) -> u64 {
        self.num_observed.load(Ordering::Relaxed)
    }

    /// Overwrites every bin.
    pub fn replace(
        &self,
        values: &[f64],
    ) -> anyhow::Result<()> {
        if values.len() != GC_BINS {
            bail!(
                "GC histogram must have {} bins, got {}",
                GC_BINS,
                values.len()
            );
        }
        self.bins
            .iter()
            .zip(values.iter())
            .for_each(|(bin, &v)| bin.store(v));
        Ok(())
    }
}

impl StatModel for GcBiasModel {
    type Evidence<'a> = GcEvidence;
    type Snapshot = Vec<f64>;

    fn observe(
        &self,
        evidence: GcEvidence,
    ) {
        if !evidence.gc_fraction.is_finite() {
            return;
        }
        self.bins[Self::bin_of(evidence.gc_fraction)].fetch_add(evidence.mass);
        self.num_observed
            .fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Vec<f64> {
        self.bins.iter().map(AtomicF64::load).collect()
    }
}
