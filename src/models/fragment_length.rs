use std::sync::atomic::{
    AtomicU64,
    AtomicUsize,
    Ordering,
};

use log::{
    debug,
    warn,
};
use serde::Serialize;
use statrs::distribution::{
    Binomial,
    ContinuousCDF,
    Discrete,
    Normal,
};

use super::StatModel;
use crate::config::QuantConfig;
use crate::utils::{
    log_add,
    log_sum,
    AtomicF64,
    LOG_0,
    LOG_EPSILON,
};

/// Empirical fragment length distribution.
///
/// Masses are kept in log space, one bin per length in `[0, max_len]`. Each
/// observation is spread over neighbouring lengths with a binomial kernel of
/// `kernel_n + 1` taps, so lengths never observed but close to observed ones
/// keep a sensible probability. An optional Gaussian prior seeds every bin.
///
/// Lengths above `max_len` are clamped to `max_len`; a length of zero is
/// ignored. Both cases are counted by [`Self::num_out_of_range`].
///
/// Two ranges are tracked. [`Self::observed_bounds`] covers the lengths
/// that received kernel mass from observations, while [`Self::support`]
/// also includes the bins seeded by the prior and is what the PMF dumps
/// span.
#[derive(Debug)]
pub struct FragmentLengthDistribution {
    hist:             Vec<AtomicF64>,
    kernel:           Vec<f64>,
    total_mass:       AtomicF64,
    /// log of sum(len * mass)
    length_sum:       AtomicF64,
    support_min:      AtomicUsize,
    support_max:      AtomicUsize,
    min_observed:     AtomicUsize,
    max_observed:     AtomicUsize,
    num_observed:     AtomicU64,
    num_out_of_range: AtomicU64,
}

impl FragmentLengthDistribution {
    /// `alpha` is the total prior mass. A `prior_mean` of zero, or an
    /// invalid Gaussian, gives a flat prior over `[1, max_len]`.
    pub fn new(
        alpha: f64,
        max_len: usize,
        prior_mean: f64,
        prior_sd: f64,
        kernel_n: usize,
        kernel_p: f64,
    ) -> Self {
        let max_len = max_len.max(1);
        let kernel = binomial_kernel(kernel_n, kernel_p);
        let log_alpha = alpha.ln();

        let mut hist = vec![LOG_0; max_len + 1];
        let mut support = (1, max_len);
        let prior = if prior_mean > 0.0 {
            Normal::new(prior_mean, prior_sd)
                .map_err(|e| warn!("Ignoring fragment length prior: {}", e))
                .ok()
        }
        else {
            None
        };
        match prior {
            Some(norm) => {
                let mut lo = None;
                let mut hi = 0;
                for (len, bin) in hist.iter_mut().enumerate().skip(1) {
                    let x = len as f64;
                    let norm_mass = norm.cdf(x + 0.5) - norm.cdf(x - 0.5);
                    *bin = if norm_mass > 0.0 {
                        lo.get_or_insert(len);
                        hi = len;
                        log_alpha + norm_mass.ln()
                    }
                    else {
                        log_alpha + LOG_EPSILON
                    };
                }
                if let Some(lo) = lo {
                    support = (lo, hi);
                }
            },
            None => {
                let flat = log_alpha - (max_len as f64).ln();
                hist.iter_mut().skip(1).for_each(|bin| *bin = flat);
            },
        }

        let total_mass = log_sum(hist.iter().copied());
        let length_sum = log_sum(
            hist.iter()
                .enumerate()
                .skip(1)
                .map(|(len, mass)| (len as f64).ln() + mass),
        );
        debug!(
            "Fragment length distribution over [1, {}], prior support [{}, {}]",
            max_len, support.0, support.1
        );

        Self {
            hist: hist.into_iter().map(AtomicF64::new).collect(),
            kernel,
            total_mass: AtomicF64::new(total_mass),
            length_sum: AtomicF64::new(length_sum),
            support_min: AtomicUsize::new(support.0),
            support_max: AtomicUsize::new(support.1),
            min_observed: AtomicUsize::new(usize::MAX),
            max_observed: AtomicUsize::new(0),
            num_observed: AtomicU64::new(0),
            num_out_of_range: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &QuantConfig) -> Self {
        Self::new(
            1.0,
            config.frag_len_dist_max,
            config.frag_len_prior_mean,
            config.frag_len_prior_sd,
            config.frag_len_kernel_n,
            config.frag_len_kernel_p,
        )
    }

    pub fn max_len(&self) -> usize {
        self.hist.len() - 1
    }

    /// Adds `log_mass` at `len`, smoothed by the kernel.
    pub fn add_val(
        &self,
        len: usize,
        log_mass: f64,
    ) {
        if len == 0 {
            self.num_out_of_range
                .fetch_add(1, Ordering::Relaxed);
            return;
        }
        let len = if len > self.max_len() {
            self.num_out_of_range
                .fetch_add(1, Ordering::Relaxed);
            self.max_len()
        }
        else {
            len
        };

        let offset = self.kernel.len() / 2;
        for (i, k) in self.kernel.iter().enumerate() {
            if len + i < offset + 1 {
                continue;
            }
            let target = len + i - offset;
            if target > self.max_len() {
                break;
            }
            let contribution = k + log_mass;
            self.hist[target].log_add_assign(contribution);
            self.length_sum
                .log_add_assign((target as f64).ln() + contribution);
            self.total_mass
                .log_add_assign(contribution);
            self.support_min
                .fetch_min(target, Ordering::AcqRel);
            self.support_max
                .fetch_max(target, Ordering::AcqRel);
            self.min_observed
                .fetch_min(target, Ordering::AcqRel);
            self.max_observed
                .fetch_max(target, Ordering::AcqRel);
        }
        self.num_observed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Log probability of `len`.
    pub fn pmf(
        &self,
        len: usize,
    ) -> f64 {
        let len = len.min(self.max_len());
        self.hist[len].load() - self.total_mass.load()
    }

    /// Mean fragment length under the current distribution.
    pub fn mean(&self) -> f64 {
        (self.length_sum.load() - self.total_mass.load()).exp()
    }

    /// Lengths `[min, max]` that carry prior or observed mass.
    pub fn support(&self) -> (usize, usize) {
        (
            self.support_min.load(Ordering::Acquire),
            self.support_max.load(Ordering::Acquire),
        )
    }

    /// Smallest and largest length that received mass from an observation,
    /// kernel spread included. `None` until something is observed.
    pub fn observed_bounds(&self) -> Option<(usize, usize)> {
        let min = self.min_observed.load(Ordering::Acquire);
        let max = self.max_observed.load(Ordering::Acquire);
        (min <= max).then_some((min, max))
    }

    /// Unnormalized-over-support log PMF for lengths `min..=max`, along with
    /// `min` and `max`.
    pub fn dump_pmf(&self) -> (Vec<f64>, usize, usize) {
        let (min, max) = self.support();
        let total = self.total_mass.load();
        let log_pmf = (min..=max)
            .map(|len| self.hist[len].load() - total)
            .collect();
        (log_pmf, min, max)
    }

    /// Number of observations folded in (kernel taps are not counted).
    pub fn num_observed(&self) -> u64 {
        self.num_observed.load(Ordering::Relaxed)
    }

    pub fn num_out_of_range(&self) -> u64 {
        self.num_out_of_range
            .load(Ordering::Relaxed)
    }
}

impl StatModel for FragmentLengthDistribution {
    /// `(length, log_mass)`
    type Evidence<'a> = (usize, f64);
    type Snapshot = FragmentLengthSnapshot;

    fn observe(
        &self,
        evidence: Self::Evidence<'_>,
    ) {
        self.add_val(evidence.0, evidence.1)
    }

    fn snapshot(&self) -> Self::Snapshot {
        let mean = self.mean();
        let (mut log_pmf, min, max) = self.dump_pmf();
        normalize_log_pmf(&mut log_pmf);
        FragmentLengthSnapshot {
            min,
            max,
            mean,
            log_pmf,
        }
    }
}

/// Normalized view of a [`FragmentLengthDistribution`] over its support.
#[derive(Debug, Clone, Serialize)]
pub struct FragmentLengthSnapshot {
    pub min:     usize,
    pub max:     usize,
    pub mean:    f64,
    /// `log_pmf[i]` is the log probability of length `min + i`.
    pub log_pmf: Vec<f64>,
}

impl FragmentLengthSnapshot {
    pub fn log_prob(
        &self,
        len: usize,
    ) -> f64 {
        if len < self.min || len > self.max {
            return LOG_0;
        }
        self.log_pmf[len - self.min]
    }

    /// Most probable length.
    pub fn mode(&self) -> usize {
        self.log_pmf
            .iter()
            .enumerate()
            .fold((self.min, LOG_0), |(best, best_p), (i, &p)| {
                if p > best_p {
                    (self.min + i, p)
                }
                else {
                    (best, best_p)
                }
            })
            .0
    }
}

/// Subtracts the log-sum of `log_pmf` from every entry.
pub(crate) fn normalize_log_pmf(log_pmf: &mut [f64]) {
    let norm = log_pmf
        .iter()
        .fold(LOG_0, |acc, &v| log_add(acc, v));
    if norm.is_finite() {
        log_pmf.iter_mut().for_each(|v| *v -= norm);
    }
}

fn binomial_kernel(
    n: usize,
    p: f64,
) -> Vec<f64> {
    match Binomial::new(p, n as u64) {
        Ok(binom) => (0..=n as u64).map(|k| binom.ln_pmf(k)).collect(),
        Err(e) => {
            warn!("Invalid fragment length kernel ({}), using no smoothing", e);
            vec![0.0]
        },
    }
}
