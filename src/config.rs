use std::path::Path;

use anyhow::Context;
use serde::{
    Deserialize,
    Serialize,
};

use crate::with_field_fn;

/// Length class upper bounds (inclusive) for fragment start statistics.
///
/// Taken from Roberts, Adam, et al. "Improving RNA-Seq expression estimates
/// by correcting for fragment bias." Genome Biol 12.3 (2011): R22.
pub const DEFAULT_LENGTH_CLASS_THRESHOLDS: [u32; 4] = [1334, 2104, 2988, 4389];

/// Options shared by every component of a quantification session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantConfig {
    /// Alignment parsing workers owned by the alignment source.
    pub num_parse_threads:          usize,
    /// Workers turning raw fragments into alignment groups.
    pub num_group_threads:          usize,
    /// Statistics-aggregation workers used by [`crate::quant::run_pass`].
    pub num_quant_threads:          usize,
    /// Capacity of each bounded ingestion queue, in fragments.
    pub mapping_cache_memory_limit: usize,
    pub frag_len_dist_max:          usize,
    /// Mean of the Gaussian fragment length prior. Zero disables the prior.
    pub frag_len_prior_mean:        f64,
    pub frag_len_prior_sd:          f64,
    pub frag_len_kernel_n:          usize,
    pub frag_len_kernel_p:          f64,
    /// Read-position bins of the error model.
    pub num_error_bins:             usize,
    /// Relative-position bins of each fragment start distribution.
    pub num_start_bins:             usize,
    /// Inclusive upper bounds separating transcript length classes. An empty
    /// list puts every transcript in class 0.
    pub length_class_thresholds:    Vec<u32>,
    /// Effective lengths are never reported below this value.
    pub min_effective_length:       f64,
    /// Weight of alignments incompatible with the library format. Zero drops
    /// them.
    pub incompat_prior:             f64,
}

impl QuantConfig {
    with_field_fn!(num_parse_threads, usize);
    with_field_fn!(num_group_threads, usize);
    with_field_fn!(num_quant_threads, usize);
    with_field_fn!(mapping_cache_memory_limit, usize);
    with_field_fn!(frag_len_dist_max, usize);
    with_field_fn!(frag_len_prior_mean, f64);
    with_field_fn!(frag_len_prior_sd, f64);
    with_field_fn!(frag_len_kernel_n, usize);
    with_field_fn!(frag_len_kernel_p, f64);
    with_field_fn!(num_error_bins, usize);
    with_field_fn!(num_start_bins, usize);
    with_field_fn!(length_class_thresholds, Vec<u32>);
    with_field_fn!(min_effective_length, f64);
    with_field_fn!(incompat_prior, f64);

    /// Reads a config from a JSON file. Missing keys keep their defaults.
    pub fn from_json<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open config {}", path.display()))?;
        let config = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Number of length classes implied by the thresholds.
    pub fn num_length_classes(&self) -> usize {
        self.length_class_thresholds.len() + 1
    }

    /// Length class of a transcript of length `ref_length`.
    pub fn length_class(
        &self,
        ref_length: u32,
    ) -> usize {
        self.length_class_thresholds
            .iter()
            .position(|&upper| ref_length <= upper)
            .unwrap_or(self.length_class_thresholds.len())
    }
}

impl Default for QuantConfig {
    fn default() -> Self {
        Self {
            num_parse_threads:          1,
            num_group_threads:          1,
            num_quant_threads:          std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            mapping_cache_memory_limit: 10_000,
            frag_len_dist_max:          1000,
            frag_len_prior_mean:        250.0,
            frag_len_prior_sd:          25.0,
            frag_len_kernel_n:          4,
            frag_len_kernel_p:          0.5,
            num_error_bins:             6,
            num_start_bins:             20,
            length_class_thresholds:    DEFAULT_LENGTH_CLASS_THRESHOLDS.to_vec(),
            min_effective_length:       1.0,
            incompat_prior:             0.0,
        }
    }
}
