//! Consumer side of a session: folding alignment groups into the models.

use std::io::Write;
use std::sync::atomic::{
    AtomicBool,
    AtomicU64,
    Ordering,
};
use std::sync::Barrier;

use crossbeam::utils::Backoff;
use itertools::Itertools;
use log::{
    debug,
    info,
};
use serde::Serialize;

use crate::cluster_forest::Cluster;
use crate::data_structs::{
    Alignment,
    AlignmentGroup,
    TranscriptId,
    TranscriptSummary,
};
use crate::eqclass::EquivalenceClass;
use crate::io::AlignmentSource;
use crate::library::AlignmentLibrary;
use crate::models::{
    context_window,
    ErrorEvidence,
    ErrorModelSnapshot,
    FragmentLengthSnapshot,
    FragmentStart,
    FragmentStartSnapshot,
    GcEvidence,
    StatModel,
    READ_BIAS_K,
};
use crate::utils::LOG_1;

/// Folds one fragment into every model of `library`.
///
/// Alignments incompatible with the library format are dropped unless
/// `incompat_prior` is positive. Every remaining alignment carries mass
/// `1 / n`. Returns false when nothing was folded (unmapped fragment, or
/// no compatible alignment left).
pub fn fold_group<S: AlignmentSource>(
    library: &AlignmentLibrary<S>,
    group: &AlignmentGroup,
) -> bool {
    if group.is_empty() {
        return false;
    }
    let lib_format = library.lib_format();
    let keep_incompatible = library.config().incompat_prior > 0.0;
    let alignments: Vec<&Alignment> = group
        .alignments
        .iter()
        .filter(|aln| keep_incompatible || aln.is_compatible_with(lib_format))
        .collect();
    if alignments.is_empty() {
        return false;
    }

    let mass = 1.0 / alignments.len() as f64;
    let log_mass = mass.ln();
    let ids: Vec<TranscriptId> = alignments
        .iter()
        .map(|aln| aln.transcript_id)
        .collect();

    library
        .equivalence_class_builder()
        .insert(&ids, &vec![mass; ids.len()]);
    let forest = library.cluster_forest();
    forest.merge_group(&ids);
    forest.record_fragment(ids[0]);

    if let [unique] = alignments.as_slice() {
        if let Some(len) = unique.fragment_len {
            library
                .fragment_length_dist()
                .observe((len as usize, LOG_1));
        }
    }

    for aln in alignments {
        let Some(txp) = library.transcripts().get(aln.transcript_id)
        else {
            continue;
        };
        library
            .fragment_start_dist(txp.length_class())
            .observe(FragmentStart {
                pos: aln.pos,
                transcript_len: txp.ref_length(),
                log_mass,
            });

        let Some(sequence) = txp.sequence()
        else {
            continue;
        };
        for read in aln.reads.iter() {
            let calls = read.base_calls(sequence);
            library
                .error_model()
                .observe(ErrorEvidence {
                    calls: &calls,
                    read_len: read.seq.len(),
                    mass,
                });
        }
        if let Some(context) =
            context_window::<READ_BIAS_K>(sequence, aln.five_prime(), aln.fwd)
        {
            library
                .read_bias_model()
                .observe(context.as_slice());
        }
        let (start, end) = aln.span();
        if let Some(gc_fraction) = txp.gc_fraction_in(start as usize, end as usize) {
            library
                .gc_bias_model()
                .observe(GcEvidence { gc_fraction, mass });
        }
    }
    true
}

/// Outcome of [`run_pass`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Groups taken from the source.
    pub num_groups:      u64,
    /// Groups that updated the models.
    pub num_folded:      u64,
    /// Whether this pass recomputed the effective lengths.
    pub updated_lengths: bool,
}

/// Drains the source with `num_threads` consumers, then has every consumer
/// race to recompute the effective lengths; exactly one of them does.
pub fn run_pass<S: AlignmentSource>(
    library: &AlignmentLibrary<S>,
    num_threads: usize,
) -> PassSummary {
    let num_threads = num_threads.max(1);
    let num_groups = AtomicU64::new(0);
    let num_folded = AtomicU64::new(0);
    let updated = AtomicBool::new(false);
    let drained = Barrier::new(num_threads);

    std::thread::scope(|s| {
        for _ in 0..num_threads {
            s.spawn(|| {
                let backoff = Backoff::new();
                loop {
                    match library.get_alignment_group() {
                        Some(group) => {
                            backoff.reset();
                            num_groups.fetch_add(1, Ordering::Relaxed);
                            if fold_group(library, &group) {
                                num_folded.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        None if library.is_exhausted() => break,
                        None => backoff.snooze(),
                    }
                }
                drained.wait();
                if library.update_transcript_lengths_atomic() {
                    updated.store(true, Ordering::Release);
                }
            });
        }
    });

    let summary = PassSummary {
        num_groups:      num_groups.into_inner(),
        num_folded:      num_folded.into_inner(),
        updated_lengths: updated.into_inner(),
    };
    info!(
        "Pass {}: {} fragments, {} folded, mapping rate {:.4}",
        library.quantification_passes(),
        summary.num_groups,
        summary.num_folded,
        library.effective_mapping_rate()
    );
    summary
}

/// Serializable view of everything a session aggregated.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub passes:                 usize,
    pub num_observed:           u64,
    pub num_mapped:             u64,
    pub num_uniquely_mapped:    u64,
    /// `None` when no fragment was observed.
    pub effective_mapping_rate: Option<f64>,
    pub fragment_length:        FragmentLengthSnapshot,
    pub fragment_starts:        Vec<FragmentStartSnapshot>,
    pub error_model:            ErrorModelSnapshot,
    pub observed_gc:            Vec<f64>,
    pub gc_frac_fwd:            f64,
    pub transcripts:            Vec<TranscriptSummary>,
    pub equivalence_classes:    Vec<EquivalenceClass>,
    /// Clusters with more than one transcript or at least one fragment.
    pub clusters:               Vec<Cluster>,
}

impl ModelSummary {
    pub fn from_library<S: AlignmentSource>(library: &AlignmentLibrary<S>) -> Self {
        let rate = library.effective_mapping_rate();
        let clusters = library
            .cluster_forest()
            .clusters()
            .into_iter()
            .filter(|c| c.members.len() > 1 || c.count > 0)
            .collect_vec();
        debug!("Summarizing {} clusters", clusters.len());

        Self {
            passes: library.quantification_passes(),
            num_observed: library.num_observed_fragments(),
            num_mapped: library.num_mapped_fragments(),
            num_uniquely_mapped: library.num_uniquely_mapped_fragments(),
            effective_mapping_rate: (!rate.is_nan()).then_some(rate),
            fragment_length: library.fragment_length_dist().snapshot(),
            fragment_starts: library
                .fragment_start_dists()
                .iter()
                .map(|dist| dist.snapshot())
                .collect(),
            error_model: library.error_model().snapshot(),
            observed_gc: library.observed_gc(),
            gc_frac_fwd: library.gc_frac_fwd(),
            transcripts: library
                .transcripts()
                .iter()
                .map(TranscriptSummary::from)
                .collect(),
            equivalence_classes: library
                .equivalence_class_builder()
                .classes(),
            clusters,
        }
    }

    pub fn write_json<W: Write>(
        &self,
        writer: W,
    ) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
