//! The quantification session.
//!
//! An [`AlignmentLibrary`] binds an [`AlignmentSource`] to the transcripts
//! named in its header and owns every statistical model aggregated from the
//! fragments the source produces. Consumer threads share it by reference
//! and fold groups into it through `&self`; only construction and
//! [`AlignmentLibrary::reset`] need exclusive access.

use std::path::{
    Path,
    PathBuf,
};
use std::sync::atomic::{
    AtomicU64,
    AtomicU8,
    Ordering,
};

use anyhow::bail;
use log::{
    debug,
    error,
    info,
};
use rayon::prelude::*;

use crate::cluster_forest::ClusterForest;
use crate::config::QuantConfig;
use crate::data_structs::{
    first_header_difference,
    AlignmentGroup,
    LibraryFormat,
    ReferenceHeader,
    TranscriptRegistry,
};
use crate::eqclass::EquivalenceClassBuilder;
use crate::error::{
    InputKind,
    QuantError,
};
use crate::io::{
    AlignmentQueue,
    AlignmentSource,
    FastaTranscriptSource,
    FragmentFilter,
    TranscriptSource,
};
use crate::models::{
    ErrorModel,
    FragmentLengthDistribution,
    FragmentStartDistribution,
    GcBiasModel,
    ReadKmerDist,
    StatModel,
    GC_BINS,
    READ_BIAS_K,
};
use crate::utils::THREAD_POOL;

/// Progress of the effective length recomputation within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LengthUpdateState {
    Idle = 0,
    Updating = 1,
    Done = 2,
}

impl From<u8> for LengthUpdateState {
    fn from(value: u8) -> Self {
        match value {
            0 => LengthUpdateState::Idle,
            1 => LengthUpdateState::Updating,
            _ => LengthUpdateState::Done,
        }
    }
}

/// Single-writer-wins gate: exactly one caller moves it out of `Idle`.
#[derive(Debug)]
struct UpdateGate(AtomicU8);

impl UpdateGate {
    fn new() -> Self {
        Self(AtomicU8::new(LengthUpdateState::Idle as u8))
    }

    fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(
                LengthUpdateState::Idle as u8,
                LengthUpdateState::Updating as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn finish(&self) {
        self.0
            .store(LengthUpdateState::Done as u8, Ordering::Release)
    }

    fn reopen(&self) {
        self.0
            .store(LengthUpdateState::Idle as u8, Ordering::Release)
    }

    fn state(&self) -> LengthUpdateState {
        LengthUpdateState::from(self.0.load(Ordering::Acquire))
    }
}

pub struct AlignmentLibrary<S: AlignmentSource = AlignmentQueue> {
    // Must stay the first field: dropping it joins the workers.
    source:                   S,
    transcript_file:          Option<PathBuf>,
    lib_format:               LibraryFormat,
    config:                   QuantConfig,
    transcripts:              TranscriptRegistry,
    frag_length_dist:         FragmentLengthDistribution,
    frag_start_dists:         Vec<FragmentStartDistribution>,
    error_model:              ErrorModel,
    read_bias:                ReadKmerDist<READ_BIAS_K>,
    gc_model:                 GcBiasModel,
    expected_seq_bias:        Vec<f64>,
    expected_gc:              Vec<f64>,
    gc_frac_fwd:              f64,
    eq_builder:               EquivalenceClassBuilder,
    cluster_forest:           ClusterForest,
    quantification_passes:    usize,
    update_gate:              UpdateGate,
    effective_length_updates: AtomicU64,
}

impl AlignmentLibrary<AlignmentQueue> {
    /// Opens a session over SAM/BAM `alignment_files` and the FASTA
    /// `transcript_file`, and starts reading alignments.
    ///
    /// Fails with [`QuantError::MissingInput`] when a path does not exist
    /// (alignment files are checked first) and with
    /// [`QuantError::HeaderMismatch`] when the alignment files disagree on
    /// their reference sequences.
    pub fn try_new<P: AsRef<Path>>(
        alignment_files: Vec<PathBuf>,
        transcript_file: P,
        lib_format: LibraryFormat,
        config: QuantConfig,
    ) -> anyhow::Result<Self> {
        let transcript_file = transcript_file.as_ref();
        if let Some(missing) = alignment_files.iter().find(|p| !p.exists()) {
            return Err(QuantError::MissingInput {
                kind: InputKind::Alignment,
                path: missing.clone(),
            }
            .into());
        }
        if !transcript_file.exists() {
            return Err(QuantError::MissingInput {
                kind: InputKind::Transcript,
                path: transcript_file.to_path_buf(),
            }
            .into());
        }

        let source = AlignmentQueue::new(alignment_files, lib_format, &config)?;
        let mut transcript_source = FastaTranscriptSource::new(transcript_file);
        let mut library =
            Self::try_from_source(source, &mut transcript_source, lib_format, config)?;
        library.transcript_file = Some(transcript_file.to_path_buf());
        Ok(library)
    }
}

impl<S: AlignmentSource> AlignmentLibrary<S> {
    /// Builds a session over an already opened `source`.
    pub fn try_from_source<T: TranscriptSource>(
        mut source: S,
        transcript_source: &mut T,
        lib_format: LibraryFormat,
        config: QuantConfig,
    ) -> anyhow::Result<Self> {
        if source.headers().is_empty() {
            bail!("Alignment source has no files");
        }
        if let Some(diff) = first_header_difference(source.headers()) {
            return Err(QuantError::HeaderMismatch {
                reason: diff.to_string(),
            }
            .into());
        }

        let mut transcripts = TranscriptRegistry::from_header(source.header());
        transcript_source.populate_targets(transcripts.as_mut_slice())?;
        transcripts.assign_length_classes(|len| config.length_class(len));

        let frag_start_dists = (0..config.num_length_classes())
            .map(|_| FragmentStartDistribution::new(config.num_start_bins))
            .collect();
        let frag_length_dist = FragmentLengthDistribution::from_config(&config);
        let error_model = ErrorModel::new(config.num_error_bins);
        let cluster_forest = ClusterForest::new(transcripts.len());

        source.start(None, false)?;
        info!(
            "Session over {} transcripts, library format {}",
            transcripts.len(),
            lib_format
        );

        Ok(Self {
            source,
            transcript_file: None,
            lib_format,
            config,
            transcripts,
            frag_length_dist,
            frag_start_dists,
            error_model,
            read_bias: ReadKmerDist::new(),
            gc_model: GcBiasModel::new(),
            expected_seq_bias: vec![1.0; ReadKmerDist::<READ_BIAS_K>::NUM_KMERS],
            expected_gc: vec![1.0; GC_BINS],
            gc_frac_fwd: 0.5,
            eq_builder: EquivalenceClassBuilder::new(),
            cluster_forest,
            quantification_passes: 0,
            update_gate: UpdateGate::new(),
            effective_length_updates: AtomicU64::new(0),
        })
    }

    /// Recomputes every transcript's effective length from the current
    /// fragment length distribution.
    ///
    /// Safe to call from any number of threads: the first caller of a pass
    /// does the work and gets `true`, every other call returns `false` at
    /// once, including calls made after the work is done.
    pub fn update_transcript_lengths_atomic(&self) -> bool {
        if !self.update_gate.try_begin() {
            return false;
        }
        let snapshot = self.frag_length_dist.snapshot();
        let floor = self.config.min_effective_length;
        THREAD_POOL.install(|| {
            self.transcripts
                .as_slice()
                .par_iter()
                .for_each(|txp| {
                    txp.update_effective_length(
                        &snapshot.log_pmf,
                        snapshot.mean,
                        snapshot.min,
                        snapshot.max,
                        floor,
                    );
                })
        });
        self.effective_length_updates
            .fetch_add(1, Ordering::AcqRel);
        self.update_gate.finish();
        info!(
            "Updated effective lengths of {} transcripts (fragment length mean {:.2}, support [{}, {}])",
            self.transcripts.len(),
            snapshot.mean,
            snapshot.min,
            snapshot.max
        );
        true
    }

    /// Replays the alignment files for another pass.
    ///
    /// Returns false, leaving everything as it was, when a bound file is no
    /// longer a regular file. Otherwise restarts the source with `filter`
    /// and `only_ambiguous`, reopens the effective length gate and, if
    /// `inc_passes`, counts a new pass. Models are kept.
    pub fn reset(
        &mut self,
        inc_passes: bool,
        filter: Option<FragmentFilter>,
        only_ambiguous: bool,
    ) -> bool {
        let stale = self
            .source
            .files()
            .iter()
            .find(|path| !path.is_file())
            .cloned();
        if let Some(path) = stale {
            error!("{}", QuantError::StaleSource { path });
            return false;
        }
        let restarted = self
            .source
            .reset()
            .and_then(|_| self.source.start(filter, only_ambiguous));
        if let Err(e) = restarted {
            error!("Failed to restart alignment source: {:#}", e);
            return false;
        }
        self.update_gate.reopen();
        if inc_passes {
            self.quantification_passes += 1;
        }
        debug!("Reset for pass {}", self.quantification_passes);
        true
    }

    pub fn get_alignment_group(&self) -> Option<AlignmentGroup> {
        self.source.get_alignment_group()
    }

    pub fn is_exhausted(&self) -> bool {
        self.source.is_exhausted()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn header(&self) -> &ReferenceHeader {
        self.source.header()
    }

    pub fn alignment_files(&self) -> &[PathBuf] {
        self.source.files()
    }

    pub fn transcript_file(&self) -> Option<&Path> {
        self.transcript_file.as_deref()
    }

    pub fn lib_format(&self) -> &LibraryFormat {
        &self.lib_format
    }

    pub fn config(&self) -> &QuantConfig {
        &self.config
    }

    pub fn transcripts(&self) -> &TranscriptRegistry {
        &self.transcripts
    }

    pub fn fragment_length_dist(&self) -> &FragmentLengthDistribution {
        &self.frag_length_dist
    }

    pub fn fragment_start_dists(&self) -> &[FragmentStartDistribution] {
        &self.frag_start_dists
    }

    /// Fragment start distribution of a length class, clamped to the last
    /// class.
    pub fn fragment_start_dist(
        &self,
        length_class: usize,
    ) -> &FragmentStartDistribution {
        let idx = length_class.min(self.frag_start_dists.len() - 1);
        &self.frag_start_dists[idx]
    }

    pub fn error_model(&self) -> &ErrorModel {
        &self.error_model
    }

    pub fn read_bias_model(&self) -> &ReadKmerDist<READ_BIAS_K> {
        &self.read_bias
    }

    pub fn gc_bias_model(&self) -> &GcBiasModel {
        &self.gc_model
    }

    pub fn equivalence_class_builder(&self) -> &EquivalenceClassBuilder {
        &self.eq_builder
    }

    pub fn cluster_forest(&self) -> &ClusterForest {
        &self.cluster_forest
    }

    pub fn quantification_passes(&self) -> usize {
        self.quantification_passes
    }

    /// Number of effective length recomputations actually performed.
    pub fn effective_length_updates(&self) -> u64 {
        self.effective_length_updates
            .load(Ordering::Acquire)
    }

    pub fn length_update_state(&self) -> LengthUpdateState {
        self.update_gate.state()
    }

    pub fn num_observed_fragments(&self) -> u64 {
        self.source.counters().num_observed()
    }

    pub fn num_mapped_fragments(&self) -> u64 {
        self.source.counters().num_mapped()
    }

    pub fn num_uniquely_mapped_fragments(&self) -> u64 {
        self.source
            .counters()
            .num_uniquely_mapped()
    }

    /// Mapped over observed fragments of the current pass. `NaN` before any
    /// fragment was observed.
    pub fn effective_mapping_rate(&self) -> f64 {
        let observed = self.num_observed_fragments();
        if observed == 0 {
            return f64::NAN;
        }
        self.num_mapped_fragments() as f64 / observed as f64
    }

    pub fn expected_seq_bias(&self) -> &[f64] {
        &self.expected_seq_bias
    }

    pub fn set_expected_seq_bias(
        &mut self,
        values: Vec<f64>,
    ) -> anyhow::Result<()> {
        let expected = ReadKmerDist::<READ_BIAS_K>::NUM_KMERS;
        if values.len() != expected {
            bail!(
                "Expected sequence bias must have {} entries, got {}",
                expected,
                values.len()
            );
        }
        self.expected_seq_bias = values;
        Ok(())
    }

    pub fn expected_gc_bias(&self) -> &[f64] {
        &self.expected_gc
    }

    pub fn set_expected_gc_bias(
        &mut self,
        values: Vec<f64>,
    ) -> anyhow::Result<()> {
        if values.len() != GC_BINS {
            bail!(
                "Expected GC bias must have {} bins, got {}",
                GC_BINS,
                values.len()
            );
        }
        self.expected_gc = values;
        Ok(())
    }

    pub fn observed_gc(&self) -> Vec<f64> {
        self.gc_model.snapshot()
    }

    pub fn set_observed_gc(
        &self,
        values: &[f64],
    ) -> anyhow::Result<()> {
        self.gc_model.replace(values)
    }

    pub fn gc_frac_fwd(&self) -> f64 {
        self.gc_frac_fwd
    }

    pub fn gc_frac_rc(&self) -> f64 {
        1.0 - self.gc_frac_fwd
    }

    pub fn set_gc_frac_fwd(
        &mut self,
        value: f64,
    ) {
        self.gc_frac_fwd = value;
    }
}
