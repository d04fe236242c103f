use std::ops::Index;

use hashbrown::HashMap;
use log::debug;
use serde::Serialize;

use crate::data_structs::ReferenceHeader;
use crate::utils::{
    log_add,
    AtomicF64,
    LOG_0,
};

pub type TranscriptId = u32;

/// A reference sequence being quantified.
///
/// Identity, length and length class are fixed at construction; the
/// effective length is the only mutable field and is written exclusively by
/// the session's one-shot recomputation.
#[derive(Debug)]
pub struct Transcript {
    id:               TranscriptId,
    name:             String,
    ref_length:       u32,
    length_class:     usize,
    sequence:         Option<Vec<u8>>,
    /// `gc_prefix[i]` is the number of G/C bases in `sequence[..i]`.
    gc_prefix:        Vec<u32>,
    effective_length: AtomicF64,
}

impl Transcript {
    pub fn new(
        id: TranscriptId,
        name: impl Into<String>,
        ref_length: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            ref_length,
            length_class: 0,
            sequence: None,
            gc_prefix: Vec::new(),
            effective_length: AtomicF64::new(ref_length as f64),
        }
    }

    pub fn id(&self) -> TranscriptId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ref_length(&self) -> u32 {
        self.ref_length
    }

    pub fn length_class(&self) -> usize {
        self.length_class
    }

    pub(crate) fn set_length_class(
        &mut self,
        length_class: usize,
    ) {
        self.length_class = length_class;
    }

    /// Uppercase nucleotide sequence, if the transcript source provided one.
    pub fn sequence(&self) -> Option<&[u8]> {
        self.sequence.as_deref()
    }

    pub fn has_sequence(&self) -> bool {
        self.sequence.is_some()
    }

    /// Attaches the nucleotide sequence and derives the GC prefix table.
    pub fn set_sequence(
        &mut self,
        sequence: Vec<u8>,
    ) {
        let sequence: Vec<u8> = sequence
            .into_iter()
            .map(|b| b.to_ascii_uppercase())
            .collect();
        let mut gc_prefix = Vec::with_capacity(sequence.len() + 1);
        gc_prefix.push(0u32);
        let mut acc = 0u32;
        for base in sequence.iter() {
            if matches!(base, b'G' | b'C') {
                acc += 1;
            }
            gc_prefix.push(acc);
        }
        self.gc_prefix = gc_prefix;
        self.sequence = Some(sequence);
    }

    /// GC fraction of `sequence[start..end]`, or `None` when there is no
    /// sequence or the interval is empty or out of bounds.
    pub fn gc_fraction_in(
        &self,
        start: usize,
        end: usize,
    ) -> Option<f64> {
        if start >= end || end >= self.gc_prefix.len() {
            return None;
        }
        let gc = self.gc_prefix[end] - self.gc_prefix[start];
        Some(gc as f64 / (end - start) as f64)
    }

    /// GC fraction of the whole transcript.
    pub fn gc_fraction(&self) -> Option<f64> {
        self.gc_fraction_in(0, self.gc_prefix.len().saturating_sub(1))
    }

    pub fn effective_length(&self) -> f64 {
        self.effective_length.load()
    }

    pub(crate) fn set_effective_length(
        &self,
        value: f64,
    ) {
        self.effective_length.store(value)
    }

    /// Recomputes and stores the effective length from a normalized
    /// fragment-length log-PMF covering `[min_len, max_len]`.
    pub fn update_effective_length(
        &self,
        log_pmf: &[f64],
        mean: f64,
        min_len: usize,
        max_len: usize,
        floor: f64,
    ) -> f64 {
        let value = compute_effective_length(
            self.ref_length,
            log_pmf,
            mean,
            min_len,
            max_len,
            floor,
        );
        self.set_effective_length(value);
        value
    }
}

/// Expected number of valid fragment start positions on a transcript of
/// length `ref_length`, given a fragment length log-PMF indexed from
/// `min_len`.
///
/// Transcripts shorter than the mean fragment length keep their reference
/// length. The result never drops below `floor`.
pub fn compute_effective_length(
    ref_length: u32,
    log_pmf: &[f64],
    mean: f64,
    min_len: usize,
    max_len: usize,
    floor: f64,
) -> f64 {
    let ref_len = ref_length as f64;
    if ref_len < mean || log_pmf.is_empty() {
        return ref_len.max(floor);
    }
    let upper = max_len
        .min(ref_length as usize)
        .min(min_len + log_pmf.len().saturating_sub(1));
    let mut log_eff = LOG_0;
    for len in min_len.max(1)..=upper {
        let log_p = log_pmf[len - min_len];
        log_eff = log_add(log_eff, log_p + (ref_len - len as f64 + 1.0).ln());
    }
    let eff = log_eff.exp();
    if !eff.is_finite() || eff < floor {
        floor
    }
    else {
        eff
    }
}

/// Transcript snapshot used by [`crate::quant::ModelSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptSummary {
    pub name:             String,
    pub length:           u32,
    pub effective_length: f64,
    pub length_class:     usize,
}

impl From<&Transcript> for TranscriptSummary {
    fn from(value: &Transcript) -> Self {
        Self {
            name:             value.name.clone(),
            length:           value.ref_length,
            effective_length: value.effective_length(),
            length_class:     value.length_class,
        }
    }
}

/// Ordered collection of transcripts, indexed by [`TranscriptId`].
#[derive(Debug, Default)]
pub struct TranscriptRegistry {
    transcripts: Vec<Transcript>,
    by_name:     HashMap<String, TranscriptId>,
}

impl TranscriptRegistry {
    /// One transcript per reference sequence of `header`, in header order.
    pub fn from_header(header: &ReferenceHeader) -> Self {
        Self::from_iter(
            header
                .iter()
                .enumerate()
                .map(|(i, (name, len))| Transcript::new(i as TranscriptId, name, len as u32)),
        )
    }

    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }

    pub fn get(
        &self,
        id: TranscriptId,
    ) -> Option<&Transcript> {
        self.transcripts.get(id as usize)
    }

    pub fn id_of(
        &self,
        name: &str,
    ) -> Option<TranscriptId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transcript> {
        self.transcripts.iter()
    }

    pub fn as_slice(&self) -> &[Transcript] {
        &self.transcripts
    }

    pub fn as_mut_slice(&mut self) -> &mut [Transcript] {
        &mut self.transcripts
    }

    /// Assigns each transcript its length class via `classify`.
    pub fn assign_length_classes<F>(
        &mut self,
        classify: F,
    ) where
        F: Fn(u32) -> usize, {
        for txp in self.transcripts.iter_mut() {
            let class = classify(txp.ref_length);
            txp.set_length_class(class);
        }
        debug!("Assigned length classes to {} transcripts", self.len());
    }
}

impl FromIterator<Transcript> for TranscriptRegistry {
    fn from_iter<I: IntoIterator<Item = Transcript>>(iter: I) -> Self {
        let transcripts: Vec<Transcript> = iter.into_iter().collect();
        let by_name = transcripts
            .iter()
            .map(|t| (t.name.clone(), t.id))
            .collect();
        Self {
            transcripts,
            by_name,
        }
    }
}

impl Index<TranscriptId> for TranscriptRegistry {
    type Output = Transcript;

    fn index(
        &self,
        index: TranscriptId,
    ) -> &Self::Output {
        &self.transcripts[index as usize]
    }
}

impl<'a> IntoIterator for &'a TranscriptRegistry {
    type IntoIter = std::slice::Iter<'a, Transcript>;
    type Item = &'a Transcript;

    fn into_iter(self) -> Self::IntoIter {
        self.transcripts.iter()
    }
}
