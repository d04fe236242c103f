//! Equivalence classes of fragments.
//!
//! Fragments that are compatible with exactly the same set of transcripts
//! are collapsed into one class. The builder is shared by every consumer
//! worker; the map is split into shards behind their own [`Mutex`]es so
//! that inserts of unrelated classes rarely contend.

use std::hash::BuildHasher;
use std::sync::Mutex;

use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashMap;
use itertools::Itertools;
use log::debug;
use serde::Serialize;

use crate::data_structs::TranscriptId;

const NUM_SHARDS: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EqClassEntry {
    /// Number of fragments in the class.
    pub count:   u64,
    /// Per-transcript auxiliary weight sums, aligned with the key.
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquivalenceClass {
    pub transcripts: Vec<TranscriptId>,
    pub count:       u64,
    pub weights:     Vec<f64>,
}

#[derive(Debug)]
pub struct EquivalenceClassBuilder {
    shards: Vec<Mutex<HashMap<Vec<TranscriptId>, EqClassEntry>>>,
    hasher: DefaultHashBuilder,
}

impl Default for EquivalenceClassBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EquivalenceClassBuilder {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
            hasher: DefaultHashBuilder::default(),
        }
    }

    fn shard_of(
        &self,
        key: &[TranscriptId],
    ) -> &Mutex<HashMap<Vec<TranscriptId>, EqClassEntry>> {
        let hash = self.hasher.hash_one(key) as usize;
        &self.shards[hash % self.shards.len()]
    }

    /// Records one fragment compatible with `transcripts`, each carrying the
    /// auxiliary weight at the same index of `weights`. Order and duplicate
    /// ids do not matter; weights of duplicates are summed.
    pub fn insert(
        &self,
        transcripts: &[TranscriptId],
        weights: &[f64],
    ) {
        if transcripts.is_empty() {
            return;
        }
        if transcripts.len() != weights.len() {
            debug!(
                "Ignoring equivalence class with {} transcripts and {} weights",
                transcripts.len(),
                weights.len()
            );
            return;
        }
        let merged = transcripts
            .iter()
            .copied()
            .zip(weights.iter().copied())
            .sorted_unstable_by_key(|(id, _)| *id)
            .coalesce(|(a, wa), (b, wb)| {
                if a == b {
                    Ok((a, wa + wb))
                }
                else {
                    Err(((a, wa), (b, wb)))
                }
            })
            .collect_vec();
        let (key, weights): (Vec<TranscriptId>, Vec<f64>) = merged.into_iter().unzip();

        let mut shard = self
            .shard_of(&key)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let entry = shard
            .entry(key)
            .or_insert_with(|| EqClassEntry {
                count:   0,
                weights: vec![0.0; weights.len()],
            });
        entry.count += 1;
        entry
            .weights
            .iter_mut()
            .zip(weights)
            .for_each(|(acc, w)| *acc += w);
    }

    /// Count of the class with exactly these transcripts, if present.
    pub fn count(
        &self,
        transcripts: &[TranscriptId],
    ) -> Option<u64> {
        let key = transcripts
            .iter()
            .copied()
            .sorted_unstable()
            .dedup()
            .collect_vec();
        let shard = self
            .shard_of(&key)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        shard.get(&key).map(|e| e.count)
    }

    pub fn num_classes(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    /// Total number of fragments over all classes.
    pub fn num_fragments(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| {
                s.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .values()
                    .map(|e| e.count)
                    .sum::<u64>()
            })
            .sum()
    }

    /// All classes, sorted by key.
    pub fn classes(&self) -> Vec<EquivalenceClass> {
        self.shards
            .iter()
            .flat_map(|s| {
                s.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .iter()
                    .map(|(k, v)| EquivalenceClass {
                        transcripts: k.clone(),
                        count:       v.count,
                        weights:     v.weights.clone(),
                    })
                    .collect_vec()
            })
            .sorted_by(|a, b| a.transcripts.cmp(&b.transcripts))
            .collect()
    }

    pub fn clear(&self) {
        self.shards
            .iter()
            .for_each(|s| s.lock().unwrap_or_else(|e| e.into_inner()).clear());
    }
}
