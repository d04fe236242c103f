//! Clusters of transcripts linked by shared ambiguous fragments.
//!
//! A concurrent disjoint-set forest over transcript ids. Lookups are
//! lock-free and compress paths by halving. Links take the stripe locks of
//! the two roots involved, keyed by the low bits of the root id, and always
//! hang the larger root under the smaller one, so the representative of a
//! cluster is its smallest transcript id whatever the order of unions.

use std::sync::atomic::{
    AtomicU64,
    AtomicUsize,
    Ordering,
};
use std::sync::Mutex;

use hashbrown::HashMap;
use itertools::Itertools;
use log::debug;
use serde::Serialize;

use crate::data_structs::TranscriptId;

const NUM_STRIPES: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Sorted member ids; the first one is the representative.
    pub members: Vec<TranscriptId>,
    /// Fragments recorded on any member.
    pub count:   u64,
}

#[derive(Debug)]
pub struct ClusterForest {
    parents: Vec<AtomicUsize>,
    hits:    Vec<AtomicU64>,
    stripes: Vec<Mutex<()>>,
}

impl ClusterForest {
    /// One singleton cluster per transcript.
    pub fn new(num_transcripts: usize) -> Self {
        Self {
            parents: (0..num_transcripts)
                .map(AtomicUsize::new)
                .collect(),
            hits:    (0..num_transcripts)
                .map(|_| AtomicU64::new(0))
                .collect(),
            stripes: (0..NUM_STRIPES.min(num_transcripts.max(1)))
                .map(|_| Mutex::new(()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    fn root(
        &self,
        mut x: usize,
    ) -> usize {
        loop {
            let parent = self.parents[x].load(Ordering::Acquire);
            if parent == x {
                return x;
            }
            let grand = self.parents[parent].load(Ordering::Acquire);
            if grand != parent {
                let _ = self.parents[x].compare_exchange(
                    parent,
                    grand,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            x = grand;
        }
    }

    fn is_root(
        &self,
        x: usize,
    ) -> bool {
        self.parents[x].load(Ordering::Acquire) == x
    }

    /// Representative of the cluster containing `id`.
    pub fn find(
        &self,
        id: TranscriptId,
    ) -> Option<TranscriptId> {
        let id = id as usize;
        if id >= self.len() {
            return None;
        }
        Some(self.root(id) as TranscriptId)
    }

    pub fn same(
        &self,
        a: TranscriptId,
        b: TranscriptId,
    ) -> bool {
        match (self.find(a), self.find(b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }

    /// Merges the clusters of `a` and `b`. Returns false if they already
    /// were one cluster or an id is out of range.
    pub fn union(
        &self,
        a: TranscriptId,
        b: TranscriptId,
    ) -> bool {
        let (a, b) = (a as usize, b as usize);
        if a >= self.len() || b >= self.len() {
            debug!("Ignoring union of out-of-range transcripts {} and {}", a, b);
            return false;
        }
        loop {
            let (ra, rb) = (self.root(a), self.root(b));
            if ra == rb {
                return false;
            }
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            let (s1, s2) = {
                let n = self.stripes.len();
                let (x, y) = (lo % n, hi % n);
                (x.min(y), x.max(y))
            };
            let _first = self.stripes[s1]
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let _second = (s2 != s1).then(|| {
                self.stripes[s2]
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
            });
            // Either root may have been linked since it was found.
            if self.is_root(lo) && self.is_root(hi) {
                self.parents[hi].store(lo, Ordering::Release);
                return true;
            }
        }
    }

    /// Puts every transcript of `ids` into one cluster.
    pub fn merge_group(
        &self,
        ids: &[TranscriptId],
    ) {
        if let Some((&first, rest)) = ids.split_first() {
            rest.iter().for_each(|&other| {
                self.union(first, other);
            });
        }
    }

    /// Counts one fragment on `id`'s cluster.
    pub fn record_fragment(
        &self,
        id: TranscriptId,
    ) {
        match self.hits.get(id as usize) {
            Some(hits) => {
                hits.fetch_add(1, Ordering::Relaxed);
            },
            None => debug!("Ignoring fragment on out-of-range transcript {}", id),
        }
    }

    /// All clusters, including singletons, ordered by representative.
    pub fn clusters(&self) -> Vec<Cluster> {
        let mut by_root: HashMap<usize, Cluster> = HashMap::new();
        for id in 0..self.len() {
            let cluster = by_root
                .entry(self.root(id))
                .or_insert_with(|| Cluster {
                    members: Vec::new(),
                    count:   0,
                });
            cluster.members.push(id as TranscriptId);
            cluster.count += self.hits[id].load(Ordering::Relaxed);
        }
        by_root
            .into_iter()
            .sorted_unstable_by_key(|(root, _)| *root)
            .map(|(_, cluster)| cluster)
            .collect()
    }

    /// Number of distinct clusters.
    pub fn num_clusters(&self) -> usize {
        (0..self.len())
            .filter(|&id| self.is_root(id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;
    use rand::{
        Rng,
        SeedableRng,
    };

    use super::*;

    #[test]
    fn union_and_find() {
        let forest = ClusterForest::new(6);
        assert!(forest.union(4, 2));
        assert!(forest.union(2, 5));
        assert!(!forest.union(5, 4));
        assert_eq!(forest.find(5), Some(2));
        assert!(forest.same(4, 5));
        assert!(!forest.same(0, 5));
        assert_eq!(forest.num_clusters(), 4);
        assert_eq!(forest.find(6), None);
        assert!(!forest.union(0, 6));
    }

    #[test]
    fn clusters_aggregate_hits() {
        let forest = ClusterForest::new(4);
        forest.merge_group(&[3, 1]);
        forest.record_fragment(1);
        forest.record_fragment(3);
        forest.record_fragment(0);
        forest.record_fragment(9);
        let clusters = forest.clusters();
        assert_eq!(
            clusters,
            vec![
                Cluster {
                    members: vec![0],
                    count:   1,
                },
                Cluster {
                    members: vec![1, 3],
                    count:   2,
                },
                Cluster {
                    members: vec![2],
                    count:   0,
                },
            ]
        );
    }

    #[test]
    fn concurrent_unions_match_sequential() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let n = 500;
        let mut edges: Vec<(u32, u32)> = (0..400)
            .map(|_| (rng.gen_range(0..n), rng.gen_range(0..n)))
            .collect();

        let sequential = ClusterForest::new(n as usize);
        edges
            .iter()
            .for_each(|&(a, b)| {
                sequential.union(a, b);
            });

        edges.shuffle(&mut rng);
        let concurrent = ClusterForest::new(n as usize);
        std::thread::scope(|s| {
            for chunk in edges.chunks(37) {
                let forest = &concurrent;
                s.spawn(move || {
                    chunk.iter().for_each(|&(a, b)| {
                        forest.union(b, a);
                    })
                });
            }
        });

        for id in 0..n {
            assert_eq!(sequential.find(id), concurrent.find(id));
        }
        assert_eq!(sequential.clusters(), concurrent.clusters());
    }
}
