use std::sync::atomic::{
    AtomicU32,
    AtomicU64,
    Ordering,
};

use super::{
    base_index,
    StatModel,
};

/// k-mer length of the read-start sequence bias context.
pub const READ_BIAS_K: usize = 6;

/// Bases of context taken upstream of the fragment's 5' end.
const UPSTREAM: usize = 2;

/// Rank of a k-mer in `0..4^k`, first base most significant. `None` if any
/// base is not one of `ACGT`.
pub fn kmer_rank(kmer: &[u8]) -> Option<usize> {
    kmer.iter()
        .try_fold(0usize, |acc, &b| Some(acc * 4 + base_index(b)?))
}

fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        other => other,
    }
}

/// The `K` bases around a fragment's 5' end, read in the fragment's
/// direction: two bases upstream of `five_prime` and `K - 2` from it on.
/// Reverse fragments get the reverse complement. `None` when the window
/// runs off either end of `sequence`.
pub fn context_window<const K: usize>(
    sequence: &[u8],
    five_prime: u32,
    fwd: bool,
) -> Option<[u8; K]> {
    let fp = five_prime as usize;
    let mut window = [0u8; K];
    if fwd {
        let start = fp.checked_sub(UPSTREAM)?;
        window.copy_from_slice(sequence.get(start..start + K)?);
    }
    else {
        let end = fp + UPSTREAM + 1;
        let start = end.checked_sub(K)?;
        let slice = sequence.get(start..end)?;
        for (dst, &src) in window.iter_mut().zip(slice.iter().rev()) {
            *dst = complement(src);
        }
    }
    Some(window)
}

/// Counts of `K`-mers observed at fragment starts.
#[derive(Debug)]
pub struct ReadKmerDist<const K: usize> {
    counts:      Vec<AtomicU32>,
    num_skipped: AtomicU64,
}

impl<const K: usize> Default for ReadKmerDist<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const K: usize> ReadKmerDist<K> {
    pub const NUM_KMERS: usize = 1 << (2 * K);

    pub fn new() -> Self {
        Self {
            counts:      (0..Self::NUM_KMERS)
                .map(|_| AtomicU32::new(0))
                .collect(),
            num_skipped: AtomicU64::new(0),
        }
    }

    pub fn count(
        &self,
        rank: usize,
    ) -> u32 {
        self.counts
            .get(rank)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed) as u64)
            .sum()
    }

    /// Contexts dropped for containing a non-`ACGT` base.
    pub fn num_skipped(&self) -> u64 {
        self.num_skipped.load(Ordering::Relaxed)
    }
}

impl<const K: usize> StatModel for ReadKmerDist<K> {
    type Evidence<'a> = &'a [u8];
    type Snapshot = Vec<u32>;

    fn observe(
        &self,
        kmer: &[u8],
    ) {
        match kmer_rank(kmer).filter(|_| kmer.len() == K) {
            Some(rank) => {
                self.counts[rank].fetch_add(1, Ordering::Relaxed);
            },
            None => {
                self.num_skipped
                    .fetch_add(1, Ordering::Relaxed);
            },
        }
    }

    fn snapshot(&self) -> Vec<u32> {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}
