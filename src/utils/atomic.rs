use std::fmt;
use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

use super::log_add;

/// An `f64` cell that can be updated from many threads without a lock.
///
/// The value is stored as its IEEE-754 bit pattern inside an [`AtomicU64`];
/// read-modify-write operations retry on contention.
#[derive(Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(
        &self,
        value: f64,
    ) {
        self.bits
            .store(value.to_bits(), Ordering::Release)
    }

    /// Applies `f` atomically and returns the previous value.
    #[inline]
    pub fn fetch_update_with<F>(
        &self,
        mut f: F,
    ) -> f64
    where
        F: FnMut(f64) -> f64, {
        let prev = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(f(f64::from_bits(bits)).to_bits())
            })
            // The closure never returns None.
            .unwrap_or_else(|bits| bits);
        f64::from_bits(prev)
    }

    /// Adds `value` in linear space.
    #[inline]
    pub fn fetch_add(
        &self,
        value: f64,
    ) -> f64 {
        self.fetch_update_with(|cur| cur + value)
    }

    /// Adds `value` in log space, i.e. stores `ln(exp(cur) + exp(value))`.
    #[inline]
    pub fn log_add_assign(
        &self,
        value: f64,
    ) -> f64 {
        self.fetch_update_with(|cur| log_add(cur, value))
    }
}

impl fmt::Debug for AtomicF64 {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

impl Clone for AtomicF64 {
    fn clone(&self) -> Self {
        Self::new(self.load())
    }
}
