//! This module contains various utility functions and helper macros used
//! throughout the txquant crate.
//!
//! Key functionalities include:
//!
//! - Log-space arithmetic ([`log_add`], [`log_sum`]) used by every
//!   log-domain model.
//! - [`AtomicF64`], a lock-free floating point cell used for concurrent
//!   accumulation of model masses and for transcript effective lengths.
//! - The [`with_field_fn!`](crate::with_field_fn) macro generating
//!   builder-style `with_*` methods.
//! - The shared rayon thread pool used for bulk recomputation.

use once_cell::sync::Lazy;
use rayon::{
    ThreadPool,
    ThreadPoolBuilder,
};

mod atomic;
mod math;

pub use atomic::AtomicF64;
pub use math::*;

/// Environment variable controlling the size of [`THREAD_POOL`].
pub const NUM_THREADS_ENV: &str = "TXQ_NUM_THREADS";

pub static THREAD_POOL: Lazy<ThreadPool> = Lazy::new(|| {
    let num_threads: Option<usize> = std::env::var(NUM_THREADS_ENV)
        .ok()
        .and_then(|str| str.parse::<usize>().ok());
    ThreadPoolBuilder::new()
        .num_threads(num_threads.unwrap_or(0))
        .build()
        .expect("Failed to create thread pool")
});

#[macro_export]
macro_rules! with_field_fn {
    ($field_name: ident, $field_type: ty) => {
        $crate::exports::paste::paste! {
            pub fn [<with_$field_name>](mut self, value: $field_type) -> Self {
            self.$field_name = value;
            self
            }
        }
    };
}
