//! Re-exports of the crates that appear in the public API, so that
//! downstream code can name them without adding its own dependencies.

#[doc(hidden)]
pub use paste;
pub use {anyhow,
         crossbeam,
         itertools,
         log,
         noodles,
         rayon,
         serde,
         serde_json,
         statrs};
