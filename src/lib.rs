//! Concurrent statistics aggregation for alignment-based transcript
//! quantification.
//!
//! A session ([`AlignmentLibrary`]) binds SAM/BAM alignments to a
//! transcriptome and aggregates, from many threads at once, the models a
//! downstream abundance estimator needs: the fragment length distribution
//! and the effective lengths derived from it, fragment start positions,
//! substitution errors, sequence and GC bias, equivalence classes and
//! transcript clusters.
//!
//! ```no_run
//! use txquant::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let library = AlignmentLibrary::try_new(
//!     vec!["sample.bam".into()],
//!     "transcripts.fa",
//!     "IU".parse()?,
//!     QuantConfig::default(),
//! )?;
//! let summary = run_pass(&library, library.config().num_quant_threads);
//! assert!(summary.updated_lengths);
//! # Ok(())
//! # }
//! ```

pub mod cluster_forest;
pub mod config;
pub mod data_structs;
pub mod eqclass;
pub mod error;
pub mod exports;
pub mod io;
pub mod library;
pub mod models;
pub mod prelude;
pub mod quant;
pub mod utils;

pub use library::AlignmentLibrary;
