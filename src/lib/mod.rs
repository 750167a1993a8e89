#![deny(unsafe_code)]
// Clippy lint configuration for CI
// These lints are allowed because:
// - cast_*: Scientific/bioinformatics code intentionally casts between numeric types
// - missing_*_doc: Documentation improvements tracked separately
// - module_name_repetitions: Re-exported type names read better fully qualified
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

//! # fgpolish - Consensus Polishing Core
//!
//! This library implements the polishing core of a DNA sequencing consensus
//! engine: given a draft template and a collection of noisy reads aligned to
//! it, it iteratively mutates the template to maximize the joint likelihood
//! of the reads under per-read hidden Markov models, and derives calibrated
//! per-position quality values from the final likelihood landscape.
//!
//! ## Overview
//!
//! The library is organized into several key modules:
//!
//! ### Core Functionality
//!
//! - **[`mutation`]** - The algebra of template edits: application,
//!   translation through windows, site ordering
//! - **[`integrator`]** - Owns the template and the per-read evaluators;
//!   broadcasts mutations and aggregates likelihoods
//! - **[`candidates`]** - Candidate enumeration with homopolymer
//!   canonicalization, tandem-repeat edits and neighborhood restriction
//! - **[`polish`]** - The iterative search: score, select non-overlapping
//!   best mutations, apply, detect cycles
//!
//! ### Extensions
//!
//! - **[`diploid`]** - Binomial two-allele testing and mapping of diploid
//!   sites back to original coordinates
//! - **[`qv`]** - Per-position quality values split by edit class
//!
//! ### Utilities
//!
//! - **[`evaluator`]** - The capability contract for external per-read HMMs
//!   and the state-tracking façade around them
//! - **[`dna`]** - Complementation and IUPAC ambiguity codes
//! - **[`errors`]** - Typed errors and the crate-wide `Result`
//!
//! ## The evaluator contract
//!
//! The HMM itself is external: callers implement [`evaluator::ReadHmm`] per
//! read and hand it to [`integrator::Integrator::add_read`]. Likelihood
//! computations may fail numerically at any time; the core guarantees that a
//! failing read is invalidated before the failure is observable, and its
//! search loops restart scoring passes until one completes against a stable
//! evaluator set. See the module docs of [`polish`] for details.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fgpolish_lib::evaluator::{MappedRead, Strand};
//! use fgpolish_lib::integrator::{Integrator, IntegratorConfig};
//! use fgpolish_lib::polish::{polish, PolishConfig};
//! use fgpolish_lib::qv::consensus_qvs;
//!
//! # fn hmm_for(tpl: &[u8], read: &MappedRead) -> fgpolish_lib::errors::Result<Box<dyn fgpolish_lib::evaluator::ReadHmm>> { unimplemented!() }
//! # fn main() -> fgpolish_lib::errors::Result<()> {
//! let mut ai = Integrator::new(b"ACGTACGT".to_vec(), IntegratorConfig::default());
//! let read = MappedRead::new("read1", b"ACGTACGT".to_vec(), Strand::Forward);
//! ai.add_read(read, |tpl, read| hmm_for(tpl, read));
//!
//! let result = polish(&mut ai, &PolishConfig::default())?;
//! assert!(result.converged);
//!
//! let qvs = consensus_qvs(&mut ai)?;
//! assert_eq!(qvs.qualities.len(), ai.template_length());
//! # Ok(())
//! # }
//! ```

pub mod candidates;
pub mod diploid;
pub mod dna;
pub mod errors;
pub mod evaluator;
pub mod integrator;
pub mod mutation;
pub mod polish;
pub mod qv;

// Re-export the types most callers touch
pub use errors::{FgpolishError, Result};
pub use evaluator::{Evaluator, EvaluatorState, MappedRead, ReadHmm, Strand};
pub use integrator::{Integrator, IntegratorConfig};
pub use mutation::{apply_mutations, Mutation, MutationType, ScoredMutation};
pub use polish::{polish, polish_repeats, PolishConfig, PolishResult, RepeatConfig};
pub use qv::{consensus_qualities, consensus_qvs, QualityValues};
