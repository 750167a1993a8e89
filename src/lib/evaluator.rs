//! The evaluator façade over external per-read HMMs.
//!
//! The polishing core never computes a likelihood itself: every read is
//! backed by an opaque [`ReadHmm`] implementation supplied by the caller,
//! and the [`Evaluator`] façade wraps it with the state machine the search
//! relies on. The façade — not the implementation — guarantees that a read
//! that fails numerically is transitioned to [`EvaluatorState::Invalid`]
//! *before* the failure propagates, so the caller always observes a
//! monotonically shrinking set of valid evaluators.

use crate::errors::{FgpolishError, Result};
use crate::mutation::Mutation;

/// Strand of a read relative to the forward template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    /// Read aligns to the forward template.
    Forward,
    /// Read aligns to the reverse-complement template.
    Reverse,
}

/// Lifecycle state of an evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluatorState {
    /// Participating in likelihood aggregation.
    Valid,
    /// Dropped after a numerical failure; the reason is kept for diagnostics.
    Invalid(String),
    /// Excluded up front (e.g. z-score below the configured minimum).
    Disabled,
}

impl EvaluatorState {
    /// Returns true when the evaluator participates in aggregation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// A read aligned to the template, the minimal record the integrator needs.
///
/// Loading reads from files and detecting chemistries happen upstream; the
/// polishing core only cares about the name (diagnostics), the called
/// sequence and the strand the read maps to.
#[derive(Debug, Clone)]
pub struct MappedRead {
    /// Read name, surfaced through diagnostics.
    pub name: String,
    /// Called bases, in read orientation.
    pub seq: Vec<u8>,
    /// Strand relative to the forward template.
    pub strand: Strand,
}

impl MappedRead {
    /// Creates a mapped read.
    #[must_use]
    pub fn new(name: impl Into<String>, seq: impl Into<Vec<u8>>, strand: Strand) -> Self {
        Self { name: name.into(), seq: seq.into(), strand }
    }
}

/// The external capability set of a per-read HMM.
///
/// Implementations own their copy of the template (in the read's
/// orientation) and whatever forward/backward state they need. Likelihood
/// calls may fail when the recursion becomes numerically invalid; such
/// failures must be reported as [`FgpolishError::InvalidEvaluator`]. The
/// façade takes care of the state transition, so implementations do not
/// track validity themselves.
pub trait ReadHmm {
    /// Log-likelihood of the read under the current template.
    fn ll(&self) -> Result<f64>;

    /// Log-likelihood of the read under a hypothetical mutation of the
    /// current template. The internal template is left unchanged.
    fn ll_of(&self, mutation: &Mutation) -> Result<f64>;

    /// Commits mutations (site-sorted, non-overlapping) to the internal
    /// template.
    fn apply_mutations(&mut self, mutations: &[Mutation]) -> Result<()>;

    /// Number of alpha/beta re-estimation oscillations observed so far.
    fn num_flip_flops(&self) -> u32;

    /// Fraction of populated cells in the alpha matrix, in `[0, 1]`.
    fn alpha_populated(&self) -> f32;

    /// Fraction of populated cells in the beta matrix, in `[0, 1]`.
    fn beta_populated(&self) -> f32;

    /// Z-score of the read likelihood against the model's expectation.
    /// Implementations without z-score support return `f64::NAN`.
    fn z_score(&self) -> f64;

    /// Expected likelihood mean and standard deviation for this read.
    fn normal_parameters(&self) -> (f64, f64);

    /// Masks template windows of width `1 + 2 * radius` whose empirical
    /// error rate exceeds `max_err_rate`.
    fn mask_intervals(&mut self, radius: usize, max_err_rate: f64);
}

/// Wraps a [`ReadHmm`] with the state machine the search depends on.
pub struct Evaluator {
    hmm: Option<Box<dyn ReadHmm>>,
    state: EvaluatorState,
    read_name: String,
    strand: Strand,
}

impl Evaluator {
    /// Creates a valid evaluator over `hmm`.
    #[must_use]
    pub fn new(read_name: impl Into<String>, strand: Strand, hmm: Box<dyn ReadHmm>) -> Self {
        Self { hmm: Some(hmm), state: EvaluatorState::Valid, read_name: read_name.into(), strand }
    }

    /// Creates an evaluator that failed construction; it never participates
    /// in aggregation but stays visible in diagnostics.
    #[must_use]
    pub fn failed(read_name: impl Into<String>, strand: Strand, reason: impl Into<String>) -> Self {
        Self {
            hmm: None,
            state: EvaluatorState::Invalid(reason.into()),
            read_name: read_name.into(),
            strand,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> &EvaluatorState {
        &self.state
    }

    /// Returns true when the evaluator participates in aggregation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    /// Strand of the underlying read.
    #[must_use]
    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// Name of the underlying read.
    #[must_use]
    pub fn read_name(&self) -> &str {
        &self.read_name
    }

    /// Permanently excludes this evaluator from aggregation.
    pub fn disable(&mut self) {
        self.state = EvaluatorState::Disabled;
        self.hmm = None;
    }

    /// Transitions to `Invalid`, releasing the underlying HMM.
    pub fn invalidate(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        log::debug!("evaluator for read '{}' invalidated: {reason}", self.read_name);
        self.state = EvaluatorState::Invalid(reason);
        self.hmm = None;
    }

    /// Log-likelihood under the current template, or `None` when the
    /// evaluator is not valid. A numerical failure invalidates the
    /// evaluator and yields `None`.
    pub fn ll(&mut self) -> Option<f64> {
        let hmm = match (&self.state, &self.hmm) {
            (EvaluatorState::Valid, Some(hmm)) => hmm,
            _ => return None,
        };
        match hmm.ll() {
            Ok(ll) => Some(ll),
            Err(e) => {
                self.invalidate(e.to_string());
                None
            }
        }
    }

    /// Log-likelihood under a hypothetical mutation.
    ///
    /// Returns `Ok(None)` when the evaluator is not valid (the read is
    /// simply omitted from aggregation). On numerical failure the evaluator
    /// is invalidated first, then the error propagates so callers can
    /// restart their scoring pass against the reduced set.
    pub fn ll_of(&mut self, mutation: &Mutation) -> Result<Option<f64>> {
        let hmm = match (&self.state, &self.hmm) {
            (EvaluatorState::Valid, Some(hmm)) => hmm,
            _ => return Ok(None),
        };
        match hmm.ll_of(mutation) {
            Ok(ll) => Ok(Some(ll)),
            Err(e) => {
                let reason = format!("read '{}': {e}", self.read_name);
                self.invalidate(e.to_string());
                Err(FgpolishError::InvalidEvaluator { reason })
            }
        }
    }

    /// Commits mutations to the internal template. A failure invalidates
    /// the evaluator instead of propagating: the broadcast either completes
    /// or leaves this evaluator invalid, never holding a stale template.
    pub fn apply_mutations(&mut self, mutations: &[Mutation]) {
        let hmm = match (&self.state, &mut self.hmm) {
            (EvaluatorState::Valid, Some(hmm)) => hmm,
            _ => return,
        };
        if let Err(e) = hmm.apply_mutations(mutations) {
            self.invalidate(e.to_string());
        }
    }

    /// Forwards interval masking to a valid evaluator.
    pub fn mask_intervals(&mut self, radius: usize, max_err_rate: f64) {
        if let (EvaluatorState::Valid, Some(hmm)) = (&self.state, &mut self.hmm) {
            hmm.mask_intervals(radius, max_err_rate);
        }
    }

    /// Flip-flop count, zero when the HMM has been released.
    #[must_use]
    pub fn num_flip_flops(&self) -> u32 {
        self.hmm.as_ref().map_or(0, |hmm| hmm.num_flip_flops())
    }

    /// Alpha-matrix population ratio, zero when the HMM has been released.
    #[must_use]
    pub fn alpha_populated(&self) -> f32 {
        self.hmm.as_ref().map_or(0.0, |hmm| hmm.alpha_populated())
    }

    /// Beta-matrix population ratio, zero when the HMM has been released.
    #[must_use]
    pub fn beta_populated(&self) -> f32 {
        self.hmm.as_ref().map_or(0.0, |hmm| hmm.beta_populated())
    }

    /// Z-score, NaN when the HMM has been released.
    #[must_use]
    pub fn z_score(&self) -> f64 {
        self.hmm.as_ref().map_or(f64::NAN, |hmm| hmm.z_score())
    }

    /// Expected likelihood mean/sd, NaN pair when the HMM has been released.
    #[must_use]
    pub fn normal_parameters(&self) -> (f64, f64) {
        self.hmm.as_ref().map_or((f64::NAN, f64::NAN), |hmm| hmm.normal_parameters())
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("read_name", &self.read_name)
            .field("strand", &self.strand)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
