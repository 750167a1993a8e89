//! The integrator: a template and the bag of evaluators scoring it.
//!
//! The [`Integrator`] owns the forward template, its reverse complement and
//! one [`Evaluator`] per read. It broadcasts committed mutations to every
//! evaluator (reverse-complemented for reverse-strand reads), aggregates
//! per-read log-likelihoods over the currently valid set, and exposes the
//! diagnostics the polish loop snapshots each round.
//!
//! Likelihood queries against a hypothetical mutation ([`Integrator::ll_of`],
//! [`Integrator::lls_of`]) propagate [`FgpolishError::InvalidEvaluator`]
//! whenever a read fails numerically; the offending evaluator has already
//! been invalidated when the error surfaces, so the caller must re-score all
//! mutations of interest against the reduced evaluator set.

use crate::dna::reverse_complement;
use crate::errors::{FgpolishError, Result};
use crate::evaluator::{Evaluator, EvaluatorState, MappedRead, ReadHmm, Strand};
use crate::mutation::{apply_mutations, Mutation, MutationType};

/// User-provided filtering configuration for evaluators.
#[derive(Debug, Clone, Copy)]
pub struct IntegratorConfig {
    /// Minimum acceptable read z-score; finite z-scores below this demote
    /// the evaluator to `Disabled` on [`Integrator::add_read`].
    pub min_z_score: f64,
    /// Score difference passed through to evaluator construction (bounds the
    /// banded HMM recursion); the integrator itself does not interpret it.
    pub score_diff: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self { min_z_score: -3.4, score_diff: 25.0 }
    }
}

/// Holds a collection of evaluators whose reads belong to the same genomic
/// region or amplicon, plus the template they are scored against.
pub struct Integrator {
    cfg: IntegratorConfig,
    evals: Vec<Evaluator>,
    fwd_tpl: Vec<u8>,
    rev_tpl: Vec<u8>,
}

impl Integrator {
    /// Creates an integrator over the draft template.
    #[must_use]
    pub fn new(tpl: impl Into<Vec<u8>>, cfg: IntegratorConfig) -> Self {
        let fwd_tpl = tpl.into();
        let rev_tpl = reverse_complement(&fwd_tpl);
        Self { cfg, evals: Vec::new(), fwd_tpl, rev_tpl }
    }

    /// The configuration this integrator was created with.
    #[must_use]
    pub fn config(&self) -> &IntegratorConfig {
        &self.cfg
    }

    /// Current template length.
    #[must_use]
    pub fn template_length(&self) -> usize {
        self.fwd_tpl.len()
    }

    /// Base `i` of the forward template.
    #[must_use]
    pub fn base_at(&self, i: usize) -> u8 {
        self.fwd_tpl[i]
    }

    /// The forward template.
    #[must_use]
    pub fn template(&self) -> &[u8] {
        &self.fwd_tpl
    }

    /// The forward template as an owned string.
    #[must_use]
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.fwd_tpl).into_owned()
    }

    /// Encapsulates `read` in a new evaluator and stores it.
    ///
    /// `build` receives the template view matching the read's strand (the
    /// reverse complement for reverse-strand reads) and constructs the
    /// external HMM. A build failure yields an evaluator in the
    /// `Invalid` state; a successful build whose finite z-score falls below
    /// [`IntegratorConfig::min_z_score`] is demoted to `Disabled`. The
    /// resulting initial state is returned.
    pub fn add_read<F>(&mut self, read: MappedRead, build: F) -> EvaluatorState
    where
        F: FnOnce(&[u8], &MappedRead) -> Result<Box<dyn ReadHmm>>,
    {
        let tpl = match read.strand {
            Strand::Forward => &self.fwd_tpl,
            Strand::Reverse => &self.rev_tpl,
        };
        let eval = match build(tpl, &read) {
            Ok(hmm) => {
                let mut eval = Evaluator::new(read.name, read.strand, hmm);
                let z = eval.z_score();
                if z.is_finite() && z < self.cfg.min_z_score {
                    eval.disable();
                }
                eval
            }
            Err(e) => Evaluator::failed(read.name, read.strand, e.to_string()),
        };
        let state = eval.state().clone();
        self.evals.push(eval);
        state
    }

    /// Aggregate log-likelihood over the currently valid evaluators.
    ///
    /// A read that fails numerically here is invalidated and omitted; the
    /// aggregate is always defined.
    pub fn ll(&mut self) -> f64 {
        self.evals.iter_mut().filter_map(Evaluator::ll).sum()
    }

    /// Aggregate log-likelihood under a hypothetical mutation.
    ///
    /// On [`FgpolishError::InvalidEvaluator`] the offending evaluator has
    /// been invalidated before the error reaches the caller; the caller must
    /// recompute the LLs for all mutations of interest, as the number of
    /// active evaluators changed.
    pub fn ll_of(&mut self, mutation: &Mutation) -> Result<f64> {
        let rc = self.reverse_complement_mutation(mutation);
        let mut sum = 0.0;
        for eval in &mut self.evals {
            let oriented = match eval.strand() {
                Strand::Forward => mutation,
                Strand::Reverse => &rc,
            };
            if let Some(ll) = eval.ll_of(oriented)? {
                sum += ll;
            }
        }
        Ok(sum)
    }

    /// Per-evaluator log-likelihoods under a hypothetical mutation; invalid
    /// evaluators are omitted. Same invalidation semantics as
    /// [`Integrator::ll_of`].
    pub fn lls_of(&mut self, mutation: &Mutation) -> Result<Vec<f64>> {
        let rc = self.reverse_complement_mutation(mutation);
        let mut lls = Vec::with_capacity(self.evals.len());
        for eval in &mut self.evals {
            let oriented = match eval.strand() {
                Strand::Forward => mutation,
                Strand::Reverse => &rc,
            };
            if let Some(ll) = eval.ll_of(oriented)? {
                lls.push(ll);
            }
        }
        Ok(lls)
    }

    /// Per-evaluator log-likelihood for every evaluator, with
    /// `f64::NEG_INFINITY` in place of invalid or disabled ones. Debugging
    /// aid; production code aggregates over the valid set instead.
    pub fn lls(&mut self) -> Vec<f64> {
        self.evals.iter_mut().map(|e| e.ll().unwrap_or(f64::NEG_INFINITY)).collect()
    }

    /// Commits one mutation to the template and broadcasts it.
    pub fn apply_mutation(&mut self, mutation: &Mutation) {
        let mut muts = [mutation.clone()];
        self.apply_mutations(&mut muts);
    }

    /// Commits a set of mutations to the template and broadcasts them.
    ///
    /// The slice is site-sorted in place. Forward-strand evaluators receive
    /// the mutations as-is; reverse-strand evaluators receive the
    /// reverse-complemented set (computed once against the pre-apply
    /// template length). Afterwards the forward and reverse templates and
    /// every evaluator's internal template are in lockstep; evaluators that
    /// fail during the broadcast transition to `Invalid` rather than holding
    /// a stale template.
    pub fn apply_mutations(&mut self, mutations: &mut [Mutation]) {
        if mutations.is_empty() {
            return;
        }
        mutations.sort_by(Mutation::site_cmp);

        let mut rc_muts: Vec<Mutation> =
            mutations.iter().map(|m| self.reverse_complement_mutation(m)).collect();
        rc_muts.sort_by(Mutation::site_cmp);

        self.fwd_tpl = apply_mutations(&self.fwd_tpl, mutations);
        self.rev_tpl = reverse_complement(&self.fwd_tpl);

        for eval in &mut self.evals {
            match eval.strand() {
                Strand::Forward => eval.apply_mutations(mutations),
                Strand::Reverse => eval.apply_mutations(&rc_muts),
            }
        }
    }

    /// Best-mutation improvement histogram for a locus and mutation kind.
    ///
    /// For each base in `{A, C, G, T}`, counts the valid evaluators for
    /// which inserting/substituting that base at `start` yields the largest
    /// per-read LL of the four; an evaluator is only counted when its best
    /// LL is at least its current LL, so a read whose likelihood drops for
    /// every base contributes nothing. Ties go to the lexicographically
    /// smallest base. Evaluators that fail numerically during the scan are
    /// invalidated and skipped. The result is sorted descending by count
    /// (ascending by base on equal counts).
    pub fn best_mutation_histogram(
        &mut self,
        start: usize,
        kind: MutationType,
    ) -> Result<[(u8, u32); 4]> {
        const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

        if kind == MutationType::Deletion {
            return Err(FgpolishError::InvalidParameter {
                parameter: "kind".to_string(),
                reason: "histogram requires an insertion or substitution".to_string(),
            });
        }

        let muts: Vec<Mutation> = BASES
            .iter()
            .map(|&b| match kind {
                MutationType::Insertion => Mutation::insertion(start, vec![b]),
                MutationType::Substitution => Mutation::substitution(start, vec![b]),
                MutationType::Deletion => unreachable!("rejected above"),
            })
            .collect();
        let rc_muts: Vec<Mutation> =
            muts.iter().map(|m| self.reverse_complement_mutation(m)).collect();

        let mut counts = [0u32; 4];
        'evals: for eval in &mut self.evals {
            let Some(ll0) = eval.ll() else { continue };

            let mut best: Option<(usize, f64)> = None;
            for (i, (fwd, rc)) in muts.iter().zip(&rc_muts).enumerate() {
                let oriented = match eval.strand() {
                    Strand::Forward => fwd,
                    Strand::Reverse => rc,
                };
                let ll = match eval.ll_of(oriented) {
                    Ok(Some(ll)) => ll,
                    Ok(None) => continue 'evals,
                    Err(e) => {
                        log::debug!("histogram scan dropped an evaluator: {e}");
                        continue 'evals;
                    }
                };
                if best.is_none() || best.is_some_and(|(_, b)| ll > b) {
                    best = Some((i, ll));
                }
            }

            if let Some((i, best_ll)) = best {
                if best_ll >= ll0 {
                    counts[i] += 1;
                }
            }
        }

        let mut hist = [
            (BASES[0], counts[0]),
            (BASES[1], counts[1]),
            (BASES[2], counts[2]),
            (BASES[3], counts[3]),
        ];
        hist.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(hist)
    }

    /// Masks template windows of width `1 + 2 * radius` whose empirical
    /// error rate exceeds `max_err_rate`, for each valid evaluator.
    pub fn mask_intervals(&mut self, radius: usize, max_err_rate: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&max_err_rate) {
            return Err(FgpolishError::InvalidProbability { value: max_err_rate });
        }
        for eval in &mut self.evals {
            eval.mask_intervals(radius, max_err_rate);
        }
        Ok(())
    }

    /// Mean z-score over all evaluators.
    #[must_use]
    pub fn avg_z_score(&self) -> f64 {
        if self.evals.is_empty() {
            return f64::NAN;
        }
        self.evals.iter().map(Evaluator::z_score).sum::<f64>() / self.evals.len() as f64
    }

    /// Per-evaluator z-scores.
    #[must_use]
    pub fn z_scores(&self) -> Vec<f64> {
        self.evals.iter().map(Evaluator::z_score).collect()
    }

    /// Per-evaluator expected likelihood mean/sd pairs.
    #[must_use]
    pub fn normal_parameters(&self) -> Vec<(f64, f64)> {
        self.evals.iter().map(Evaluator::normal_parameters).collect()
    }

    /// Per-evaluator flip-flop counts.
    #[must_use]
    pub fn num_flip_flops(&self) -> Vec<u32> {
        self.evals.iter().map(Evaluator::num_flip_flops).collect()
    }

    /// Maximum flip-flop count over all evaluators (zero when empty).
    #[must_use]
    pub fn max_num_flip_flops(&self) -> u32 {
        self.evals.iter().map(Evaluator::num_flip_flops).max().unwrap_or(0)
    }

    /// Maximum alpha-matrix population ratio over all evaluators.
    #[must_use]
    pub fn max_alpha_populated(&self) -> f32 {
        self.evals.iter().map(Evaluator::alpha_populated).fold(0.0, f32::max)
    }

    /// Maximum beta-matrix population ratio over all evaluators.
    #[must_use]
    pub fn max_beta_populated(&self) -> f32 {
        self.evals.iter().map(Evaluator::beta_populated).fold(0.0, f32::max)
    }

    /// Per-evaluator lifecycle states.
    #[must_use]
    pub fn states(&self) -> Vec<EvaluatorState> {
        self.evals.iter().map(|e| e.state().clone()).collect()
    }

    /// Per-evaluator strands.
    #[must_use]
    pub fn strand_types(&self) -> Vec<Strand> {
        self.evals.iter().map(Evaluator::strand).collect()
    }

    /// Per-evaluator read names.
    #[must_use]
    pub fn read_names(&self) -> Vec<String> {
        self.evals.iter().map(|e| e.read_name().to_string()).collect()
    }

    /// Read-only access to evaluator `idx`.
    #[must_use]
    pub fn evaluator(&self, idx: usize) -> &Evaluator {
        &self.evals[idx]
    }

    /// Number of evaluators (in any state).
    #[must_use]
    pub fn num_evaluators(&self) -> usize {
        self.evals.len()
    }

    /// Re-expresses a forward-template mutation against the reverse
    /// complement template: payload bases are complemented and reversed, and
    /// the start reflects to `template_length - end`.
    fn reverse_complement_mutation(&self, mutation: &Mutation) -> Mutation {
        let start = self.fwd_tpl.len() - mutation.end();
        match mutation.kind() {
            MutationType::Deletion => Mutation::deletion(start, mutation.length()),
            MutationType::Insertion => {
                Mutation::insertion(start, reverse_complement(mutation.bases()))
            }
            MutationType::Substitution => {
                Mutation::substitution(start, reverse_complement(mutation.bases()))
            }
        }
    }
}

impl std::fmt::Debug for Integrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integrator")
            .field("template_length", &self.fwd_tpl.len())
            .field("num_evaluators", &self.evals.len())
            .finish_non_exhaustive()
    }
}
