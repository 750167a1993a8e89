//! The iterative polishing search.
//!
//! Each round scores the candidate set against every active evaluator,
//! greedily selects the non-overlapping best mutations, applies them
//! atomically across all evaluators and restricts the next round's
//! candidates to the neighborhood of what changed. The search terminates
//! when no candidate improves the aggregate likelihood (convergence) or
//! after a bounded number of iterations.
//!
//! Evaluators can fail numerically at any point during scoring; the set of
//! valid evaluators only ever shrinks, so a failed pass is discarded
//! wholesale and restarted rather than patched (partial scores would mix
//! likelihoods over different evaluator sets).
//!
//! Template trajectories can cycle when selected mutations interact; a set
//! of visited template hashes detects this and a best-singleton fallback
//! breaks the cycle.

use std::collections::HashSet;
use std::hash::Hasher;

use crate::candidates::{
    all_repeat_mutations, all_site_mutations, nearby_mutations, DIPLOID_SENTINEL,
};
use crate::diploid::{test_diploid_site, DiploidSite, MutationTracker};
use crate::errors::{FgpolishError, Result};
use crate::integrator::Integrator;
use crate::mutation::{apply_mutations, Mutation, ScoredMutation};

/// Configuration for [`polish`].
#[derive(Debug, Clone, Copy)]
pub struct PolishConfig {
    /// Upper bound on polishing rounds; the result reports `converged =
    /// false` when it is reached.
    pub max_iterations: usize,
    /// Minimum separation between mutations applied in the same round; must
    /// be at least 1.
    pub mutation_separation: usize,
    /// Radius of the candidate window re-opened around each applied edit.
    pub mutation_neighborhood: usize,
    /// Enables the two-allele test and ambiguity-coded calls.
    pub diploid: bool,
}

impl Default for PolishConfig {
    fn default() -> Self {
        Self { max_iterations: 40, mutation_separation: 10, mutation_neighborhood: 20, diploid: false }
    }
}

/// Configuration for [`polish_repeats`].
#[derive(Debug, Clone, Copy)]
pub struct RepeatConfig {
    /// Largest tandem-repeat unit size considered; below 2 nothing is
    /// emitted.
    pub max_repeat_size: usize,
    /// Minimum number of adjacent copies for a run to be considered.
    pub min_element_count: usize,
    /// Upper bound on repeat-polishing rounds.
    pub max_iterations: usize,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self { max_repeat_size: 3, min_element_count: 3, max_iterations: 9 }
    }
}

/// Outcome of a polishing run.
#[derive(Debug, Clone, Default)]
pub struct PolishResult {
    /// True when the search ran out of improving mutations (as opposed to
    /// hitting the iteration cap).
    pub converged: bool,
    /// Number of candidate mutations scored, excluding passes discarded by
    /// evaluator invalidation.
    pub mutations_tested: usize,
    /// Number of mutations committed to the template.
    pub mutations_applied: usize,
    /// Per-round maximum alpha-matrix population ratio.
    pub max_alpha_populated: Vec<f32>,
    /// Per-round maximum beta-matrix population ratio.
    pub max_beta_populated: Vec<f32>,
    /// Per-round maximum flip-flop count.
    pub max_num_flip_flops: Vec<u32>,
    /// Accepted diploid sites mapped to original template coordinates;
    /// populated only for converged diploid runs.
    pub diploid_sites: Vec<DiploidSite>,
}

/// Stable 64-bit hash of a template, used for trajectory cycle detection.
fn hash_template(tpl: &[u8]) -> u64 {
    let mut hasher = ahash::AHasher::default();
    hasher.write(tpl);
    hasher.finish()
}

/// Greedily selects the best-scoring mutations subject to a separation
/// constraint.
///
/// Repeatedly takes the highest-scoring mutation, then drops every remaining
/// mutation whose `[start, end]` interval touches the picked window padded by
/// `separation` on both sides, until the pool is empty. The result is in pick
/// order (descending score) and its windows are pairwise non-overlapping.
///
/// # Errors
///
/// `separation == 0` is rejected with
/// [`FgpolishError::InvalidParameter`]; whether zero should mean "no
/// suppression" is ambiguous, so the stricter behavior is kept.
pub fn best_mutations(
    scored: &mut Vec<ScoredMutation>,
    separation: usize,
) -> Result<Vec<ScoredMutation>> {
    if separation == 0 {
        return Err(FgpolishError::InvalidParameter {
            parameter: "separation".to_string(),
            reason: "nonzero separation required".to_string(),
        });
    }

    let mut result = Vec::new();

    while !scored.is_empty() {
        let mut best_idx = 0;
        for (i, sm) in scored.iter().enumerate() {
            if sm.score > scored[best_idx].score {
                best_idx = i;
            }
        }
        let best = scored[best_idx].clone();

        let win_start = best.mutation.start().saturating_sub(separation);
        let win_end = best.mutation.end() + separation;
        scored.retain(|sm| !(win_start <= sm.mutation.end() && sm.mutation.start() < win_end));

        result.push(best);
    }

    Ok(result)
}

/// One full scoring pass over the candidate set.
///
/// Returns the improving candidates with their scores plus the number of
/// candidates tested. Any `InvalidEvaluator` failure aborts the pass; the
/// caller restarts it because the evaluator set changed.
fn score_candidates(
    ai: &mut Integrator,
    muts: &[Mutation],
    diploid: bool,
) -> Result<(Vec<ScoredMutation>, usize)> {
    let ll0 = ai.ll();
    let mut scored = Vec::new();
    let mut tested = 0usize;

    for m in muts {
        tested += 1;

        if diploid && !m.is_deletion() {
            if m.bases() == [DIPLOID_SENTINEL] {
                // the sentinel stands for "run the statistical test here"
                if let Some(sm) = test_diploid_site(ai, m)? {
                    debug_assert!(
                        !sm.mutation.bases().contains(&DIPLOID_SENTINEL),
                        "sentinel must not survive the diploid test"
                    );
                    scored.push(sm);
                }
            } else {
                // the sentinel never reappears once replaced
                debug_assert!(!m.bases().contains(&DIPLOID_SENTINEL));
                let ll = ai.ll_of(m)?;
                if ll > ll0 {
                    scored.push(m.with_score(ll));
                }
            }
        } else {
            let ll = ai.ll_of(m)?;
            if ll > ll0 {
                scored.push(m.with_score(ll));
            }
        }
    }

    Ok((scored, tested))
}

/// Runs a scoring pass until one completes without evaluator invalidation.
fn score_until_stable(
    ai: &mut Integrator,
    muts: &[Mutation],
    diploid: bool,
) -> Result<(Vec<ScoredMutation>, usize)> {
    loop {
        match score_candidates(ai, muts, diploid) {
            Ok(outcome) => return Ok(outcome),
            Err(e @ FgpolishError::InvalidEvaluator { .. }) => {
                log::info!("{e}; restarting scoring pass against the reduced evaluator set");
            }
            Err(e) => return Err(e),
        }
    }
}

fn snapshot_diagnostics(ai: &Integrator, result: &mut PolishResult) {
    result.max_alpha_populated.push(ai.max_alpha_populated());
    result.max_beta_populated.push(ai.max_beta_populated());
    result.max_num_flip_flops.push(ai.max_num_flip_flops());
}

/// Iteratively polishes the integrator's template to a local likelihood
/// optimum.
///
/// See the module docs for the search structure. On convergence in diploid
/// mode, [`PolishResult::diploid_sites`] reports the accepted two-allele
/// sites in original template coordinates.
pub fn polish(ai: &mut Integrator, cfg: &PolishConfig) -> Result<PolishResult> {
    let mut muts = all_site_mutations(ai, cfg.diploid);
    let mut history = HashSet::new();
    history.insert(hash_template(ai.template()));

    let mut result = PolishResult::default();
    let mut tracker = cfg.diploid.then(|| MutationTracker::new(ai.template_length()));

    for _ in 0..cfg.max_iterations {
        let (mut scored, tested) = score_until_stable(ai, &muts, cfg.diploid)?;
        result.mutations_tested += tested;

        // take the best mutations in separation windows
        let selection = best_mutations(&mut scored, cfg.mutation_separation)?;

        if selection.is_empty() {
            result.converged = true;
            if let Some(tracker) = &tracker {
                result.diploid_sites = tracker.mapping_to_original_tpl();
            }
            return Ok(result);
        }

        let mut site_sorted: Vec<Mutation> =
            selection.iter().map(|sm| sm.mutation.clone()).collect();
        let new_tpl_hash = hash_template(&apply_mutations(ai.template(), &mut site_sorted));

        if history.contains(&new_tpl_hash) {
            // The template is mutating back to an earlier version: selected
            // mutations X + Y made removing X + Y beneficial. Applying only
            // the single best mutation removes the interaction driving the
            // cycle.
            let best = &selection[0];
            log::debug!("cycle detected; applying only {}", best.mutation);

            if let Some(tracker) = &mut tracker {
                tracker.add_sorted_mutations(std::slice::from_ref(best));
            }
            ai.apply_mutation(&best.mutation);
            result.mutations_applied += 1;
            history.insert(hash_template(ai.template()));

            snapshot_diagnostics(ai, &mut result);

            // candidates for the next round
            let mut applied = vec![best.mutation.clone()];
            let mut centers: Vec<Mutation> =
                selection.iter().map(|sm| sm.mutation.clone()).collect();
            muts = nearby_mutations(
                &mut applied,
                &mut centers,
                ai,
                cfg.mutation_neighborhood,
                cfg.diploid,
            );
        } else {
            if let Some(tracker) = &mut tracker {
                let mut sorted_selection = selection.clone();
                sorted_selection.sort_by(|a, b| a.mutation.site_cmp(&b.mutation));
                tracker.add_sorted_mutations(&sorted_selection);
            }
            ai.apply_mutations(&mut site_sorted);
            result.mutations_applied += site_sorted.len();
            history.insert(new_tpl_hash);

            snapshot_diagnostics(ai, &mut result);

            // candidates for the next round
            let mut applied = site_sorted.clone();
            let mut centers = site_sorted;
            muts = nearby_mutations(
                &mut applied,
                &mut centers,
                ai,
                cfg.mutation_neighborhood,
                cfg.diploid,
            );
        }
    }

    Ok(result)
}

/// Scans the repeat candidates for the single best improving mutation.
fn best_repeat_mutation(
    ai: &mut Integrator,
    muts: &[Mutation],
) -> Result<(Option<ScoredMutation>, usize)> {
    let ll0 = ai.ll();
    let mut best: Option<ScoredMutation> = None;
    let mut tested = 0usize;

    for m in muts {
        tested += 1;
        let ll = ai.ll_of(m)?;
        if ll > ll0 && best.as_ref().map_or(true, |b| b.score < ll) {
            best = Some(m.with_score(ll));
        }
    }

    Ok((best, tested))
}

/// Polishes tandem-repeat expansions/contractions, applying the single
/// globally best improving mutation per round.
pub fn polish_repeats(ai: &mut Integrator, cfg: &RepeatConfig) -> Result<PolishResult> {
    let mut result = PolishResult::default();

    for _ in 0..cfg.max_iterations {
        let muts = all_repeat_mutations(ai, cfg);

        let (best, tested) = loop {
            match best_repeat_mutation(ai, &muts) {
                Ok(outcome) => break outcome,
                Err(e @ FgpolishError::InvalidEvaluator { .. }) => {
                    log::info!("{e}; restarting repeat scan against the reduced evaluator set");
                }
                Err(e) => return Err(e),
            }
        };
        result.mutations_tested += tested;

        let Some(best) = best else {
            result.converged = true;
            break;
        };

        let mut to_apply = [best.mutation.clone()];
        ai.apply_mutations(&mut to_apply);
        result.mutations_applied += 1;
        snapshot_diagnostics(ai, &mut result);
    }

    Ok(result)
}
