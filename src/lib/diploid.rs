//! Diploid (two-allele) site testing and coordinate tracking.
//!
//! When polishing in diploid mode, the candidate stream carries sentinel
//! payloads; for each one the integrator's best-mutation histogram is put
//! through a filter cascade ending in a binomial significance test. Accepted
//! sites become mutations carrying a IUPAC ambiguity code and the binomial
//! p-value.
//!
//! The model is deliberately approximate: the binomial test uses a single
//! average error rate rather than the exact per-site marginal of the HMM,
//! and read deviations are treated as identically distributed even though
//! each evaluator has its own error profile (the exact model would be a
//! Poisson binomial, which has no tractable tail). The constants below are
//! part of the contract so that outputs match across implementations.
//!
//! A [`MutationTracker`] accumulates the edits committed over polishing
//! rounds so that accepted diploid sites can be reported in the coordinates
//! of the original input template.

use statrs::distribution::{Binomial, DiscreteCDF};

use crate::dna::{encode_iupac_pair, is_ambiguous_base};
use crate::errors::Result;
use crate::integrator::Integrator;
use crate::mutation::{Mutation, MutationType, ScoredMutation};

/// Minimum coverage to even consider doing diploid polishing.
pub const MIN_COVERAGE: u32 = 10;

/// The major and minor allele together have to account for at least this
/// fraction of all counted evaluators.
pub const MAJORITY_FRACTION: f64 = 0.75;

/// Average error rate; `1 - ERROR_RATE` is the probability of recovering the
/// major allele at a haploid site.
pub const ERROR_RATE: f64 = 0.08;

/// Binomial significance level for rejecting the null hypothesis of a purely
/// haploid site. 0.5% keeps discoveries strong.
pub const SIGNIFICANCE_LEVEL: f64 = 0.005;

/// Even when significant, the minor allele has to rise above this fraction
/// of the coverage to be realistically considered.
pub const MIN_FRACTION_MINOR: f64 = 0.25;

/// Runs the two-allele test for a sentinel candidate at `mutation`'s site.
///
/// Returns `Ok(None)` when any filter rejects the site, or the
/// ambiguity-coded replacement mutation scored against the current evaluator
/// set. Evaluator invalidation while scoring the replacement propagates, so
/// the caller's restart logic sees it.
pub(crate) fn test_diploid_site(
    ai: &mut Integrator,
    mutation: &Mutation,
) -> Result<Option<ScoredMutation>> {
    debug_assert!(!mutation.is_deletion(), "diploid test is for insertions and substitutions");

    let hist = ai.best_mutation_histogram(mutation.start(), mutation.kind())?;

    let coverage: u32 = hist.iter().map(|&(_, count)| count).sum();

    // 1. enough absolute coverage to contemplate a diploid call?
    if coverage < MIN_COVERAGE {
        return Ok(None);
    }

    // 2. do the two most frequent alleles cover enough together?
    if f64::from(hist[0].1 + hist[1].1) < f64::from(coverage) * MAJORITY_FRACTION {
        return Ok(None);
    }

    // 3. binomial test against the haploid null
    let Ok(binomial) = Binomial::new(1.0 - ERROR_RATE, u64::from(coverage)) else {
        return Ok(None);
    };
    let p_value = binomial.cdf(u64::from(hist[0].1));
    if p_value > SIGNIFICANCE_LEVEL {
        return Ok(None);
    }

    // 4. is the minor allele above its minimum frequency?
    if f64::from(hist[1].1) < f64::from(coverage) * MIN_FRACTION_MINOR {
        return Ok(None);
    }

    let ambiguous = match encode_iupac_pair(hist[0].0, hist[1].0) {
        Some(base) => base,
        None => return Ok(None),
    };

    let new_mutation = match mutation.kind() {
        MutationType::Insertion => Mutation::insertion(mutation.start(), vec![ambiguous]),
        MutationType::Substitution => Mutation::substitution(mutation.start(), vec![ambiguous]),
        MutationType::Deletion => return Ok(None),
    };

    let ll = ai.ll_of(&new_mutation)?;
    Ok(Some(new_mutation.with_score(ll).with_p_value(p_value)))
}

/// A diploid site reported in both final and original template coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DiploidSite {
    /// The kind of edit that introduced the ambiguity code.
    pub kind: MutationType,
    /// The IUPAC ambiguity code at the site.
    pub base: u8,
    /// Position in the final polished template.
    pub final_pos: usize,
    /// Position in the original input template. Bases inserted during
    /// polishing map to the next surviving original coordinate (the original
    /// template length if none survives to their right).
    pub original_pos: usize,
    /// Binomial p-value recorded when the site was accepted.
    pub p_value: Option<f64>,
}

#[derive(Debug, Clone)]
struct DiploidAnnotation {
    kind: MutationType,
    base: u8,
    p_value: Option<f64>,
}

/// Provenance of one base of the current template.
#[derive(Debug, Clone)]
struct TrackedBase {
    /// Index in the original template, `None` for bases inserted during
    /// polishing.
    origin: Option<usize>,
    diploid: Option<DiploidAnnotation>,
}

/// Tracks the template trajectory across polishing rounds, keeping one
/// provenance entry per current-template base so that diploid sites can be
/// mapped back to original coordinates at the end.
#[derive(Debug)]
pub struct MutationTracker {
    original_len: usize,
    entries: Vec<TrackedBase>,
}

impl MutationTracker {
    /// Creates a tracker for a template of `original_len` bases.
    #[must_use]
    pub fn new(original_len: usize) -> Self {
        let entries =
            (0..original_len).map(|i| TrackedBase { origin: Some(i), diploid: None }).collect();
        Self { original_len, entries }
    }

    /// Records one round of committed mutations. `muts` must be site-sorted
    /// and expressed against the template as it was before this round.
    pub fn add_sorted_mutations(&mut self, muts: &[ScoredMutation]) {
        for sm in muts.iter().rev() {
            let m = &sm.mutation;
            match m.kind() {
                MutationType::Insertion => {
                    let inserted = m.bases().iter().map(|&base| TrackedBase {
                        origin: None,
                        diploid: is_ambiguous_base(base).then(|| DiploidAnnotation {
                            kind: MutationType::Insertion,
                            base,
                            p_value: sm.p_value,
                        }),
                    });
                    self.entries.splice(m.start()..m.start(), inserted.collect::<Vec<_>>());
                }
                MutationType::Deletion => {
                    self.entries.drain(m.start()..m.end());
                }
                MutationType::Substitution => {
                    for (offset, &base) in m.bases().iter().enumerate() {
                        let entry = &mut self.entries[m.start() + offset];
                        entry.diploid =
                            is_ambiguous_base(base).then(|| DiploidAnnotation {
                                kind: MutationType::Substitution,
                                base,
                                p_value: sm.p_value,
                            });
                    }
                }
            }
        }
    }

    /// Maps every recorded diploid site from final-template coordinates back
    /// to the original input template.
    #[must_use]
    pub fn mapping_to_original_tpl(&self) -> Vec<DiploidSite> {
        let mut sites = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(ann) = &entry.diploid else { continue };
            let original_pos = self.entries[idx..]
                .iter()
                .find_map(|e| e.origin)
                .unwrap_or(self.original_len);
            sites.push(DiploidSite {
                kind: ann.kind,
                base: ann.base,
                final_pos: idx,
                original_pos,
                p_value: ann.p_value,
            });
        }
        sites
    }
}
