//! Per-position quality values from the marginal mutation landscape.
//!
//! For each template position, every site mutation touching it is scored
//! against the polished template; the summed probability mass of the
//! (necessarily worse) alternatives yields the error probability of the
//! consensus call at that position, reported on the Phred scale
//! (`QV = -10 * log10(p_error)`, rounded).

use crate::candidates::site_mutations;
use crate::errors::{FgpolishError, Result};
use crate::integrator::Integrator;

/// Per-position quality values, split by edit class.
///
/// All four vectors have the template's length. The overall vector
/// aggregates every alternative; the class vectors count only deletions,
/// insertions or substitutions respectively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityValues {
    /// Overall per-position QVs.
    pub qualities: Vec<u32>,
    /// Deletion-only per-position QVs.
    pub deletion_qvs: Vec<u32>,
    /// Insertion-only per-position QVs.
    pub insertion_qvs: Vec<u32>,
    /// Substitution-only per-position QVs.
    pub substitution_qvs: Vec<u32>,
}

/// Converts an error probability to a rounded Phred quality value.
///
/// A probability of exactly zero is clamped to the smallest positive normal
/// before taking the logarithm, so the result is large but finite.
///
/// # Errors
///
/// [`FgpolishError::InvalidProbability`] when `probability` is outside
/// `[0, 1]`.
pub fn probability_to_qv(probability: f64) -> Result<u32> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(FgpolishError::InvalidProbability { value: probability });
    }
    let probability = if probability == 0.0 { f64::MIN_POSITIVE } else { probability };
    Ok((-10.0 * probability.log10()).round() as u32)
}

/// Converts an accumulated alternative-probability mass to a QV.
///
/// `score_sum` is the sum of `exp(score)` over the worse alternatives; the
/// error probability of the call is `1 - 1 / (1 + score_sum)`.
fn score_sum_to_qv(score_sum: f64) -> Result<u32> {
    probability_to_qv(1.0 - 1.0 / (1.0 + score_sum))
}

/// Computes the overall per-position quality vector for a polished template.
///
/// Mutations whose evaluator fails numerically are logged and skipped (the
/// evaluator is invalid from then on); only strictly negative score deltas
/// contribute probability mass.
pub fn consensus_qualities(ai: &mut Integrator) -> Result<Vec<u32>> {
    let len = ai.template_length();
    let mut quals = Vec::with_capacity(len);
    let ll0 = ai.ll();

    for i in 0..len {
        let mut score_sum = 0.0;
        for m in site_mutations(ai, i, i + 1, false) {
            // skip mutations that start beyond the current site (trailing
            // insertions at the right edge)
            if m.start() > i {
                continue;
            }
            let score = match ai.ll_of(&m) {
                Ok(ll) => ll - ll0,
                Err(e @ FgpolishError::InvalidEvaluator { .. }) => {
                    log::error!("in consensus_qualities: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if score < 0.0 {
                score_sum += score.exp();
            }
        }
        quals.push(score_sum_to_qv(score_sum)?);
    }

    Ok(quals)
}

/// Computes per-position quality vectors, overall and split by edit class.
///
/// Same scoring and failure handling as [`consensus_qualities`]; each
/// alternative additionally contributes to the vector of its own edit class.
pub fn consensus_qvs(ai: &mut Integrator) -> Result<QualityValues> {
    let len = ai.template_length();
    let mut qualities = Vec::with_capacity(len);
    let mut deletion_qvs = Vec::with_capacity(len);
    let mut insertion_qvs = Vec::with_capacity(len);
    let mut substitution_qvs = Vec::with_capacity(len);
    let ll0 = ai.ll();

    for i in 0..len {
        let mut qual_sum = 0.0;
        let mut del_sum = 0.0;
        let mut ins_sum = 0.0;
        let mut sub_sum = 0.0;

        for m in site_mutations(ai, i, i + 1, false) {
            if m.start() > i {
                continue;
            }
            let score = match ai.ll_of(&m) {
                Ok(ll) => ll - ll0,
                Err(e @ FgpolishError::InvalidEvaluator { .. }) => {
                    log::error!("in consensus_qvs: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if score >= 0.0 {
                continue;
            }
            let exp_score = score.exp();
            qual_sum += exp_score;
            if m.is_deletion() {
                del_sum += exp_score;
            } else if m.start() == m.end() {
                ins_sum += exp_score;
            } else {
                sub_sum += exp_score;
            }
        }

        qualities.push(score_sum_to_qv(qual_sum)?);
        deletion_qvs.push(score_sum_to_qv(del_sum)?);
        insertion_qvs.push(score_sum_to_qv(ins_sum)?);
        substitution_qvs.push(score_sum_to_qv(sub_sum)?);
    }

    Ok(QualityValues { qualities, deletion_qvs, insertion_qvs, substitution_qvs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_to_qv_identities() {
        // a certain error has quality zero
        assert_eq!(probability_to_qv(1.0).unwrap(), 0);
        // 10% error -> Q10, 1% -> Q20
        assert_eq!(probability_to_qv(0.1).unwrap(), 10);
        assert_eq!(probability_to_qv(0.01).unwrap(), 20);
        // rounding
        assert_eq!(probability_to_qv(0.5).unwrap(), 3);
    }

    #[test]
    fn test_probability_to_qv_zero_clamps() {
        let qv = probability_to_qv(0.0).unwrap();
        // -10 * log10(f64::MIN_POSITIVE) ~ 3077
        assert!(qv > 3000);
    }

    #[test]
    fn test_probability_to_qv_rejects_out_of_range() {
        for p in [-0.1, 1.1, f64::NAN] {
            assert!(matches!(
                probability_to_qv(p),
                Err(FgpolishError::InvalidProbability { .. })
            ));
        }
    }

    #[test]
    fn test_probability_to_qv_monotone() {
        let probs = [0.0, 1e-12, 1e-6, 0.001, 0.01, 0.1, 0.5, 0.9, 1.0];
        let qvs: Vec<u32> = probs.iter().map(|&p| probability_to_qv(p).unwrap()).collect();
        for pair in qvs.windows(2) {
            assert!(pair[0] >= pair[1], "QV not monotone non-increasing: {qvs:?}");
        }
    }

    #[test]
    fn test_score_sum_to_qv() {
        // no alternative mass at all: error probability 0, clamped
        assert!(score_sum_to_qv(0.0).unwrap() > 3000);
        // unit mass: error probability 1/2 -> Q3
        assert_eq!(score_sum_to_qv(1.0).unwrap(), 3);
    }
}
