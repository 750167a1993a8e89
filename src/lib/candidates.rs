//! Candidate mutation enumeration.
//!
//! Three generators feed the polish loop:
//!
//! * [`site_mutations`] — all single-site edits inside a window, canonicalized
//!   so every distinct neighboring template is reachable exactly once: an
//!   insertion extending a homopolymer is only emitted before the run's first
//!   base, and only the first base of a run may be deleted.
//! * [`repeat_mutations`] — expansion/contraction of tandem repeats by one
//!   full copy.
//! * [`nearby_mutations`] — site mutations restricted to merged windows
//!   around freshly applied edits, translated through the length changes
//!   those edits introduced.

use crate::integrator::Integrator;
use crate::mutation::Mutation;
use crate::polish::RepeatConfig;

/// Sentinel payload base marking a nascent diploid site.
///
/// In diploid mode the candidate stream carries this placeholder instead of
/// concrete bases; the polish loop replaces it with a IUPAC ambiguity code
/// once the binomial test accepts the site. The sentinel never survives into
/// a committed mutation.
pub const DIPLOID_SENTINEL: u8 = b'Z';

/// Appends all site mutations for positions `[start, end)` to `muts`.
///
/// Per position: insertions of every candidate base that does not extend the
/// preceding homopolymer, a single one-base deletion when the position is the
/// first of its run, and substitutions of every base differing from the
/// current one. A final round of insertions is emitted at `end`, again
/// suppressing terminal homopolymer extension. In haploid mode the candidate
/// bases are `{A, C, G, T}`; in diploid mode the single sentinel base
/// [`DIPLOID_SENTINEL`].
pub fn site_mutations_into(
    muts: &mut Vec<Mutation>,
    ai: &Integrator,
    start: usize,
    end: usize,
    diploid: bool,
) {
    let bases: &[u8] = if diploid { &[DIPLOID_SENTINEL] } else { &[b'A', b'C', b'G', b'T'] };

    if start == end {
        return;
    }

    let mut last = if start > 0 { ai.base_at(start - 1) } else { 0 };

    for i in start..end {
        let curr = ai.base_at(i);

        // insertions come before deletion/substitutions at site i, their
        // end() is i < i + 1
        for &b in bases {
            if b != last {
                muts.push(Mutation::insertion(i, vec![b]));
            }
        }

        // only the first base of a homopolymer may be deleted
        if curr != last {
            muts.push(Mutation::deletion(i, 1));
        }

        for &b in bases {
            if b != curr {
                muts.push(Mutation::substitution(i, vec![b]));
            }
        }

        last = curr;
    }

    // at the window end, avoid a terminal homopolymer insertion
    for &b in bases {
        if b != last {
            muts.push(Mutation::insertion(end, vec![b]));
        }
    }
}

/// Returns all site mutations for positions `[start, end)`.
#[must_use]
pub fn site_mutations(ai: &Integrator, start: usize, end: usize, diploid: bool) -> Vec<Mutation> {
    let mut muts = Vec::new();
    site_mutations_into(&mut muts, ai, start, end, diploid);
    muts
}

/// Returns all site mutations over the whole template.
#[must_use]
pub fn all_site_mutations(ai: &Integrator, diploid: bool) -> Vec<Mutation> {
    site_mutations(ai, 0, ai.template_length(), diploid)
}

/// Appends tandem-repeat expansions/contractions inside `[start, end)`.
///
/// For every repeat unit size in `[2, max_repeat_size]` and every position,
/// the maximal run of identical adjacent copies is measured; runs of at least
/// `min_element_count` copies yield an insertion of one extra copy and a
/// deletion of one copy, both anchored at the run start. After a run the scan
/// advances past it (`repeat_size * (n_elem - 1) + 1`) so a locus is not
/// re-emitted for the same unit size. The output is site-sorted.
pub fn repeat_mutations_into(
    muts: &mut Vec<Mutation>,
    ai: &Integrator,
    cfg: &RepeatConfig,
    start: usize,
    end: usize,
) {
    if cfg.max_repeat_size < 2 || cfg.min_element_count == 0 {
        return;
    }

    let tpl = ai.template();

    for repeat_size in 2..=cfg.max_repeat_size {
        let mut i = start;
        while i + repeat_size <= end {
            let mut n_elem = 1;

            let mut j = i + repeat_size;
            while j + repeat_size <= end {
                if tpl[j..j + repeat_size] == tpl[i..i + repeat_size] {
                    n_elem += 1;
                    j += repeat_size;
                } else {
                    break;
                }
            }

            if n_elem >= cfg.min_element_count {
                muts.push(Mutation::insertion(i, tpl[i..i + repeat_size].to_vec()));
                muts.push(Mutation::deletion(i, repeat_size));
            }

            if n_elem > 1 {
                i += repeat_size * (n_elem - 1) + 1;
            } else {
                i += 1;
            }
        }
    }

    muts.sort_by(Mutation::site_cmp);
}

/// Returns tandem-repeat mutations inside `[start, end)`.
#[must_use]
pub fn repeat_mutations(
    ai: &Integrator,
    cfg: &RepeatConfig,
    start: usize,
    end: usize,
) -> Vec<Mutation> {
    let mut muts = Vec::new();
    repeat_mutations_into(&mut muts, ai, cfg, start, end);
    muts
}

/// Returns tandem-repeat mutations over the whole template.
#[must_use]
pub fn all_repeat_mutations(ai: &Integrator, cfg: &RepeatConfig) -> Vec<Mutation> {
    repeat_mutations(ai, cfg, 0, ai.template_length())
}

/// Generates site mutations in the neighborhood of freshly applied edits.
///
/// `applied` holds the edits just committed (in pre-apply coordinates) and
/// `centers` the pivots to search around; both are site-sorted in place. Each
/// center's window `[start - neighborhood, end + neighborhood]` is shifted by
/// the cumulative length change of the applied edits preceding it, clamped to
/// the current template, and overlapping windows are merged before
/// enumeration.
#[must_use]
pub fn nearby_mutations(
    applied: &mut [Mutation],
    centers: &mut [Mutation],
    ai: &Integrator,
    neighborhood: usize,
    diploid: bool,
) -> Vec<Mutation> {
    let len = ai.template_length() as i64;
    let clamp = |i: i64| -> usize { i.clamp(0, len) as usize };

    let mut result = Vec::new();

    if centers.is_empty() {
        return result;
    }

    applied.sort_by(Mutation::site_cmp);
    centers.sort_by(Mutation::site_cmp);

    let mut_range = |m: &Mutation, diff: i64| -> (usize, usize) {
        let start = diff + m.start() as i64 - neighborhood as i64;
        let end = diff + m.end() as i64 + neighborhood as i64;
        (clamp(start), clamp(end))
    };

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut applied_idx = 0;
    let mut length_diff = 0i64;

    for center in centers.iter() {
        while applied_idx < applied.len() && applied[applied_idx].end() <= center.start() {
            length_diff += applied[applied_idx].length_diff();
            applied_idx += 1;
        }

        let (next_start, next_end) = mut_range(center, length_diff);

        // if the next window touches the last one, just extend the last one
        match ranges.last_mut() {
            Some(last) if next_start <= last.1 => last.1 = next_end,
            _ => ranges.push((next_start, next_end)),
        }
    }

    for (range_start, range_end) in ranges {
        site_mutations_into(&mut result, ai, range_start, range_end, diploid);
    }

    result
}
