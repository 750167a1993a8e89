//! Shared scripted-HMM implementations for integration tests.
//!
//! Real evaluators run banded forward/backward recursions; these stand-ins
//! expose the same capability surface with landscapes simple enough to
//! reason about exactly: an alignment-cost model (one penalty unit per edit
//! between template and read), a table-driven model for scripting exact
//! likelihood trajectories, and wrappers for injecting numerical failures.

use std::cell::Cell;
use std::collections::HashMap;

use fgpolish_lib::errors::{FgpolishError, Result};
use fgpolish_lib::evaluator::ReadHmm;
use fgpolish_lib::mutation::{apply_mutations, Mutation};

/// Levenshtein distance, small-input DP.
#[must_use]
pub fn edit_distance(a: &[u8], b: &[u8]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut curr = vec![i + 1];
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr.push((prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1));
        }
        prev = curr;
    }
    prev[b.len()]
}

/// Scores a read as minus its edit distance to the template.
pub struct AlignmentHmm {
    tpl: Vec<u8>,
    read: Vec<u8>,
}

impl AlignmentHmm {
    pub fn new(tpl: &[u8], read: &[u8]) -> Self {
        Self { tpl: tpl.to_vec(), read: read.to_vec() }
    }
}

impl ReadHmm for AlignmentHmm {
    fn ll(&self) -> Result<f64> {
        Ok(-(edit_distance(&self.tpl, &self.read) as f64))
    }

    fn ll_of(&self, mutation: &Mutation) -> Result<f64> {
        let mut muts = [mutation.clone()];
        let mutated = apply_mutations(&self.tpl, &mut muts);
        Ok(-(edit_distance(&mutated, &self.read) as f64))
    }

    fn apply_mutations(&mut self, mutations: &[Mutation]) -> Result<()> {
        let mut muts = mutations.to_vec();
        self.tpl = apply_mutations(&self.tpl, &mut muts);
        Ok(())
    }

    fn num_flip_flops(&self) -> u32 {
        2
    }

    fn alpha_populated(&self) -> f32 {
        0.9
    }

    fn beta_populated(&self) -> f32 {
        0.7
    }

    fn z_score(&self) -> f64 {
        f64::NAN
    }

    fn normal_parameters(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn mask_intervals(&mut self, _radius: usize, _max_err_rate: f64) {}
}

/// Table-driven likelihood landscape: every template string maps to a fixed
/// log-likelihood, everything else to a strongly negative default. Lets a
/// test script an exact search trajectory, including cycles.
pub struct TableHmm {
    tpl: Vec<u8>,
    table: HashMap<Vec<u8>, f64>,
    default_ll: f64,
}

impl TableHmm {
    pub fn new(tpl: &[u8], entries: &[(&[u8], f64)]) -> Self {
        let table = entries.iter().map(|&(t, ll)| (t.to_vec(), ll)).collect();
        Self { tpl: tpl.to_vec(), table, default_ll: -1000.0 }
    }

    fn lookup(&self, tpl: &[u8]) -> f64 {
        self.table.get(tpl).copied().unwrap_or(self.default_ll)
    }
}

impl ReadHmm for TableHmm {
    fn ll(&self) -> Result<f64> {
        Ok(self.lookup(&self.tpl))
    }

    fn ll_of(&self, mutation: &Mutation) -> Result<f64> {
        let mut muts = [mutation.clone()];
        Ok(self.lookup(&apply_mutations(&self.tpl, &mut muts)))
    }

    fn apply_mutations(&mut self, mutations: &[Mutation]) -> Result<()> {
        let mut muts = mutations.to_vec();
        self.tpl = apply_mutations(&self.tpl, &mut muts);
        Ok(())
    }

    fn num_flip_flops(&self) -> u32 {
        0
    }

    fn alpha_populated(&self) -> f32 {
        1.0
    }

    fn beta_populated(&self) -> f32 {
        1.0
    }

    fn z_score(&self) -> f64 {
        f64::NAN
    }

    fn normal_parameters(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn mask_intervals(&mut self, _radius: usize, _max_err_rate: f64) {}
}

/// Returns true when a IUPAC ambiguity code covers the given concrete base.
fn code_covers(code: u8, base: u8) -> bool {
    let set: &[u8] = match code {
        b'M' => b"AC",
        b'R' => b"AG",
        b'W' => b"AT",
        b'S' => b"CG",
        b'Y' => b"CT",
        b'K' => b"GT",
        _ => return false,
    };
    set.contains(&base)
}

/// Votes for one allele at one template site, and prefers an ambiguity code
/// covering its allele over everything else: -0.5 for a covering code, -1.0
/// for an exact match, -10.0 otherwise, plus a length penalty of 0.25 per
/// base of deviation from the expected template length. Across a read
/// population this mimics an HMM whose ambiguous template base explains both
/// alleles at once and which disfavors indels around the site.
pub struct AlleleVoterHmm {
    tpl: Vec<u8>,
    site: usize,
    allele: u8,
    expected_len: usize,
}

impl AlleleVoterHmm {
    pub fn new(tpl: &[u8], site: usize, allele: u8) -> Self {
        Self { tpl: tpl.to_vec(), site, allele, expected_len: tpl.len() }
    }

    fn score(&self, tpl: &[u8]) -> f64 {
        let site_score = match tpl.get(self.site) {
            Some(&b) if b == self.allele => -1.0,
            Some(&b) if code_covers(b, self.allele) => -0.5,
            _ => -10.0,
        };
        site_score - 0.25 * tpl.len().abs_diff(self.expected_len) as f64
    }
}

impl ReadHmm for AlleleVoterHmm {
    fn ll(&self) -> Result<f64> {
        Ok(self.score(&self.tpl))
    }

    fn ll_of(&self, mutation: &Mutation) -> Result<f64> {
        let mut muts = [mutation.clone()];
        Ok(self.score(&apply_mutations(&self.tpl, &mut muts)))
    }

    fn apply_mutations(&mut self, mutations: &[Mutation]) -> Result<()> {
        let mut muts = mutations.to_vec();
        self.tpl = apply_mutations(&self.tpl, &mut muts);
        Ok(())
    }

    fn num_flip_flops(&self) -> u32 {
        0
    }

    fn alpha_populated(&self) -> f32 {
        1.0
    }

    fn beta_populated(&self) -> f32 {
        1.0
    }

    fn z_score(&self) -> f64 {
        f64::NAN
    }

    fn normal_parameters(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn mask_intervals(&mut self, _radius: usize, _max_err_rate: f64) {}
}

/// Wraps another HMM and fails every likelihood query after a scripted
/// number of calls, the way a banded recursion degenerates mid-search.
pub struct FailingHmm<H: ReadHmm> {
    inner: H,
    calls_left: Cell<usize>,
}

impl<H: ReadHmm> FailingHmm<H> {
    pub fn after(inner: H, calls: usize) -> Self {
        Self { inner, calls_left: Cell::new(calls) }
    }

    fn tick(&self) -> Result<()> {
        if self.calls_left.get() == 0 {
            return Err(FgpolishError::invalid_evaluator("alpha/beta mismatch during rescore"));
        }
        self.calls_left.set(self.calls_left.get() - 1);
        Ok(())
    }
}

impl<H: ReadHmm> ReadHmm for FailingHmm<H> {
    fn ll(&self) -> Result<f64> {
        self.tick()?;
        self.inner.ll()
    }

    fn ll_of(&self, mutation: &Mutation) -> Result<f64> {
        self.tick()?;
        self.inner.ll_of(mutation)
    }

    fn apply_mutations(&mut self, mutations: &[Mutation]) -> Result<()> {
        self.inner.apply_mutations(mutations)
    }

    fn num_flip_flops(&self) -> u32 {
        self.inner.num_flip_flops()
    }

    fn alpha_populated(&self) -> f32 {
        self.inner.alpha_populated()
    }

    fn beta_populated(&self) -> f32 {
        self.inner.beta_populated()
    }

    fn z_score(&self) -> f64 {
        self.inner.z_score()
    }

    fn normal_parameters(&self) -> (f64, f64) {
        self.inner.normal_parameters()
    }

    fn mask_intervals(&mut self, radius: usize, max_err_rate: f64) {
        self.inner.mask_intervals(radius, max_err_rate);
    }
}
