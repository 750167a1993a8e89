//! The algebra of template edits.
//!
//! A [`Mutation`] is a single local edit (insertion, deletion or substitution)
//! expressed against a concrete template coordinate system. Mutations can be
//! re-expressed relative to a substring window ([`Mutation::translate`]),
//! ordered by site, and applied in bulk to a template
//! ([`apply_mutations`]). [`ScoredMutation`] augments a mutation with its
//! aggregate log-likelihood and, for diploid calls, the binomial p-value.

use std::cmp::Ordering;
use std::fmt;

/// The three kinds of template edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MutationType {
    /// Removes template bases.
    Deletion,
    /// Inserts bases before a template position.
    Insertion,
    /// Replaces template bases in place.
    Substitution,
}

/// A single edit to a template sequence.
///
/// * An insertion at `start` inserts `bases` *before* template position
///   `start`; it spans zero template bases (`end() == start()`).
/// * A deletion at `start` removes `length` template bases
///   `[start, start + length)`.
/// * A substitution at `start` replaces `bases.len()` template bases starting
///   at `start`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mutation {
    kind: MutationType,
    start: usize,
    length: usize,
    bases: Vec<u8>,
}

impl Mutation {
    /// Creates a deletion of `length` bases at `start`.
    #[must_use]
    pub fn deletion(start: usize, length: usize) -> Self {
        debug_assert!(length >= 1, "deletion length must be >= 1");
        Self { kind: MutationType::Deletion, start, length, bases: Vec::new() }
    }

    /// Creates an insertion of `bases` before position `start`.
    #[must_use]
    pub fn insertion(start: usize, bases: impl Into<Vec<u8>>) -> Self {
        let bases = bases.into();
        debug_assert!(!bases.is_empty(), "insertion payload must be non-empty");
        Self { kind: MutationType::Insertion, start, length: 0, bases }
    }

    /// Creates a substitution of `bases.len()` bases starting at `start`.
    #[must_use]
    pub fn substitution(start: usize, bases: impl Into<Vec<u8>>) -> Self {
        let bases = bases.into();
        debug_assert!(!bases.is_empty(), "substitution payload must be non-empty");
        let length = bases.len();
        Self { kind: MutationType::Substitution, start, length, bases }
    }

    /// The kind of edit.
    #[must_use]
    pub fn kind(&self) -> MutationType {
        self.kind
    }

    /// First template position touched by the edit.
    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last template position touched (equals `start()` for
    /// insertions).
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Number of template bases spanned (zero for insertions).
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// The replacement/inserted payload (empty for deletions).
    #[must_use]
    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    /// Returns true for insertions.
    #[must_use]
    pub fn is_insertion(&self) -> bool {
        self.kind == MutationType::Insertion
    }

    /// Returns true for deletions.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.kind == MutationType::Deletion
    }

    /// Returns true for substitutions.
    #[must_use]
    pub fn is_substitution(&self) -> bool {
        self.kind == MutationType::Substitution
    }

    /// Net change in template length caused by this edit.
    #[must_use]
    pub fn length_diff(&self) -> i64 {
        match self.kind {
            MutationType::Insertion => self.bases.len() as i64,
            MutationType::Deletion => -(self.length as i64),
            MutationType::Substitution => 0,
        }
    }

    /// Site ordering: by `start`, then `end`, then kind.
    ///
    /// Insertions at a site order before deletions and substitutions at the
    /// same site because their `end()` is smaller.
    #[must_use]
    pub fn site_cmp(&self, other: &Self) -> Ordering {
        (self.start, self.end(), self.kind).cmp(&(other.start, other.end(), other.kind))
    }

    /// Re-expresses this mutation relative to the window
    /// `[start, start + length)` of its own coordinate system.
    ///
    /// Returns `None` when the mutation lies outside the window. Insertions
    /// occupy a zero-width point and lie inside iff
    /// `start <= self.start() <= start + length`; they are preserved in full
    /// with a shifted start. Deletions and substitutions are clipped to the
    /// window (substitutions keep the matching payload slice); a clipped
    /// length of zero yields `None`.
    #[must_use]
    pub fn translate(&self, start: usize, length: usize) -> Option<Mutation> {
        let win_end = start + length;

        if self.is_insertion() {
            if self.start < start || self.start > win_end {
                return None;
            }
            return Some(Mutation::insertion(self.start - start, self.bases.clone()));
        }

        if self.end() < start || win_end <= self.start {
            return None;
        }

        let new_start = self.start.max(start);
        let new_len = self.end().min(win_end) - new_start;
        if new_len == 0 {
            return None;
        }

        if self.is_deletion() {
            return Some(Mutation::deletion(new_start - start, new_len));
        }

        let offset = new_start - self.start;
        Some(Mutation::substitution(new_start - start, self.bases[offset..offset + new_len].to_vec()))
    }

    /// Attaches a score, producing a [`ScoredMutation`].
    #[must_use]
    pub fn with_score(&self, score: f64) -> ScoredMutation {
        ScoredMutation { mutation: self.clone(), score, p_value: None }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MutationType::Deletion => write!(f, "Deletion({}, {})", self.start, self.length),
            MutationType::Insertion => {
                write!(f, "Insertion({}, \"{}\")", self.start, String::from_utf8_lossy(&self.bases))
            }
            MutationType::Substitution => write!(
                f,
                "Substitution({}, \"{}\")",
                self.start,
                String::from_utf8_lossy(&self.bases)
            ),
        }
    }
}

/// A [`Mutation`] together with the aggregate log-likelihood it achieved and,
/// for accepted diploid candidates, the binomial test p-value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMutation {
    /// The underlying edit.
    pub mutation: Mutation,
    /// Aggregate log-likelihood of the template with this edit applied.
    pub score: f64,
    /// Binomial p-value, set only for accepted diploid candidates.
    pub p_value: Option<f64>,
}

impl ScoredMutation {
    /// Attaches a diploid-test p-value.
    #[must_use]
    pub fn with_p_value(mut self, p_value: f64) -> Self {
        self.p_value = Some(p_value);
        self
    }
}

impl fmt::Display for ScoredMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScoredMutation({}, {})", self.mutation, self.score)
    }
}

/// Applies a set of mutations to a template.
///
/// The slice is site-sorted in place, then applied from right to left so that
/// earlier indices stay valid; the result is therefore insensitive to the
/// caller's ordering. Mutations must be expressed against `tpl`'s coordinate
/// system and must not overlap.
#[must_use]
pub fn apply_mutations(tpl: &[u8], muts: &mut [Mutation]) -> Vec<u8> {
    if muts.is_empty() || tpl.is_empty() {
        return tpl.to_vec();
    }

    muts.sort_by(Mutation::site_cmp);

    let mut new_tpl = tpl.to_vec();
    for m in muts.iter().rev() {
        new_tpl.splice(m.start()..m.end(), m.bases().iter().copied());
    }
    new_tpl
}
