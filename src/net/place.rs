//! Petri net places.

/// Upper bound on a place's marking.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Bound {
    /// A finite, non-negative upper bound.
    Finite(u64),
    /// No upper bound (`max = ∞`).
    Unbounded,
}

impl Bound {
    /// Returns `true` iff `tokens + delta` would not exceed this bound.
    pub fn admits(&self, tokens: u64, delta: u64) -> bool {
        match self {
            Bound::Finite(max) => tokens + delta <= *max,
            Bound::Unbounded => true,
        }
    }
}

/// A token-holding node with bounds and accounting.
///
/// May represent different concepts depending on the context, commonly used
/// to represent some state or condition.
#[derive(Clone, Debug)]
pub struct Place {
    /// Unique textual label.
    pub label: String,
    /// Current non-negative token count.
    pub tokens: u64,
    /// Marking restored by a `RESET`.
    pub reset_tokens: u64,
    /// Minimum marking, enforced after every commit.
    pub min: u64,
    /// Maximum marking, enforced after every commit.
    pub max: Bound,
    /// Termination limits `(lo, hi)`; tokens outside ends the run.
    pub term_limits: Option<(u64, u64)>,
    /// Visualisation-only grouping.
    pub group: Option<i64>,
    /// Cumulative tokens added by firings.
    pub ins: u64,
    /// Cumulative tokens removed by firings.
    pub outs: u64,
    /// Number of times this place has been reset.
    pub reset_count: u64,
    /// Sum of durations during which `tokens > 0`.
    pub total_token_time: f64,
    /// Set for one step after a `RESET` touches this place.
    pub just_reset: bool,
}

impl Place {
    /// Returns a newly constructed place with the given initial marking.
    pub fn new(label: impl Into<String>, tokens: u64) -> Self {
        Self {
            label: label.into(),
            tokens,
            reset_tokens: tokens,
            min: 0,
            max: Bound::Unbounded,
            term_limits: None,
            group: None,
            ins: 0,
            outs: 0,
            reset_count: 0,
            total_token_time: 0.0,
            just_reset: false,
        }
    }

    /// Returns `true` iff the current marking violates `min ≤ tokens ≤ max`.
    pub fn violates_bounds(&self) -> bool {
        self.tokens < self.min
            || match self.max {
                Bound::Finite(max) => self.tokens > max,
                Bound::Unbounded => false,
            }
    }

    /// Returns `true` iff the current marking has crossed the termination
    /// limits, if any are set.
    pub fn violates_termination(&self) -> bool {
        match self.term_limits {
            Some((lo, hi)) => self.tokens < lo || self.tokens > hi,
            None => false,
        }
    }

    /// Resets the marking to `reset_tokens`, bumping `reset_count`.
    pub fn reset(&mut self) {
        self.tokens = self.reset_tokens;
        self.reset_count += 1;
        self.just_reset = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_place_is_unbounded_and_clean() {
        let p = Place::new("P0", 3);
        assert_eq!(p.tokens, 3);
        assert_eq!(p.reset_tokens, 3);
        assert!(!p.violates_bounds());
        assert!(!p.violates_termination());
    }

    #[test]
    fn bound_admits_respects_finite_max() {
        let b = Bound::Finite(5);
        assert!(b.admits(3, 2));
        assert!(!b.admits(3, 3));
        assert!(Bound::Unbounded.admits(1_000, 1_000));
    }

    #[test]
    fn reset_restores_initial_marking_and_counts() {
        let mut p = Place::new("P0", 2);
        p.tokens = 0;
        p.reset();
        assert_eq!(p.tokens, 2);
        assert_eq!(p.reset_count, 1);
        assert!(p.just_reset);
    }

    #[test]
    fn termination_limits_trip_outside_range() {
        let mut p = Place::new("P0", 5);
        p.term_limits = Some((1, 10));
        assert!(!p.violates_termination());
        p.tokens = 0;
        assert!(p.violates_termination());
        p.tokens = 11;
        assert!(p.violates_termination());
    }
}
