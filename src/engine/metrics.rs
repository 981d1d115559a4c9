//! Generation metrics.
//!
//! Counters collected while one top-level generation runs. They are reset at
//! the start of every [`Generator::generate`](crate::Generator::generate) and
//! returned by [`Generator::generate_verbose`](crate::Generator::generate_verbose).
//!
//! Collection is a handful of integer increments on the rule-call path, so it
//! is always on.
//!
//! ## Design notes
//!
//! - `candidates_checked - applicable` is the number of failed checks.
//! - `live_nodes` and `reclaimed` are taken after the end-of-generation sweep.

use std::time::Duration;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerationMetrics {
    /// Total elapsed time, sweep included.
    pub total: Duration,
    /// `=>name` rule calls, the one for the start symbol included.
    pub rule_calls: usize,
    /// Candidates whose conditions were evaluated.
    pub candidates_checked: usize,
    /// Candidates whose conditions all held.
    pub applicable: usize,
    /// Rules executed.
    pub executions: usize,
    /// Rule calls that found no applicable candidate and produced empty text.
    pub unmatched_calls: usize,
    /// Deepest local-scope nesting reached.
    pub max_depth: usize,
    /// State nodes alive after the sweep.
    pub live_nodes: usize,
    /// State nodes reclaimed by the sweep.
    pub reclaimed: usize,
}

impl GenerationMetrics {
    /// Share of checked candidates that turned out applicable, in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        if self.candidates_checked == 0 {
            return 0.0;
        }
        self.applicable as f64 / self.candidates_checked as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_handles_empty_runs() {
        assert_eq!(GenerationMetrics::default().hit_rate(), 0.0);
        let metrics = GenerationMetrics { candidates_checked: 4, applicable: 1, ..GenerationMetrics::default() };
        assert_eq!(metrics.hit_rate(), 0.25);
    }
}
