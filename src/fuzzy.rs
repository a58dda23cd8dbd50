//! Best-match-above-threshold string comparison.
//!
//! Similarity is Jaro-Winkler on lowercased strings (`strsim`). Every entity
//! resolver uses either a fixed bias ([`find`]) or the adaptive search
//! ([`seek_deep_match`]), which starts from a strict bias and relaxes it one
//! hundredth at a time until something matches:
//!
//! ```text
//! bias 0.99 ─▶ no match ─▶ 0.98 ─▶ ... ─▶ first bias with ≥1 match  (stop)
//!                                    └──▶ min_bias reached          (stop, empty)
//! ```
//!
//! The relaxation works on integer hundredths so the final bias of an empty
//! search is exactly `min_bias`.

pub const DEFAULT_BIAS: f64 = 0.65;
pub const DEEP_START_BIAS: f64 = 0.99;
pub const DEEP_MIN_BIAS: f64 = 0.8;

/// A candidate that scored at or above the requested bias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatch<'a, T> {
    pub score: f64,
    pub candidate: &'a T,
}

/// Outcome of [`seek_deep_match`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeepMatch<'a, T> {
    /// The bias at which the search stopped.
    pub bias: f64,
    /// Matches sorted by descending score.
    pub matches: Vec<FuzzyMatch<'a, T>>,
    /// How many times the bias was lowered.
    pub retries: usize,
}

impl<'a, T> DeepMatch<'a, T> {
    pub fn best(&self) -> Option<&'a T> {
        self.matches.first().map(|m| m.candidate)
    }
}

pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&a.trim().to_lowercase(), &b.trim().to_lowercase())
}

/// All candidates scoring `>= bias`, best first.
pub fn collect_matches<'a, T, F>(query: &str, candidates: &'a [T], getter: F, bias: f64) -> Vec<FuzzyMatch<'a, T>>
where
    F: Fn(&T) -> &str,
{
    if query.trim().is_empty() {
        return Vec::new();
    }
    let mut matches: Vec<FuzzyMatch<'a, T>> = candidates
        .iter()
        .filter_map(|candidate| {
            let score = similarity(query, getter(candidate));
            (score >= bias).then_some(FuzzyMatch { score, candidate })
        })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches
}

/// Best candidate scoring `>= bias`.
pub fn find<'a, T, F>(query: &str, candidates: &'a [T], getter: F, bias: f64) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    collect_matches(query, candidates, getter, bias).first().map(|m| m.candidate)
}

/// Find the tightest bias in `[min_bias, start_bias]` that yields any match.
pub fn seek_deep_match<'a, T, F>(
    query: &str,
    candidates: &'a [T],
    getter: F,
    start_bias: f64,
    min_bias: f64,
) -> DeepMatch<'a, T>
where
    F: Fn(&T) -> &str,
{
    let floor = (min_bias * 100.0).round() as i64;
    let mut cents = ((start_bias * 100.0).round() as i64).max(floor);
    let mut retries = 0;

    loop {
        let bias = cents as f64 / 100.0;
        let matches = collect_matches(query, candidates, &getter, bias);
        if !matches.is_empty() || cents <= floor {
            tracing::trace!(query, bias, retries, found = matches.len(), "deep match finished");
            return DeepMatch { bias, matches, retries };
        }
        cents -= 1;
        retries += 1;
    }
}
