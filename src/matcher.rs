//! Bitap approximate matching: locate a pattern in a text near an expected
//! location, tolerating errors.

use std::collections::HashMap;

use crate::diff::{find_subsequence, units, Redline};
use crate::errors::Error;

impl Redline {
    /// Locate the best instance of `pattern` in `text` near the code-unit
    /// offset `loc`, weighing character errors against distance from `loc`.
    ///
    /// Returns `Ok(None)` when nothing scores within the match threshold,
    /// and `Err(Error::PatternTooLong)` when the pattern exceeds the
    /// configured bit width.
    ///
    /// # Example
    /// ```
    /// use redline::Redline;
    ///
    /// let rl = Redline::new();
    /// assert_eq!(Ok(Some(2)), rl.find_near("a quick brown fox", "quick", 0));
    /// ```
    pub fn find_near(&self, text: &str, pattern: &str, loc: usize) -> Result<Option<usize>, Error> {
        let pattern = units(pattern);
        if pattern.len() > self.max_pattern_bits() {
            return Err(Error::PatternTooLong {
                len: pattern.len(),
                max: self.max_pattern_bits(),
            });
        }
        Ok(self.locate(&units(text), &pattern, loc))
    }

    pub(crate) fn locate(&self, text: &[u16], pattern: &[u16], loc: usize) -> Option<usize> {
        if text.is_empty() {
            // Nothing to match against, unless nothing is sought.
            return pattern.is_empty().then_some(0);
        }

        let loc = loc.min(text.len());

        if text == pattern {
            // Shortcut: not guaranteed by the scoring below.
            Some(0)
        } else if text[loc..(loc + pattern.len()).min(text.len())] == pattern[..] {
            // Perfect match at the perfect spot (includes the empty pattern).
            Some(loc)
        } else {
            self.bitap(text, pattern, loc)
        }
    }

    fn bitap(&self, text: &[u16], pattern: &[u16], loc: usize) -> Option<usize> {
        if pattern.len() > self.max_pattern_bits() || pattern.is_empty() {
            return None;
        }

        let alphabet = alphabet(pattern);

        // Highest score beyond which we give up.
        let mut score_limit = self.match_threshold();

        // Is there a nearby exact match? (speedup)
        if let Some(best) = find_subsequence(&text[loc.min(text.len())..], pattern).map(|p| p + loc)
        {
            score_limit = self.bitap_score(loc, pattern.len(), 0, best).min(score_limit);

            // What about in the other direction? (speedup)
            let limit = (loc + pattern.len()).min(text.len() - pattern.len());
            if let Some(best_rev) =
                (0..=limit).rev().find(|&s| text[s..s + pattern.len()] == pattern[..])
            {
                score_limit = self
                    .bitap_score(loc, pattern.len(), 0, best_rev)
                    .min(score_limit);
            }
        }

        let matchmask: u64 = 1 << (pattern.len() - 1);
        let mut best_loc = None;

        let mut bin_max = pattern.len() + text.len();
        let mut last_rd: Vec<u64> = Vec::new();

        for d in 0..pattern.len() {
            // Scan for the best match; each iteration allows one more error.
            // Binary search for how far from `loc` we can stray at this
            // error level.
            let mut bin_min = 0;
            let mut bin_mid = bin_max;
            while bin_min < bin_mid {
                if self.bitap_score(loc, pattern.len(), d, loc + bin_mid) <= score_limit {
                    bin_min = bin_mid;
                } else {
                    bin_max = bin_mid;
                }
                bin_mid = (bin_max - bin_min) / 2 + bin_min;
            }
            // Use the result from this iteration as the maximum for the next.
            bin_max = bin_mid;

            let mut start = 1.max(loc.saturating_sub(bin_mid) + 1);
            let finish = (loc + bin_mid).min(text.len()) + pattern.len();

            let mut rd = vec![0_u64; finish + 2];
            rd[finish + 1] = (1 << d) - 1;

            let mut j = finish;
            while j >= start {
                let char_match = if text.len() < j {
                    // Out of range.
                    0
                } else {
                    alphabet.get(&text[j - 1]).copied().unwrap_or(0)
                };

                rd[j] = if d == 0 {
                    // First pass: exact match.
                    ((rd[j + 1] << 1) | 1) & char_match
                } else {
                    // Subsequent passes: fuzzy match.
                    (((rd[j + 1] << 1) | 1) & char_match)
                        | (((last_rd[j + 1] | last_rd[j]) << 1) | 1)
                        | last_rd[j + 1]
                };

                if rd[j] & matchmask != 0 {
                    let score = self.bitap_score(loc, pattern.len(), d, j - 1);
                    // This match will almost certainly be better than any
                    // existing match, but check anyway.
                    if score <= score_limit {
                        score_limit = score;
                        best_loc = Some(j - 1);
                        if j - 1 > loc {
                            // When passing loc, don't exceed our current
                            // distance from it.
                            start = 1.max((2 * loc).saturating_sub(j - 1));
                        } else {
                            // Already passed loc: downhill from here on in.
                            break;
                        }
                    }
                }

                j -= 1;
            }

            // No hope for a better match at greater error levels.
            if self.bitap_score(loc, pattern.len(), d + 1, loc) > score_limit {
                break;
            }
            last_rd = rd;
        }

        best_loc
    }

    // Score for a match with `errors` errors landing at `at`; 0.0 is a
    // perfect match, 1.0 a complete mismatch.
    fn bitap_score(&self, loc: usize, pattern_len: usize, errors: usize, at: usize) -> f32 {
        let accuracy = errors as f32 / pattern_len as f32;
        let proximity = loc.abs_diff(at);

        if self.match_distance() == 0 {
            // Dodge divide by zero.
            return if proximity == 0 { accuracy } else { 1.0 };
        }

        accuracy + proximity as f32 / self.match_distance() as f32
    }
}

// Map every pattern unit to a bitmask of the positions it occupies.
fn alphabet(pattern: &[u16]) -> HashMap<u16, u64> {
    let mut map = HashMap::with_capacity(pattern.len());
    for (i, &u) in pattern.iter().enumerate() {
        *map.entry(u).or_insert(0_u64) |= 1 << (pattern.len() - i - 1);
    }
    map
}
