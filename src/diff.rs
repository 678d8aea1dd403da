use std::collections::HashMap;
use std::fmt::Display;

use chrono::{DateTime, TimeDelta, Utc};

/// The three kinds of step an edit script is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Delete,
    Insert,
    Equal,
}

/// One step of an edit script: an operation plus the text it covers.
///
/// `Diff::delete("Hello")` means remove `Hello`, `Diff::insert("Goodbye")`
/// means add `Goodbye`, `Diff::equal(" world.")` means keep ` world.`.
/// The payload is held as UTF-16 code units, the unit every offset and
/// length in this crate counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    op: Op,
    data: Vec<u16>,
}

impl Diff {
    pub fn new(op: Op, text: &str) -> Self {
        Self {
            op,
            data: text.encode_utf16().collect(),
        }
    }

    pub fn delete(text: &str) -> Self {
        Self::new(Op::Delete, text)
    }

    pub fn insert(text: &str) -> Self {
        Self::new(Op::Insert, text)
    }

    pub fn equal(text: &str) -> Self {
        Self::new(Op::Equal, text)
    }

    pub(crate) fn del(data: &[u16]) -> Self {
        Self::from_units(Op::Delete, data)
    }

    pub(crate) fn ins(data: &[u16]) -> Self {
        Self::from_units(Op::Insert, data)
    }

    pub(crate) fn eq(data: &[u16]) -> Self {
        Self::from_units(Op::Equal, data)
    }

    pub(crate) fn from_units(op: Op, data: &[u16]) -> Self {
        Self {
            op,
            data: data.to_vec(),
        }
    }

    pub fn op(&self) -> Op {
        self.op
    }

    /// The covered text. Entries produced by this crate always hold
    /// well-formed UTF-16, so the conversion is lossless in practice.
    pub fn text(&self) -> String {
        String::from_utf16_lossy(&self.data)
    }

    /// The raw UTF-16 code units this entry covers.
    pub fn units(&self) -> &[u16] {
        &self.data
    }

    /// Length in UTF-16 code units.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn data(&self) -> &[u16] {
        &self.data
    }

    pub(crate) fn set_op(&mut self, op: Op) {
        self.op = op;
    }

    pub(crate) fn set_data(&mut self, data: Vec<u16>) {
        self.data = data;
    }

    pub(crate) fn data_mut(&mut self) -> &mut Vec<u16> {
        &mut self.data
    }
}

impl Display for Diff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:?}, {:?})", self.op, self.text())
    }
}

pub(crate) type Deadline = Option<DateTime<Utc>>;

// A balanced bisection halves the problem each level, so this covers any
// input that fits in memory; pathological splits degrade to a coarse
// delete+insert instead of overflowing the call stack.
const MAX_RECURSION_DEPTH: usize = 72;

// At or below this combined length a replacement block is a minimal
// substitution already and re-diffing it cannot improve anything.
const REDIFF_THRESHOLD: usize = 2;

/// The engine: holds the tunables and exposes every diff, match and patch
/// operation. All operations take `&self`; a configured instance is plain
/// immutable data and can be shared freely across threads.
///
/// # Example
/// ```
/// use redline::Redline;
///
/// let rl = Redline::new();
/// let diffs = rl.diff("the quick red fox", "the quick brown fox");
/// assert_eq!(redline::source_text(&diffs), "the quick red fox");
/// assert_eq!(redline::target_text(&diffs), "the quick brown fox");
/// ```
pub struct Redline {
    /// When false, skip the line-level pre-pass on long texts.
    checklines: bool,
    /// Diff deadline in milliseconds, `None` for unbounded search.
    timeout: Option<u32>,
    /// Cost of an empty edit operation in terms of edit characters.
    edit_cost: usize,
    /// At what point is no match declared (0.0 = perfection, 1.0 = very loose).
    match_threshold: f32,
    /// How far to search for a match (0 = exact location, 1000+ = broad match).
    /// A match this many code units away from the expected location adds 1.0
    /// to the score.
    match_distance: usize,
    /// Bitap pattern-length ceiling; at most the u64 bitmask width.
    max_pattern_bits: usize,
    /// When deleting a large block of text, how closely its contents have to
    /// match the expected contents (0.0 = perfection, 1.0 = very loose).
    delete_threshold: f32,
    /// Chunk size for patch context, in code units.
    patch_margin: usize,
}

impl Default for Redline {
    fn default() -> Self {
        Self {
            checklines: true,
            timeout: Some(1000),
            edit_cost: 4,
            match_threshold: 0.5,
            match_distance: 1000,
            max_pattern_bits: 32,
            delete_threshold: 0.5,
            patch_margin: 4,
        }
    }
}

impl Redline {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn checklines(&self) -> bool {
        self.checklines
    }

    /// Enable or disable the line-level pre-pass for texts over 100 code
    /// units. On by default; the pre-pass is faster but can produce a
    /// slightly less minimal diff.
    pub fn set_checklines(&mut self, checklines: bool) {
        self.checklines = checklines;
    }

    /// Set the diff deadline in milliseconds; `None` means unbounded
    /// search. Defaults to 1000.
    pub fn set_timeout(&mut self, timeout: Option<u32>) {
        self.timeout = timeout;
    }

    pub(crate) fn timeout(&self) -> Option<u32> {
        self.timeout
    }

    pub(crate) fn edit_cost(&self) -> usize {
        self.edit_cost
    }

    /// Cost of an edit operation for the efficiency cleanup. Defaults to 4.
    pub fn set_edit_cost(&mut self, edit_cost: usize) {
        self.edit_cost = edit_cost;
    }

    pub(crate) fn match_threshold(&self) -> f32 {
        self.match_threshold
    }

    /// Cut-off score for a valid fuzzy match: closer to 0 demands accuracy,
    /// closer to 1 accepts looser matches. Defaults to 0.5.
    pub fn set_match_threshold(&mut self, threshold: f32) {
        self.match_threshold = threshold;
    }

    pub(crate) fn match_distance(&self) -> usize {
        self.match_distance
    }

    /// Location weight for fuzzy matching: a match this many code units from
    /// the expected location scores a full 1.0 penalty. Zero restricts
    /// matches to the exact expected location. Defaults to 1000.
    pub fn set_match_distance(&mut self, distance: usize) {
        self.match_distance = distance;
    }

    pub(crate) fn max_pattern_bits(&self) -> usize {
        self.max_pattern_bits
    }

    /// Ceiling on fuzzy-match pattern length, capped at the 64 bits of the
    /// bitap mask. Defaults to 32 for parity with other implementations.
    pub fn set_max_pattern_bits(&mut self, bits: usize) {
        self.max_pattern_bits = bits.min(64);
    }

    pub(crate) fn delete_threshold(&self) -> f32 {
        self.delete_threshold
    }

    /// How closely the contents of a large deletion have to match the text
    /// found at the patch location. Defaults to 0.5.
    pub fn set_delete_threshold(&mut self, threshold: f32) {
        self.delete_threshold = threshold;
    }

    pub(crate) fn patch_margin(&self) -> usize {
        self.patch_margin
    }

    /// Context chunk size for patches, in code units. Defaults to 4.
    pub fn set_patch_margin(&mut self, margin: usize) {
        self.patch_margin = margin;
    }

    pub(crate) fn deadline(&self) -> Deadline {
        self.timeout
            .and_then(|ms| Utc::now().checked_add_signed(TimeDelta::milliseconds(i64::from(ms))))
    }
}

impl Redline {
    /// Compute the edit script turning `old` into `new`.
    ///
    /// The result satisfies `source_text(&diffs) == old` and
    /// `target_text(&diffs) == new`, carries no adjacent entries of the
    /// same kind and no empty entries, and never splits a surrogate pair
    /// across an entry boundary.
    pub fn diff(&self, old: &str, new: &str) -> Vec<Diff> {
        let old = units(old);
        let new = units(new);

        let mut diffs = self.diff_range(&old, &new, self.checklines(), 0, self.deadline());
        repair_split_surrogates(&mut diffs);

        diffs
    }

    /// The shared pipeline: trim the common affixes, dispatch the middle to
    /// `compute`, then reattach the affixes and normalize.
    pub(crate) fn diff_range(
        &self,
        old: &[u16],
        new: &[u16],
        linemode: bool,
        depth: usize,
        deadline: Deadline,
    ) -> Vec<Diff> {
        if old == new {
            if old.is_empty() {
                return Vec::new();
            }
            return vec![Diff::eq(old)];
        }

        if depth > MAX_RECURSION_DEPTH {
            tracing::debug!(depth, "diff recursion budget exhausted, degrading to coarse edit");
            return coarse(old, new);
        }

        let prefix = common_prefix(old, new);
        let suffix = common_suffix(&old[prefix..], &new[prefix..]);

        let mut diffs = self.compute(
            &old[prefix..old.len() - suffix],
            &new[prefix..new.len() - suffix],
            linemode,
            depth,
            deadline,
        );

        if prefix > 0 {
            diffs.insert(0, Diff::eq(&old[..prefix]));
        }
        if suffix > 0 {
            diffs.push(Diff::eq(&old[old.len() - suffix..]));
        }

        crate::cleanup::cleanup_merge(&mut diffs);

        diffs
    }

    /// Ordered shortcut checks, first match wins; bisection is the fallback.
    fn compute(
        &self,
        old: &[u16],
        new: &[u16],
        linemode: bool,
        depth: usize,
        deadline: Deadline,
    ) -> Vec<Diff> {
        if old.is_empty() {
            return vec![Diff::ins(new)];
        }
        if new.is_empty() {
            return vec![Diff::del(old)];
        }

        let (long, short, old_is_long) = if old.len() > new.len() {
            (old, new, true)
        } else {
            (new, old, false)
        };

        // Shorter text inside the longer one (speedup).
        if let Some(at) = find_subsequence(long, short) {
            let op = if old_is_long { Op::Delete } else { Op::Insert };
            return vec![
                Diff::from_units(op, &long[..at]),
                Diff::eq(short),
                Diff::from_units(op, &long[at + short.len()..]),
            ];
        }

        if short.len() == 1 {
            // After the containment check this cannot be an equality.
            return vec![Diff::del(old), Diff::ins(new)];
        }

        // A long shared middle splits the problem in two.
        if let Some(hm) = self.half_match(old, new) {
            let mut diffs =
                self.diff_range(hm.old_head, hm.new_head, linemode, depth + 1, deadline);
            diffs.push(Diff::eq(hm.common));
            diffs.extend(self.diff_range(hm.old_tail, hm.new_tail, linemode, depth + 1, deadline));
            return diffs;
        }

        if linemode && old.len() > 100 && new.len() > 100 {
            return self.line_mode(old, new, depth, deadline);
        }

        self.bisect(old, new, depth, deadline)
    }

    fn half_match<'a>(&self, old: &'a [u16], new: &'a [u16]) -> Option<HalfMatch<'a>> {
        // With unlimited time, don't risk a suboptimal diff.
        self.timeout()?;

        let (long, short) = if old.len() > new.len() {
            (old, new)
        } else {
            (new, old)
        };

        if long.len() < 4 || short.len() * 2 < long.len() {
            return None;
        }

        // Seed once from the second quarter, once from the third.
        let hm1 = half_match_at(long, short, long.len() / 4);
        let hm2 = half_match_at(long, short, long.len() / 2);

        let hm = match (hm1, hm2) {
            (Some(a), Some(b)) => {
                if a.common.len() > b.common.len() {
                    a
                } else {
                    b
                }
            }
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return None,
        };

        Some(if old.len() > new.len() {
            hm
        } else {
            HalfMatch {
                old_head: hm.new_head,
                old_tail: hm.new_tail,
                new_head: hm.old_head,
                new_tail: hm.old_tail,
                common: hm.common,
            }
        })
    }

    // Quick line-level diff, then re-diff the replacement blocks for
    // accuracy. This speedup can produce a non-minimal diff.
    fn line_mode(&self, old: &[u16], new: &[u16], depth: usize, deadline: Deadline) -> Vec<Diff> {
        let table = lines_to_codes(old, new);
        let encoded =
            self.diff_range(&table.old_codes, &table.new_codes, false, depth + 1, deadline);
        let mut diffs = codes_to_lines(&encoded, &table.lines);

        // Eliminate freak matches between unrelated lines.
        crate::cleanup::cleanup_semantic(&mut diffs);

        // Re-diff each coarse replacement block character by character and
        // splice the finer result in.
        diffs.push(Diff::eq(&[]));
        let mut pointer = 0;
        let mut count_delete = 0;
        let mut count_insert = 0;
        let mut text_delete: Vec<u16> = Vec::new();
        let mut text_insert: Vec<u16> = Vec::new();

        while pointer < diffs.len() {
            match diffs[pointer].op() {
                Op::Insert => {
                    count_insert += 1;
                    text_insert.extend_from_slice(diffs[pointer].data());
                }
                Op::Delete => {
                    count_delete += 1;
                    text_delete.extend_from_slice(diffs[pointer].data());
                }
                Op::Equal => {
                    if count_delete >= 1
                        && count_insert >= 1
                        && text_delete.len() + text_insert.len() > REDIFF_THRESHOLD
                    {
                        let start = pointer - count_delete - count_insert;
                        let sub =
                            self.diff_range(&text_delete, &text_insert, false, depth + 1, deadline);
                        let sublen = sub.len();
                        diffs.splice(start..pointer, sub);
                        pointer = start + sublen;
                    }
                    count_delete = 0;
                    count_insert = 0;
                    text_delete.clear();
                    text_insert.clear();
                }
            }
            pointer += 1;
        }
        diffs.pop();

        diffs
    }

    /// Find the middle snake per Myers 1986 (An O(ND) Difference Algorithm
    /// and Its Variations), split the problem in two and diff the halves.
    /// Hitting the deadline abandons the search for a coarse delete+insert:
    /// quality is sacrificed for termination, never the reverse.
    pub(crate) fn bisect(
        &self,
        old: &[u16],
        new: &[u16],
        depth: usize,
        deadline: Deadline,
    ) -> Vec<Diff> {
        if old.is_empty() || new.is_empty() || (old.len() == 1 && new.len() == 1) {
            // Too small for the frontier arrays; the callers' shortcut
            // checks make this unreachable from the diff pipeline.
            return coarse(old, new);
        }

        let old_len = old.len() as isize;
        let new_len = new.len() as isize;

        let max_d = (old_len + new_len + 1) / 2;
        let v_offset = max_d;
        let v_len = (2 * max_d) as usize;

        let mut v1 = vec![-1_isize; v_len];
        let mut v2 = vec![-1_isize; v_len];
        v1[v_offset as usize + 1] = 0;
        v2[v_offset as usize + 1] = 0;

        let delta = old_len - new_len;
        // With an odd length delta the forward path collides with the
        // reverse path; with an even one the reverse path collides first.
        let front = delta % 2 != 0;

        // Trim the k loops once a path runs off an edge of the grid.
        let mut k1start: isize = 0;
        let mut k1end: isize = 0;
        let mut k2start: isize = 0;
        let mut k2end: isize = 0;

        for d in 0..max_d {
            if deadline.is_some_and(|dl| Utc::now() > dl) {
                tracing::debug!("bisect deadline hit, degrading to coarse edit");
                break;
            }

            // Walk the forward path one step.
            let mut k1 = -d + k1start;
            while k1 < d + 1 - k1end {
                let k1_offset = (v_offset + k1) as usize;
                let mut x1 = if k1 == -d || (k1 != d && v1[k1_offset - 1] < v1[k1_offset + 1]) {
                    v1[k1_offset + 1]
                } else {
                    v1[k1_offset - 1] + 1
                };
                let mut y1 = x1 - k1;
                while x1 < old_len && y1 < new_len && old[x1 as usize] == new[y1 as usize] {
                    x1 += 1;
                    y1 += 1;
                }
                v1[k1_offset] = x1;

                if x1 > old_len {
                    // Ran off the right of the graph.
                    k1end += 2;
                } else if y1 > new_len {
                    // Ran off the bottom of the graph.
                    k1start += 2;
                } else if front {
                    let k2_offset = v_offset + delta - k1;
                    if k2_offset >= 0
                        && (k2_offset as usize) < v_len
                        && v2[k2_offset as usize] != -1
                    {
                        // Mirror x2 onto the top-left coordinate system.
                        let x2 = old_len - v2[k2_offset as usize];
                        if x1 >= x2 {
                            // Overlap detected.
                            return self.bisect_split(
                                old,
                                new,
                                x1 as usize,
                                y1 as usize,
                                depth,
                                deadline,
                            );
                        }
                    }
                }
                k1 += 2;
            }

            // Walk the reverse path one step.
            let mut k2 = -d + k2start;
            while k2 < d + 1 - k2end {
                let k2_offset = (v_offset + k2) as usize;
                let mut x2 = if k2 == -d || (k2 != d && v2[k2_offset - 1] < v2[k2_offset + 1]) {
                    v2[k2_offset + 1]
                } else {
                    v2[k2_offset - 1] + 1
                };
                let mut y2 = x2 - k2;
                while x2 < old_len
                    && y2 < new_len
                    && old[(old_len - x2 - 1) as usize] == new[(new_len - y2 - 1) as usize]
                {
                    x2 += 1;
                    y2 += 1;
                }
                v2[k2_offset] = x2;

                if x2 > old_len {
                    // Ran off the left of the graph.
                    k2end += 2;
                } else if y2 > new_len {
                    // Ran off the top of the graph.
                    k2start += 2;
                } else if !front {
                    let k1_offset = v_offset + delta - k2;
                    if k1_offset >= 0
                        && (k1_offset as usize) < v_len
                        && v1[k1_offset as usize] != -1
                    {
                        let x1 = v1[k1_offset as usize];
                        let y1 = v_offset + x1 - k1_offset;
                        // Mirror x2 onto the top-left coordinate system.
                        let x2 = old_len - x2;
                        if x1 >= x2 {
                            // Overlap detected.
                            return self.bisect_split(
                                old,
                                new,
                                x1 as usize,
                                y1 as usize,
                                depth,
                                deadline,
                            );
                        }
                    }
                }
                k2 += 2;
            }
        }

        // Ran out of time, or the number of edits equals the number of
        // characters: no commonality at all.
        coarse(old, new)
    }

    fn bisect_split(
        &self,
        old: &[u16],
        new: &[u16],
        x: usize,
        y: usize,
        depth: usize,
        deadline: Deadline,
    ) -> Vec<Diff> {
        let mut diffs = self.diff_range(&old[..x], &new[..y], false, depth + 1, deadline);
        diffs.extend(self.diff_range(&old[x..], &new[y..], false, depth + 1, deadline));
        diffs
    }
}

#[derive(Debug, PartialEq, Eq)]
struct HalfMatch<'a> {
    old_head: &'a [u16],
    old_tail: &'a [u16],
    new_head: &'a [u16],
    new_tail: &'a [u16],
    common: &'a [u16],
}

// Does a substring of `short` exist within `long` that is at least half the
// length of `long`, seeded from the quarter-length chunk at `idx`?
fn half_match_at<'a>(long: &'a [u16], short: &'a [u16], idx: usize) -> Option<HalfMatch<'a>> {
    let seed = &long[idx..idx + long.len() / 4];

    let mut j = 0;
    let mut best_common: &[u16] = &[];
    let mut best_long_head: &[u16] = &[];
    let mut best_long_tail: &[u16] = &[];
    let mut best_short_head: &[u16] = &[];
    let mut best_short_tail: &[u16] = &[];

    while let Some(pos) = find_subsequence(&short[j..], seed) {
        j += pos;

        let prefix = common_prefix(&long[idx..], &short[j..]);
        let suffix = common_suffix(&long[..idx], &short[..j]);

        if best_common.len() < suffix + prefix {
            best_common = &short[j - suffix..j + prefix];
            best_long_head = &long[..idx - suffix];
            best_long_tail = &long[idx + prefix..];
            best_short_head = &short[..j - suffix];
            best_short_tail = &short[j + prefix..];
        }

        j += 1;
    }

    if best_common.len() * 2 >= long.len() {
        Some(HalfMatch {
            old_head: best_long_head,
            old_tail: best_long_tail,
            new_head: best_short_head,
            new_tail: best_short_tail,
            common: best_common,
        })
    } else {
        None
    }
}

fn coarse(old: &[u16], new: &[u16]) -> Vec<Diff> {
    let mut diffs = Vec::with_capacity(2);
    if !old.is_empty() {
        diffs.push(Diff::del(old));
    }
    if !new.is_empty() {
        diffs.push(Diff::ins(new));
    }
    diffs
}

pub(crate) fn units(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}

pub(crate) fn find_subsequence(haystack: &[u16], needle: &[u16]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub(crate) fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..0xDC00).contains(&unit)
}

pub(crate) fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..0xE000).contains(&unit)
}

// Number of code units shared at the start of both slices, found by the
// halving search; throughput is on par with a unit-at-a-time scan but far
// better on long shared prefixes. Never splits a surrogate pair.
pub(crate) fn common_prefix(lhs: &[u16], rhs: &[u16]) -> usize {
    if lhs.is_empty() || rhs.is_empty() || lhs[0] != rhs[0] {
        return 0;
    }

    let mut lo = 0;
    let mut hi = lhs.len().min(rhs.len());
    let mut mid = hi;
    let mut start = 0;

    while lo < mid {
        if lhs[start..mid] == rhs[start..mid] {
            lo = mid;
            start = lo;
        } else {
            hi = mid;
        }
        mid = (hi - lo) / 2 + lo;
    }

    // Back off a boundary that falls between a high and a low surrogate.
    if mid > 0
        && is_high_surrogate(lhs[mid - 1])
        && (lhs.get(mid).is_some_and(|&u| is_low_surrogate(u))
            || rhs.get(mid).is_some_and(|&u| is_low_surrogate(u)))
    {
        mid -= 1;
    }

    mid
}

/// Number of code units shared at the end of both slices. Never splits a
/// surrogate pair.
pub(crate) fn common_suffix(lhs: &[u16], rhs: &[u16]) -> usize {
    if lhs.is_empty() || rhs.is_empty() || lhs.last() != rhs.last() {
        return 0;
    }

    let mut lo = 0;
    let mut hi = lhs.len().min(rhs.len());
    let mut mid = hi;
    let mut start = 0;

    while lo < mid {
        if lhs[lhs.len() - mid..lhs.len() - start] == rhs[rhs.len() - mid..rhs.len() - start] {
            lo = mid;
            start = lo;
        } else {
            hi = mid;
        }
        mid = (hi - lo) / 2 + lo;
    }

    if mid > 0
        && is_low_surrogate(lhs[lhs.len() - mid])
        && ((mid < lhs.len() && is_high_surrogate(lhs[lhs.len() - mid - 1]))
            || (mid < rhs.len() && is_high_surrogate(rhs[rhs.len() - mid - 1])))
    {
        mid -= 1;
    }

    mid
}

// Longest length where a suffix of `lhs` equals a prefix of `rhs`: start
// from a single-unit match and grow by the found index, verifying exactly.
// Performance analysis: https://neil.fraser.name/news/2010/11/04/
pub(crate) fn common_overlap(lhs: &[u16], rhs: &[u16]) -> usize {
    if lhs.is_empty() || rhs.is_empty() {
        return 0;
    }

    let minlen = lhs.len().min(rhs.len());

    // Truncate to the shared length.
    let l = &lhs[lhs.len() - minlen..];
    let r = &rhs[..minlen];

    if l == r {
        return minlen;
    }

    let mut len = 1;
    let mut best = 0;
    loop {
        let pattern = &l[minlen - len..];
        let Some(found) = find_subsequence(r, pattern) else {
            return best;
        };
        len += found;
        if found == 0 || l[minlen - len..] == r[..len] {
            best = len;
            len += 1;
        }
    }
}

const LINE_FEED: u16 = b'\n' as u16;

// Keep synthetic line codes clear of the surrogate range so the affix
// helpers can never mistake one for half a pair.
const LINE_CODE_LIMIT: usize = 0xD7FF;

struct LineTable<'a> {
    old_codes: Vec<u16>,
    new_codes: Vec<u16>,
    lines: Vec<&'a [u16]>,
}

// Reduce both texts to strings of codes where each code stands for one
// line. Code 0 is intentionally reserved and never assigned.
fn lines_to_codes<'a>(old: &'a [u16], new: &'a [u16]) -> LineTable<'a> {
    let mut lines: Vec<&'a [u16]> = vec![&[]];
    let mut index: HashMap<&'a [u16], u16> = HashMap::new();

    // First two thirds of the code space for the old text, the rest for the
    // new one.
    let old_codes = encode_lines(old, &mut lines, &mut index, LINE_CODE_LIMIT * 2 / 3);
    let new_codes = encode_lines(new, &mut lines, &mut index, LINE_CODE_LIMIT);

    LineTable {
        old_codes,
        new_codes,
        lines,
    }
}

fn encode_lines<'a>(
    text: &'a [u16],
    lines: &mut Vec<&'a [u16]>,
    index: &mut HashMap<&'a [u16], u16>,
    max_lines: usize,
) -> Vec<u16> {
    let budget = max_lines.saturating_sub(lines.len());
    let mut codes = Vec::new();
    let mut consumed = 0;

    for line in text.split_inclusive(|&u| u == LINE_FEED).take(budget) {
        consumed += line.len();
        let code = *index.entry(line).or_insert(lines.len() as u16);
        if code as usize == lines.len() {
            lines.push(line);
        }
        codes.push(code);
    }

    // Out of codes: the rest of the text becomes one synthetic line.
    if consumed < text.len() {
        let line = &text[consumed..];
        let code = *index.entry(line).or_insert(lines.len() as u16);
        if code as usize == lines.len() {
            lines.push(line);
        }
        codes.push(code);
    }

    codes
}

// Rehydrate line codes back into real line content.
fn codes_to_lines(diffs: &[Diff], lines: &[&[u16]]) -> Vec<Diff> {
    diffs
        .iter()
        .map(|d| {
            let mut data = Vec::new();
            for &code in d.data() {
                if let Some(line) = lines.get(code as usize) {
                    data.extend_from_slice(line);
                }
            }
            Diff::from_units(d.op(), &data)
        })
        .collect()
}

// An EQUAL entry must never start or end on half a surrogate pair: move the
// offending unit into the neighboring delete/insert pair, seeding an empty
// edit when one of the two is missing. Both input texts are well-formed
// UTF-16, so whenever an equality boundary splits a pair the adjacent edits
// carry the matching halves.
fn repair_split_surrogates(diffs: &mut Vec<Diff>) {
    let mut i = 0;
    while i < diffs.len() {
        if diffs[i].op() == Op::Equal && !diffs[i].is_empty() {
            // A leading low surrogate belongs to the edits before this entry.
            if i > 0 && is_low_surrogate(diffs[i].data()[0]) {
                if let Some((del, ins, shifted)) = edit_pair_before(diffs, i) {
                    i += shifted;
                    let unit = diffs[i].data_mut().remove(0);
                    diffs[del].data_mut().push(unit);
                    diffs[ins].data_mut().push(unit);
                }
            }

            // A trailing high surrogate belongs to the edits after it.
            if i + 1 < diffs.len()
                && diffs[i].data().last().is_some_and(|&u| is_high_surrogate(u))
            {
                if let Some((del, ins)) = edit_pair_after(diffs, i) {
                    if let Some(unit) = diffs[i].data_mut().pop() {
                        diffs[del].data_mut().insert(0, unit);
                        diffs[ins].data_mut().insert(0, unit);
                    }
                }
            }
        }
        i += 1;
    }

    diffs.retain(|d| !d.is_empty());
}

// Locate (synthesizing if needed) the delete and insert directly before the
// equality at `at`. Returns their indices plus how far `at` moved.
fn edit_pair_before(diffs: &mut Vec<Diff>, at: usize) -> Option<(usize, usize, usize)> {
    let prev_ins = at >= 1 && diffs[at - 1].op() == Op::Insert;
    let prev_del = at >= 1 && diffs[at - 1].op() == Op::Delete;
    let del_behind_ins = at >= 2 && prev_ins && diffs[at - 2].op() == Op::Delete;

    if del_behind_ins {
        Some((at - 2, at - 1, 0))
    } else if prev_ins {
        diffs.insert(at - 1, Diff::del(&[]));
        Some((at - 1, at, 1))
    } else if prev_del {
        diffs.insert(at, Diff::ins(&[]));
        Some((at - 1, at, 1))
    } else {
        // Preceded by another equality: nothing to repair against.
        None
    }
}

// Same, for the edit run directly after the equality at `at`.
fn edit_pair_after(diffs: &mut Vec<Diff>, at: usize) -> Option<(usize, usize)> {
    let next_del = at + 1 < diffs.len() && diffs[at + 1].op() == Op::Delete;
    let next_ins = at + 1 < diffs.len() && diffs[at + 1].op() == Op::Insert;
    let ins_after_del = next_del && at + 2 < diffs.len() && diffs[at + 2].op() == Op::Insert;

    if ins_after_del {
        Some((at + 1, at + 2))
    } else if next_del {
        diffs.insert(at + 2, Diff::ins(&[]));
        Some((at + 1, at + 2))
    } else if next_ins {
        diffs.insert(at + 1, Diff::del(&[]));
        Some((at + 1, at + 2))
    } else {
        None
    }
}

/// Rebuild the source text covered by an edit script (all equalities and
/// deletions).
pub fn source_text(diffs: &[Diff]) -> String {
    String::from_utf16_lossy(&source_units(diffs))
}

/// Rebuild the destination text covered by an edit script (all equalities
/// and insertions).
pub fn target_text(diffs: &[Diff]) -> String {
    String::from_utf16_lossy(&target_units(diffs))
}

pub(crate) fn source_units(diffs: &[Diff]) -> Vec<u16> {
    let mut out = Vec::new();
    for d in diffs {
        if d.op() != Op::Insert {
            out.extend_from_slice(d.data());
        }
    }
    out
}

pub(crate) fn target_units(diffs: &[Diff]) -> Vec<u16> {
    let mut out = Vec::new();
    for d in diffs {
        if d.op() != Op::Delete {
            out.extend_from_slice(d.data());
        }
    }
    out
}

/// Map a code-unit offset in the source text to the corresponding offset in
/// the destination text. Offsets inside a deletion clamp to the start of
/// the content that follows it: for `"The cat"` -> `"The big cat"`, 1 maps
/// to 1 and 4 (the `c`) maps to 8.
pub fn x_index(diffs: &[Diff], loc: usize) -> usize {
    let mut chars1 = 0;
    let mut chars2 = 0;
    let mut last_chars1 = 0;
    let mut last_chars2 = 0;
    let mut overshot: Option<&Diff> = None;

    for diff in diffs {
        if diff.op() != Op::Insert {
            chars1 += diff.len();
        }
        if diff.op() != Op::Delete {
            chars2 += diff.len();
        }
        if chars1 > loc {
            overshot = Some(diff);
            break;
        }
        last_chars1 = chars1;
        last_chars2 = chars2;
    }

    if let Some(d) = overshot {
        if d.op() == Op::Delete {
            // The location was deleted.
            return last_chars2;
        }
    }

    last_chars2 + (loc - last_chars1)
}

/// Levenshtein distance of an edit script: the number of inserted, deleted
/// or substituted code units. A paired deletion and insertion between two
/// equalities counts once, as a substitution.
pub fn levenshtein(diffs: &[Diff]) -> usize {
    let mut total = 0;
    let mut inserted = 0;
    let mut deleted = 0;

    for diff in diffs {
        match diff.op() {
            Op::Insert => inserted += diff.len(),
            Op::Delete => deleted += diff.len(),
            Op::Equal => {
                total += inserted.max(deleted);
                inserted = 0;
                deleted = 0;
            }
        }
    }

    total + inserted.max(deleted)
}

/// Render an edit script as an HTML fragment, for display only: deletions
/// in `<del>`, insertions in `<ins>`, everything HTML-escaped and newlines
/// shown as a pilcrow plus break.
pub fn pretty_html(diffs: &[Diff]) -> String {
    let mut html = String::new();
    for diff in diffs {
        let text = diff
            .text()
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('\n', "&para;<br>");
        match diff.op() {
            Op::Insert => {
                html.push_str("<ins style=\"background:#e6ffe6;\">");
                html.push_str(&text);
                html.push_str("</ins>");
            }
            Op::Delete => {
                html.push_str("<del style=\"background:#ffe6e6;\">");
                html.push_str(&text);
                html.push_str("</del>");
            }
            Op::Equal => {
                html.push_str("<span>");
                html.push_str(&text);
                html.push_str("</span>");
            }
        }
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_prefix() {
        // Null case.
        assert_eq!(0, common_prefix(&units("abc"), &units("xyz")));
        // Non-null case.
        assert_eq!(4, common_prefix(&units("1234abcdef"), &units("1234xyz")));
        // Whole case.
        assert_eq!(4, common_prefix(&units("1234"), &units("1234xyz")));
        // A shared high surrogate is not a shared character.
        assert_eq!(0, common_prefix(&units("\u{1F643}"), &units("\u{1F642}")));
        // Whole pairs still count.
        assert_eq!(2, common_prefix(&units("\u{1F643}a"), &units("\u{1F643}b")));
    }

    #[test]
    fn test_common_suffix() {
        // Null case.
        assert_eq!(0, common_suffix(&units("abc"), &units("xyz")));
        // Non-null case.
        assert_eq!(4, common_suffix(&units("abcdef1234"), &units("xyz1234")));
        // Whole case.
        assert_eq!(4, common_suffix(&units("1234"), &units("xyz1234")));
        // A shared low surrogate is not a shared character.
        assert_eq!(0, common_suffix(&units("\u{1F442}"), &units("\u{1F042}")));
        assert_eq!(2, common_suffix(&units("a\u{1F643}"), &units("b\u{1F643}")));
    }

    #[test]
    fn test_common_overlap() {
        // Null case.
        assert_eq!(0, common_overlap(&[], &units("abcd")));
        // Whole case.
        assert_eq!(3, common_overlap(&units("abc"), &units("abcd")));
        // No overlap.
        assert_eq!(0, common_overlap(&units("123456"), &units("abcd")));
        // Overlap.
        assert_eq!(3, common_overlap(&units("123456xxx"), &units("xxxabcd")));
        // Unicode: "fi" and the fi-ligature share no code units.
        assert_eq!(0, common_overlap(&units("fi"), &units("\u{fb01}i")));
    }

    #[test]
    fn test_half_match() {
        let mut rl = Redline::new();
        rl.set_timeout(Some(1000));

        // No match.
        assert!(rl
            .half_match(&units("1234567890"), &units("abcdef"))
            .is_none());
        assert!(rl.half_match(&units("12345"), &units("23")).is_none());

        // Single match.
        let old1 = units("1234567890");
        let new1 = units("a345678z");
        let hm = rl.half_match(&old1, &new1).unwrap();
        assert_eq!(hm.old_head, &units("12")[..]);
        assert_eq!(hm.old_tail, &units("90")[..]);
        assert_eq!(hm.new_head, &units("a")[..]);
        assert_eq!(hm.new_tail, &units("z")[..]);
        assert_eq!(hm.common, &units("345678")[..]);

        let old2 = units("a345678z");
        let new2 = units("1234567890");
        let hm = rl.half_match(&old2, &new2).unwrap();
        assert_eq!(hm.old_head, &units("a")[..]);
        assert_eq!(hm.old_tail, &units("z")[..]);
        assert_eq!(hm.new_head, &units("12")[..]);
        assert_eq!(hm.new_tail, &units("90")[..]);
        assert_eq!(hm.common, &units("345678")[..]);

        // Multiple matches.
        let old3 = units("121231234123451234123121");
        let new3 = units("a1234123451234z");
        let hm = rl.half_match(&old3, &new3).unwrap();
        assert_eq!(hm.common, &units("1234123451234")[..]);

        // Non-optimal half-match: optimal diff would be -q+x=H-i+e=lloHe+Hu=llo-Hew+y.
        let old4 = units("qHilloHelloHew");
        let new4 = units("xHelloHeHulloy");
        let hm = rl.half_match(&old4, &new4).unwrap();
        assert_eq!(hm.old_head, &units("qHillo")[..]);
        assert_eq!(hm.old_tail, &units("w")[..]);
        assert_eq!(hm.new_head, &units("x")[..]);
        assert_eq!(hm.new_tail, &units("Hulloy")[..]);
        assert_eq!(hm.common, &units("HelloHe")[..]);

        // With unlimited time the optimal diff is preferred.
        rl.set_timeout(None);
        assert!(rl
            .half_match(&units("qHilloHelloHew"), &units("xHelloHeHulloy"))
            .is_none());
    }

    #[test]
    fn test_lines_to_codes() {
        let old = units("alpha\nbeta\nalpha\n");
        let new = units("beta\nalpha\nbeta\n");
        let table = lines_to_codes(&old, &new);
        assert_eq!(table.old_codes, vec![1, 2, 1]);
        assert_eq!(table.new_codes, vec![2, 1, 2]);
        assert_eq!(
            table.lines,
            vec![&units("")[..], &units("alpha\n")[..], &units("beta\n")[..]]
        );

        let old = units("a");
        let new = units("b");
        let table = lines_to_codes(&old, &new);
        assert_eq!(table.old_codes, vec![1]);
        assert_eq!(table.new_codes, vec![2]);
    }

    #[test]
    fn test_codes_to_lines() {
        let alpha = units("alpha\n");
        let beta = units("beta\n");
        let lines: Vec<&[u16]> = vec![&[], &alpha, &beta];
        let diffs = vec![
            Diff::from_units(Op::Equal, &[1, 2, 1]),
            Diff::from_units(Op::Insert, &[2, 1, 2]),
        ];
        let out = codes_to_lines(&diffs, &lines);
        assert_eq!(
            out,
            vec![
                Diff::equal("alpha\nbeta\nalpha\n"),
                Diff::insert("beta\nalpha\nbeta\n"),
            ]
        );
    }

    #[test]
    fn test_bisect() {
        let rl = Redline::new();

        // Since the resulting diff is not normalized it is fine for the
        // insertion/deletion pairs to be in this exact order.
        assert_eq!(
            vec![
                Diff::delete("c"),
                Diff::insert("m"),
                Diff::equal("a"),
                Diff::delete("t"),
                Diff::insert("p"),
            ],
            rl.bisect(&units("cat"), &units("map"), 0, None)
        );

        // An already expired deadline degrades to a coarse edit.
        let expired = Utc::now().checked_sub_signed(TimeDelta::milliseconds(1));
        assert_eq!(
            vec![Diff::delete("cat"), Diff::insert("map")],
            rl.bisect(&units("cat"), &units("map"), 0, expired)
        );
    }

    #[test]
    fn test_x_index() {
        // Translation on equality.
        let diffs = vec![Diff::delete("a"), Diff::insert("1234"), Diff::equal("xyz")];
        assert_eq!(5, x_index(&diffs, 2));

        // Translation on deletion.
        let diffs = vec![Diff::equal("a"), Diff::delete("1234"), Diff::equal("xyz")];
        assert_eq!(1, x_index(&diffs, 3));
    }

    #[test]
    fn test_levenshtein() {
        // Trailing equality.
        assert_eq!(
            4,
            levenshtein(&[
                Diff::delete("abc"),
                Diff::insert("1234"),
                Diff::equal("xyz"),
            ])
        );
        // Leading equality.
        assert_eq!(
            4,
            levenshtein(&[
                Diff::equal("xyz"),
                Diff::delete("abc"),
                Diff::insert("1234"),
            ])
        );
        // Middle equality.
        assert_eq!(
            7,
            levenshtein(&[
                Diff::delete("abc"),
                Diff::equal("xyz"),
                Diff::insert("1234"),
            ])
        );
    }

    #[test]
    fn test_pretty_html() {
        let diffs = vec![
            Diff::equal("a\n"),
            Diff::delete("<B>b</B>"),
            Diff::insert("c&d"),
        ];
        assert_eq!(
            "<span>a&para;<br></span>\
             <del style=\"background:#ffe6e6;\">&lt;B&gt;b&lt;/B&gt;</del>\
             <ins style=\"background:#e6ffe6;\">c&amp;d</ins>",
            pretty_html(&diffs)
        );
    }

    #[test]
    fn test_surrogate_repair() {
        let rl = Redline::new();

        // The two emoji share a high surrogate; the shared unit must end up
        // inside the edits, not dangling at the end of the equality.
        let diffs = rl.diff("a\u{1F4A9}b", "a\u{1F4AA}b");
        assert_eq!(
            vec![
                Diff::equal("a"),
                Diff::delete("\u{1F4A9}"),
                Diff::insert("\u{1F4AA}"),
                Diff::equal("b"),
            ],
            diffs
        );

        // Every entry of every supplementary-plane diff is well-formed UTF-16.
        let cases = [
            ("\u{1F643}", "\u{1F642}"),
            ("a\u{1F643}\u{1F642}z", "a\u{1F642}\u{1F643}z"),
            ("\u{1F30D}x\u{1F30E}", "\u{1F30E}x\u{1F30D}"),
            ("text \u{1F643}", "text \u{1F643}\u{1F643}"),
        ];
        for (old, new) in cases {
            let diffs = rl.diff(old, new);
            for d in &diffs {
                assert!(
                    String::from_utf16(d.units()).is_ok(),
                    "entry splits a surrogate pair: {d} in {old:?} -> {new:?}"
                );
            }
            assert_eq!(source_text(&diffs), old);
            assert_eq!(target_text(&diffs), new);
        }
    }
}
