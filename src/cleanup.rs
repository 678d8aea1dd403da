//! The four in-place normalization passes over an edit script.

use crate::diff::{
    common_overlap, common_prefix, common_suffix, is_high_surrogate, is_low_surrogate, Diff, Op,
    Redline,
};

impl Redline {
    /// Reduce the number of edits by eliminating operationally trivial
    /// equalities: an equality shorter than the configured edit cost that
    /// sits between reducible edit runs costs more to keep than to
    /// regenerate. Unlike the semantic pass this trades meaning for size.
    pub fn cleanup_efficiency(&self, diffs: &mut Vec<Diff>) {
        cleanup_efficiency(self.edit_cost(), diffs);
    }
}

/// Reorder and merge like edit sections, merge equalities, drop empty
/// entries. Any edit section can move as long as it doesn't cross an
/// equality. Repeats until a full pass makes no change.
pub fn cleanup_merge(diffs: &mut Vec<Diff>) {
    // Every effective pass removes at least one entry, so the entry count
    // bounds the loop; the cap turns an unexpected non-terminating case
    // into a logged warning instead of a hang.
    let cap = diffs.len().max(8);
    for _ in 0..cap {
        if !merge_pass(diffs) {
            return;
        }
    }
    tracing::warn!("merge cleanup did not reach a fixpoint, keeping current sequence");
}

fn merge_pass(diffs: &mut Vec<Diff>) -> bool {
    // Dummy entry so the final run is flushed like any other.
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
                pointer += 1;
            }
            Op::Delete => {
                count_delete += 1;
                text_delete.extend_from_slice(diffs[pointer].data());
                pointer += 1;
            }
            Op::Equal => {
                // Upon reaching an equality, flush any prior redundancies.
                if count_delete + count_insert > 1 {
                    if count_delete != 0 && count_insert != 0 {
                        // Factor out a common prefix into the prior equality.
                        let common = common_prefix(&text_insert, &text_delete);
                        if common != 0 {
                            let start = pointer - count_delete - count_insert;
                            if start > 0 && diffs[start - 1].op() == Op::Equal {
                                diffs[start - 1]
                                    .data_mut()
                                    .extend_from_slice(&text_insert[..common]);
                            } else {
                                diffs.insert(0, Diff::eq(&text_insert[..common]));
                                pointer += 1;
                            }
                            text_insert.drain(..common);
                            text_delete.drain(..common);
                        }

                        // Factor out a common suffix into the current one.
                        let common = common_suffix(&text_insert, &text_delete);
                        if common != 0 {
                            let mut data = text_insert[text_insert.len() - common..].to_vec();
                            data.extend_from_slice(diffs[pointer].data());
                            diffs[pointer].set_data(data);
                            text_insert.truncate(text_insert.len() - common);
                            text_delete.truncate(text_delete.len() - common);
                        }
                    }

                    // Replace the run with the merged records.
                    let start = pointer - count_delete - count_insert;
                    let mut merged: Vec<Diff> = Vec::with_capacity(2);
                    if !text_delete.is_empty() {
                        merged.push(Diff::del(&text_delete));
                    }
                    if !text_insert.is_empty() {
                        merged.push(Diff::ins(&text_insert));
                    }
                    let merged_len = merged.len();
                    diffs.splice(start..pointer, merged);
                    pointer = start + merged_len + 1;
                } else if pointer != 0 && diffs[pointer - 1].op() == Op::Equal {
                    // Merge this equality into the previous one.
                    let removed = diffs.remove(pointer);
                    diffs[pointer - 1].data_mut().extend_from_slice(removed.data());
                } else {
                    pointer += 1;
                }

                count_delete = 0;
                count_insert = 0;
                text_delete.clear();
                text_insert.clear();
            }
        }
    }

    if diffs.last().is_some_and(|d| d.is_empty()) {
        diffs.pop();
    }

    // Second pass: single edits surrounded on both sides by equalities can
    // shift sideways to eliminate an equality,
    // e.g. A<ins>BA</ins>C -> <ins>AB</ins>AC.
    let mut changed = false;
    let mut pointer = 1;
    while pointer + 1 < diffs.len() {
        if diffs[pointer - 1].op() == Op::Equal && diffs[pointer + 1].op() == Op::Equal {
            let prev = diffs[pointer - 1].data().to_vec();
            let cur = diffs[pointer].data().to_vec();
            let next = diffs[pointer + 1].data().to_vec();

            if cur.len() >= prev.len() && cur[cur.len() - prev.len()..] == prev[..] {
                // Shift the edit over the previous equality.
                let mut shifted = prev.clone();
                shifted.extend_from_slice(&cur[..cur.len() - prev.len()]);
                diffs[pointer].set_data(shifted);
                let mut grown = prev;
                grown.extend_from_slice(&next);
                diffs[pointer + 1].set_data(grown);
                diffs.remove(pointer - 1);
                changed = true;
            } else if cur.len() >= next.len() && cur[..next.len()] == next[..] {
                // Shift the edit over the next equality.
                diffs[pointer - 1].data_mut().extend_from_slice(&next);
                let mut shifted = cur[next.len()..].to_vec();
                shifted.extend_from_slice(&next);
                diffs[pointer].set_data(shifted);
                diffs.remove(pointer + 1);
                changed = true;
            }
        }
        pointer += 1;
    }

    changed
}

/// Reduce the number of edits by eliminating semantically trivial
/// equalities: an equality no longer than the edits on both sides of it
/// contributes no meaningful distinction and is absorbed. Finishes with the
/// lossless boundary pass and pulls shared edges of delete/insert pairs out
/// into equalities.
pub fn cleanup_semantic(diffs: &mut Vec<Diff>) {
    if diffs.is_empty() {
        return;
    }

    let mut changes = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<Vec<u16>> = None;
    let mut pointer = 0;
    // Units changed before and after the candidate equality.
    let mut len_insertions1 = 0;
    let mut len_deletions1 = 0;
    let mut len_insertions2 = 0;
    let mut len_deletions2 = 0;

    while pointer < diffs.len() {
        if diffs[pointer].op() == Op::Equal {
            equalities.push(pointer);
            len_insertions1 = len_insertions2;
            len_deletions1 = len_deletions2;
            len_insertions2 = 0;
            len_deletions2 = 0;
            last_equality = Some(diffs[pointer].data().to_vec());
            pointer += 1;
        } else {
            if diffs[pointer].op() == Op::Insert {
                len_insertions2 += diffs[pointer].len();
            } else {
                len_deletions2 += diffs[pointer].len();
            }

            // An equality smaller than or equal to the edits on both sides
            // of it can be absorbed into them.
            let absorb = last_equality.as_ref().is_some_and(|eq| {
                eq.len() <= len_insertions1.max(len_deletions1)
                    && eq.len() <= len_insertions2.max(len_deletions2)
            });
            if absorb {
                if let (Some(eq), Some(&eq_idx)) = (last_equality.take(), equalities.last()) {
                    // Duplicate the equality as a deletion and turn the
                    // original into an insertion.
                    diffs.insert(eq_idx, Diff::del(&eq));
                    diffs[eq_idx + 1].set_op(Op::Insert);
                    // Throw away the equality we just absorbed and the one
                    // before it, which now needs re-evaluation.
                    equalities.pop();
                    equalities.pop();
                    pointer = equalities.last().map(|&e| e + 1).unwrap_or(0);
                    len_insertions1 = 0;
                    len_deletions1 = 0;
                    len_insertions2 = 0;
                    len_deletions2 = 0;
                    changes = true;
                    continue;
                }
            }
            pointer += 1;
        }
    }

    if changes {
        cleanup_merge(diffs);
    }
    cleanup_semantic_lossless(diffs);

    // Find overlaps between deletions and insertions, e.g.
    // <del>abcxxx</del><ins>xxxdef</ins> -> <del>abc</del>xxx<ins>def</ins>
    // <del>xxxabc</del><ins>defxxx</ins> -> <ins>def</ins>xxx<del>abc</del>
    // Only extract an overlap at least as big as half the edit ahead or
    // behind it.
    let mut pointer = 1;
    while pointer < diffs.len() {
        if diffs[pointer - 1].op() == Op::Delete && diffs[pointer].op() == Op::Insert {
            let deletion = diffs[pointer - 1].data().to_vec();
            let insertion = diffs[pointer].data().to_vec();
            let overlap1 = common_overlap(&deletion, &insertion);
            let overlap2 = common_overlap(&insertion, &deletion);
            let deletion_floor = deletion.len().div_ceil(2);
            let insertion_floor = insertion.len().div_ceil(2);

            if overlap1 >= overlap2 {
                if overlap1 >= deletion_floor || overlap1 >= insertion_floor {
                    diffs.insert(pointer, Diff::eq(&insertion[..overlap1]));
                    diffs[pointer - 1].set_data(deletion[..deletion.len() - overlap1].to_vec());
                    diffs[pointer + 1].set_data(insertion[overlap1..].to_vec());
                    pointer += 1;
                }
            } else if overlap2 >= deletion_floor || overlap2 >= insertion_floor {
                // Reverse overlap: swap the trimmed edits around the equality.
                diffs.insert(pointer, Diff::eq(&deletion[..overlap2]));
                diffs[pointer - 1] = Diff::ins(&insertion[..insertion.len() - overlap2]);
                diffs[pointer + 1] = Diff::del(&deletion[overlap2..]);
                pointer += 1;
            }
            pointer += 1;
        }
        pointer += 1;
    }
}

/// Look for single edits surrounded on both sides by equalities and slide
/// the edit boundary to the most readable position,
/// e.g. `The c<ins>at c</ins>ame.` -> `The <ins>cat </ins>came.`
pub fn cleanup_semantic_lossless(diffs: &mut Vec<Diff>) {
    // The first and last element don't need checking.
    let mut pointer = 1;
    while pointer + 1 < diffs.len() {
        if diffs[pointer - 1].op() == Op::Equal && diffs[pointer + 1].op() == Op::Equal {
            let mut equality_prev = diffs[pointer - 1].data().to_vec();
            let mut edit = diffs[pointer].data().to_vec();
            let mut equality_next = diffs[pointer + 1].data().to_vec();

            // First, shift the edit as far left as possible.
            let common = common_suffix(&equality_prev, &edit);
            if common > 0 {
                let tail = edit[edit.len() - common..].to_vec();
                equality_prev.truncate(equality_prev.len() - common);
                let mut rotated = tail.clone();
                rotated.extend_from_slice(&edit[..edit.len() - common]);
                edit = rotated;
                let mut grown = tail;
                grown.extend_from_slice(&equality_next);
                equality_next = grown;
            }

            // Then step right one unit at a time looking for the best fit.
            let mut best_prev = equality_prev.clone();
            let mut best_edit = edit.clone();
            let mut best_next = equality_next.clone();
            let mut best_score =
                boundary_score(&equality_prev, &edit) + boundary_score(&edit, &equality_next);

            loop {
                let (Some(&e0), Some(&n0)) = (edit.first(), equality_next.first()) else {
                    break;
                };
                if e0 != n0 {
                    break;
                }
                equality_prev.push(e0);
                edit.remove(0);
                edit.push(n0);
                equality_next.remove(0);

                let score =
                    boundary_score(&equality_prev, &edit) + boundary_score(&edit, &equality_next);
                // The >= favors trailing over leading whitespace; a rotation
                // that splits a surrogate pair is never a candidate.
                if score >= best_score && !splits_pair(&equality_prev, &edit, &equality_next) {
                    best_score = score;
                    best_prev.clone_from(&equality_prev);
                    best_edit.clone_from(&edit);
                    best_next.clone_from(&equality_next);
                }
            }

            if diffs[pointer - 1].data() != best_prev {
                // An improvement was found.
                if !best_prev.is_empty() {
                    diffs[pointer - 1].set_data(best_prev);
                } else {
                    diffs.remove(pointer - 1);
                    pointer -= 1;
                }
                diffs[pointer].set_data(best_edit);
                if !best_next.is_empty() {
                    diffs[pointer + 1].set_data(best_next);
                } else {
                    diffs.remove(pointer + 1);
                    pointer -= 1;
                }
            }
        }
        pointer += 1;
    }
}

pub(crate) fn cleanup_efficiency(edit_cost: usize, diffs: &mut Vec<Diff>) {
    if diffs.is_empty() {
        return;
    }

    let mut changes = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<Vec<u16>> = None;
    let mut pointer = 0;
    // Is there an insertion/deletion before and after the candidate?
    let mut pre_ins = false;
    let mut pre_del = false;
    let mut post_ins = false;
    let mut post_del = false;

    while pointer < diffs.len() {
        if diffs[pointer].op() == Op::Equal {
            if diffs[pointer].len() < edit_cost && (post_ins || post_del) {
                // Candidate found.
                equalities.push(pointer);
                pre_ins = post_ins;
                pre_del = post_del;
                last_equality = Some(diffs[pointer].data().to_vec());
            } else {
                // Not a candidate and can never become one.
                equalities.clear();
                last_equality = None;
            }
            post_ins = false;
            post_del = false;
            pointer += 1;
        } else {
            if diffs[pointer].op() == Op::Delete {
                post_del = true;
            } else {
                post_ins = true;
            }

            // Five types to be split:
            // <ins>A</ins><del>B</del>XY<ins>C</ins><del>D</del>
            // <ins>A</ins>X<ins>C</ins><del>D</del>
            // <ins>A</ins><del>B</del>X<ins>C</ins>
            // <del>B</del>X<ins>C</ins><del>D</del>
            // <ins>A</ins><del>B</del>X<del>C</del>
            let split = last_equality.as_ref().is_some_and(|eq| {
                (pre_ins && pre_del && post_ins && post_del)
                    || (eq.len() < edit_cost / 2
                        && usize::from(pre_ins)
                            + usize::from(pre_del)
                            + usize::from(post_ins)
                            + usize::from(post_del)
                            == 3)
            });
            if split {
                if let (Some(eq), Some(&eq_idx)) = (last_equality.take(), equalities.last()) {
                    diffs.insert(eq_idx, Diff::del(&eq));
                    diffs[eq_idx + 1].set_op(Op::Insert);
                    equalities.pop();
                    changes = true;

                    if pre_ins && pre_del {
                        // No change can affect a previous entry, keep going.
                        post_ins = true;
                        post_del = true;
                        equalities.clear();
                        pointer += 1;
                    } else {
                        equalities.pop();
                        pointer = equalities.last().map(|&e| e + 1).unwrap_or(0);
                        post_ins = false;
                        post_del = false;
                    }
                    continue;
                }
            }
            pointer += 1;
        }
    }

    if changes {
        cleanup_merge(diffs);
    }
}

fn splits_pair(prev: &[u16], edit: &[u16], next: &[u16]) -> bool {
    prev.last().is_some_and(|&u| is_high_surrogate(u))
        || edit.first().is_some_and(|&u| is_low_surrogate(u))
        || edit.last().is_some_and(|&u| is_high_surrogate(u))
        || next.first().is_some_and(|&u| is_low_surrogate(u))
}

const LINE_FEED: u16 = b'\n' as u16;
const CARRIAGE_RETURN: u16 = b'\r' as u16;

// Score how well the boundary between `one` and `two` lands on logical
// boundaries: 6 (edges, best) down to 0 (mid-word, worst).
fn boundary_score(one: &[u16], two: &[u16]) -> u8 {
    if one.is_empty() || two.is_empty() {
        // Edges are the best boundaries of all.
        return 6;
    }

    let (Some(char1), Some(char2)) = (last_char(one), first_char(two)) else {
        // A lone surrogate half is the worst boundary there is.
        return 0;
    };

    let whitespace1 = char1.is_whitespace();
    let whitespace2 = char2.is_whitespace();
    let linebreak1 = whitespace1 && (char1 == '\n' || char1 == '\r');
    let linebreak2 = whitespace2 && (char2 == '\n' || char2 == '\r');
    let blankline1 = linebreak1 && ends_with_blank_line(one);
    let blankline2 = linebreak2 && starts_with_blank_line(two);

    if blankline1 || blankline2 {
        5
    } else if linebreak1 || linebreak2 {
        4
    } else if !char1.is_alphanumeric() && !whitespace1 && whitespace2 {
        // End of sentences.
        3
    } else if whitespace1 || whitespace2 {
        2
    } else if !char1.is_alphanumeric() || !char2.is_alphanumeric() {
        1
    } else {
        0
    }
}

fn last_char(units: &[u16]) -> Option<char> {
    let &last = units.last()?;
    if is_low_surrogate(last) && units.len() >= 2 && is_high_surrogate(units[units.len() - 2]) {
        char::decode_utf16([units[units.len() - 2], last]).next()?.ok()
    } else {
        char::from_u32(u32::from(last))
    }
}

fn first_char(units: &[u16]) -> Option<char> {
    let &first = units.first()?;
    if is_high_surrogate(first) && units.len() >= 2 && is_low_surrogate(units[1]) {
        char::decode_utf16([first, units[1]]).next()?.ok()
    } else {
        char::from_u32(u32::from(first))
    }
}

// \n\r?\n at the very end.
fn ends_with_blank_line(units: &[u16]) -> bool {
    let n = units.len();
    (n >= 2 && units[n - 2] == LINE_FEED && units[n - 1] == LINE_FEED)
        || (n >= 3
            && units[n - 3] == LINE_FEED
            && units[n - 2] == CARRIAGE_RETURN
            && units[n - 1] == LINE_FEED)
}

// \r?\n\r?\n at the very start.
fn starts_with_blank_line(units: &[u16]) -> bool {
    let mut i = 0;
    if units.first() == Some(&CARRIAGE_RETURN) {
        i = 1;
    }
    if units.get(i) != Some(&LINE_FEED) {
        return false;
    }
    i += 1;
    if units.get(i) == Some(&CARRIAGE_RETURN) {
        i += 1;
    }
    units.get(i) == Some(&LINE_FEED)
}
