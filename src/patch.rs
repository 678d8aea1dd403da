//! Patch construction, serialization and fuzzy application.

use std::fmt::Display;

use percent_encoding::{percent_decode_str, utf8_percent_encode};

use crate::delta::WIRE_ENCODE_SET;
use crate::diff::{
    is_high_surrogate, is_low_surrogate, source_units, target_units, units, x_index, Diff, Op,
    Redline,
};
use crate::errors::Error;

/// One hunk: a windowed run of diffs plus its offsets and lengths in the
/// source (`start1`/`length1`) and destination (`start2`/`length2`) texts,
/// all counted in UTF-16 code units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub(crate) diffs: Vec<Diff>,
    pub(crate) start1: usize,
    pub(crate) start2: usize,
    pub(crate) length1: usize,
    pub(crate) length2: usize,
}

pub type Patches = Vec<Patch>;

impl Patch {
    pub fn diffs(&self) -> &[Diff] {
        &self.diffs
    }

    pub fn start1(&self) -> usize {
        self.start1
    }

    pub fn start2(&self) -> usize {
        self.start2
    }

    pub fn length1(&self) -> usize {
        self.length1
    }

    pub fn length2(&self) -> usize {
        self.length2
    }
}

impl Display for Patch {
    /// GNU diff-style hunk text. Header indices are 1-based; a length of 1
    /// omits the `,length` part and a length of 0 keeps the 0-based start.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let coords1 = if self.length1 == 0 {
            format!("{},0", self.start1)
        } else if self.length1 == 1 {
            format!("{}", self.start1 + 1)
        } else {
            format!("{},{}", self.start1 + 1, self.length1)
        };
        let coords2 = if self.length2 == 0 {
            format!("{},0", self.start2)
        } else if self.length2 == 1 {
            format!("{}", self.start2 + 1)
        } else {
            format!("{},{}", self.start2 + 1, self.length2)
        };

        writeln!(f, "@@ -{coords1} +{coords2} @@")?;
        for diff in &self.diffs {
            let sign = match diff.op() {
                Op::Insert => '+',
                Op::Delete => '-',
                Op::Equal => ' ',
            };
            writeln!(
                f,
                "{sign}{}",
                utf8_percent_encode(&diff.text(), WIRE_ENCODE_SET)
            )?;
        }
        Ok(())
    }
}

/// Render a patch list as a block of text for storage or transmission.
pub fn patches_to_text(patches: &[Patch]) -> String {
    patches.iter().map(ToString::to_string).collect()
}

/// Parse a block of patch text produced by [`patches_to_text`].
pub fn patches_from_text(text: &str) -> Result<Patches, Error> {
    let mut patches = Vec::new();
    if text.is_empty() {
        return Ok(patches);
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.is_empty() {
            i += 1;
            continue;
        }

        let header = parse_patch_header(line)
            .ok_or_else(|| Error::MalformedPatch(format!("invalid header: {line:?}")))?;
        let mut patch = Patch::default();
        let (start1, cols1, start2, cols2) = header;

        // A missing length means 1; a zero length keeps the 0-based start.
        match cols1 {
            None => {
                patch.start1 = start1
                    .checked_sub(1)
                    .ok_or_else(|| Error::MalformedPatch(format!("invalid header: {line:?}")))?;
                patch.length1 = 1;
            }
            Some(0) => {
                patch.start1 = start1;
                patch.length1 = 0;
            }
            Some(n) => {
                patch.start1 = start1
                    .checked_sub(1)
                    .ok_or_else(|| Error::MalformedPatch(format!("invalid header: {line:?}")))?;
                patch.length1 = n;
            }
        }
        match cols2 {
            None => {
                patch.start2 = start2
                    .checked_sub(1)
                    .ok_or_else(|| Error::MalformedPatch(format!("invalid header: {line:?}")))?;
                patch.length2 = 1;
            }
            Some(0) => {
                patch.start2 = start2;
                patch.length2 = 0;
            }
            Some(n) => {
                patch.start2 = start2
                    .checked_sub(1)
                    .ok_or_else(|| Error::MalformedPatch(format!("invalid header: {line:?}")))?;
                patch.length2 = n;
            }
        }
        i += 1;

        while i < lines.len() {
            let line = lines[i];
            if line.is_empty() {
                i += 1;
                continue;
            }
            let Some(sign) = line.chars().next() else {
                i += 1;
                continue;
            };
            if sign == '@' {
                // Start of the next patch.
                break;
            }
            let body = percent_decode_str(&line[sign.len_utf8()..])
                .decode_utf8()
                .map_err(|_| Error::MalformedPatch(format!("invalid escape in line {line:?}")))?;
            match sign {
                '+' => patch.diffs.push(Diff::insert(&body)),
                '-' => patch.diffs.push(Diff::delete(&body)),
                ' ' => patch.diffs.push(Diff::equal(&body)),
                _ => {
                    return Err(Error::MalformedPatch(format!(
                        "invalid line prefix: {line:?}"
                    )));
                }
            }
            i += 1;
        }

        // The header must agree with the body it announces.
        let len1: usize = patch
            .diffs
            .iter()
            .filter(|d| d.op() != Op::Insert)
            .map(|d| d.len())
            .sum();
        let len2: usize = patch
            .diffs
            .iter()
            .filter(|d| d.op() != Op::Delete)
            .map(|d| d.len())
            .sum();
        if len1 != patch.length1 || len2 != patch.length2 {
            return Err(Error::MalformedPatch(format!(
                "header announces {}/{} code units but the body holds {len1}/{len2}",
                patch.length1, patch.length2
            )));
        }

        patches.push(patch);
    }

    Ok(patches)
}

fn parse_patch_header(line: &str) -> Option<(usize, Option<usize>, usize, Option<usize>)> {
    let rest = line.strip_prefix("@@ -")?;
    let (coords1, rest) = rest.split_once(" +")?;
    let (coords2, tail) = rest.split_once(" @@")?;
    if !tail.is_empty() {
        return None;
    }
    let (start1, cols1) = parse_coords(coords1)?;
    let (start2, cols2) = parse_coords(coords2)?;
    Some((start1, cols1, start2, cols2))
}

fn parse_coords(s: &str) -> Option<(usize, Option<usize>)> {
    match s.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, Some(len.parse().ok()?))),
        None => Some((s.parse().ok()?, None)),
    }
}

impl Redline {
    /// Compute a list of patches turning `old` into `new`.
    ///
    /// # Example
    /// ```
    /// use redline::Redline;
    ///
    /// let rl = Redline::new();
    /// let patches = rl.make_patches("Apples are a fruit.", "Bananas are also fruit.");
    /// let (patched, applied) = rl.patch_apply(&patches, "Apples are a fruit.");
    /// assert_eq!("Bananas are also fruit.", patched);
    /// assert!(applied.iter().all(|&ok| ok));
    /// ```
    pub fn make_patches(&self, old: &str, new: &str) -> Patches {
        let mut diffs = self.diff(old, new);
        if diffs.len() > 2 {
            crate::cleanup::cleanup_semantic(&mut diffs);
            self.cleanup_efficiency(&mut diffs);
        }
        self.build_patches(&units(old), &diffs)
    }

    /// Patches from a precomputed edit script; the source text is rebuilt
    /// from the script itself.
    pub fn patches_from_diffs(&self, diffs: &[Diff]) -> Patches {
        self.build_patches(&source_units(diffs), diffs)
    }

    /// Patches from the source text plus a precomputed edit script. The
    /// preferred form when both are already at hand.
    pub fn patches_from_source_diffs(&self, old: &str, diffs: &[Diff]) -> Patches {
        self.build_patches(&units(old), diffs)
    }

    fn build_patches(&self, source: &[u16], diffs: &[Diff]) -> Patches {
        if diffs.is_empty() {
            return Vec::new();
        }

        let margin = self.patch_margin();
        let mut patches = Vec::new();
        let mut patch = Patch::default();
        let mut char_count1 = 0;
        let mut char_count2 = 0;
        // Recreate the patched text as we go, so later hunks get a rolling
        // context instead of unidiff's static one.
        let mut prepatch: Vec<u16> = source.to_vec();
        let mut postpatch: Vec<u16> = source.to_vec();

        for (i, diff) in diffs.iter().enumerate() {
            if patch.diffs.is_empty() && diff.op() != Op::Equal {
                // A new patch starts here.
                patch.start1 = char_count1;
                patch.start2 = char_count2;
            }

            match diff.op() {
                Op::Insert => {
                    patch.length2 += diff.len();
                    postpatch.splice(char_count2..char_count2, diff.data().iter().copied());
                    patch.diffs.push(diff.clone());
                }
                Op::Delete => {
                    patch.length1 += diff.len();
                    postpatch.drain(char_count2..char_count2 + diff.len());
                    patch.diffs.push(diff.clone());
                }
                Op::Equal => {
                    if diff.len() <= 2 * margin && !patch.diffs.is_empty() && i + 1 != diffs.len()
                    {
                        // Small equality inside a patch.
                        patch.length1 += diff.len();
                        patch.length2 += diff.len();
                        patch.diffs.push(diff.clone());
                    } else if diff.len() >= 2 * margin && !patch.diffs.is_empty() {
                        // Time for a new patch.
                        self.add_context(&mut patch, &prepatch);
                        patches.push(std::mem::take(&mut patch));
                        // Update prepatch to reflect the application of the
                        // patch just completed.
                        prepatch.clone_from(&postpatch);
                        char_count1 = char_count2;
                    }
                }
            }

            if diff.op() != Op::Insert {
                char_count1 += diff.len();
            }
            if diff.op() != Op::Delete {
                char_count2 += diff.len();
            }
        }

        // Pick up the leftover patch if not empty.
        if !patch.diffs.is_empty() {
            self.add_context(&mut patch, &prepatch);
            patches.push(patch);
        }

        patches
    }

    // Increase the context until the patch pattern is unique in `text`, but
    // don't let it expand beyond what the match engine can take.
    pub(crate) fn add_context(&self, patch: &mut Patch, text: &[u16]) {
        if text.is_empty() {
            return;
        }

        let margin = self.patch_margin();
        let mut padding = 0;

        // Grow the window until the pattern is unique in the text, but not
        // beyond what the match engine can take.
        let mut win_begin = patch.start2.min(text.len());
        let mut win_end = (patch.start2 + patch.length1).min(text.len());
        loop {
            let pattern = &text[win_begin..win_end];
            if first_index(text, pattern) == last_index(text, pattern)
                || pattern.len() >= self.max_pattern_bits().saturating_sub(2 * margin)
            {
                break;
            }
            padding += margin;
            let grown_begin = patch.start2.saturating_sub(padding);
            let grown_end = (patch.start2 + patch.length1 + padding).min(text.len());
            if grown_begin == win_begin && grown_end == win_end {
                // Cannot grow any further.
                break;
            }
            win_begin = grown_begin;
            win_end = grown_end;
        }
        // One chunk of margin for luck.
        padding += margin;

        // Prefix context, never starting inside a surrogate pair.
        let mut begin = patch.start2.saturating_sub(padding).min(text.len());
        if begin > 0 && begin < text.len() && is_low_surrogate(text[begin]) && is_high_surrogate(text[begin - 1]) {
            begin -= 1;
        }
        let prefix = &text[begin..patch.start2.min(text.len())];
        if !prefix.is_empty() {
            patch.diffs.insert(0, Diff::eq(prefix));
        }

        // Suffix context, never ending inside one.
        let start = (patch.start2 + patch.length1).min(text.len());
        let mut end = (patch.start2 + patch.length1 + padding).min(text.len());
        if end > 0 && end < text.len() && is_low_surrogate(text[end]) && is_high_surrogate(text[end - 1])
        {
            end += 1;
        }
        let suffix = &text[start..end];
        if !suffix.is_empty() {
            patch.diffs.push(Diff::eq(suffix));
        }

        // Roll back the start points and extend the lengths.
        patch.start1 -= prefix.len();
        patch.start2 -= prefix.len();
        patch.length1 += prefix.len() + suffix.len();
        patch.length2 += prefix.len() + suffix.len();
    }

    /// Apply `patches` to `text`, locating each hunk fuzzily when the text
    /// has drifted. Returns the patched text plus one flag per input patch;
    /// a hunk that cannot be confidently located is reported as not applied
    /// and the rest continue. Partial success is an expected outcome, not
    /// an error.
    pub fn patch_apply(&self, patches: &[Patch], text: &str) -> (String, Vec<bool>) {
        let (out, results) = self.patch_apply_units(patches, &units(text));
        (String::from_utf16_lossy(&out), results)
    }

    fn patch_apply_units(&self, patches: &[Patch], source: &[u16]) -> (Vec<u16>, Vec<bool>) {
        if patches.is_empty() {
            return (source.to_vec(), Vec::new());
        }

        let deadline = self.deadline();
        let max_bits = self.max_pattern_bits();

        // Work on a deep copy so the caller's patches are never mutated.
        let mut padded: Patches = patches.to_vec();
        let null_pad = self.padding_units();
        let mut source = [&null_pad[..], source, &null_pad[..]].concat();
        self.add_padding_units(&mut padded);

        // Break oversized patches apart, remembering which input patch each
        // piece came from so the result flags line up with the input.
        let mut pieces: Vec<(usize, Patch)> = Vec::new();
        for (i, p) in padded.into_iter().enumerate() {
            if p.length1 > max_bits {
                pieces.extend(self.split_patch(p).into_iter().map(|piece| (i, piece)));
            } else {
                pieces.push((i, p));
            }
        }

        let mut results = vec![true; patches.len()];
        // Offset between the expected and actual location of the previous
        // patch: if the first patch was found 2 units later than expected,
        // the second is searched for 2 units later too.
        let mut delta: isize = 0;

        for (origin, p) in &pieces {
            let expected_loc = (p.start2 as isize + delta).max(0) as usize;
            let txt_old = source_units(&p.diffs);

            let (start_loc, end_loc) = if txt_old.len() > max_bits {
                // split_patch only leaves an oversized pattern for a monster
                // deletion: anchor on its head and tail separately.
                match self.locate(&source, &txt_old[..max_bits], expected_loc) {
                    Some(sl) => {
                        let el = self.locate(
                            &source,
                            &txt_old[txt_old.len() - max_bits..],
                            expected_loc + txt_old.len() - max_bits,
                        );
                        match el {
                            // No valid trailing context: drop this patch.
                            Some(el) if sl < el => (Some(sl), Some(el)),
                            _ => (None, None),
                        }
                    }
                    None => (None, None),
                }
            } else {
                (self.locate(&source, &txt_old, expected_loc), None)
            };

            let Some(sl) = start_loc else {
                // No match found. Subtract the delta for this failed patch
                // from subsequent patches.
                results[*origin] = false;
                delta -= p.length2 as isize - p.length1 as isize;
                continue;
            };

            delta = sl as isize - expected_loc as isize;

            let txt_new_end = match end_loc {
                Some(el) => (el + max_bits).min(source.len()),
                None => (sl + txt_old.len()).min(source.len()),
            };
            let txt_new = source[sl..txt_new_end].to_vec();

            if txt_old == txt_new {
                // Perfect match: shove the replacement text in.
                source.splice(sl..sl + txt_old.len(), target_units(&p.diffs));
            } else {
                // Imperfect match: diff the expected against the actual text
                // and use the result as a scaffold of equivalent indices.
                let mut diffs = self.diff_range(&txt_old, &txt_new, false, 0, deadline);
                if txt_old.len() > max_bits
                    && crate::diff::levenshtein(&diffs) as f32 / txt_old.len() as f32
                        > self.delete_threshold()
                {
                    // The end points match but the content is unacceptably bad.
                    results[*origin] = false;
                } else {
                    crate::cleanup::cleanup_semantic_lossless(&mut diffs);
                    let mut index1 = 0;
                    for diff in &p.diffs {
                        if diff.op() != Op::Equal {
                            let index2 = x_index(&diffs, index1);
                            match diff.op() {
                                Op::Insert => {
                                    source.splice(
                                        sl + index2..sl + index2,
                                        diff.data().iter().copied(),
                                    );
                                }
                                Op::Delete => {
                                    let del_end = sl + x_index(&diffs, index1 + diff.len());
                                    source.drain(sl + index2..del_end);
                                }
                                Op::Equal => {}
                            }
                        }
                        if diff.op() != Op::Delete {
                            index1 += diff.len();
                        }
                    }
                }
            }
        }

        // Strip the padding off.
        let start = null_pad.len().min(source.len());
        let end = source.len().saturating_sub(null_pad.len()).max(start);
        (source[start..end].to_vec(), results)
    }

    /// Pad every patch edge with the margin-sized null-character string so
    /// edits at the text boundaries have context to match against. Returns
    /// the padding string used; [`patch_apply`](Self::patch_apply) calls
    /// this internally and strips it again.
    pub fn add_padding(&self, patches: &mut Patches) -> String {
        let pad = self.padding_units();
        self.add_padding_units(patches);
        String::from_utf16_lossy(&pad)
    }

    pub(crate) fn padding_units(&self) -> Vec<u16> {
        (1..=self.patch_margin()).map(|c| c as u16).collect()
    }

    fn add_padding_units(&self, patches: &mut Patches) {
        let null_pad = self.padding_units();
        let pad_len = null_pad.len();

        // Bump all the patches forward.
        for p in patches.iter_mut() {
            p.start1 += pad_len;
            p.start2 += pad_len;
        }

        // Add some padding on the start of the first diff.
        if let Some(first) = patches.first_mut() {
            let needs_pad = first.diffs.first().map_or(true, |d| d.op() != Op::Equal);
            if needs_pad {
                first.diffs.insert(0, Diff::eq(&null_pad));
                first.start1 -= pad_len;
                first.start2 -= pad_len;
                first.length1 += pad_len;
                first.length2 += pad_len;
            } else if let Some(d) = first.diffs.first_mut() {
                if pad_len > d.len() {
                    // Grow the first equality.
                    let extra = pad_len - d.len();
                    let mut data = null_pad[d.len()..].to_vec();
                    data.extend_from_slice(d.data());
                    d.set_data(data);
                    first.start1 -= extra;
                    first.start2 -= extra;
                    first.length1 += extra;
                    first.length2 += extra;
                }
            }
        }

        // And on the end of the last diff.
        if let Some(last) = patches.last_mut() {
            let needs_pad = last.diffs.last().map_or(true, |d| d.op() != Op::Equal);
            if needs_pad {
                last.diffs.push(Diff::eq(&null_pad));
                last.length1 += pad_len;
                last.length2 += pad_len;
            } else if let Some(d) = last.diffs.last_mut() {
                if pad_len > d.len() {
                    // Grow the last equality.
                    let extra = pad_len - d.len();
                    d.data_mut().extend_from_slice(&null_pad[..extra]);
                    last.length1 += extra;
                    last.length2 += extra;
                }
            }
        }
    }

    /// Break up any patch whose source span exceeds the bitap bit width
    /// into smaller patches re-padded with margin context, preserving the
    /// total edit.
    pub fn split_max(&self, patches: &mut Patches) {
        let mut i = 0;
        while i < patches.len() {
            if patches[i].length1 <= self.max_pattern_bits() {
                i += 1;
                continue;
            }
            let big = patches.remove(i);
            let pieces = self.split_patch(big);
            let count = pieces.len();
            patches.splice(i..i, pieces);
            i += count;
        }
    }

    fn split_patch(&self, mut bigpatch: Patch) -> Vec<Patch> {
        let patch_size = self.max_pattern_bits();
        let margin = self.patch_margin();
        let mut start1 = bigpatch.start1;
        let mut start2 = bigpatch.start2;
        let mut precontext: Vec<u16> = Vec::new();
        let mut pieces: Vec<Patch> = Vec::new();

        while !bigpatch.diffs.is_empty() {
            // Create one of several smaller patches.
            let mut patch = Patch::default();
            let mut empty = true;

            patch.start1 = start1.saturating_sub(precontext.len());
            patch.start2 = start2.saturating_sub(precontext.len());
            if !precontext.is_empty() {
                patch.length1 = precontext.len();
                patch.length2 = precontext.len();
                patch.diffs.push(Diff::eq(&precontext));
            }

            while !bigpatch.diffs.is_empty()
                && patch.length1 < patch_size.saturating_sub(margin)
            {
                let op = bigpatch.diffs[0].op();
                if op == Op::Insert {
                    // Insertions are harmless.
                    patch.length2 += bigpatch.diffs[0].len();
                    start2 += bigpatch.diffs[0].len();
                    let d = bigpatch.diffs.remove(0);
                    patch.diffs.push(d);
                    empty = false;
                } else if op == Op::Delete
                    && patch.diffs.len() == 1
                    && patch.diffs[0].op() == Op::Equal
                    && bigpatch.diffs[0].len() > 2 * patch_size
                {
                    // A monster delete: let it pass in one chunk.
                    patch.length1 += bigpatch.diffs[0].len();
                    start1 += bigpatch.diffs[0].len();
                    empty = false;
                    let d = bigpatch.diffs.remove(0);
                    patch.diffs.push(d);
                } else {
                    // Deletion or equality: take as much as we can stomach.
                    let mut take = bigpatch.diffs[0]
                        .len()
                        .min(patch_size - patch.length1 - margin);
                    // Never cut between the halves of a surrogate pair.
                    if take < bigpatch.diffs[0].len()
                        && is_high_surrogate(bigpatch.diffs[0].data()[take - 1])
                        && is_low_surrogate(bigpatch.diffs[0].data()[take])
                    {
                        take += 1;
                    }

                    patch.length1 += take;
                    start1 += take;
                    if op == Op::Equal {
                        patch.length2 += take;
                        start2 += take;
                    } else {
                        empty = false;
                    }

                    patch
                        .diffs
                        .push(Diff::from_units(op, &bigpatch.diffs[0].data()[..take]));

                    if take == bigpatch.diffs[0].len() {
                        bigpatch.diffs.remove(0);
                    } else {
                        let rest = bigpatch.diffs[0].data()[take..].to_vec();
                        bigpatch.diffs[0].set_data(rest);
                    }
                }
            }

            // Compute the head context for the next patch.
            precontext = target_units(&patch.diffs);
            if precontext.len() > margin {
                let mut cut = precontext.len() - margin;
                if cut > 0
                    && cut < precontext.len()
                    && is_low_surrogate(precontext[cut])
                    && is_high_surrogate(precontext[cut - 1])
                {
                    cut -= 1;
                }
                precontext.drain(..cut);
            }

            // Append the end context for this patch.
            let mut postcontext = source_units(&bigpatch.diffs);
            if postcontext.len() > margin {
                let mut take = margin;
                if take > 0
                    && take < postcontext.len()
                    && is_low_surrogate(postcontext[take])
                    && is_high_surrogate(postcontext[take - 1])
                {
                    take += 1;
                }
                postcontext.truncate(take);
            }
            if !postcontext.is_empty() {
                patch.length1 += postcontext.len();
                patch.length2 += postcontext.len();
                let appended = match patch.diffs.last_mut() {
                    Some(d) if d.op() == Op::Equal => {
                        d.data_mut().extend_from_slice(&postcontext);
                        true
                    }
                    _ => false,
                };
                if !appended {
                    patch.diffs.push(Diff::eq(&postcontext));
                }
            }

            if !empty {
                pieces.push(patch);
            }
        }

        pieces
    }
}

fn first_index(text: &[u16], pattern: &[u16]) -> Option<usize> {
    crate::diff::find_subsequence(text, pattern)
}

fn last_index(text: &[u16], pattern: &[u16]) -> Option<usize> {
    if pattern.is_empty() {
        return Some(text.len());
    }
    if pattern.len() > text.len() {
        return None;
    }
    (0..=text.len() - pattern.len())
        .rev()
        .find(|&s| text[s..s + pattern.len()] == pattern[..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_text_roundtrip() {
        let cases = [
            "@@ -21,18 +22,17 @@\n jump\n-s\n+ed\n  over \n-the\n+a\n %0Alaz\n",
            "@@ -1,9 +1,9 @@\n-f\n+F\n oo+fooba\n@@ -7,9 +7,9 @@\n obar\n-,\n+.\n  tes\n",
            "@@ -1,3 +0,0 @@\n-abc\n",
            "@@ -0,0 +1,3 @@\n+abc\n",
        ];
        for case in cases {
            let patches = patches_from_text(case).unwrap();
            assert_eq!(case, patches_to_text(&patches), "roundtrip of {case:?}");
        }

        // Single-unit hunks omit the length.
        let patches = patches_from_text("@@ -1 +1 @@\n-a\n+b\n").unwrap();
        assert_eq!("@@ -1 +1 @@\n-a\n+b\n", patches_to_text(&patches));

        // Empty input parses to no patches.
        assert_eq!(Vec::<Patch>::new(), patches_from_text("").unwrap());
    }

    #[test]
    fn test_patch_from_text_malformed() {
        // Garbage header.
        assert!(patches_from_text("Bad\nPatch\n").is_err());
        // Unrecognized line prefix.
        assert!(patches_from_text("@@ -1,3 +1,3 @@\nxabc\n").is_err());
        // Non-numeric header fields.
        assert!(patches_from_text("@@ -a,3 +1,3 @@\n abc\n").is_err());
        // Header and body disagree about lengths.
        assert!(patches_from_text("@@ -1,5 +1,5 @@\n abc\n").is_err());
    }

    #[test]
    fn test_patch_add_context() {
        let rl = Redline::new();
        let text = "The quick brown fox jumps over the lazy dog.";

        let mut patch = patches_from_text("@@ -21,4 +21,10 @@\n-jump\n+somersault\n").unwrap()
            [0]
            .clone();
        rl.add_context(&mut patch, &units(text));
        assert_eq!(
            "@@ -17,12 +17,18 @@\n fox \n-jump\n+somersault\n s ov\n",
            patch.to_string()
        );

        // Same patch, not enough trailing context.
        let mut patch = patches_from_text("@@ -21,4 +21,10 @@\n-jump\n+somersault\n").unwrap()
            [0]
            .clone();
        rl.add_context(&mut patch, &units("The quick brown fox jumps."));
        assert_eq!(
            "@@ -17,10 +17,16 @@\n fox \n-jump\n+somersault\n s.\n",
            patch.to_string()
        );

        // Not enough leading context.
        let mut patch = patches_from_text("@@ -3 +3,2 @@\n-e\n+at\n").unwrap()[0].clone();
        rl.add_context(&mut patch, &units("The quick brown fox jumps."));
        assert_eq!("@@ -1,7 +1,8 @@\n Th\n-e\n+at\n  qui\n", patch.to_string());

        // Ambiguous pattern forces the window wider.
        let mut patch = patches_from_text("@@ -3 +3,2 @@\n-e\n+at\n").unwrap()[0].clone();
        rl.add_context(
            &mut patch,
            &units("The quick brown fox jumps.  The quick brown fox crashes."),
        );
        assert_eq!(
            "@@ -1,27 +1,28 @@\n Th\n-e\n+at\n  quick brown fox jumps. \n",
            patch.to_string()
        );
    }

    #[test]
    fn test_make_patches() {
        let rl = Redline::new();

        // Null case.
        assert_eq!(
            "",
            patches_to_text(&rl.make_patches("", ""))
        );

        let text1 = "The quick brown fox jumps over the lazy dog.";
        let text2 = "That quick brown fox jumped over a lazy dog.";

        // The second patch of text2-to-text1 must be "-21,17 +21,18" and not
        // "-22,17 +21,18" due to the rolling context.
        let expected = "@@ -1,8 +1,7 @@\n Th\n-at\n+e\n  qui\n@@ -21,17 +21,18 @@\n jump\n-ed\n+s\n  over \n-a\n+the\n  laz\n";
        assert_eq!(expected, patches_to_text(&rl.make_patches(text2, text1)));

        let expected = "@@ -1,11 +1,12 @@\n Th\n-e\n+at\n  quick b\n@@ -22,18 +22,17 @@\n jump\n-s\n+ed\n  over \n-the\n+a\n  laz\n";
        assert_eq!(expected, patches_to_text(&rl.make_patches(text1, text2)));

        // From precomputed diffs.
        let mut rl2 = Redline::new();
        rl2.set_checklines(false);
        let diffs = rl2.diff(text1, text2);
        assert_eq!(expected, patches_to_text(&rl2.patches_from_diffs(&diffs)));
        assert_eq!(
            expected,
            patches_to_text(&rl2.patches_from_source_diffs(text1, &diffs))
        );

        // Character encoding.
        let patches = rl.make_patches(
            "`1234567890-=[]\\;',./",
            "~!@#$%^&*()_+{}|:\"<>?",
        );
        assert_eq!(
            "@@ -1,21 +1,21 @@\n-%601234567890-=%5B%5D%5C;',./\n+~!@#$%25%5E&*()_+%7B%7D%7C:%22%3C%3E?\n",
            patches_to_text(&patches)
        );

        // Character decoding.
        let patches = patches_from_text(
            "@@ -1,21 +1,21 @@\n-%601234567890-=%5B%5D%5C;',./\n+~!@#$%25%5E&*()_+%7B%7D%7C:%22%3C%3E?\n",
        )
        .unwrap();
        assert_eq!(
            vec![
                Diff::delete("`1234567890-=[]\\;',./"),
                Diff::insert("~!@#$%^&*()_+{}|:\"<>?"),
            ],
            patches[0].diffs
        );

        // Long string with repeats.
        let text1 = "abcdef".repeat(100);
        let text2 = format!("{text1}123");
        let expected = "@@ -573,28 +573,31 @@\n cdefabcdefabcdefabcdefabcdef\n+123\n";
        assert_eq!(expected, patches_to_text(&rl.make_patches(&text1, &text2)));
    }

    #[test]
    fn test_add_padding() {
        let rl = Redline::new();

        // Both edges full.
        let mut patches = rl.make_patches("", "test");
        assert_eq!("@@ -0,0 +1,4 @@\n+test\n", patches_to_text(&patches));
        let pad = rl.add_padding(&mut patches);
        assert_eq!("\u{1}\u{2}\u{3}\u{4}", pad);
        assert_eq!(
            "@@ -1,8 +1,12 @@\n %01%02%03%04\n+test\n %01%02%03%04\n",
            patches_to_text(&patches)
        );

        // Both edges partial.
        let mut patches = rl.make_patches("XY", "XtestY");
        assert_eq!("@@ -1,2 +1,6 @@\n X\n+test\n Y\n", patches_to_text(&patches));
        rl.add_padding(&mut patches);
        assert_eq!(
            "@@ -2,8 +2,12 @@\n %02%03%04X\n+test\n Y%01%02%03\n",
            patches_to_text(&patches)
        );

        // Both edges none.
        let mut patches = rl.make_patches("XXXXYYYY", "XXXXtestYYYY");
        assert_eq!(
            "@@ -1,8 +1,12 @@\n XXXX\n+test\n YYYY\n",
            patches_to_text(&patches)
        );
        rl.add_padding(&mut patches);
        assert_eq!(
            "@@ -5,8 +5,12 @@\n XXXX\n+test\n YYYY\n",
            patches_to_text(&patches)
        );
    }

    #[test]
    fn test_split_max() {
        let rl = Redline::new();

        let mut patches = rl.make_patches(
            "abcdefghijklmnopqrstuvwxyz01234567890",
            "XabXcdXefXghXijXklXmnXopXqrXstXuvXwxXyzX01X23X45X67X89X0",
        );
        rl.split_max(&mut patches);
        assert_eq!(
            "@@ -1,32 +1,46 @@\n+X\n ab\n+X\n cd\n+X\n ef\n+X\n gh\n+X\n ij\n+X\n kl\n+X\n mn\n+X\n op\n+X\n qr\n+X\n st\n+X\n uv\n+X\n wx\n+X\n yz\n+X\n 012345\n@@ -25,13 +39,18 @@\n zX01\n+X\n 23\n+X\n 45\n+X\n 67\n+X\n 89\n+X\n 0\n",
            patches_to_text(&patches)
        );

        // A patch without an oversized span is left alone.
        let mut patches = rl.make_patches(
            "abcdef1234567890123456789012345678901234567890123456789012345678901234567890uvwxyz",
            "abcdefuvwxyz",
        );
        let before = patches_to_text(&patches);
        rl.split_max(&mut patches);
        assert_eq!(before, patches_to_text(&patches));

        let mut patches = rl.make_patches(
            "abcdefghij , h : 0 , t : 1 abcdefghij , h : 0 , t : 1 abcdefghij , h : 0 , t : 1",
            "abcdefghij , h : 1 , t : 1 abcdefghij , h : 1 , t : 1 abcdefghij , h : 0 , t : 1",
        );
        rl.split_max(&mut patches);
        assert_eq!(
            "@@ -2,32 +2,32 @@\n bcdefghij , h : \n-0\n+1\n  , t : 1 abcdef\n@@ -29,32 +29,32 @@\n bcdefghij , h : \n-0\n+1\n  , t : 1 abcdef\n",
            patches_to_text(&patches)
        );
    }
}
