//! The delta wire format: an edit script crushed into a compact string of
//! tab-separated tokens, decodable against the original source text.
//!
//! `=3\t-2\t+ing` means keep 3 code units, delete 2, insert `ing`.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::diff::{units, Diff, Op};
use crate::errors::Error;

// The JavaScript encodeURI() character set: everything alphanumeric plus
// the characters below stays literal, including spaces.
pub(crate) const WIRE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b' ')
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'?')
    .remove(b'@')
    .remove(b'_')
    .remove(b'~');

/// Encode an edit script as delta text. Lengths count UTF-16 code units;
/// inserted text is percent-encoded.
pub fn to_delta(diffs: &[Diff]) -> String {
    let mut tokens = Vec::with_capacity(diffs.len());
    for diff in diffs {
        match diff.op() {
            Op::Insert => tokens.push(format!(
                "+{}",
                utf8_percent_encode(&diff.text(), WIRE_ENCODE_SET)
            )),
            Op::Delete => tokens.push(format!("-{}", diff.len())),
            Op::Equal => tokens.push(format!("={}", diff.len())),
        }
    }
    tokens.join("\t")
}

/// Rebuild the full edit script from `source` (the original text) and a
/// delta produced by [`to_delta`]. Keep and delete tokens carry only
/// lengths, so the source is required to recover their content.
pub fn from_delta(source: &str, delta: &str) -> Result<Vec<Diff>, Error> {
    let source = units(source);
    let mut diffs = Vec::new();
    // Cursor into `source`.
    let mut pointer = 0;

    for token in delta.split('\t') {
        if token.is_empty() {
            // Blank tokens are ok, e.g. from a trailing tab.
            continue;
        }

        // Each token begins with a one-character parameter specifying its
        // operation.
        let Some(op) = token.chars().next() else {
            continue;
        };
        let param = &token[op.len_utf8()..];

        match op {
            '+' => {
                let decoded = percent_decode_str(param).decode_utf8().map_err(|_| {
                    Error::MalformedDelta(format!("invalid escape sequence in {param:?}"))
                })?;
                diffs.push(Diff::insert(&decoded));
            }
            '-' | '=' => {
                let n: usize = param.parse().map_err(|_| {
                    Error::MalformedDelta(format!("invalid length in token {token:?}"))
                })?;
                let end = pointer + n;
                if end > source.len() {
                    return Err(Error::MalformedDelta(format!(
                        "token {token:?} overruns the source text"
                    )));
                }
                let slice = &source[pointer..end];
                if String::from_utf16(slice).is_err() {
                    return Err(Error::MalformedDelta(format!(
                        "token {token:?} splits a surrogate pair"
                    )));
                }
                pointer = end;
                diffs.push(if op == '=' {
                    Diff::eq(slice)
                } else {
                    Diff::del(slice)
                });
            }
            _ => {
                return Err(Error::MalformedDelta(format!(
                    "unknown operation in token {token:?}"
                )));
            }
        }
    }

    if pointer != source.len() {
        return Err(Error::MalformedDelta(format!(
            "delta consumed {pointer} of {} source code units",
            source.len()
        )));
    }

    Ok(diffs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_roundtrip() {
        let diffs = vec![
            Diff::equal("jump"),
            Diff::delete("s"),
            Diff::insert("ed"),
            Diff::equal(" over "),
            Diff::delete("the"),
            Diff::insert("a"),
            Diff::equal(" lazy"),
            Diff::insert("old dog"),
        ];
        let text1 = crate::diff::source_text(&diffs);
        assert_eq!("jumps over the lazy", text1);

        let delta = to_delta(&diffs);
        assert_eq!("=4\t-1\t+ed\t=6\t-3\t+a\t=5\t+old dog", delta);

        // Convert delta string into a diff.
        assert_eq!(diffs, from_delta(&text1, &delta).unwrap());
    }

    #[test]
    fn test_delta_special_characters() {
        let diffs = vec![
            Diff::equal("\u{0680} \x00 \t %"),
            Diff::delete("\u{0681} \x01 \n ^"),
            Diff::insert("\u{0682} \x02 \\ |"),
        ];
        let text1 = crate::diff::source_text(&diffs);

        let delta = to_delta(&diffs);
        assert_eq!("=7\t-7\t+%DA%82 %02 %5C %7C", delta);

        assert_eq!(diffs, from_delta(&text1, &delta).unwrap());
    }

    #[test]
    fn test_delta_unchanged_characters() {
        let safe = "A-Z a-z 0-9 - _ . ! ~ * ' ( ) ; / ? : @ & = + $ , # ";
        let diffs = vec![Diff::insert(safe)];
        let delta = to_delta(&diffs);
        assert_eq!(format!("+{safe}"), delta);
        assert_eq!(diffs, from_delta("", &delta).unwrap());
    }

    #[test]
    fn test_delta_surrogate_lengths() {
        // Supplementary-plane characters count as two units.
        let diffs = vec![Diff::equal("\u{1F64F}"), Diff::delete("\u{1F645}")];
        let delta = to_delta(&diffs);
        assert_eq!("=2\t-2", delta);
        assert_eq!(
            diffs,
            from_delta("\u{1F64F}\u{1F645}", &delta).unwrap()
        );
    }

    #[test]
    fn test_delta_malformed() {
        // Delta length larger than the source.
        assert!(from_delta("jumps over the lazy", "=4\t-1\t+ed\t=6\t-3\t+a\t=5\t+old dog\t=1").is_err());
        // Delta length smaller than the source.
        assert!(from_delta("jumps over the lazyx", "=4\t-1\t+ed\t=6\t-3\t+a\t=5\t+old dog").is_err());
        // Unknown operation.
        assert!(from_delta("abc", "x3").is_err());
        // Negative length.
        assert!(from_delta("abc", "=-1").is_err());
        // Non-numeric length.
        assert!(from_delta("abc", "=x").is_err());
        // Invalid UTF-8 behind an escape.
        assert!(from_delta("", "+%DA").is_err());
        // A keep that splits a surrogate pair.
        assert!(from_delta("\u{1F64F}", "=1\t-1").is_err());
    }
}
