use thiserror::Error;

/// Failures surfaced by the decoding and matching entry points.
///
/// Diffing, cleanup and patch application never fail: a patch that cannot be
/// located is reported through its boolean flag instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A delta string could not be decoded against its source text.
    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    /// A patch text block could not be parsed.
    #[error("malformed patch text: {0}")]
    MalformedPatch(String),

    /// A match pattern is longer than the configured bitap bit width.
    #[error("pattern of {len} code units exceeds the {max}-bit match limit")]
    PatternTooLong { len: usize, max: usize },
}
