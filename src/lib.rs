//! Diff, fuzzy match and patch over plain text.
//!
//! Computes fine-grained edit scripts between two strings, cleans them up
//! for human consumption or compact transmission, locates patterns in
//! drifted text with the bitap algorithm, and builds patches that still
//! apply after the target has been edited elsewhere.
//!
//! Everything is driven through a [`Redline`] value holding the tunables:
//!
//! ```
//! use redline::Redline;
//!
//! let rl = Redline::new();
//! let patches = rl.make_patches("Apples are a fruit.", "Bananas are also fruit.");
//!
//! // Months later, against a text that has been edited in the meantime:
//! let (patched, applied) = rl.patch_apply(&patches, "Apples are a tasty fruit.");
//! assert_eq!("Bananas are also tasty fruit.", patched);
//! assert!(applied.iter().all(|&ok| ok));
//! ```
//!
//! All offsets and lengths count UTF-16 code units, and no operation ever
//! splits a surrogate pair across an edit boundary.

pub mod cleanup;
pub mod delta;
pub mod diff;
pub mod errors;
pub mod matcher;
pub mod patch;

pub use cleanup::{cleanup_merge, cleanup_semantic, cleanup_semantic_lossless};
pub use delta::{from_delta, to_delta};
pub use diff::{
    levenshtein, pretty_html, source_text, target_text, x_index, Diff, Op, Redline,
};
pub use errors::Error;
pub use patch::{patches_from_text, patches_to_text, Patch, Patches};
