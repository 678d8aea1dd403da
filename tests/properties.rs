use proptest::prelude::*;

use redline::{from_delta, source_text, target_text, to_delta, Redline};

// ASCII-heavy text with the occasional accent or supplementary-plane
// character, the mix that shakes out surrogate handling.
fn any_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            8 => proptest::char::range('a', 'f'),
            3 => Just(' '),
            2 => Just('\n'),
            1 => Just('\u{00E9}'),
            1 => Just('\u{1F4A9}'),
            1 => Just('\u{1F4AA}'),
        ],
        0..40,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn diff_reconstructs_both_texts(old in any_text(), new in any_text()) {
        let rl = Redline::new();
        let diffs = rl.diff(&old, &new);
        prop_assert_eq!(source_text(&diffs), old);
        prop_assert_eq!(target_text(&diffs), new);
    }

    #[test]
    fn diff_never_splits_surrogate_pairs(old in any_text(), new in any_text()) {
        let rl = Redline::new();
        for d in rl.diff(&old, &new) {
            prop_assert!(
                String::from_utf16(d.units()).is_ok(),
                "entry splits a surrogate pair: {}",
                d
            );
        }
    }

    #[test]
    fn delta_roundtrip(old in any_text(), new in any_text()) {
        let rl = Redline::new();
        let diffs = rl.diff(&old, &new);
        let delta = to_delta(&diffs);
        prop_assert_eq!(from_delta(&old, &delta).unwrap(), diffs);
    }

    #[test]
    fn patches_apply_cleanly(old in any_text(), new in any_text()) {
        let rl = Redline::new();
        let patches = rl.make_patches(&old, &new);
        let (patched, results) = rl.patch_apply(&patches, &old);
        prop_assert_eq!(patched, new);
        prop_assert!(results.into_iter().all(|ok| ok));
    }
}
