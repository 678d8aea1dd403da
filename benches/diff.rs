use criterion::{criterion_group, criterion_main, Criterion};
use redline::Redline;

// Deterministic pseudo-prose so runs are comparable without fixture files.
fn build_text(mut seed: u64, paragraphs: usize) -> String {
    const WORDS: [&str; 12] = [
        "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india",
        "juliet", "kilo", "lima",
    ];
    let mut out = String::new();
    for p in 0..paragraphs {
        for _ in 0..40 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            out.push_str(WORDS[(seed >> 33) as usize % WORDS.len()]);
            out.push(' ');
        }
        out.push('\n');
        if p % 7 == 0 {
            out.push('\n');
        }
    }
    out
}

fn bench_diff(c: &mut Criterion) {
    let old = build_text(1, 40);
    let new = build_text(2, 40);
    let rl = Redline::new();

    c.bench_function("diff", |b| b.iter(|| rl.diff(&old, &new)));
}

fn bench_patch_roundtrip(c: &mut Criterion) {
    let old = build_text(1, 40);
    let new = build_text(2, 40);
    let rl = Redline::new();

    c.bench_function("patch make+apply", |b| {
        b.iter(|| {
            let patches = rl.make_patches(&old, &new);
            rl.patch_apply(&patches, &old)
        })
    });
}

criterion_group!(benches, bench_diff, bench_patch_roundtrip);
criterion_main!(benches);
