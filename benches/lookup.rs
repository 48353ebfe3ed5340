use criterion::{criterion_group, criterion_main, Criterion};

use helpers::index::TestIndex;
use review_index::{builder::BuilderOptions, wildcard::WildcardKind};

fn criterion_benchmark(c: &mut Criterion) {
    const NUM_REVIEWS: usize = 10_000;

    for wildcard in [WildcardKind::Bigram, WildcardKind::Permuterm] {
        let options = BuilderOptions {
            wildcard,
            ..Default::default()
        };
        let data = TestIndex::new(5_000, 500, NUM_REVIEWS, 20., Some(1), &options);
        let reader = data.reader(false);
        let token = data.tokens.keys().nth(100).cloned().unwrap_or_default();
        let prefix = format!("{}*", &token[..token.len().min(2)]);

        c.bench_function(&format!("postings ({})", wildcard), |b| {
            b.iter(|| reader.postings(&token))
        });
        c.bench_function(&format!("wildcard {} ({})", prefix, wildcard), |b| {
            b.iter(|| reader.matching_terms(&prefix))
        });
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().significance_level(0.1).sample_size(100);
    targets = criterion_benchmark
}
criterion_main!(benches);
