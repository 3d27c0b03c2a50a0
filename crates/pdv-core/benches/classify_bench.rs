//! Criterion benchmarks for telegram classification.
//!
//! Every datagram received from a PDV is classified on the device event
//! pump, so classification sits on the hot path of the relay.
//!
//! Run with:
//! ```bash
//! cargo bench --package pdv-core --bench classify_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pdv_core::{MarkerClassifier, TelegramClassifier};

/// One telegram of each kind, plus a long line with no markers.
const BENCH_TELEGRAMS: &[(&str, &str)] = &[
    ("start", "*PDV03*Trans:1187*Atend:42 Operador: MARIA"),
    ("activity", "Item 001 7891000100103 ARROZ TIPO 1 5KG      1 x 24,90"),
    ("end", "TOTAL R$ 41,88"),
    (
        "other",
        "------------------------------------------------------------------------",
    ),
];

fn bench_classify(c: &mut Criterion) {
    let classifier = MarkerClassifier::new();
    let mut group = c.benchmark_group("classify");

    for (name, telegram) in BENCH_TELEGRAMS {
        group.bench_with_input(BenchmarkId::from_parameter(name), telegram, |b, t| {
            b.iter(|| classifier.classify(black_box(t)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
