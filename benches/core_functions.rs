//! Benchmarks for core fgpolish functions.
//!
//! Run with: `cargo bench`
//! View reports in: `target/criterion/report/index.html`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use fgpolish_lib::candidates::{all_repeat_mutations, all_site_mutations};
use fgpolish_lib::dna::reverse_complement;
use fgpolish_lib::integrator::{Integrator, IntegratorConfig};
use fgpolish_lib::mutation::{apply_mutations, Mutation};
use fgpolish_lib::polish::RepeatConfig;
use fgpolish_lib::qv::probability_to_qv;

/// Deterministic pseudo-random template of the given length.
fn synthetic_template(len: usize) -> Vec<u8> {
    const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            BASES[(state >> 33) as usize % 4]
        })
        .collect()
}

fn bench_apply_mutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_mutations");

    for len in [100usize, 1_000, 10_000] {
        let tpl = synthetic_template(len);
        let muts: Vec<Mutation> = (0..len / 20)
            .map(|i| {
                let start = i * 20;
                match i % 3 {
                    0 => Mutation::substitution(start, b"T".to_vec()),
                    1 => Mutation::insertion(start, b"AC".to_vec()),
                    _ => Mutation::deletion(start, 1),
                }
            })
            .collect();

        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                let mut batch = muts.clone();
                black_box(apply_mutations(black_box(&tpl), &mut batch))
            });
        });
    }

    group.finish();
}

fn bench_candidate_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("candidates");

    for len in [100usize, 1_000, 10_000] {
        let ai = Integrator::new(synthetic_template(len), IntegratorConfig::default());

        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("site_mutations", len), &len, |b, _| {
            b.iter(|| black_box(all_site_mutations(black_box(&ai), false)));
        });

        let cfg = RepeatConfig::default();
        group.bench_with_input(BenchmarkId::new("repeat_mutations", len), &len, |b, _| {
            b.iter(|| black_box(all_repeat_mutations(black_box(&ai), &cfg)));
        });
    }

    group.finish();
}

fn bench_dna_and_qv(c: &mut Criterion) {
    let mut group = c.benchmark_group("dna_and_qv");

    let tpl = synthetic_template(10_000);
    group.bench_function("reverse_complement_10k", |b| {
        b.iter(|| black_box(reverse_complement(black_box(&tpl))));
    });

    group.bench_function("probability_to_qv", |b| {
        b.iter(|| {
            for i in 1..=1_000u32 {
                let p = f64::from(i) / 1_000.0;
                let _ = black_box(probability_to_qv(black_box(p)));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_apply_mutations, bench_candidate_enumeration, bench_dna_and_qv);
criterion_main!(benches);
