use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use bracketeer::{
    Participant, ResultPayload, SeedingMode, apply_seeding,
    bracket::{BracketTree, build_bracket, seed_order},
};
use chrono::Utc;
use std::hint::black_box;

fn field(n: usize) -> Vec<Participant> {
    (1..=n as i64)
        .map(|i| Participant::team(i, format!("team{i}")))
        .collect()
}

fn fresh_bracket(n: usize) -> BracketTree {
    let seeded = apply_seeding(&field(n), &SeedingMode::SlotOrder).unwrap();
    build_bracket(1, &seeded, Utc::now()).unwrap()
}

/// Benchmark seed order generation for the largest bracket
fn bench_seed_order(c: &mut Criterion) {
    c.bench_function("seed_order_1024", |b| {
        b.iter(|| seed_order(black_box(1024)));
    });
}

/// Benchmark bracket construction across field sizes
fn bench_build_bracket(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_bracket");

    for n in [5usize, 64, 257, 1000] {
        let seeded = apply_seeding(&field(n), &SeedingMode::SlotOrder).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &seeded, |b, seeded| {
            b.iter(|| build_bracket(1, black_box(seeded), Utc::now()).unwrap());
        });
    }

    group.finish();
}

/// Benchmark random seeding
fn bench_random_seeding(c: &mut Criterion) {
    let entrants = field(512);
    c.bench_function("random_seeding_512", |b| {
        b.iter(|| apply_seeding(black_box(&entrants), &SeedingMode::Random).unwrap());
    });
}

/// Benchmark playing a whole bracket through confirmed results
fn bench_play_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("play_out");

    for n in [16usize, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || fresh_bracket(n),
                |mut tree| {
                    let now = Utc::now();
                    while tree.champion().is_none() {
                        let ready: Vec<_> = tree
                            .matches()
                            .iter()
                            .filter(|m| m.filled_slots() == 2 && !m.status.is_terminal())
                            .map(|m| (m.id, m.participant1.unwrap(), m.participant2.unwrap()))
                            .collect();
                        for (id, p1, p2) in ready {
                            let payload = ResultPayload::from_scores([(p1, 2), (p2, 1)]);
                            let s = tree.submit_result(id, p1, payload, None, now).unwrap();
                            tree.confirm_result(s.id, p2, now).unwrap();
                        }
                    }
                    tree
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_seed_order,
    bench_build_bracket,
    bench_random_seeding,
    bench_play_out
);
criterion_main!(benches);
