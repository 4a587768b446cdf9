//! Benchmarks for the search hot loops.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use games_tictactoe::Position;
use ubfm::{
    CnsSearcher, DescentConfig, DescentSearcher, NoveltyOff, SearchConfig, UbfmSearcher,
    UniformEvaluator,
};

fn bench_ubfm(c: &mut Criterion) {
    let searcher = UbfmSearcher::<Position>::new(
        Arc::new(UniformEvaluator::new()),
        SearchConfig::default().with_simulations(500),
    );
    c.bench_function("ubfm_500_sims_empty_board", |b| {
        b.iter(|| searcher.think(Position::new()).unwrap())
    });
}

fn bench_descent(c: &mut Criterion) {
    c.bench_function("descent_50_sims_empty_board", |b| {
        b.iter(|| {
            let mut searcher = DescentSearcher::<Position>::new(
                Arc::new(UniformEvaluator::new()),
                DescentConfig::default().with_seed(42),
            )
            .unwrap();
            searcher.think(Position::new(), &NoveltyOff).unwrap()
        })
    });
}

fn bench_cns(c: &mut Criterion) {
    let searcher = CnsSearcher::<Position>::new(
        Arc::new(UniformEvaluator::new()),
        SearchConfig::default().with_simulations(200),
    );
    c.bench_function("cns_200_iters_empty_board", |b| {
        b.iter(|| searcher.think(Position::new()).unwrap())
    });
}

criterion_group!(benches, bench_ubfm, bench_descent, bench_cns);
criterion_main!(benches);
