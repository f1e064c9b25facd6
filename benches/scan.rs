// Copyright 2025 Recoshard Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Preference file scan benchmark
//!
//! Run with: cargo bench --bench scan
//!
//! Measures one full sequential pass over a 20K-set file for different
//! read-ahead sizes, and a like served end to end by the scheduler.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use recoshard::{PreferenceFile, PreferenceSet, PreferenceSource, Recommender, StoreConfig};
use tempfile::TempDir;

const SET_COUNT: u64 = 20_000;

fn seed(dir: &TempDir) -> StoreConfig {
    let config = StoreConfig::new(dir.path().join("bench.dat"));
    let mut store = PreferenceFile::open_with_config(&config).unwrap();
    let mut sets: Vec<PreferenceSet> = (0..SET_COUNT)
        .map(|owner| {
            let ids = (0..owner % 32).map(|i| (owner * 31 + i * 7) % 10_000).collect();
            PreferenceSet::new(owner, 0, ids, 0)
        })
        .collect();
    store.add(&mut sets).unwrap();
    store.close().unwrap();
    config
}

fn bench_scan(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let config = seed(&dir);

    let mut group = c.benchmark_group("full_scan");
    group.sample_size(20);
    for read_ahead in [1usize, 100, 1000] {
        let config = config.clone().with_read_ahead(read_ahead);
        let mut store = PreferenceFile::open_with_config(&config).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(read_ahead),
            &read_ahead,
            |b, _| {
                b.iter(|| {
                    store.rewind().unwrap();
                    let mut entities = 0usize;
                    while let Some(set) = store.next().unwrap() {
                        entities += set.len();
                    }
                    black_box(entities)
                })
            },
        );
    }
    group.finish();
}

fn bench_like_round_trip(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let config = seed(&dir);
    let shard = Recommender::open(&config).unwrap();

    let mut entity = 0u64;
    c.bench_function("like_round_trip", |b| {
        b.iter(|| {
            entity += 1;
            black_box(shard.add_preference(7, 1_000_000 + entity).wait().unwrap())
        })
    });
    shard.shutdown().unwrap();
}

criterion_group!(benches, bench_scan, bench_like_round_trip);
criterion_main!(benches);
