//! Session Pool Performance Benchmarks
//!
//! Measures the overhead the pool adds around a session factory. The factory
//! used here creates sessions instantly, so the numbers are pure pool cost.
//!
//! # Benchmark Groups
//!
//! - **pool_creation**: Pool construction with and without warm-up
//! - **acquire_release**: Uncontended borrow/return of an idle session
//! - **contention**: Many tasks sharing a small pool
//! - **option_resolution**: Open/copy option validation
//!
//! # Running the Benchmarks
//!
//! ```bash
//! cargo bench --bench session_pool_benchmark
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use tokio::runtime::Runtime;

use async_trait::async_trait;
use sftp_pool::options::{CopyOptions, FileOption, OpenOptions};
use sftp_pool::pool::{PoolConfig, SessionPool};
use sftp_pool::session::{ConnectionParams, SessionFactory, SessionResult};

// ============================================================================
// Instant Factory
// ============================================================================

struct InstantFactory;

#[async_trait]
impl SessionFactory for InstantFactory {
    type Session = u64;

    async fn create_session(&self, _params: &ConnectionParams) -> SessionResult<u64> {
        Ok(0)
    }

    async fn close_session(&self, _session: u64) -> SessionResult<()> {
        Ok(())
    }
}

fn params() -> ConnectionParams {
    ConnectionParams::new("bench.local", "bench")
}

fn config(initial_size: usize, max_size: usize) -> PoolConfig {
    let mut builder = PoolConfig::builder();
    builder
        .max_size(max_size)
        .unwrap()
        .initial_size(initial_size)
        .unwrap();
    builder.build()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_pool_creation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pool_creation");

    for initial_size in [0usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("warm_up", initial_size),
            &initial_size,
            |b, &initial_size| {
                b.to_async(&rt).iter(|| async move {
                    let pool = SessionPool::new(InstantFactory, params(), config(initial_size, 16)).await;
                    black_box(pool.stats());
                })
            },
        );
    }

    group.finish();
}

fn bench_acquire_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = rt.block_on(SessionPool::new(InstantFactory, params(), config(1, 1)));
    let pool = &pool;

    c.bench_function("acquire_release_idle", |b| {
        b.to_async(&rt).iter(|| async move {
            let session = pool.acquire().await.unwrap();
            black_box(*session);
            session.release();
        })
    });

    c.bench_function("try_acquire_drop", |b| {
        b.to_async(&rt).iter(|| async move {
            black_box(pool.try_acquire().await.unwrap().id());
        })
    });
}

fn bench_contention(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("contention");
    group.sample_size(20);

    for num_tasks in [8usize, 32, 128] {
        group.throughput(Throughput::Elements(num_tasks as u64));
        let pool = rt.block_on(SessionPool::new(InstantFactory, params(), config(4, 4)));

        group.bench_with_input(
            BenchmarkId::new("tasks_on_pool_of_4", num_tasks),
            &num_tasks,
            |b, &num| {
                b.to_async(&rt).iter(|| {
                    let pool = pool.clone();
                    async move {
                        let mut handles = Vec::with_capacity(num);
                        for _ in 0..num {
                            let pool = pool.clone();
                            handles.push(tokio::spawn(async move {
                                let session = pool.acquire().await.unwrap();
                                tokio::task::yield_now().await;
                                session.release();
                            }));
                        }
                        for handle in handles {
                            handle.await.unwrap();
                        }
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_option_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("option_resolution");

    group.bench_function("open_write_append", |b| {
        b.iter(|| {
            OpenOptions::for_open(black_box(&[
                FileOption::Write,
                FileOption::Append,
                FileOption::Create,
                FileOption::Sync,
            ]))
        })
    });

    group.bench_function("move_atomic", |b| {
        b.iter(|| {
            CopyOptions::for_move(black_box(&[
                FileOption::ReplaceExisting,
                FileOption::AtomicMove,
            ]))
        })
    });

    group.bench_function("parse_token", |b| {
        b.iter(|| black_box("truncate-existing").parse::<FileOption>())
    });

    group.finish();
}

fn criterion_config() -> Criterion {
    Criterion::default()
        .significance_level(0.05)
        .sample_size(50)
        .warm_up_time(Duration::from_secs(2))
        .measurement_time(Duration::from_secs(5))
}

criterion_group! {
    name = pool_benches;
    config = criterion_config();
    targets = bench_pool_creation, bench_acquire_release, bench_contention
}

criterion_group! {
    name = option_benches;
    config = criterion_config();
    targets = bench_option_resolution
}

criterion_main!(pool_benches, option_benches);
