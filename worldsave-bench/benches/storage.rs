//! worldsave Benchmark Suite
//!
//! Targets on a developer laptop:
//!   quadrant_write_v1 / v2 ........... < 1ms
//!   quadrant_read_v1 / v2 ............ < 500μs
//!   save_tx_100_quadrants_v2 ......... < 20ms
//!   migrate_200_quadrants ............ < 200ms

use std::io::{Read, Write};

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use worldsave_bench::{open_world, populate, quadrant_payload};
use worldsave_core::config::StorageConfig;
use worldsave_core::migration::migrate_v1_to_v2;
use worldsave_core::{SaveFormat, Tripoint};

/// Benchmark: one quadrant written outside a save transaction.
fn bench_quadrant_write(c: &mut Criterion) {
    let body = quadrant_payload(7);
    for format in [SaveFormat::V1, SaveFormat::V2] {
        let dir = tempfile::tempdir().expect("tempdir");
        let world = open_world(dir.path(), format);
        c.bench_function(&format!("quadrant_write_{format}"), |b| {
            b.iter(|| {
                world
                    .write_map_quadrant(black_box(Tripoint::new(3, 4, 0)), |w| {
                        w.write_all(&body)?;
                        Ok(())
                    })
                    .expect("write");
            });
        });
    }
}

/// Benchmark: one quadrant read back through the reader callback.
fn bench_quadrant_read(c: &mut Criterion) {
    for format in [SaveFormat::V1, SaveFormat::V2] {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut world = open_world(dir.path(), format);
        populate(&mut world, 64);
        c.bench_function(&format!("quadrant_read_{format}"), |b| {
            b.iter(|| {
                let mut buf = Vec::new();
                let found = world
                    .read_map_quadrant(black_box(Tripoint::new(5, 1, 0)), |r| {
                        r.read_to_end(&mut buf)?;
                        Ok(())
                    })
                    .expect("read");
                black_box((found, buf));
            });
        });
    }
}

/// Benchmark: a full save transaction of 100 quadrants.
fn bench_save_tx(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut world = open_world(dir.path(), SaveFormat::V2);
    c.bench_function("save_tx_100_quadrants_v2", |b| {
        b.iter(|| populate(&mut world, black_box(100)));
    });
}

/// Benchmark: V1 → V2 migration of a small world.
fn bench_migration(c: &mut Criterion) {
    let source = tempfile::tempdir().expect("tempdir");
    {
        let mut world = open_world(source.path(), SaveFormat::V1);
        populate(&mut world, 200);
    }
    let storage = StorageConfig::default();
    c.bench_function("migrate_200_quadrants", |b| {
        b.iter_batched(
            || tempfile::tempdir().expect("tempdir"),
            |dest| {
                let report = migrate_v1_to_v2(&source.path().join("bench"), dest.path(), &storage)
                    .expect("migrate");
                black_box(report);
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_quadrant_write,
    bench_quadrant_read,
    bench_save_tx,
    bench_migration,
);
criterion_main!(benches);
