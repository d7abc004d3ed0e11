//! Benchmarks for the interpolation and reprojection hot paths.
//!
//! Run with: `cargo bench`
//!
//! These cover the two stages that dominate pipeline runtime:
//! - IDW gridding at various point-cloud sizes
//! - Single-cell IDW queries
//! - Raster reprojection to a projected CRS

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use cfactor::{
    raster_to_points, reproject, Extent, GridGeometry, IdwInterpolator, InterpolationParams,
    Raster, SamplePoint,
};

/// Synthetic point cloud on a jittered grid, roughly `side * side` points
/// spaced 5 km apart.
fn synthetic_cloud(side: usize) -> Vec<SamplePoint> {
    let mut points = Vec::with_capacity(side * side);
    for row in 0..side {
        for col in 0..side {
            // Deterministic jitter so runs are comparable.
            let jitter = ((row * 31 + col * 17) % 100) as f64 * 4.0 - 200.0;
            points.push(SamplePoint {
                x: 400_000.0 + col as f64 * 5_000.0 + jitter,
                y: 5_500_000.0 - row as f64 * 5_000.0 - jitter,
                value: ((row + col) % 10) as f32 * 0.1,
            });
        }
    }
    points
}

fn bench_idw_gridding(c: &mut Criterion) {
    let mut group = c.benchmark_group("idw_gridding");
    group.sample_size(20);

    for side in [20, 50, 100] {
        let points = synthetic_cloud(side);
        let extent = Extent {
            min_x: 400_000.0,
            max_y: 5_500_000.0,
            max_x: 400_000.0 + side as f64 * 5_000.0,
            min_y: 5_500_000.0 - side as f64 * 5_000.0,
        };

        group.bench_with_input(
            BenchmarkId::new("points", side * side),
            &points,
            |b, points| {
                let idw =
                    IdwInterpolator::new(points, InterpolationParams::default()).unwrap();
                b.iter(|| {
                    let raster = idw
                        .interpolate(black_box(extent), 5_000.0, 32634)
                        .unwrap();
                    black_box(raster.pixels.len())
                });
            },
        );
    }
    group.finish();
}

fn bench_idw_cell_query(c: &mut Criterion) {
    let points = synthetic_cloud(100);
    let idw = IdwInterpolator::new(&points, InterpolationParams::default()).unwrap();

    c.bench_function("idw_cell_query", |b| {
        b.iter(|| black_box(idw.cell_value(black_box(520_000.0), black_box(5_350_000.0))));
    });
}

fn bench_reprojection(c: &mut Criterion) {
    let geometry = GridGeometry {
        origin_x: 19.0,
        origin_y: 51.0,
        pixel_size: 0.01,
        width: 200,
        height: 200,
    };
    let mut raster = Raster::filled_nodata(geometry, 4326);
    for row in 0..200 {
        for col in 0..200 {
            raster.set(row, col, ((row + col) % 100) as f32 * 0.01);
        }
    }

    let mut group = c.benchmark_group("reprojection");
    group.sample_size(20);
    group.bench_function("lonlat_to_utm34_200x200", |b| {
        b.iter(|| {
            let out = reproject(black_box(&raster), 32634).unwrap();
            black_box(out.pixels.len())
        });
    });
    group.finish();
}

fn bench_point_sampling(c: &mut Criterion) {
    let geometry = GridGeometry {
        origin_x: 400_000.0,
        origin_y: 5_500_000.0,
        pixel_size: 5_000.0,
        width: 100,
        height: 100,
    };
    let mut raster = Raster::filled_nodata(geometry, 32634);
    for row in 0..100 {
        for col in 0..100 {
            if (row + col) % 7 != 0 {
                raster.set(row, col, (row * 100 + col) as f32);
            }
        }
    }

    c.bench_function("raster_to_points_100x100", |b| {
        b.iter(|| black_box(raster_to_points(black_box(&raster)).len()));
    });
}

criterion_group!(
    benches,
    bench_idw_gridding,
    bench_idw_cell_query,
    bench_reprojection,
    bench_point_sampling
);
criterion_main!(benches);
