use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use meterflow_ai::{MlpRegressor, SequenceModel, Standardizer, Trainer, TrainerConfig};
use meterflow_core::Window;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Quarter-hourly load curve with a daily cycle.
fn daily_curve(points: usize) -> Vec<f64> {
    (0..points)
        .map(|i| 50.0 + 20.0 * ((i % 96) as f64 / 96.0 * std::f64::consts::TAU).sin())
        .collect()
}

fn bench_windowing(c: &mut Criterion) {
    let mut group = c.benchmark_group("windowing");
    let window = Window::new(24).unwrap();
    for points in [1_000usize, 10_000] {
        let values = daily_curve(points);
        group.throughput(Throughput::Elements(points as u64));
        group.bench_with_input(BenchmarkId::new("training_pairs", points), &values, |b, v| {
            b.iter(|| black_box(window.training_pairs(black_box(v))))
        });
    }
    group.finish();
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10);
    let set = Window::new(24).unwrap().training_pairs(&daily_curve(2_000));
    for epochs in [1usize, 5] {
        let trainer = Trainer::new(TrainerConfig {
            epochs,
            patience: epochs,
            ..TrainerConfig::default()
        });
        group.bench_with_input(BenchmarkId::new("fit", epochs), &set, |b, s| {
            b.iter(|| black_box(trainer.fit(s).unwrap()))
        });
    }
    group.finish();
}

fn bench_inference(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let values = daily_curve(96);
    let model = MlpRegressor::initialise(24, 50, Standardizer::fit(&values), &mut rng);
    let input = &values[..24];
    c.bench_function("mlp_predict_w24_h50", |b| {
        b.iter(|| black_box(model.predict(black_box(input)).unwrap()))
    });
}

criterion_group!(benches, bench_windowing, bench_training, bench_inference);
criterion_main!(benches);
