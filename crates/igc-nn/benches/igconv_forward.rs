// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use igc_nn::{ComplexTensor, GaborPooling, IGConvCmplx, IGConvConfig, Module};
use num_complex::Complex32;

#[track_caller]
fn unwrap_ok<T, E: core::fmt::Debug>(context: &str, result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{context}: {error:?}"),
    }
}

fn input(batch: usize, channels: usize, side: usize) -> ComplexTensor {
    ComplexTensor::from_fn(&[batch, channels, side, side], |idx| {
        let t = (idx[1] * side * side + idx[2] * side + idx[3]) as f32;
        Complex32::new((0.13 * t).sin(), (0.07 * t).cos())
    })
}

fn bench_igconv_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("igconv_forward");
    let x = input(4, 8, 32);

    let cached = unwrap_ok(
        "igconv construction failed",
        IGConvCmplx::new("bench", IGConvConfig::new(8, 16, 3).with_no_g(4).with_seed(7)),
    );
    group.bench_function("cached_filters_8x16_32px", |b| {
        b.iter(|| black_box(unwrap_ok("forward failed", cached.forward(&x))));
    });

    group.bench_function("regenerated_filters_8x16_32px", |b| {
        b.iter_batched(
            || cached.invalidate(),
            |_| black_box(unwrap_ok("forward failed", cached.forward(&x))),
            BatchSize::SmallInput,
        );
    });

    let pooled = unwrap_ok(
        "igconv construction failed",
        IGConvCmplx::new(
            "bench_pooled",
            IGConvConfig::new(8, 16, 3)
                .with_no_g(4)
                .with_gabor_pooling(GaborPooling::Mag)
                .with_seed(7),
        ),
    );
    group.bench_function("mag_pooled_8x16_32px", |b| {
        b.iter(|| black_box(unwrap_ok("forward failed", pooled.forward(&x))));
    });

    group.finish();
}

criterion_group!(benches, bench_igconv_forward);
criterion_main!(benches);
