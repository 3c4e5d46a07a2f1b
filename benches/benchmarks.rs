#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use ndarray::{Array3, Array4, ArrayView4};

use rustmtcnn::{
    non_maximum_suppression, BBox, BoxError, Detector, DetectorConfig, ImageData, Inference,
    Network, Networks, OverlapMode, Stage,
};

/// Proposal stub firing on a sparse, fixed pattern of cells.
struct Checkerboard {
    size: u32,
}

impl Network for Checkerboard {
    fn input_size(&self) -> u32 {
        self.size
    }

    fn infer(&self, batch: ArrayView4<'_, f32>) -> Result<Inference, BoxError> {
        let (n, h, w, _) = batch.dim();
        let (rows, cols) = if n == 1 && h > 12 {
            ((h - 12) / 2 + 1, (w - 12) / 2 + 1)
        } else {
            (1, 1)
        };
        let scores = Array3::from_shape_fn((n, rows, cols), |(_, r, c)| {
            if (r / 4 + c / 4) % 2 == 0 {
                0.95
            } else {
                0.1
            }
        });
        Ok(Inference {
            scores,
            regression: Array4::zeros((n, rows, cols, 4)),
            landmarks: Some(Array4::zeros((n, rows, cols, 10))),
        })
    }
}

fn grid_boxes(count: usize) -> Vec<BBox> {
    (0..count)
        .map(|i| {
            let x = (i % 40) as f32 * 7.0;
            let y = (i / 40) as f32 * 7.0;
            BBox::new(x, y, x + 23.0, y + 23.0, ((i * 37) % 100) as f32 / 100.0)
        })
        .collect()
}

fn bench_nms(c: &mut Criterion) {
    let boxes = grid_boxes(1000);
    c.bench_function("nms_union_1000", |b| {
        b.iter(|| non_maximum_suppression(black_box(&boxes), 0.5, OverlapMode::Union))
    });
    c.bench_function("nms_minimum_1000", |b| {
        b.iter(|| non_maximum_suppression(black_box(&boxes), 0.6, OverlapMode::Minimum))
    });
}

fn bench_cascade(c: &mut Criterion) {
    let networks = Networks::new(
        Box::new(Checkerboard { size: 12 }),
        Box::new(Checkerboard { size: 24 }),
        Box::new(Checkerboard { size: 48 }),
    );
    let detector = rustmtcnn::create_detector_with_networks(networks, DetectorConfig::default())
        .unwrap();
    let data: Vec<u8> = (0..320 * 240 * 3).map(|i| (i % 251) as u8).collect();
    let image = ImageData::new(data, 320, 240).unwrap();

    c.bench_function("proposal_scan_320x240", |b| {
        b.iter(|| detector.detect(black_box(&image), Stage::Proposal))
    });
    c.bench_function("cascade_320x240", |b| {
        b.iter(|| detector.detect(black_box(&image), Stage::Output))
    });
}

criterion_group!(benches, bench_nms, bench_cascade);
criterion_main!(benches);
