use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xfeat_core::{l2_normalize, BatchCorrespondence, DenseFeature, DenseFeatures, Descriptor, DescriptorPair, OffsetLogits};
use xfeat_match::{match_descriptors, Refiner};

/// Deterministic pseudo-random unit descriptors
fn create_descriptors(n: usize, seed: u32) -> Vec<Descriptor> {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    (0..n)
        .map(|_| {
            let mut d = [0.0f32; 64];
            for v in d.iter_mut() {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                *v = (state % 2000) as f32 / 1000.0 - 1.0;
            }
            l2_normalize(&mut d);
            d
        })
        .collect()
}

fn bench_mutual_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutual_matching");
    for &n in &[512usize, 2048, 4096] {
        let left = create_descriptors(n, 1);
        let right = create_descriptors(n, 2);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| match_descriptors(black_box(&left), black_box(&right), -1.0))
        });
    }
    group.finish();
}

fn bench_refinement(c: &mut Criterion) {
    let n = 4096;
    let mut features = DenseFeatures::default();
    for (i, descriptor) in create_descriptors(n, 3).into_iter().enumerate() {
        features.push(DenseFeature {
            x: (i % 80) as f32 * 8.0,
            y: (i / 80) as f32 * 8.0,
            scale: 1.0,
            descriptor,
        });
    }
    let sets = vec![features];
    let matches: Vec<BatchCorrespondence> = (0..n)
        .map(|i| BatchCorrespondence { batch: 0, left: i, right: i })
        .collect();
    let fine = |pairs: &[DescriptorPair]| -> Vec<OffsetLogits> {
        pairs
            .iter()
            .map(|p| {
                let mut logits = [0.0f32; 64];
                logits.copy_from_slice(&p[..64]);
                logits
            })
            .collect()
    };
    let refiner = Refiner::default();

    c.bench_function("refine_4096", |b| {
        b.iter(|| refiner.refine(black_box(&sets), &sets, &matches, &fine).unwrap())
    });
}

criterion_group!(benches, bench_mutual_matching, bench_refinement);
criterion_main!(benches);
