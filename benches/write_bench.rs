// Write performance benchmarks for spreadblock

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use spreadblock::block::{BlockWriter, PushdownBlockWriter};
use spreadblock::column::{Column, Spread};
use spreadblock::Options;
use std::hint::black_box;

fn random_spread(rows: usize) -> Spread {
    let mut rng = rand::rng();
    let ids = (0..rows).map(|_| Some(rng.random_range(0..1_000_000i64))).collect();
    let scores = (0..rows).map(|_| Some(rng.random::<f64>())).collect();
    let labels = (0..rows).map(|_| Some(format!("label-{}", rng.random_range(0..32)))).collect::<Vec<_>>();
    Spread::new(rows)
        .with_column(Column::long("id", ids))
        .unwrap()
        .with_column(Column::double("score", scores))
        .unwrap()
        .with_column(Column::string("label", labels))
        .unwrap()
}

fn benchmark_encode_spread(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_spread");
    let writer = PushdownBlockWriter::new(Options::default()).unwrap();

    for rows in [100, 1000, 10000].iter() {
        let spread = random_spread(*rows);
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &spread, |b, spread| {
            b.iter(|| black_box(writer.encode_spread(spread).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_write_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_block");

    for spreads in [1, 8, 64].iter() {
        let batch: Vec<Spread> = (0..*spreads).map(|_| random_spread(1000)).collect();
        group.throughput(Throughput::Elements((*spreads * 1000) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(spreads), &batch, |b, batch| {
            b.iter(|| {
                let mut writer = PushdownBlockWriter::new(Options::default().block_size(16 * 1024 * 1024)).unwrap();
                for spread in batch {
                    writer.append_spread(spread).unwrap();
                }
                let mut out = Vec::new();
                writer.write(&mut out, None).unwrap();
                black_box(out);
            });
        });
    }

    group.finish();
}

fn benchmark_meta_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("meta_compression");
    let batch: Vec<Spread> = (0..32).map(|_| random_spread(100)).collect();

    for compressor in ["none", "snappy"].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(compressor), compressor, |b, compressor| {
            b.iter(|| {
                let mut writer = PushdownBlockWriter::new(Options::default().meta_compressor(*compressor)).unwrap();
                for spread in &batch {
                    writer.append_spread(spread).unwrap();
                }
                let mut out = Vec::new();
                black_box(writer.write(&mut out, None).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_encode_spread, benchmark_write_block, benchmark_meta_compression);
criterion_main!(benches);
