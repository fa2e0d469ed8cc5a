use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use den::encoding::{marshal_var_u64s, unmarshal_var_u64s};
use den::part::{InMemoryBlock, StorageBlock};

fn sample_items(n: u32) -> Vec<Vec<u8>> {
    (0..n)
        .map(|i| format!("host{:04}.region{:02}.cpu.usage", i % 500, i % 7).into_bytes())
        .collect()
}

fn bench_varint_array(c: &mut Criterion) {
    let values: Vec<u64> = (0..4096u64).map(|i| i * i % 300_000).collect();
    let mut encoded = Vec::new();
    marshal_var_u64s(&mut encoded, &values);

    let mut group = c.benchmark_group("varint_array");
    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("marshal", |b| {
        let mut buf = Vec::with_capacity(encoded.len());
        b.iter(|| {
            buf.clear();
            marshal_var_u64s(&mut buf, black_box(&values));
        });
    });
    group.bench_function("unmarshal", |b| {
        let mut dst = vec![0u64; values.len()];
        b.iter(|| unmarshal_var_u64s(&mut dst, black_box(&encoded)).unwrap());
    });
    group.finish();
}

fn bench_block_codec(c: &mut Criterion) {
    let items = sample_items(2000);
    let raw_size: usize = items.iter().map(|i| i.len()).sum();

    let mut ib = InMemoryBlock::new();
    for item in &items {
        assert!(ib.add(item));
    }
    ib.sort_items();

    let mut group = c.benchmark_group("block_codec");
    group.throughput(Throughput::Bytes(raw_size as u64));
    group.bench_function("marshal", |b| {
        let mut sb = StorageBlock::default();
        b.iter(|| {
            let mut first_item = Vec::new();
            let mut common_prefix = Vec::new();
            ib.marshal_sorted_data(&mut sb, &mut first_item, &mut common_prefix, black_box(1))
                .unwrap()
        });
    });

    let mut sb = StorageBlock::default();
    let mut first_item = Vec::new();
    let mut common_prefix = Vec::new();
    let (count, mt) = ib
        .marshal_sorted_data(&mut sb, &mut first_item, &mut common_prefix, 1)
        .unwrap();
    group.bench_function("unmarshal", |b| {
        let mut decoded = InMemoryBlock::new();
        b.iter(|| {
            decoded
                .unmarshal_data(black_box(&sb), &first_item, &common_prefix, count, mt)
                .unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_varint_array, bench_block_codec);
criterion_main!(benches);
