use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use nbs_core::table::max_table_size;
use nbs_core::{compute_addr, Address, ChunkReader, GetBatch, MemTable, TableReader, TableWriter};
use rand::{Rng, SeedableRng};

const N_CHUNKS: usize = 10_000;
const CHUNK_SIZE: usize = 256;

fn random_chunks() -> Vec<Vec<u8>> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    (0..N_CHUNKS)
        .map(|_| (0..CHUNK_SIZE).map(|_| rng.gen()).collect())
        .collect()
}

fn build_table(chunks: &[Vec<u8>]) -> TableReader<Bytes> {
    let mut writer = TableWriter::new(max_table_size(chunks.len(), chunks.len() * CHUNK_SIZE));
    for chunk in chunks {
        writer.write_chunk(compute_addr(chunk), chunk).unwrap();
    }
    writer.finish().unwrap().reader().unwrap()
}

fn table_write_benchmark(c: &mut Criterion) {
    let chunks = random_chunks();
    c.bench_function("table_write_10k", |b| {
        b.iter(|| build_table(&chunks));
    });
}

fn memtable_flush_benchmark(c: &mut Criterion) {
    let chunks = random_chunks();
    c.bench_function("memtable_flush_10k", |b| {
        b.iter_batched(
            || {
                let mt = MemTable::new(N_CHUNKS * CHUNK_SIZE).unwrap();
                for chunk in &chunks {
                    mt.add_chunk(compute_addr(chunk), chunk);
                }
                mt
            },
            |mt| {
                let existing = nbs_core::ChunkReaderGroup::empty();
                mt.flush(&existing, Default::default()).unwrap().unwrap()
            },
            BatchSize::LargeInput,
        );
    });
}

fn table_get_hit_benchmark(c: &mut Criterion) {
    let chunks = random_chunks();
    let reader = build_table(&chunks);
    let addrs: Vec<Address> = chunks.iter().map(|c| compute_addr(c)).collect();

    c.bench_function("table_get_hit_10k", |b| {
        b.iter(|| {
            for addr in &addrs {
                assert!(reader.get(addr).unwrap().is_some());
            }
        });
    });
}

fn table_has_miss_benchmark(c: &mut Criterion) {
    let reader = build_table(&random_chunks());
    let missing: Vec<Address> = (0..N_CHUNKS)
        .map(|i| compute_addr(format!("missing{}", i).as_bytes()))
        .collect();

    c.bench_function("table_has_miss_10k", |b| {
        b.iter(|| {
            for addr in &missing {
                assert!(!reader.has(addr));
            }
        });
    });
}

fn table_get_many_benchmark(c: &mut Criterion) {
    let chunks = random_chunks();
    let reader = build_table(&chunks);
    let addrs: Vec<Address> = chunks.iter().map(|c| compute_addr(c)).collect();

    c.bench_function("table_get_many_10k", |b| {
        b.iter(|| {
            let mut batch = GetBatch::new(&addrs);
            assert!(!reader.get_many(&mut batch).unwrap());
        });
    });
}

criterion_group!(
    benches,
    table_write_benchmark,
    memtable_flush_benchmark,
    table_get_hit_benchmark,
    table_has_miss_benchmark,
    table_get_many_benchmark
);
criterion_main!(benches);
