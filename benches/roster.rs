//! 名单导入性能基准测试

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use schoolhub::config::ImportConfig;
use schoolhub::import::parse_upload;

fn roster_csv(rows: usize) -> Vec<u8> {
    let mut out = String::from("ci,paterno,materno,nombres,email,celular\n");
    for i in 0..rows {
        out.push_str(&format!(
            "{}-LP,perez,gomez,juan carlos {},Student{}@School.test,7{:07}\n",
            1_000_000 + i,
            i,
            i,
            i
        ));
    }
    out.into_bytes()
}

fn bench_parse_csv(c: &mut Criterion) {
    let config = ImportConfig::default();
    let mut group = c.benchmark_group("roster/parse_csv");

    for rows in [30, 300, 3000] {
        let bytes = roster_csv(rows);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &bytes, |b, bytes| {
            b.iter(|| parse_upload(black_box("roster.csv"), black_box(bytes), &config));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_csv);
criterion_main!(benches);
