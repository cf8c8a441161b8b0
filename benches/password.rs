//! 学生账号密码流程基准测试
//!
//! 学生默认以 CI 号作为初始密码：名单导入时逐个哈希，登录时逐个校验。

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use schoolhub::utils::digits_only;
use schoolhub::utils::password::{check_stored_password, hash_password};

fn sample_cis(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{}.{:03}.{:03} LP", 4 + i % 5, i % 1000, (i * 7) % 1000))
        .collect()
}

/// 导入名单时为新学生生成初始密码
fn bench_provision_roster(c: &mut Criterion) {
    let mut group = c.benchmark_group("password/provision_roster");
    group.sample_size(10);

    for size in [1usize, 10, 40] {
        let cis = sample_cis(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &cis, |b, cis| {
            b.iter(|| {
                for raw in cis {
                    let ci = digits_only(raw);
                    hash_password(&ci).expect("hash should succeed");
                }
            });
        });
    }

    group.finish();
}

/// 以 CI 登录：先归一化输入再校验存储的哈希
fn bench_ci_login(c: &mut Criterion) {
    let stored = hash_password("7654321").expect("hash should succeed");

    let mut group = c.benchmark_group("password/ci_login");

    group.bench_function("formatted_ci", |b| {
        b.iter(|| {
            let ci = digits_only("7.654.321 LP");
            assert!(check_stored_password(&ci, Some(&stored)));
        });
    });

    group.bench_function("wrong_ci", |b| {
        b.iter(|| {
            let ci = digits_only("7.654.322");
            assert!(!check_stored_password(&ci, Some(&stored)));
        });
    });

    // 未设置密码的账号直接拒绝，不做哈希计算
    group.bench_function("no_password", |b| {
        b.iter(|| {
            assert!(!check_stored_password("7654321", None));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_provision_roster, bench_ci_login);
criterion_main!(benches);
