//! 成绩计算性能基准测试

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use schoolhub::grading::calc::{CriterionGroup, cap_manual_score, final_grade, weighted_average};
use schoolhub::grading::{GradingPolicy, WeightedScore};

fn tasks(count: usize) -> Vec<WeightedScore> {
    (0..count)
        .map(|i| WeightedScore::new((i * 37 % 101) as f64, (i % 4 + 1) as i32))
        .collect()
}

fn bench_weighted_average(c: &mut Criterion) {
    let mut group = c.benchmark_group("grading/weighted_average");
    for count in [5, 50, 500] {
        let input = tasks(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| weighted_average(black_box(input.iter().copied())));
        });
    }
    group.finish();
}

fn bench_sub_criterion_score(c: &mut Criterion) {
    let policy = GradingPolicy::default();
    let input = tasks(20);

    // 一个课程 40 名学生，每人 20 个任务
    c.bench_function("grading/sub_criterion_score_40_students", |b| {
        b.iter(|| {
            for _ in 0..40 {
                black_box(policy.sub_criterion_score(input.iter().copied(), black_box(25.0)));
            }
        });
    });
}

fn bench_final_grade(c: &mut Criterion) {
    let groups: Vec<CriterionGroup> = (0..6)
        .map(|i| CriterionGroup {
            criterion_id: i,
            weight: 100.0 / 6.0,
            children: vec![4.5, 6.25, 3.0, 2.75],
        })
        .collect();

    c.bench_function("grading/final_grade_6_criteria", |b| {
        b.iter(|| final_grade(black_box(&groups)));
    });

    c.bench_function("grading/cap_manual_score", |b| {
        b.iter(|| cap_manual_score(black_box(31.456), black_box(30.0)));
    });
}

criterion_group!(
    benches,
    bench_weighted_average,
    bench_sub_criterion_score,
    bench_final_grade,
);
criterion_main!(benches);
