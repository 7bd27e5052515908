//! Benchmarks for pipeline execution.

use blockflow::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

async fn drain(pipeline: &DelegateTarget<u64>, items: u64) {
    for i in 0..items {
        pipeline.post(black_box(i));
    }
    pipeline.complete();
    let _ = pipeline.completion().wait().await;
}

fn build_plain() -> std::sync::Arc<DelegateTarget<u64>> {
    let mut builder = PipelineBuilder::<u64>::new("bench");
    builder
        .use_action(ActionDelegate::map_fn(|x: &u64| Ok(x.wrapping_mul(3))))
        .and_then(|b| b.build_target())
        .unwrap()
}

fn build_branched() -> std::sync::Arc<DelegateTarget<u64>> {
    let mut builder = PipelineBuilder::<u64>::new("bench-branched");
    builder
        .use_action(ActionDelegate::from_fn(|_: &u64| Ok(())))
        .unwrap()
        .use_when(|x| x % 3 == 0, |when| {
            when.use_action(ActionDelegate::map_fn(|x: &u64| Ok(x + 1)));
        })
        .unwrap()
        .use_when(|x| x % 3 == 1, |when| {
            when.use_conditional_queue(TransformDelegate::from_fn(|x: &u64| Ok(x % 2 == 0)))
                .use_action(ActionDelegate::from_fn(|_: &u64| Ok(())))
                .use_completion(ActionDelegate::from_fn(|_: &u64| Ok(())));
        })
        .unwrap()
        .use_exception_handler(ErrorDelegate::from_fn(|_: &u64, _: &StageFailure| Ok(())))
        .unwrap();
    builder.build_target().unwrap()
}

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("pipeline_drain");
    for items in [100_u64, 1_000] {
        group.bench_with_input(BenchmarkId::new("plain", items), &items, |b, &items| {
            b.iter(|| runtime.block_on(async { drain(&build_plain(), items).await }));
        });
        group.bench_with_input(BenchmarkId::new("branched", items), &items, |b, &items| {
            b.iter(|| runtime.block_on(async { drain(&build_branched(), items).await }));
        });
    }
    group.finish();
}

fn compile_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("compile_branched", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let pipeline = build_branched();
                pipeline.complete();
                let _ = pipeline.completion().wait().await;
            });
        });
    });
}

criterion_group!(benches, pipeline_benchmark, compile_benchmark);
criterion_main!(benches);
