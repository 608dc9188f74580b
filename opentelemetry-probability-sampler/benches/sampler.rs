use criterion::{criterion_group, criterion_main, Criterion};
use opentelemetry::{
    trace::{SpanContext, SpanId, SpanKind, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};
use opentelemetry_probability_sampler::ProbabilityBased;
use opentelemetry_sdk::trace::ShouldSample;

fn criterion_benchmark(c: &mut Criterion) {
    let sampler = ProbabilityBased::new(0.25);

    c.bench_function("should_sample/root", |b| {
        b.iter(|| {
            sampler.should_sample(
                None,
                TraceId::from_u128(1),
                "bench_span",
                &SpanKind::Internal,
                &[],
                &[],
            )
        })
    });

    let parent = Context::new().with_remote_span_context(SpanContext::new(
        TraceId::from_u128(1),
        SpanId::from_u64(1),
        TraceFlags::SAMPLED,
        true,
        TraceState::from_key_value([("ot", "r:10")]).unwrap(),
    ));
    c.bench_function("should_sample/with_parent", |b| {
        b.iter(|| {
            sampler.should_sample(
                Some(&parent),
                TraceId::from_u128(1),
                "bench_span",
                &SpanKind::Internal,
                &[],
                &[],
            )
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
