//! Benchmarks for trellis-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::{Runtime, Target, Value};

// =============================================================================
// HANDLE BENCHMARKS
// =============================================================================

fn bench_untracked_get(c: &mut Criterion) {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("n", 1)]));
    c.bench_function("handle_get_untracked", |b| b.iter(|| black_box(state.get("n"))));
}

fn bench_set_without_subscribers(c: &mut Criterion) {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("n", 0)]));
    let mut i = 0;
    c.bench_function("handle_set_no_subscribers", |b| {
        b.iter(|| {
            i += 1;
            state.set("n", black_box(i))
        })
    });
}

fn bench_set_same_value(c: &mut Criterion) {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("n", 42)]));
    let s = state.clone();
    let _effect = rt.effect(move || {
        s.get("n");
    });
    c.bench_function("handle_set_same_value", |b| b.iter(|| state.set("n", black_box(42))));
}

// =============================================================================
// EFFECT BENCHMARKS
// =============================================================================

fn bench_effect_rerun(c: &mut Criterion) {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("n", 0)]));
    let s = state.clone();
    let _effect = rt.effect(move || black_box(s.get("n")));

    let mut i = 0;
    c.bench_function("effect_rerun_single_dep", |b| {
        b.iter(|| {
            i += 1;
            state.set("n", i)
        })
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("effect_fan_out");
    for width in [10, 100, 1000] {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        let effects: Vec<_> = (0..width)
            .map(|_| {
                let s = state.clone();
                rt.effect(move || black_box(s.get("n")))
            })
            .collect();

        let mut i = 0;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                i += 1;
                state.set("n", i)
            })
        });
        drop(effects);
    }
    group.finish();
}

fn bench_wide_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("effect_wide_reads");
    for width in [10, 100, 1000] {
        let rt = Runtime::new();
        let fields: Vec<(String, Value)> = (0..width)
            .map(|i| (format!("f{i}"), Value::from(i)))
            .collect();
        let state = rt.reactive(Target::record(fields));
        let s = state.clone();
        let _effect = rt.effect(move || {
            for i in 0..width {
                black_box(s.get(format!("f{i}").as_str()));
            }
        });

        let mut i = 0;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                i += 1;
                state.set("f0", -i)
            })
        });
    }
    group.finish();
}

// =============================================================================
// COMPUTED BENCHMARKS
// =============================================================================

fn bench_computed_cached(c: &mut Criterion) {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("n", 21)]));
    let s = state.clone();
    let doubled = rt.computed(move || s.get("n").as_f64().unwrap_or_default() * 2.0);
    doubled.value();

    c.bench_function("computed_value_cached", |b| b.iter(|| black_box(doubled.value())));
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");
    for depth in [1, 10, 100] {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        let s = state.clone();
        let mut tail = rt.computed(move || s.get("n").as_f64().unwrap_or_default());
        let mut chain = vec![tail.clone()];
        for _ in 0..depth {
            let prev = tail.clone();
            tail = rt.computed(move || prev.value() + 1.0);
            chain.push(tail.clone());
        }
        let t = tail.clone();
        let _effect = rt.effect(move || black_box(t.value()));

        let mut i = 0;
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                i += 1;
                state.set("n", i)
            })
        });
    }
    group.finish();
}

// =============================================================================
// COLLECTION BENCHMARKS
// =============================================================================

fn bench_sequence_push(c: &mut Criterion) {
    let rt = Runtime::new();
    let list = rt.reactive(Target::sequence(Vec::<Value>::new()));
    let l = list.clone();
    let _effect = rt.effect(move || black_box(l.len()));

    c.bench_function("sequence_push_with_length_reader", |b| {
        b.iter(|| {
            list.push([black_box(1)]);
            if list.len() > 1024 {
                list.set_len(0);
            }
        })
    });
}

fn bench_map_iteration(c: &mut Criterion) {
    let rt = Runtime::new();
    let entries: Vec<(Value, Value)> = (0..100)
        .map(|i| (Value::from(i), Value::from(i)))
        .collect();
    let map = rt.reactive(Target::map(entries));
    let m = map.clone();
    let _effect = rt.effect(move || black_box(m.entries().len()));

    let mut i = 0;
    c.bench_function("map_set_with_iterating_reader", |b| {
        b.iter(|| {
            i += 1;
            map.set(0, i)
        })
    });
}

criterion_group!(
    handle_benches,
    bench_untracked_get,
    bench_set_without_subscribers,
    bench_set_same_value,
);

criterion_group!(effect_benches, bench_effect_rerun, bench_fan_out, bench_wide_reads);

criterion_group!(computed_benches, bench_computed_cached, bench_computed_chain);

criterion_group!(collection_benches, bench_sequence_push, bench_map_iteration);

criterion_main!(handle_benches, effect_benches, computed_benches, collection_benches);
