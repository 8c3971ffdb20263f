use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Bencher, Criterion};
use trellis_core::reactive::{Memo, Runtime};
use trellis_core::render::{fragment, h, props, MemoryHost, Props, Reconciler, VNode};

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("memo_chain", memo_chain);
    c.bench_function("wide_fan_out", wide_fan_out);
    c.bench_function("batched_writes", batched_writes);
    c.bench_function("keyed_shuffle", keyed_shuffle);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

const DEPTH: usize = 200;
const WIDTH: usize = 1000;
const WRITES: usize = 100;
const ITEMS: usize = 1000;

fn memo_chain(b: &mut Bencher) {
    let rt = Runtime::new();
    let source = rt.signal(0usize);
    let mut last: Memo<usize> = {
        let source = source.clone();
        rt.computed(move || source.get())
    };
    for _ in 0..DEPTH {
        let prev = last.clone();
        last = rt.computed(move || prev.get().unwrap_or_default() + 1);
    }

    let mut i = 0;
    b.iter(|| {
        i += 1;
        source.set(i).unwrap();
        black_box(last.get().unwrap());
    });
}

fn wide_fan_out(b: &mut Bencher) {
    let rt = Runtime::new();
    let source = rt.signal(0usize);
    let memos: Vec<Memo<usize>> = (0..WIDTH)
        .map(|k| {
            let source = source.clone();
            rt.computed(move || source.get() + k)
        })
        .collect();
    let total = {
        let memos = memos.clone();
        rt.computed(move || memos.iter().map(|m| m.get().unwrap_or_default()).sum::<usize>())
    };

    let mut i = 0;
    b.iter(|| {
        i += 1;
        source.set(i).unwrap();
        black_box(total.get().unwrap());
    });
}

fn batched_writes(b: &mut Bencher) {
    let rt = Runtime::new();
    let signals: Vec<_> = (0..WRITES).map(|_| rt.signal(0usize)).collect();
    let _effect = {
        let signals = signals.clone();
        rt.autorun(move || {
            black_box(signals.iter().map(|s| s.get()).sum::<usize>());
        })
        .unwrap()
    };

    let mut i = 0;
    b.iter(|| {
        i += 1;
        rt.batch(|| {
            for signal in &signals {
                signal.set(i).unwrap();
            }
        })
        .unwrap();
    });
}

fn list(order: &[usize]) -> VNode {
    h(
        "ul",
        Props::new(),
        order
            .iter()
            .map(|&k| h("li", props([("key", k.to_string())]), [k])),
    )
}

fn keyed_shuffle(b: &mut Bencher) {
    let mut host = MemoryHost::new();
    let root = host.container();
    let mut rec = Reconciler::new(host);

    let forward: Vec<usize> = (0..ITEMS).collect();
    let mut rotated = forward.clone();
    rotated.rotate_left(ITEMS / 3);

    let mut current = list(&forward);
    rec.mount(&mut current, &root, None).unwrap();
    let mut flip = false;

    b.iter(|| {
        flip = !flip;
        let mut next = list(if flip { &rotated } else { &forward });
        let previous = std::mem::replace(&mut current, fragment(Vec::new()));
        rec.patch(previous, &mut next, &root, None).unwrap();
        current = next;
        rec.host_mut().clear_ops();
    });
}
