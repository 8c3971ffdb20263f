//! Integration Tests for Reactive System
//!
//! These tests verify that signals, memos, and effects work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rstest::rstest;
use trellis_core::reactive::{Memo, Runtime};
use trellis_core::{ReactiveError, RuntimeConfig};

/// Test that an observer of a diamond never sees a half-updated state.
#[rstest]
#[case::plain_write(false)]
#[case::inside_batch(true)]
fn diamond_is_glitch_free(#[case] batched: bool) {
    let rt = Runtime::new();
    let source = rt.signal(1);

    let left = {
        let source = source.clone();
        rt.computed(move || source.get() + 1)
    };
    let right = {
        let source = source.clone();
        rt.computed(move || source.get() * 2)
    };
    let combined = {
        let (left, right) = (left.clone(), right.clone());
        rt.try_computed(move || Ok(left.get()? + right.get()?))
    };

    let seen = Rc::new(RefCell::new(Vec::new()));
    let _observer = {
        let seen = seen.clone();
        rt.autorun(move || {
            let snapshot = (
                left.get().unwrap(),
                right.get().unwrap(),
                combined.get().unwrap(),
            );
            seen.borrow_mut().push(snapshot);
        })
        .unwrap()
    };

    if batched {
        rt.batch(|| source.set(2).unwrap()).unwrap();
    } else {
        source.set(2).unwrap();
    }

    assert_eq!(*seen.borrow(), vec![(2, 2, 4), (3, 4, 7)]);
}

/// Test that versions only move forward, and only on real changes.
#[test]
fn versions_are_monotonic() {
    let rt = Runtime::new();
    let input = rt.signal(1);
    let parity = {
        let input = input.clone();
        rt.computed(move || input.get() % 2)
    };

    parity.get().unwrap();
    let mut last = (input.version(), parity.version());

    for (value, input_moves, parity_moves) in [
        (1, false, false),
        (3, true, false),
        (4, true, true),
        (4, false, false),
        (6, true, false),
        (7, true, true),
    ] {
        input.set(value).unwrap();
        parity.get().unwrap();

        let now = (input.version(), parity.version());
        assert!(now.0 >= last.0 && now.1 >= last.1);
        assert_eq!(now.0 > last.0, input_moves, "input version after writing {value}");
        assert_eq!(now.1 > last.1, parity_moves, "parity version after writing {value}");
        last = now;
    }
}

/// Test that two memos reading each other are rejected.
#[test]
fn mutually_dependent_memos_are_rejected() {
    let rt = Runtime::new();
    let b_slot: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));

    let a = {
        let b_slot = b_slot.clone();
        rt.try_computed(move || match b_slot.borrow().as_ref() {
            Some(b) => Ok(b.get()? + 1),
            None => Ok(0),
        })
    };
    let b = {
        let a = a.clone();
        rt.try_computed(move || Ok(a.get()? + 1))
    };
    *b_slot.borrow_mut() = Some(b);

    assert!(matches!(a.get(), Err(ReactiveError::CircularDependency { .. })));

    // Break the reference cycle between the two closures.
    b_slot.borrow_mut().take();
}

/// Test that a subscriber feeding its own value back stops at the ceiling.
#[test]
fn feedback_subscriber_stops_at_the_ceiling() {
    let rt = Runtime::with_config(RuntimeConfig {
        notify_limit: 20,
        ..RuntimeConfig::default()
    });
    let value = rt.signal(0);
    let calls = Rc::new(Cell::new(0));

    let writer = value.clone();
    let counter = calls.clone();
    let _sub = value.subscribe(move |v| {
        counter.set(counter.get() + 1);
        writer.set(v + 1)
    });

    let err = value.set(1).unwrap_err();

    assert!(matches!(err, ReactiveError::NotificationLimit { limit: 20 }));
    assert_eq!(calls.get(), 20);
    assert_eq!(value.peek(), 21);
}

/// Test that effects waking each other forever stop at the flush ceiling.
#[test]
fn ping_pong_effects_stop_at_the_ceiling() {
    let rt = Runtime::with_config(RuntimeConfig {
        flush_limit: 10,
        ..RuntimeConfig::default()
    });
    let a = rt.signal(0);
    let b = rt.signal(0);

    let _forward = {
        let (a, b) = (a.clone(), b.clone());
        rt.effect(move || b.set(a.get() + 1)).unwrap()
    };
    let backward = {
        let (a, b) = (a.clone(), b.clone());
        rt.effect(move || a.set(b.get() + 1))
    };

    assert!(matches!(backward, Err(ReactiveError::FlushLimit { limit: 10 })));
}

/// Test that several writes in one batch run a dependent effect once.
#[test]
fn batched_writes_run_the_effect_once() {
    let rt = Runtime::new();
    let first = rt.signal(0);
    let second = rt.signal(0);
    let runs = Rc::new(Cell::new(0));

    let effect = {
        let (first, second, runs) = (first.clone(), second.clone(), runs.clone());
        rt.autorun(move || {
            first.get();
            second.get();
            runs.set(runs.get() + 1);
        })
        .unwrap()
    };
    assert_eq!(runs.get(), 1);

    rt.batch(|| {
        first.set(1).unwrap();
        second.set(2).unwrap();
        first.set(3).unwrap();
    })
    .unwrap();

    assert_eq!(runs.get(), 2);
    assert_eq!(effect.run_count(), 2);
}

/// Test that dependencies follow the branch actually taken.
#[test]
fn dependencies_follow_the_taken_branch() {
    let rt = Runtime::new();
    let use_left = rt.signal(true);
    let left = rt.signal("left");
    let right = rt.signal("right");
    let seen = Rc::new(RefCell::new(Vec::new()));

    let effect = {
        let (use_left, left, right, seen) =
            (use_left.clone(), left.clone(), right.clone(), seen.clone());
        rt.autorun(move || {
            let value = if use_left.get() { left.get() } else { right.get() };
            seen.borrow_mut().push(value);
        })
        .unwrap()
    };
    assert_eq!(rt.node_sources(effect.id()), vec![use_left.id(), left.id()]);

    right.set("ignored").unwrap();
    assert_eq!(*seen.borrow(), vec!["left"]);

    use_left.set(false).unwrap();
    assert_eq!(rt.node_sources(effect.id()), vec![use_left.id(), right.id()]);

    left.set("also ignored").unwrap();
    right.set("right again").unwrap();
    assert_eq!(*seen.borrow(), vec!["left", "ignored", "right again"]);
}

/// Test that only memos actually read are recomputed.
#[test]
fn unread_memos_stay_stale() {
    let rt = Runtime::new();
    let input = rt.signal(1);
    let memos: Vec<Memo<i32>> = (0..10)
        .map(|i| {
            let input = input.clone();
            rt.computed(move || input.get() + i)
        })
        .collect();

    for memo in &memos {
        memo.get().unwrap();
    }
    input.set(2).unwrap();
    assert_eq!(memos[3].get().unwrap(), 5);

    let recomputed: Vec<u64> = memos.iter().map(Memo::recompute_count).collect();
    assert_eq!(recomputed[3], 2);
    assert!(recomputed
        .iter()
        .enumerate()
        .all(|(i, &count)| i == 3 || count == 1));
}

/// Test effect disposal stops execution and tears down the graph.
#[test]
fn disposed_effect_does_not_run() {
    let rt = Runtime::new();
    let signal = rt.signal(0);
    let runs = Rc::new(Cell::new(0));

    let effect = {
        let (signal, runs) = (signal.clone(), runs.clone());
        rt.autorun(move || {
            signal.get();
            runs.set(runs.get() + 1);
        })
        .unwrap()
    };
    assert_eq!(rt.observer_count(signal.id()), 1);

    effect.dispose();
    effect.dispose();
    signal.set(1).unwrap();
    signal.set(2).unwrap();

    assert_eq!(runs.get(), 1);
    assert!(effect.is_disposed());
    assert_eq!(rt.observer_count(signal.id()), 0);
}

/// Test that dropping every handle empties the graph.
#[test]
fn dropping_handles_empties_the_graph() {
    let rt = Runtime::new();
    {
        let signal = rt.signal(1);
        let memo = {
            let signal = signal.clone();
            rt.computed(move || signal.get() * 10)
        };
        let _effect = {
            let memo = memo.clone();
            rt.autorun(move || {
                memo.get().unwrap();
            })
            .unwrap()
        };
        assert_eq!(rt.node_count(), 3);
    }
    assert_eq!(rt.node_count(), 0);
}
