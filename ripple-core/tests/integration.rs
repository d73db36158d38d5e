//! Integration Tests for Reactive System
//!
//! These tests verify that signals, computeds, effects and batches work
//! together correctly through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ripple_core::tree::MaxDepth;
use ripple_core::{
    batch, computed, effect, signal, try_computed, untracked, Cleanup, Computed, PathSegment,
    ReactiveError, Result, Runtime, RuntimeConfig, Signal, SignalTree,
};
use serde_json::json;

fn log<T>() -> Rc<RefCell<Vec<T>>> {
    Rc::new(RefCell::new(Vec::new()))
}

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

/// The example from the crate docs: `c = a * b`, an effect logs `c`.
#[test]
fn end_to_end_product_log() {
    let a = signal(2);
    let b = signal(3);
    let c = {
        let (a, b) = (a.clone(), b.clone());
        computed(move || a.get() * b.get())
    };

    let seen = log();
    let _effect = {
        let (c, seen) = (c.clone(), seen.clone());
        effect(move || -> Result<()> {
            seen.borrow_mut().push(c.get()?);
            Ok(())
        })
        .unwrap()
    };
    assert_eq!(*seen.borrow(), vec![6]);

    a.set(5).unwrap();
    assert_eq!(*seen.borrow(), vec![6, 15]);

    a.set(5).unwrap();
    assert_eq!(*seen.borrow(), vec![6, 15]);
}

/// A diamond never exposes a half-updated state.
#[test]
fn diamond_is_glitch_free() {
    let a = signal(1);
    let b = {
        let a = a.clone();
        computed(move || a.get() * 2)
    };
    let c = {
        let a = a.clone();
        computed(move || a.get() * 3)
    };

    let pairs = log();
    let d = {
        let (b, c, pairs) = (b.clone(), c.clone(), pairs.clone());
        try_computed(move || {
            let (b, c) = (b.get()?, c.get()?);
            pairs.borrow_mut().push((b, c));
            Ok(b + c)
        })
    };

    let seen = log();
    let _effect = {
        let (d, seen) = (d.clone(), seen.clone());
        effect(move || -> Result<()> {
            seen.borrow_mut().push(d.get()?);
            Ok(())
        })
        .unwrap()
    };

    a.set(2).unwrap();
    a.set(3).unwrap();

    assert_eq!(*seen.borrow(), vec![5, 10, 15]);
    for &(b, c) in pairs.borrow().iter() {
        assert_eq!(b * 3, c * 2, "inconsistent pair ({b}, {c})");
    }
    assert_eq!(pairs.borrow().len(), 3);
}

/// Reading twice without a write in between does not re-derive.
#[test]
fn reads_are_idempotent() {
    let a = signal(4);
    let runs = counter();
    let c = {
        let (a, runs) = (a.clone(), runs.clone());
        computed(move || {
            runs.set(runs.get() + 1);
            a.get() + 1
        })
    };

    assert_eq!(c.get().unwrap(), 5);
    assert_eq!(c.get().unwrap(), 5);
    assert_eq!(c.peek().unwrap(), 5);
    assert_eq!(runs.get(), 1);
}

/// Writing the current value again notifies nobody.
#[test]
fn no_op_writes_do_not_notify() {
    let s = signal(String::from("same"));
    let runs = counter();
    let _effect = {
        let (s, runs) = (s.clone(), runs.clone());
        effect(move || {
            s.with(|v| v.len());
            runs.set(runs.get() + 1);
        })
        .unwrap()
    };

    let version = s.version();
    s.set(String::from("same")).unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(s.version(), version);
}

/// A dependency read only on an abandoned branch is dropped.
#[test]
fn dynamic_dependencies_are_pruned() {
    let use_left = signal(true);
    let left = signal("left");
    let right = signal("right");
    let seen = log();

    let e = {
        let (use_left, left, right, seen) =
            (use_left.clone(), left.clone(), right.clone(), seen.clone());
        effect(move || {
            let v = if use_left.get() { left.get() } else { right.get() };
            seen.borrow_mut().push(v);
        })
        .unwrap()
    };
    assert_eq!(e.dependency_count(), 2);
    assert_eq!(left.observer_count(), 1);

    use_left.set(false).unwrap();
    assert_eq!(left.observer_count(), 0);
    assert_eq!(right.observer_count(), 1);

    left.set("ignored").unwrap();
    right.set("RIGHT").unwrap();
    assert_eq!(*seen.borrow(), vec!["left", "right", "RIGHT"]);
}

/// A computed subscribes upstream only while it is observed.
#[test]
fn computed_subscription_is_lazy() {
    let a = signal(1);
    let c = {
        let a = a.clone();
        computed(move || a.get() * 10)
    };
    assert_eq!(c.get().unwrap(), 10);
    assert_eq!(a.observer_count(), 0);

    let e = {
        let c = c.clone();
        effect(move || {
            let _ = c.get();
        })
        .unwrap()
    };
    assert_eq!(a.observer_count(), 1);
    assert_eq!(c.observer_count(), 1);

    e.dispose().unwrap();
    assert_eq!(a.observer_count(), 0);
    assert_eq!(c.observer_count(), 0);

    // Still correct when read without observers.
    a.set(2).unwrap();
    assert_eq!(c.get().unwrap(), 20);
}

/// Two computeds that read each other fail with a cycle error instead of
/// recursing forever.
#[test]
fn mutual_recursion_is_a_cycle() {
    let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
    let first = {
        let slot = slot.clone();
        try_computed(move || {
            let second = slot.borrow().clone();
            match second {
                Some(second) => second.get(),
                None => Ok(0),
            }
        })
    };
    let second = {
        let first = first.clone();
        try_computed(move || first.get().map(|v| v + 1))
    };
    *slot.borrow_mut() = Some(second.clone());

    assert!(first.get().unwrap_err().is_cycle());
    assert!(second.get().unwrap_err().is_cycle());

    slot.borrow_mut().take();
}

/// Writes inside a batch reach each effect once, with the final values.
#[test]
fn batch_coalesces_writes() {
    let first = signal("Ada");
    let last = signal("Lovelace");
    let seen = log();

    let _effect = {
        let (first, last, seen) = (first.clone(), last.clone(), seen.clone());
        effect(move || seen.borrow_mut().push(format!("{} {}", first.get(), last.get())))
            .unwrap()
    };

    batch(|| {
        first.set("Grace")?;
        last.set("Hopper")?;
        assert!(Runtime::is_batching());
        Ok(())
    })
    .unwrap();

    assert_eq!(*seen.borrow(), vec!["Ada Lovelace", "Grace Hopper"]);
}

/// Effects run oldest first; each at most once per flush.
#[test]
fn effects_run_once_in_subscription_order() {
    let s = signal(0);
    let order = log();

    let effects: Vec<_> = ["first", "second", "third"]
        .into_iter()
        .map(|name| {
            let (s, order) = (s.clone(), order.clone());
            effect(move || {
                s.get();
                s.get();
                order.borrow_mut().push(name);
            })
            .unwrap()
        })
        .collect();
    order.borrow_mut().clear();

    s.set(1).unwrap();
    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    assert!(effects.iter().all(|e| e.run_count() == 2));
}

/// One failing effect does not stop the others; all failures are reported.
#[test]
fn flush_errors_are_collected() {
    let s = signal(0);
    let healthy = counter();

    let failing: Vec<_> = (0..2)
        .map(|i| {
            let s = s.clone();
            effect(move || -> Result<()> {
                if s.get() > 0 {
                    return Err(ReactiveError::msg(format!("effect {i} failed")));
                }
                Ok(())
            })
            .unwrap()
        })
        .collect();
    let _healthy = {
        let (s, healthy) = (s.clone(), healthy.clone());
        effect(move || {
            s.get();
            healthy.set(healthy.get() + 1);
        })
        .unwrap()
    };

    let err = s.set(1).unwrap_err();
    assert!(matches!(err, ReactiveError::Multiple(ref errors) if errors.len() == 2));
    assert_eq!(healthy.get(), 2);
    assert!(failing.iter().all(|e| e.is_disposed()));

    // Disposed effects stay quiet.
    s.set(2).unwrap();
    assert_eq!(healthy.get(), 3);
}

/// A derivation error is returned on every read, then clears on recovery.
#[test]
fn computed_errors_recover() {
    let input = signal("12");
    let parsed = {
        let input = input.clone();
        try_computed(move || input.get().parse::<i32>().map_err(ReactiveError::user))
    };

    assert_eq!(parsed.get().unwrap(), 12);

    input.set("twelve").unwrap();
    let err = parsed.get().unwrap_err();
    assert!(matches!(err, ReactiveError::User(_)));
    assert!(parsed.get().is_err());

    input.set("13").unwrap();
    assert_eq!(parsed.get().unwrap(), 13);
}

/// Cleanups run before each re-run and once on dispose, untracked.
#[test]
fn cleanup_ordering() {
    let s = signal(1);
    let other = signal(0);
    let events = log();

    let e = {
        let (s, other, events) = (s.clone(), other.clone(), events.clone());
        effect(move || {
            let v = s.get();
            events.borrow_mut().push(format!("run {v}"));
            let (other, events) = (other.clone(), events.clone());
            Cleanup::new(move || {
                other.get();
                events.borrow_mut().push(format!("cleanup {v}"));
            })
        })
        .unwrap()
    };

    s.set(2).unwrap();
    // Read inside a cleanup: not a dependency.
    other.set(1).unwrap();
    e.dispose().unwrap();
    e.dispose().unwrap();

    assert_eq!(
        *events.borrow(),
        vec!["run 1", "cleanup 1", "run 2", "cleanup 2"]
    );
}

/// A self-triggering effect chain is cut off at the configured limit.
#[test]
fn runaway_effects_are_abandoned() {
    Runtime::configure(RuntimeConfig::default().with_max_batch_iterations(5));

    let ping = signal(0);
    let pong = signal(0);
    let _echo = {
        let (ping, pong) = (ping.clone(), pong.clone());
        effect(move || pong.set(ping.get()))
    }
    .unwrap();
    let result = {
        let (ping, pong) = (ping.clone(), pong.clone());
        effect(move || ping.set(pong.get() + 1))
    };

    assert!(matches!(result, Err(ReactiveError::RunawayUpdate { limit: 5 })));
    assert_eq!(Runtime::stats().batch_depth, 0);

    // The runtime is usable afterwards.
    let fresh = signal(1);
    let doubled = {
        let fresh = fresh.clone();
        computed(move || fresh.get() * 2)
    };
    assert_eq!(doubled.get().unwrap(), 2);

    // Computeds caught mid-flush keep propagating later writes.
    let source = signal(0);
    let level = signal(0);
    let scaled = {
        let source = source.clone();
        computed(move || source.get() * 10)
    };
    let seen = log();
    let _watch = {
        let (scaled, seen) = (scaled.clone(), seen.clone());
        effect(move || seen.borrow_mut().push(scaled.get().unwrap_or_default()))
    }
    .unwrap();
    let result = {
        let (source, level) = (source.clone(), level.clone());
        effect(move || -> Result<()> {
            let n = level.get();
            source.set(n)?;
            level.set(n + 1)
        })
    };
    assert!(matches!(result, Err(ReactiveError::RunawayUpdate { limit: 5 })));

    Runtime::configure(RuntimeConfig::default());

    source.set(1000).unwrap();
    assert_eq!(seen.borrow().last(), Some(&10000));
    assert_eq!(scaled.get().unwrap(), 10000);
}

/// Released dependency nodes are reused by later evaluations.
#[test]
fn dependency_nodes_are_recycled() {
    let signals: Vec<Signal<i32>> = (0..3).map(signal).collect();
    let before = Runtime::stats();

    let first = {
        let signals = signals.clone();
        effect(move || {
            for s in &signals {
                s.get();
            }
        })
        .unwrap()
    };
    assert_eq!(Runtime::stats().live_nodes, before.live_nodes + 3);

    first.dispose().unwrap();
    let after_dispose = Runtime::stats();
    assert_eq!(after_dispose.live_nodes, before.live_nodes);
    assert_eq!(after_dispose.pooled_nodes, before.pooled_nodes + 3);

    let _second = {
        let signals = signals.clone();
        effect(move || {
            for s in &signals {
                s.get();
            }
        })
        .unwrap()
    };
    assert_eq!(Runtime::stats().pooled_nodes, before.pooled_nodes);
}

/// `untracked` hides reads from the surrounding effect.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = signal(1);
    let hidden = signal(1);
    let runs = counter();

    let _effect = {
        let (tracked, hidden, runs) = (tracked.clone(), hidden.clone(), runs.clone());
        effect(move || {
            tracked.get();
            untracked(|| hidden.get());
            assert!(Runtime::is_tracking());
            runs.set(runs.get() + 1);
        })
        .unwrap()
    };
    assert!(!Runtime::is_tracking());

    hidden.set(2).unwrap();
    assert_eq!(runs.get(), 1);
    tracked.set(2).unwrap();
    assert_eq!(runs.get(), 2);
}

/// Tree readers only hear about the paths they read.
#[test]
fn signal_tree_notifies_selectively() {
    let tree = SignalTree::new(json!({
        "title": "todo",
        "items": [{ "done": false }, { "done": false }]
    }));

    let title_runs = counter();
    let _title = {
        let (tree, runs) = (tree.clone(), title_runs.clone());
        effect(move || {
            tree.get(&["title".into()]);
            runs.set(runs.get() + 1);
        })
        .unwrap()
    };

    let done = log();
    let _second = {
        let (tree, done) = (tree.clone(), done.clone());
        effect(move || {
            let path = ["items".into(), PathSegment::Index(1), "done".into()];
            done.borrow_mut().push(tree.get(&path));
        })
        .unwrap()
    };

    tree.set(&["items".into(), PathSegment::Index(0), "done".into()], json!(true))
        .unwrap();
    tree.set(&["items".into(), PathSegment::Index(1), "done".into()], json!(true))
        .unwrap();

    assert_eq!(title_runs.get(), 1);
    assert_eq!(*done.borrow(), vec![Some(json!(false)), Some(json!(true))]);
}

/// A matcher that stops expanding below the first level stores deeper
/// containers whole.
#[test]
fn signal_tree_respects_matcher() {
    let tree = SignalTree::with_matcher(
        json!({ "config": { "theme": "dark", "size": 12 } }),
        MaxDepth(0),
    );

    let runs = counter();
    let _effect = {
        let (tree, runs) = (tree.clone(), runs.clone());
        effect(move || {
            tree.get(&["config".into(), "theme".into()]);
            runs.set(runs.get() + 1);
        })
        .unwrap()
    };

    // Coarse: a sibling write inside the same container notifies.
    tree.set(&["config".into(), "size".into()], json!(14)).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(
        tree.to_value(),
        json!({ "config": { "theme": "dark", "size": 14 } })
    );
}
