//! Integration Tests for the Reactive Core
//!
//! These tests drive effects through bound records, the way a rendering or
//! monitoring layer would.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use trellis_core::{
    field_access, EffectId, GraphStats, ReactiveProxy, Record, Runtime, Value, WatchKind,
};

#[derive(Debug, Clone)]
struct MemoryReport {
    alloc_mb: String,
    sys_mb: String,
    num_gc: i64,
}

field_access!(MemoryReport { alloc_mb, sys_mb, num_gc });

impl MemoryReport {
    fn new() -> Self {
        Self {
            alloc_mb: "0.00 MB".into(),
            sys_mb: "0.00 MB".into(),
            num_gc: 0,
        }
    }
}

fn counter_record(runtime: &Runtime) -> ReactiveProxy<Record> {
    let proxy = ReactiveProxy::new(Record::new().with("count", 0));
    proxy.bind(runtime);
    proxy
}

/// The basic scenario: an effect logs `count`, equal writes are invisible,
/// real writes re-run it.
#[test]
fn effect_reruns_on_change_only() {
    let runtime = Runtime::new();
    let state = counter_record(&runtime);
    let log = Arc::new(Mutex::new(Vec::new()));

    let (reader, sink) = (state.clone(), log.clone());
    let _effect = runtime.watch_effect(move || {
        let count = reader.get("count").and_then(|v| v.as_int());
        sink.lock().push(count.unwrap_or(-1));
    });
    assert_eq!(*log.lock(), vec![0]);

    state.set("count", 0);
    assert_eq!(*log.lock(), vec![0]);

    state.set("count", 5);
    assert_eq!(*log.lock(), vec![0, 5]);
}

/// Two effects on one field run once each, in subscription order.
#[test]
fn subscribers_run_in_subscription_order() {
    let runtime = Runtime::new();
    let state = counter_record(&runtime);
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second"] {
        let (reader, order) = (state.clone(), order.clone());
        runtime.watch_effect(move || {
            reader.get("count");
            order.lock().push(name);
        });
    }
    order.lock().clear();

    state.set("count", 1);
    assert_eq!(*order.lock(), vec!["first", "second"]);
}

/// Reads behind a branch that is no longer taken stop triggering the effect.
#[test]
fn dependencies_follow_the_branch_taken() {
    let runtime = Runtime::new();
    let state = ReactiveProxy::new(Record::new().with("a", 1).with("b", 2));
    state.bind(&runtime);
    let use_a = Arc::new(AtomicBool::new(true));
    let runs = Arc::new(AtomicI32::new(0));

    let (reader, flag, count) = (state.clone(), use_a.clone(), runs.clone());
    let effect = runtime.watch_effect(move || {
        count.fetch_add(1, Ordering::SeqCst);
        if flag.load(Ordering::SeqCst) {
            reader.get("a");
        } else {
            reader.get("b");
        }
    });

    use_a.store(false, Ordering::SeqCst);
    effect.run();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    state.set("a", 10);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    state.set("b", 20);
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    let b_dep = runtime.dep_for(state.target_id(), "b").unwrap();
    let a_dep = runtime.dep_for(state.target_id(), "a").unwrap();
    assert_eq!(effect.dependencies(), vec![b_dep]);
    assert!(runtime.subscribers_of(a_dep).is_empty());
}

/// After any run, `dep ∈ effect.deps` iff `effect ∈ dep.subscribers`.
#[test]
fn edges_stay_bidirectional() {
    let runtime = Runtime::new();
    let state = ReactiveProxy::new(Record::new().with("x", 0).with("y", 0).with("z", 0));
    state.bind(&runtime);

    let mut effects = Vec::new();
    for fields in [vec!["x"], vec!["x", "y"], vec!["z", "y", "x"]] {
        let reader = state.clone();
        effects.push(runtime.watch_effect(move || {
            for field in &fields {
                reader.get(field);
            }
        }));
    }
    state.set("x", 1);
    state.set("y", 1);

    let target = state.target_id();
    for field in ["x", "y", "z"] {
        let dep = runtime.dep_for(target, field).unwrap();
        let subscribers = runtime.subscribers_of(dep);
        for effect in &effects {
            assert_eq!(
                effect.dependencies().contains(&dep),
                subscribers.contains(&effect.id()),
                "field {field}, effect {:?}",
                effect.id()
            );
        }
    }
}

/// Stopping twice behaves like stopping once.
#[test]
fn stop_is_idempotent() {
    let runtime = Runtime::new();
    let state = counter_record(&runtime);
    let teardowns = Arc::new(AtomicI32::new(0));
    let runs = Arc::new(AtomicI32::new(0));

    let (reader, count) = (state.clone(), runs.clone());
    let effect = runtime.watch_effect(move || {
        count.fetch_add(1, Ordering::SeqCst);
        reader.get("count");
    });
    let counter = teardowns.clone();
    effect.on_stop(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    effect.stop();
    effect.stop();
    state.set("count", 1);

    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.stats().subscribed_effects, 0);
}

/// An effect run inside another effect's body tracks its own reads, and the
/// outer effect is active again afterwards.
#[test]
fn nested_effects_track_their_own_reads() {
    let runtime = Runtime::new();
    let outer_state = ReactiveProxy::new(Record::new().with("outer", 0));
    let inner_state = ReactiveProxy::new(Record::new().with("inner", 0));
    outer_state.bind(&runtime);
    inner_state.bind(&runtime);

    let inner_runs = Arc::new(AtomicI32::new(0));
    let outer_runs = Arc::new(AtomicI32::new(0));
    let active_after_inner: Arc<Mutex<Option<Option<EffectId>>>> = Arc::default();

    let rt = runtime.clone();
    let (outer_reader, inner_reader) = (outer_state.clone(), inner_state.clone());
    let (inner_count, outer_count) = (inner_runs.clone(), outer_runs.clone());
    let observed = active_after_inner.clone();
    let outer = runtime.watch_effect(move || {
        outer_count.fetch_add(1, Ordering::SeqCst);
        // Created once; later outer runs only read.
        if observed.lock().is_none() {
            let reader = inner_reader.clone();
            let count = inner_count.clone();
            rt.watch_effect(move || {
                count.fetch_add(1, Ordering::SeqCst);
                reader.get("inner");
            });
            *observed.lock() = Some(rt.active_effect());
        }
        outer_reader.get("outer");
    });

    assert_eq!(*active_after_inner.lock(), Some(Some(outer.id())));
    assert!(runtime.active_effect().is_none());

    inner_state.set("inner", 1);
    assert_eq!(inner_runs.load(Ordering::SeqCst), 2);
    assert_eq!(outer_runs.load(Ordering::SeqCst), 1);

    outer_state.set("outer", 1);
    assert_eq!(outer_runs.load(Ordering::SeqCst), 2);
    assert_eq!(inner_runs.load(Ordering::SeqCst), 2);
}

/// A panicking body must not leave a stale active effect behind.
#[test]
fn panicking_body_restores_context() {
    let runtime = Runtime::new();
    let state = counter_record(&runtime);
    let fail = Arc::new(AtomicBool::new(false));

    let (reader, should_fail) = (state.clone(), fail.clone());
    let _effect = runtime.watch_effect(move || {
        reader.get("count");
        if should_fail.load(Ordering::SeqCst) {
            panic!("effect body failed");
        }
    });

    fail.store(true, Ordering::SeqCst);
    let result = catch_unwind(AssertUnwindSafe(|| {
        state.set("count", 1);
    }));
    assert!(result.is_err());
    assert!(runtime.active_effect().is_none());

    // A plain read after the failure must not subscribe anything.
    let other = ReactiveProxy::new(Record::new().with("k", 0));
    other.bind(&runtime);
    other.get("k");
    assert!(runtime.dep_for(other.target_id(), "k").is_none());

    // And the graph keeps working.
    fail.store(false, Ordering::SeqCst);
    state.set("count", 2);
    assert!(runtime.active_effect().is_none());
}

/// Writing a field nobody tracks, or triggering a Dep without subscribers,
/// is harmless.
#[test]
fn untracked_writes_are_noops() {
    let runtime = Runtime::new();
    let state = counter_record(&runtime);

    assert!(state.set("count", 3));
    assert_eq!(runtime.stats(), GraphStats::default());

    let dep = runtime.create_dep();
    runtime.trigger_dep(dep);
}

/// A generated accessor works the same as the dynamic record.
#[test]
fn generated_record_drives_effects() {
    let runtime = Runtime::new();
    let report = ReactiveProxy::new(MemoryReport::new());
    report.bind(&runtime);
    let rendered = Arc::new(Mutex::new(Vec::new()));

    let (reader, screen) = (report.clone(), rendered.clone());
    runtime.watch_effect(move || {
        let alloc = reader.get("alloc_mb").unwrap_or_default();
        screen.lock().push(alloc.to_string());
    });

    report.set("alloc_mb", "12.50 MB");
    report.set("sys_mb", "40.00 MB");
    report.set("num_gc", 3);

    assert_eq!(*rendered.lock(), vec!["0.00 MB", "12.50 MB"]);
    assert_eq!(report.snapshot().num_gc, 3);
    assert_eq!(report.history().len(), 2);
    assert_eq!(report.history()[1].field, "num_gc");
}

/// An effect that writes what it reads re-runs until it stops writing.
#[test]
fn self_writing_effect_converges() {
    let runtime = Runtime::new();
    let state = counter_record(&runtime);
    let runs = Arc::new(AtomicI32::new(0));

    let (proxy, count) = (state.clone(), runs.clone());
    let effect = runtime.watch_effect(move || {
        count.fetch_add(1, Ordering::SeqCst);
        let n = proxy.get("count").and_then(|v| v.as_int()).unwrap_or(0);
        if n < 10 {
            proxy.set("count", n + 1);
        }
    });

    assert_eq!(state.get("count"), Some(Value::Int(10)));
    assert_eq!(runs.load(Ordering::SeqCst), 11);
    assert!(runtime.active_effect().is_none());

    // Still subscribed after settling.
    state.set("count", 0);
    assert_eq!(state.get("count"), Some(Value::Int(10)));
    assert_eq!(effect.run_count(), 22);
}

/// A nested effect writing a field the outer effect already read makes the
/// outer effect run again with the new value.
#[test]
fn outer_effect_sees_write_from_nested_effect() {
    let runtime = Runtime::new();
    let state = ReactiveProxy::new(Record::new().with("a", 0).with("b", 0));
    state.bind(&runtime);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let proxy = state.clone();
    let _mirror = runtime.watch_effect(move || {
        let b = proxy.get("b").and_then(|v| v.as_int()).unwrap_or(0);
        if b > 0 {
            proxy.set("a", 10);
        }
    });

    let (proxy, sink) = (state.clone(), seen.clone());
    let _source = runtime.watch_effect(move || {
        let a = proxy.get("a").and_then(|v| v.as_int()).unwrap_or(0);
        sink.lock().push(a);
        proxy.set("b", a + 1);
    });

    assert_eq!(*seen.lock(), vec![0, 10]);
    assert_eq!(state.get("a"), Some(Value::Int(10)));
    assert_eq!(state.get("b"), Some(Value::Int(11)));
}

/// One effect reading two records only reruns for the one that changed.
#[test]
fn records_with_equal_contents_do_not_share_deps() {
    let runtime = Runtime::new();
    let left = counter_record(&runtime);
    let right = counter_record(&runtime);
    let runs = Arc::new(AtomicI32::new(0));

    let (reader, count) = (left.clone(), runs.clone());
    runtime.watch_effect(move || {
        count.fetch_add(1, Ordering::SeqCst);
        reader.get("count");
    });

    right.set("count", 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    left.set("count", 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Dropping the last handle to a bound record releases its Deps.
#[test]
fn dropped_record_is_released() {
    let runtime = Runtime::new();
    let kept = counter_record(&runtime);
    let temp = counter_record(&runtime);

    // Track through the runtime directly so the body holds no record handle.
    let (rt, kept_id, temp_id) = (runtime.clone(), kept.target_id(), temp.target_id());
    let effect = runtime.watch_effect(move || {
        rt.track(kept_id, "count");
        rt.track(temp_id, "count");
    });
    assert_eq!(runtime.stats().targets, 2);
    assert_eq!(effect.dependencies().len(), 2);

    drop(temp);

    assert_eq!(runtime.stats().targets, 1);
    assert!(runtime.dep_for(temp_id, "count").is_none());
    assert_eq!(effect.dependencies().len(), 1);
    assert!(effect.is_active());
}

/// Stopping an effect lets go of the record its body captured, so dropping
/// the caller's handle releases the record.
#[test]
fn record_captured_by_stopped_effect_is_released() {
    let runtime = Runtime::new();
    let state = counter_record(&runtime);

    let reader = state.clone();
    let effect = runtime.watch_effect(move || {
        reader.get("count");
    });
    assert_eq!(runtime.stats().targets, 1);

    effect.stop();
    drop(effect);
    drop(state);

    assert_eq!(runtime.stats(), GraphStats::default());
}

/// A body holding the runtime does not keep it alive once stopped.
#[test]
fn stopped_effect_releases_captured_runtime() {
    let runtime = Runtime::new();
    let weak = runtime.downgrade();

    let rt = runtime.clone();
    let effect = runtime.watch_effect(move || {
        assert!(rt.is_tracking());
    });

    effect.stop();
    drop(effect);
    drop(runtime);

    assert!(weak.upgrade().is_none());
}

/// Diagnostics count targets, fields and distinct subscribed effects.
#[test]
fn stats_cover_the_registry() {
    let runtime = Runtime::new();
    let a = ReactiveProxy::new(Record::new().with("x", 0).with("y", 0));
    let b = ReactiveProxy::new(Record::new().with("x", 0));
    a.bind(&runtime);
    b.bind(&runtime);

    let (ra, rb) = (a.clone(), b.clone());
    runtime.watch_effect(move || {
        ra.get("x");
        ra.get("y");
        rb.get("x");
    });
    let ra = a.clone();
    runtime.watch_effect(move || {
        ra.get("x");
    });

    assert_eq!(
        runtime.stats(),
        GraphStats {
            targets: 2,
            fields: 3,
            subscribed_effects: 2,
        }
    );
}

/// Writers on other threads are serialized with effect runs.
#[test]
fn concurrent_writers_are_serialized() {
    let runtime = Runtime::new();
    let state = ReactiveProxy::new(Record::new().with("n", 0).with("sum", 0));
    state.bind(&runtime);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (reader, sink) = (state.clone(), seen.clone());
    runtime.watch_effect(move || {
        let n = reader.get("n").and_then(|v| v.as_int()).unwrap_or(0);
        sink.lock().push(n);
    });

    std::thread::scope(|scope| {
        for worker in 0..4_i64 {
            let state = state.clone();
            scope.spawn(move || {
                for i in 0..25_i64 {
                    state.set("n", worker * 1000 + i + 1);
                }
            });
        }
    });

    let seen = seen.lock();
    assert_eq!(seen[0], 0);
    assert!(seen.len() > 1);
    assert_eq!(state.get("n").and_then(|v| v.as_int()), seen.last().copied());
    assert!(runtime.active_effect().is_none());
}

/// Read watchers see identical old and new values; write watchers see the
/// real pair.
#[test]
fn watcher_arguments_match_access_kind() {
    let state = ReactiveProxy::new(Record::new().with("name", "Anya"));
    let calls = Arc::new(Mutex::new(Vec::new()));

    for kind in [WatchKind::Read, WatchKind::Write] {
        let calls = calls.clone();
        state.watch("name", kind, move |field, old, new| {
            calls
                .lock()
                .push((kind, field.to_string(), old.clone(), new.clone()));
        });
    }

    state.get("name");
    state.set("name", "Katya");

    assert_eq!(
        *calls.lock(),
        vec![
            (
                WatchKind::Read,
                "name".to_string(),
                Value::from("Anya"),
                Value::from("Anya")
            ),
            (
                WatchKind::Write,
                "name".to_string(),
                Value::from("Anya"),
                Value::from("Katya")
            ),
        ]
    );
}
