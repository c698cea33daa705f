//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects Deps and effects. It
//! owns the dependency graph, the target map and the execution context.
//!
//! # How It Works
//!
//! 1. When an effect runs, the runtime pushes it onto the execution stack and
//!    unsubscribes it from every Dep it read last time.
//!
//! 2. While the body runs, each `track(target, field)` resolves (or lazily
//!    creates) the Dep for that field and subscribes the active effect to it.
//!
//! 3. A later `trigger(target, field)` snapshots that Dep's subscribers and
//!    re-runs each one that is still active, in subscription order. A
//!    subscriber that is already running further up the stack is marked
//!    pending and re-runs once its current run returns, up to
//!    [`MAX_PENDING_RERUNS`] times in a row.
//!
//! # Thread Safety
//!
//! All entry points take the runtime's execution gate, a re-entrant mutex.
//! Only one thread can be inside the graph at a time, while a run on the
//! owning thread may still trigger or run nested effects. The graph itself is
//! behind a plain mutex that is never held while user code runs.
//!
//! # Storage
//!
//! Deps and effects live in two arenas and refer to each other by index, so
//! there are no reference cycles between them.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::context::{ContextFrame, ExecutionContext};
use super::dep::{Dep, DepId};
use super::effect::{Effect, EffectBody, EffectId, EffectSlot, Teardown};
use super::target::{TargetId, TargetMap};

/// How many times in a row an effect may be re-run because it was triggered
/// during its own run. Past this the effect is left with its last run's state.
pub const MAX_PENDING_RERUNS: usize = 100;

/// Snapshot of the registry, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Records with at least one tracked field.
    pub targets: usize,
    /// Tracked `(record, field)` pairs.
    pub fields: usize,
    /// Distinct effects subscribed to any registry Dep.
    pub subscribed_effects: usize,
}

/// Graph state guarded by the runtime's mutex.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    deps: Vec<Dep>,
    /// Dep slots cleared by `release_target`, ready for reuse.
    free_deps: Vec<DepId>,
    effects: Vec<EffectSlot>,
    targets: TargetMap,
    pub(crate) context: ExecutionContext,
}

fn alloc_dep(deps: &mut Vec<Dep>, free_deps: &mut Vec<DepId>) -> DepId {
    // Released slots are already empty.
    if let Some(id) = free_deps.pop() {
        return id;
    }
    let id = DepId::from_index(deps.len());
    deps.push(Dep::new());
    id
}

impl Graph {
    fn create_dep(&mut self) -> DepId {
        alloc_dep(&mut self.deps, &mut self.free_deps)
    }

    fn dep_for_or_insert(&mut self, target: TargetId, field: &str) -> DepId {
        let Self {
            deps,
            free_deps,
            targets,
            ..
        } = self;
        targets.get_or_insert_with(target, field, || {
            let id = alloc_dep(deps, free_deps);
            trace!(dep = id.raw(), target_id = target.raw(), field, "created dep");
            id
        })
    }

    /// Subscribe the active effect to `dep`, keeping both edge directions in
    /// sync.
    fn track_dep(&mut self, dep: DepId) {
        let Some(effect) = self.context.current() else {
            return;
        };
        let Some(slot) = self.effects.get_mut(effect.index()) else {
            return;
        };
        // A body that stopped its own effect must not re-subscribe it.
        if !slot.active {
            return;
        }
        let Some(node) = self.deps.get_mut(dep.index()) else {
            return;
        };
        if node.add_subscriber(effect) {
            slot.deps.push(dep);
        }
    }

    /// Unsubscribe `effect` from every Dep it reads and clear its dep list.
    fn cleanup(&mut self, effect: EffectId) {
        let Self { deps, effects, .. } = self;
        let Some(slot) = effects.get_mut(effect.index()) else {
            return;
        };
        for dep in slot.deps.drain(..) {
            if let Some(node) = deps.get_mut(dep.index()) {
                node.remove_subscriber(effect);
            }
        }
    }

    /// Prepare a run: push the effect, recompute from scratch, and hand back
    /// the body to execute outside the lock. `None` if the effect is stopped.
    fn begin_run(&mut self, effect: EffectId) -> Option<EffectBody> {
        let slot = self.effects.get_mut(effect.index())?;
        if !slot.active {
            return None;
        }
        let body = slot.body.clone()?;
        slot.pending = false;
        slot.run_count += 1;

        self.context.push(effect);
        self.cleanup(effect);
        Some(body)
    }

    /// Clear the pending flag, returning whether `effect` should run again.
    fn take_pending(&mut self, effect: EffectId) -> bool {
        self.effects
            .get_mut(effect.index())
            .is_some_and(|slot| std::mem::take(&mut slot.pending) && slot.active)
    }

    fn mark_pending(&mut self, effect: EffectId) {
        if let Some(slot) = self.effects.get_mut(effect.index()) {
            slot.pending = true;
        }
    }

    /// Deactivate `effect` and hand back its teardown callbacks and body, to
    /// be run and dropped outside the lock. `None` if it was already stopped.
    fn stop(&mut self, effect: EffectId) -> Option<(Vec<Teardown>, Option<EffectBody>)> {
        let slot = self.effects.get(effect.index())?;
        if !slot.active {
            return None;
        }
        self.cleanup(effect);

        let slot = &mut self.effects[effect.index()];
        slot.active = false;
        slot.pending = false;
        Some((std::mem::take(&mut slot.on_stop), slot.body.take()))
    }

    fn is_active(&self, effect: EffectId) -> bool {
        self.effects
            .get(effect.index())
            .is_some_and(|slot| slot.active)
    }

    fn release_target(&mut self, target: TargetId) -> usize {
        let released = self.targets.remove(target);
        for dep in &released {
            let Some(node) = self.deps.get_mut(dep.index()) else {
                continue;
            };
            for effect in node.subscribers() {
                if let Some(slot) = self.effects.get_mut(effect.index()) {
                    slot.deps.retain(|d| *d != *dep);
                }
            }
            node.clear();
        }
        self.free_deps.extend_from_slice(&released);
        released.len()
    }

    fn stats(&self) -> GraphStats {
        let mut subscribed = HashSet::new();
        for dep in self.targets.deps() {
            if let Some(node) = self.deps.get(dep.index()) {
                subscribed.extend(node.subscribers());
            }
        }
        GraphStats {
            targets: self.targets.target_count(),
            fields: self.targets.field_count(),
            subscribed_effects: subscribed.len(),
        }
    }
}

pub(crate) struct RuntimeInner {
    /// Serializes every entry point; re-entrant so nested runs on the same
    /// thread can pass through.
    gate: ReentrantMutex<()>,
    graph: Mutex<Graph>,
}

/// Owner of one dependency graph.
///
/// `Runtime` is a cheap, cloneable handle. Clones share the same graph.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning reference to a [`Runtime`].
///
/// Watchers installed on a record hold one of these, so that effect bodies
/// capturing the record do not keep the runtime alive through a cycle.
#[derive(Clone, Debug)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    /// Create an empty runtime.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                gate: ReentrantMutex::new(()),
                graph: Mutex::new(Graph::default()),
            }),
        }
    }

    /// Process-wide runtime for callers that do not pass one around.
    pub fn global() -> &'static Runtime {
        GLOBAL.get_or_init(Runtime::new)
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles share a graph.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    /// Create an effect and run it once, establishing its dependencies.
    pub fn watch_effect<F>(&self, body: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        Effect::new(self, body)
    }

    /// Create an effect without running it.
    pub fn effect_lazy<F>(&self, body: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        Effect::new_lazy(self, body)
    }

    pub(crate) fn register_effect(&self, body: EffectBody) -> EffectId {
        let _gate = self.inner.gate.lock();
        let mut graph = self.inner.graph.lock();
        let id = EffectId::from_index(graph.effects.len());
        graph.effects.push(EffectSlot::new(body));
        debug!(effect = id.raw(), "registered effect");
        id
    }

    pub(crate) fn run_effect(&self, effect: EffectId) {
        let _gate = self.inner.gate.lock();
        let mut reruns = 0;
        loop {
            let Some(body) = self.inner.graph.lock().begin_run(effect) else {
                return;
            };
            {
                let _frame = ContextFrame::new(&self.inner.graph, effect);
                trace!(effect = effect.raw(), "running effect");
                body();
            }
            // May be the last handle if the body stopped its own effect.
            drop(body);

            if !self.inner.graph.lock().take_pending(effect) {
                return;
            }
            if reruns == MAX_PENDING_RERUNS {
                warn!(
                    effect = effect.raw(),
                    reruns, "effect keeps triggering itself, giving up"
                );
                return;
            }
            reruns += 1;
        }
    }

    pub(crate) fn stop_effect(&self, effect: EffectId) {
        let _gate = self.inner.gate.lock();
        let Some((teardowns, body)) = self.inner.graph.lock().stop(effect) else {
            return;
        };
        debug!(
            effect = effect.raw(),
            teardowns = teardowns.len(),
            "stopped effect"
        );
        for teardown in teardowns {
            teardown();
        }
        drop(body);
    }

    pub(crate) fn add_teardown(&self, effect: EffectId, teardown: Teardown) {
        let _gate = self.inner.gate.lock();
        let rejected = match self.inner.graph.lock().effects.get_mut(effect.index()) {
            Some(slot) if slot.active => {
                slot.on_stop.push(teardown);
                None
            }
            _ => Some(teardown),
        };
        // Dropped outside the graph lock; it may own records bound here.
        if rejected.is_some() {
            debug!(effect = effect.raw(), "teardown ignored, effect stopped");
        }
    }

    pub(crate) fn is_effect_active(&self, effect: EffectId) -> bool {
        self.inner.graph.lock().is_active(effect)
    }

    pub(crate) fn effect_run_count(&self, effect: EffectId) -> usize {
        self.inner
            .graph
            .lock()
            .effects
            .get(effect.index())
            .map_or(0, |slot| slot.run_count)
    }

    pub(crate) fn effect_dependencies(&self, effect: EffectId) -> Vec<DepId> {
        self.inner
            .graph
            .lock()
            .effects
            .get(effect.index())
            .map(|slot| slot.deps.to_vec())
            .unwrap_or_default()
    }

    /// The effect currently running, if any.
    pub fn active_effect(&self) -> Option<EffectId> {
        let _gate = self.inner.gate.lock();
        self.inner.graph.lock().context.current()
    }

    /// Check if we're inside a running effect.
    pub fn is_tracking(&self) -> bool {
        self.active_effect().is_some()
    }

    /// Number of effects ever created in this runtime, stopped ones included.
    pub fn effect_count(&self) -> usize {
        self.inner.graph.lock().effects.len()
    }

    // ------------------------------------------------------------------------
    // Tracking API
    // ------------------------------------------------------------------------

    /// Subscribe the active effect to `(target, field)`.
    ///
    /// No-op outside of any effect, so plain reads never populate the
    /// registry.
    pub fn track(&self, target: TargetId, field: &str) {
        let _gate = self.inner.gate.lock();
        let mut graph = self.inner.graph.lock();
        if graph.context.current().is_none() {
            return;
        }
        let dep = graph.dep_for_or_insert(target, field);
        graph.track_dep(dep);
    }

    /// Re-run every effect subscribed to `(target, field)`.
    ///
    /// No-op if the field was never tracked.
    pub fn trigger(&self, target: TargetId, field: &str) {
        let _gate = self.inner.gate.lock();
        let Some(dep) = self.inner.graph.lock().targets.get(target, field) else {
            return;
        };
        trace!(target_id = target.raw(), field, "trigger");
        self.notify(dep);
    }

    /// Create a Dep that is not attached to any record.
    pub fn create_dep(&self) -> DepId {
        let _gate = self.inner.gate.lock();
        self.inner.graph.lock().create_dep()
    }

    /// Subscribe the active effect to `dep`.
    pub fn track_dep(&self, dep: DepId) {
        let _gate = self.inner.gate.lock();
        self.inner.graph.lock().track_dep(dep);
    }

    /// Re-run every active subscriber of `dep`.
    pub fn trigger_dep(&self, dep: DepId) {
        let _gate = self.inner.gate.lock();
        self.notify(dep);
    }

    fn notify(&self, dep: DepId) {
        let queue = match self.inner.graph.lock().deps.get(dep.index()) {
            Some(node) => node.snapshot(),
            None => return,
        };

        for effect in queue {
            {
                let mut graph = self.inner.graph.lock();
                // Stopped by an earlier subscriber in this pass.
                if !graph.is_active(effect) {
                    continue;
                }
                // Already mid-run further up the stack; its outermost run
                // repeats once the body returns.
                if graph.context.is_running(effect) {
                    trace!(effect = effect.raw(), "deferring re-entrant trigger");
                    graph.mark_pending(effect);
                    continue;
                }
            }
            self.run_effect(effect);
        }
    }

    // ------------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------------

    /// The Dep registered for `(target, field)`, if it has been tracked.
    pub fn dep_for(&self, target: TargetId, field: &str) -> Option<DepId> {
        self.inner.graph.lock().targets.get(target, field)
    }

    /// Current subscribers of `dep`, in notification order.
    pub fn subscribers_of(&self, dep: DepId) -> Vec<EffectId> {
        self.inner
            .graph
            .lock()
            .deps
            .get(dep.index())
            .map(Dep::snapshot)
            .unwrap_or_default()
    }

    /// Remove every Dep registered for `target` and sever their edges.
    ///
    /// Returns how many fields were released. Effects that read the target
    /// stay active but will not be re-run by it until they track it again.
    /// The released [`DepId`]s are reused for fields tracked later.
    pub fn release_target(&self, target: TargetId) -> usize {
        let _gate = self.inner.gate.lock();
        let released = self.inner.graph.lock().release_target(target);
        if released > 0 {
            debug!(target_id = target.raw(), fields = released, "released target");
        }
        released
    }

    /// Counts over the whole registry.
    pub fn stats(&self) -> GraphStats {
        let _gate = self.inner.gate.lock();
        self.inner.graph.lock().stats()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("effects", &self.effect_count())
            .field("stats", &self.stats())
            .finish()
    }
}
