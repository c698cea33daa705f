//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever a field it
//! read during its last run changes.
//!
//! # How Effects Work
//!
//! 1. When created with [`Runtime::watch_effect`], the effect runs its body
//!    immediately to establish its initial dependency set.
//!
//! 2. Before every run the effect unsubscribes from all Deps it read last
//!    time. The body then re-subscribes to whatever it reads now, so a read
//!    behind a branch that is no longer taken stops triggering the effect.
//!
//! 3. When a Dep it reads is triggered, the runtime re-runs the effect
//!    synchronously. If the effect is itself mid-run (it wrote a field it
//!    read, or a nested effect did), it is marked pending instead and runs
//!    again as soon as the current run returns.
//!
//! 4. [`Effect::stop`] severs every edge, fires the teardown callbacks once
//!    and drops the body. The effect never runs again afterwards.
//!
//! # Storage
//!
//! Effects live in the runtime's effect arena. [`Effect`] is a cheap handle
//! (runtime + index); cloning it does not clone the effect.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::dep::DepId;
use super::runtime::Runtime;

/// Identifier of an effect inside a runtime's effect arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectId(u64);

impl EffectId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u64)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

pub(crate) type EffectBody = Arc<dyn Fn() + Send + Sync>;
pub(crate) type Teardown = Box<dyn FnOnce() + Send>;

/// Arena entry for one effect.
pub(crate) struct EffectSlot {
    /// Taken on `stop`, releasing whatever the body captured.
    pub(crate) body: Option<EffectBody>,

    /// Deps this effect is subscribed to. Always the reverse view of the
    /// Deps' subscriber sets.
    pub(crate) deps: SmallVec<[DepId; 4]>,

    pub(crate) active: bool,

    /// Triggered while already running; re-run once the current run returns.
    pub(crate) pending: bool,

    /// Teardown callbacks, drained by the first `stop`.
    pub(crate) on_stop: Vec<Teardown>,

    pub(crate) run_count: usize,
}

impl EffectSlot {
    pub(crate) fn new(body: EffectBody) -> Self {
        Self {
            body: Some(body),
            deps: SmallVec::new(),
            active: true,
            pending: false,
            on_stop: Vec::new(),
            run_count: 0,
        }
    }
}

impl fmt::Debug for EffectSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectSlot")
            .field("deps", &self.deps)
            .field("active", &self.active)
            .field("pending", &self.pending)
            .field("on_stop", &self.on_stop.len())
            .field("run_count", &self.run_count)
            .finish()
    }
}

/// Handle to an effect registered in a [`Runtime`].
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let counter = ReactiveProxy::new(Record::new().with("count", 0));
/// counter.bind(&runtime);
///
/// let reader = counter.clone();
/// let effect = runtime.watch_effect(move || {
///     println!("count is {:?}", reader.get("count"));
/// });
///
/// counter.set("count", 5);   // prints "count is Some(Int(5))"
/// effect.stop();
/// counter.set("count", 6);   // prints nothing
/// ```
#[derive(Clone)]
pub struct Effect {
    id: EffectId,
    runtime: Runtime,
}

impl Effect {
    /// Create an effect and run it once to establish its dependencies.
    pub fn new<F>(runtime: &Runtime, body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(runtime, body);
        effect.run();
        effect
    }

    /// Create an effect without running it.
    ///
    /// It has no dependencies until [`Effect::run`] is called.
    pub fn new_lazy<F>(runtime: &Runtime, body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = runtime.register_effect(Arc::new(body));
        Self {
            id,
            runtime: runtime.clone(),
        }
    }

    /// Get the effect's ID.
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// The runtime this effect belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Re-run the body, recomputing the dependency set. No-op once stopped.
    pub fn run(&self) {
        self.runtime.run_effect(self.id);
    }

    /// Stop the effect. Idempotent.
    pub fn stop(&self) {
        self.runtime.stop_effect(self.id);
    }

    /// Register a callback invoked once when the effect is stopped.
    pub fn on_stop<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.runtime.add_teardown(self.id, Box::new(teardown));
    }

    pub fn is_active(&self) -> bool {
        self.runtime.is_effect_active(self.id)
    }

    /// Number of times the body has been executed.
    pub fn run_count(&self) -> usize {
        self.runtime.effect_run_count(self.id)
    }

    /// Deps the effect is currently subscribed to.
    pub fn dependencies(&self) -> Vec<DepId> {
        self.runtime.effect_dependencies(self.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependencies().len())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
