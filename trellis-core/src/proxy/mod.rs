//! Reactive Records
//!
//! [`ReactiveProxy`] wraps a record and intercepts every read and write made
//! through it:
//!
//! - `get` runs the field's read watchers with `old == new`.
//! - `set` ignores writes that do not change the value. Otherwise it writes,
//!   runs the field's write watchers with the real old/new pair, and appends
//!   to a bounded change history.
//!
//! The proxy knows nothing about effects. It is connected to a [`Runtime`]
//! by installing watchers that call `track` on read and `trigger` on write,
//! which is what [`ReactiveProxy::bind`] does.
//!
//! # Re-entrancy
//!
//! No lock is held while watchers run. A write watcher may therefore trigger
//! an effect that reads (or writes) the same proxy again.

mod history;
mod record;
mod value;
mod watch;

pub use history::ChangeRecord;
pub use record::{FieldAccess, Record};
#[doc(hidden)]
pub use record::convert_field;
pub use value::{ConversionError, Value};
pub use watch::{WatchKind, Watcher};

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{ReactiveError, Result};
use crate::reactive::{Runtime, TargetId, WeakRuntime};
use history::History;
use watch::Watchers;

/// History capacity used by [`ProxyOptions::default`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 2;

/// Per-proxy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyOptions {
    /// Maximum number of change records kept. `0` disables history.
    pub history_capacity: usize,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl ProxyOptions {
    /// Parse options from JSON, filling missing keys with defaults.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

struct ProxyInner<R> {
    record: RwLock<R>,
    watchers: RwLock<Watchers>,
    history: Mutex<History>,
    /// Runtimes this record was bound to; released when the record goes away.
    bindings: Mutex<Vec<WeakRuntime>>,
}

impl<R> Drop for ProxyInner<R> {
    fn drop(&mut self) {
        let target = TargetId::of(&*self);
        for binding in self.bindings.get_mut().drain(..) {
            if let Some(runtime) = binding.upgrade() {
                runtime.release_target(target);
            }
        }
    }
}

/// A watched record.
///
/// `ReactiveProxy` is a cheap, cloneable handle; clones share the record, the
/// watchers and the history.
pub struct ReactiveProxy<R> {
    inner: Arc<ProxyInner<R>>,
}

impl<R> Clone for ReactiveProxy<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: FieldAccess> ReactiveProxy<R> {
    /// Wrap `record` with default options.
    pub fn new(record: R) -> Self {
        Self::with_options(record, ProxyOptions::default())
    }

    pub fn with_options(record: R, options: ProxyOptions) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                record: RwLock::new(record),
                watchers: RwLock::new(Watchers::default()),
                history: Mutex::new(History::new(options.history_capacity)),
                bindings: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Identity of the wrapped record in a runtime's target map.
    pub fn target_id(&self) -> TargetId {
        TargetId::of(&*self.inner)
    }

    // ------------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------------

    /// Read `field`, running its read watchers. `None` if there is no such
    /// field.
    pub fn get(&self, field: &str) -> Option<Value> {
        match self.try_get(field) {
            Ok(value) => Some(value),
            Err(err) => {
                trace!(%err, "read ignored");
                None
            }
        }
    }

    /// Like [`get`](Self::get), reporting a missing field as an error.
    pub fn try_get(&self, field: &str) -> Result<Value> {
        let value = self
            .inner
            .record
            .read()
            .get_field(field)
            .ok_or_else(|| ReactiveError::field_not_found(field))?;

        self.run_watchers(field, WatchKind::Read, &value, &value);
        Ok(value)
    }

    /// Write `field`. Returns whether the value changed.
    ///
    /// Unknown and read-only fields, and values the record rejects, leave the
    /// record untouched and return `false`.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> bool {
        match self.try_set(field, value) {
            Ok(changed) => changed,
            Err(err) => {
                debug!(%err, "write ignored");
                false
            }
        }
    }

    /// Like [`set`](Self::set), reporting why a write was rejected.
    ///
    /// A write equal to the current value returns `Ok(false)` before the
    /// record is asked to store it.
    pub fn try_set(&self, field: &str, value: impl Into<Value>) -> Result<bool> {
        let new = value.into();
        let old = {
            let mut record = self.inner.record.write();
            let old = record
                .get_field(field)
                .ok_or_else(|| ReactiveError::field_not_found(field))?;
            if old == new {
                return Ok(false);
            }
            record.set_field(field, new.clone())?;
            old
        };

        self.run_watchers(field, WatchKind::Write, &old, &new);
        self.inner.history.lock().push(field, old, new);
        Ok(true)
    }

    fn run_watchers(&self, field: &str, kind: WatchKind, old: &Value, new: &Value) {
        let watchers = self.inner.watchers.read().snapshot(field, kind);
        for watcher in watchers {
            watcher(field, old, new);
        }
    }

    // ------------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------------

    /// Register `callback` for reads or writes of `field`.
    ///
    /// Callbacks for the same field and kind run in registration order.
    pub fn watch<F>(&self, field: &str, kind: WatchKind, callback: F)
    where
        F: Fn(&str, &Value, &Value) + Send + Sync + 'static,
    {
        self.inner
            .watchers
            .write()
            .add(field, kind, Arc::new(callback));
    }

    /// Register a watcher with the kind given by name (`"Get"`/`"Set"` or
    /// `"Read"`/`"Write"`).
    ///
    /// An unknown kind is logged and the watcher is dropped.
    pub fn watch_named<F>(&self, field: &str, kind: &str, callback: F) -> Result<()>
    where
        F: Fn(&str, &Value, &Value) + Send + Sync + 'static,
    {
        match kind.parse::<WatchKind>() {
            Ok(kind) => {
                self.watch(field, kind, callback);
                Ok(())
            }
            Err(err) => {
                warn!(%err, field, "watcher ignored");
                Err(err)
            }
        }
    }

    /// Number of watchers registered for `(field, kind)`.
    pub fn watcher_count(&self, field: &str, kind: WatchKind) -> usize {
        self.inner.watchers.read().count(field, kind)
    }

    // ------------------------------------------------------------------------
    // Runtime binding
    // ------------------------------------------------------------------------

    /// Make `field` reactive in `runtime`: reads through this proxy track
    /// `(record, field)` and changes trigger it.
    pub fn bind_field(&self, runtime: &Runtime, field: &str) {
        let target = self.target_id();

        let weak = runtime.downgrade();
        self.watch(field, WatchKind::Read, move |field, _, _| {
            if let Some(runtime) = weak.upgrade() {
                runtime.track(target, field);
            }
        });

        let weak = runtime.downgrade();
        self.watch(field, WatchKind::Write, move |field, _, _| {
            if let Some(runtime) = weak.upgrade() {
                runtime.trigger(target, field);
            }
        });

        self.remember_binding(runtime);
    }

    /// Bind every field the record currently reports.
    pub fn bind(&self, runtime: &Runtime) {
        let fields = self.inner.record.read().field_names();
        for field in &fields {
            self.bind_field(runtime, field);
        }
        debug!(
            target_id = self.target_id().raw(),
            fields = fields.len(),
            "bound record"
        );
    }

    fn remember_binding(&self, runtime: &Runtime) {
        let mut bindings = self.inner.bindings.lock();
        let known = bindings
            .iter()
            .filter_map(WeakRuntime::upgrade)
            .any(|bound| bound.ptr_eq(runtime));
        if !known {
            bindings.push(runtime.downgrade());
        }
    }

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    /// Recorded changes, oldest first.
    ///
    /// A change is appended after its write watchers return, so `seq` is
    /// append order. A write made from inside a write watcher is appended,
    /// and numbered, before the write that caused it.
    pub fn history(&self) -> Vec<ChangeRecord> {
        self.inner.history.lock().entries()
    }

    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
    }

    pub fn history_capacity(&self) -> usize {
        self.inner.history.lock().capacity()
    }

    // ------------------------------------------------------------------------
    // Record
    // ------------------------------------------------------------------------

    /// Run `f` against the wrapped record without notifying any watcher.
    pub fn with_record<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&*self.inner.record.read())
    }

    /// Copy of the wrapped record.
    pub fn snapshot(&self) -> R
    where
        R: Clone,
    {
        self.inner.record.read().clone()
    }
}

impl<R: fmt::Debug> fmt::Debug for ReactiveProxy<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveProxy")
            .field("record", &*self.inner.record.read())
            .field("watchers", &*self.inner.watchers.read())
            .field("history", &self.inner.history.lock().entries().len())
            .finish()
    }
}
