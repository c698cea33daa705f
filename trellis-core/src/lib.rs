//! Trellis Core
//!
//! This crate provides fine-grained reactive state tracking:
//!
//! - A dependency graph of Deps (one per watched record field) and effects
//! - Effects that re-run exactly when something they last read changes
//! - A record wrapper that observes reads and writes and keeps a short change
//!   history
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: Deps, effects, the execution context and the target map,
//!   all owned by a [`Runtime`]
//! - `proxy`: [`ReactiveProxy`], per-field watchers and change history over
//!   any record implementing [`FieldAccess`]
//!
//! The two halves are independent. A proxy becomes reactive once its read
//! watchers call [`Runtime::track`] and its write watchers call
//! [`Runtime::trigger`], which [`ReactiveProxy::bind`] sets up.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use trellis_core::{ReactiveProxy, Record, Runtime, Value};
//!
//! let runtime = Runtime::new();
//! let state = ReactiveProxy::new(Record::new().with("count", 0));
//! state.bind(&runtime);
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let (reader, sink) = (state.clone(), log.clone());
//! let effect = runtime.watch_effect(move || {
//!     if let Some(Value::Int(count)) = reader.get("count") {
//!         sink.lock().unwrap().push(count);
//!     }
//! });
//!
//! state.set("count", 0); // unchanged, effect does not re-run
//! state.set("count", 5); // effect re-runs
//! assert_eq!(*log.lock().unwrap(), vec![0, 5]);
//!
//! effect.stop();
//! state.set("count", 6);
//! assert_eq!(*log.lock().unwrap(), vec![0, 5]);
//! ```

pub mod error;
pub mod proxy;
pub mod reactive;

pub use error::{ReactiveError, Result};
pub use proxy::{
    ChangeRecord, FieldAccess, ProxyOptions, ReactiveProxy, Record, Value, WatchKind,
};
pub use reactive::{
    DepId, Effect, EffectId, GraphStats, MAX_PENDING_RERUNS, Runtime, TargetId, WeakRuntime,
};
