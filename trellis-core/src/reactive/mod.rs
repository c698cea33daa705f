//! Reactive Primitives
//!
//! This module implements the dependency graph: Deps, effects, the execution
//! context and the target map that ties record fields to Deps.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A Dep is one trackable slot, normally "field `f` of record `r`". It keeps
//! an ordered set of subscribed effects.
//!
//! ## Effects
//!
//! An Effect is a computation that re-runs whenever a Dep it read during its
//! previous run is triggered. Its dependency set is rebuilt from scratch on
//! every run, so it only ever reacts to what it actually read last time.
//!
//! ## Tracking
//!
//! [`Runtime::track`] subscribes the running effect to a `(target, field)`
//! pair and [`Runtime::trigger`] re-runs the subscribers of one. Records call
//! these from their read and write watchers, see
//! [`ReactiveProxy::bind`](crate::proxy::ReactiveProxy::bind).
//!
//! # Implementation Notes
//!
//! The execution context is owned by a [`Runtime`] rather than stored in a
//! hidden global, and Deps and effects reference each other by arena index.

mod context;
mod dep;
mod effect;
mod runtime;
mod target;

pub use dep::DepId;
pub use effect::{Effect, EffectId};
pub use runtime::{GraphStats, MAX_PENDING_RERUNS, Runtime, WeakRuntime};
pub use target::TargetId;
