//! Per-field watcher lists.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::value::Value;
use crate::error::ReactiveError;

/// Which access a watcher observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    /// Called on every successful `get`, with `old == new`.
    Read,
    /// Called on every `set` that changes the value.
    Write,
}

impl FromStr for WatchKind {
    type Err = ReactiveError;

    /// Accepts `Read`/`Write` and the `Get`/`Set` spelling, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" | "get" => Ok(WatchKind::Read),
            "write" | "set" => Ok(WatchKind::Write),
            _ => Err(ReactiveError::UnknownWatchKind { kind: s.to_owned() }),
        }
    }
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchKind::Read => f.write_str("read"),
            WatchKind::Write => f.write_str("write"),
        }
    }
}

/// Callback receiving `(field, old, new)`.
pub type Watcher = Arc<dyn Fn(&str, &Value, &Value) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Watchers {
    read: HashMap<String, Vec<Watcher>>,
    write: HashMap<String, Vec<Watcher>>,
}

impl Watchers {
    pub(crate) fn add(&mut self, field: &str, kind: WatchKind, watcher: Watcher) {
        self.list_mut(kind)
            .entry(field.to_owned())
            .or_default()
            .push(watcher);
    }

    /// Watchers for `(field, kind)` in registration order, cloned so they can
    /// be invoked without holding the proxy's lock.
    pub(crate) fn snapshot(&self, field: &str, kind: WatchKind) -> Vec<Watcher> {
        self.list(kind).get(field).cloned().unwrap_or_default()
    }

    pub(crate) fn count(&self, field: &str, kind: WatchKind) -> usize {
        self.list(kind).get(field).map_or(0, Vec::len)
    }

    fn list(&self, kind: WatchKind) -> &HashMap<String, Vec<Watcher>> {
        match kind {
            WatchKind::Read => &self.read,
            WatchKind::Write => &self.write,
        }
    }

    fn list_mut(&mut self, kind: WatchKind) -> &mut HashMap<String, Vec<Watcher>> {
        match kind {
            WatchKind::Read => &mut self.read,
            WatchKind::Write => &mut self.write,
        }
    }
}

impl fmt::Debug for Watchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = |map: &HashMap<String, Vec<Watcher>>| -> usize {
            map.values().map(Vec::len).sum()
        };
        f.debug_struct("Watchers")
            .field("read", &counts(&self.read))
            .field("write", &counts(&self.write))
            .finish()
    }
}
