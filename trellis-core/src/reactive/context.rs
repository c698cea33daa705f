//! Execution Context
//!
//! The execution context tracks which effect is currently running, so that a
//! field read can subscribe the right effect.
//!
//! # Implementation
//!
//! Each runtime owns one stack of effect IDs. Running an effect pushes its ID
//! and the top of the stack is the active effect. When the run completes the
//! ID is popped, which restores whatever effect was active before. Nested runs
//! therefore attribute their reads to the innermost effect only.
//!
//! The pop is performed by [`ContextFrame`]'s `Drop`, so it also happens when
//! an effect body panics. A stale entry left on the stack would make every
//! later read subscribe the wrong effect.

use parking_lot::Mutex;

use super::effect::EffectId;
use super::runtime::Graph;

/// Stack of running effects.
#[derive(Debug, Default)]
pub(crate) struct ExecutionContext {
    stack: Vec<EffectId>,
}

impl ExecutionContext {
    pub(crate) fn push(&mut self, effect: EffectId) {
        self.stack.push(effect);
    }

    pub(crate) fn pop(&mut self, expected: EffectId) {
        let popped = self.stack.pop();

        // Verify we're popping the right frame.
        debug_assert_eq!(
            popped,
            Some(expected),
            "execution context mismatch: expected {:?}, got {:?}",
            expected,
            popped
        );
    }

    /// The effect currently running, if any.
    pub(crate) fn current(&self) -> Option<EffectId> {
        self.stack.last().copied()
    }

    /// Whether `effect` is anywhere on the stack (running or suspended by a
    /// nested run).
    pub(crate) fn is_running(&self, effect: EffectId) -> bool {
        self.stack.contains(&effect)
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Guard that pops an effect off the execution stack when dropped.
///
/// Created right after the runtime pushed `effect`.
pub(crate) struct ContextFrame<'a> {
    graph: &'a Mutex<Graph>,
    effect: EffectId,
}

impl<'a> ContextFrame<'a> {
    pub(crate) fn new(graph: &'a Mutex<Graph>, effect: EffectId) -> Self {
        Self { graph, effect }
    }
}

impl Drop for ContextFrame<'_> {
    fn drop(&mut self) {
        self.graph.lock().context.pop(self.effect);
    }
}
