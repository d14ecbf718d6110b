//! Per-unit request context and cancellation.
//!
//! Every unit dispatched by `run`, `spawn`, `parallel`, or an HTTP front-end
//! gets a [`RequestContext`] installed in a thread-local stack for the
//! duration of its execution; the `context()` builtin reads the top of that
//! stack. Nested dispatches on the same thread push and pop, so each depth
//! sees its own context.

use std::{
    cell::RefCell,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use strum::Display;

/// Granularity of cancellation re-checks at suspension points. Waits are
/// bounded by this tick so a cancelled unit wakes promptly even when nothing
/// notifies its condition variable.
pub(crate) const WAIT_TICK: Duration = Duration::from_millis(25);

/// Cooperative cancellation signal, shared between a unit and its children.
///
/// A token observes its parent chain: cancelling a parent cancels every
/// linked child, while a child token can be cancelled on its own (e.g. a
/// `run` timeout) without touching the parent.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is also cancelled whenever `self` is.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Sleeps for `duration`, waking early (with `true`) when cancelled.
    #[must_use]
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(WAIT_TICK));
        }
    }
}

/// What kind of dispatch started a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnitKind {
    #[strum(serialize = "run")]
    Run,
    #[strum(serialize = "spawn")]
    Spawn,
    #[strum(serialize = "parallel")]
    Parallel,
    #[strum(serialize = "http")]
    Http,
    #[strum(serialize = "module")]
    Module,
}

/// One link in the dispatch chain exposed by `context().callstack()`.
#[derive(Debug, Clone)]
pub struct DispatchFrame {
    pub kind: UnitKind,
    /// Source path of the dispatching script, when it came from a file.
    pub path: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// Per-unit descriptor carried in the thread-local registry.
pub struct RequestContext {
    /// Payload supplied at dispatch, exposed via `context().request()`.
    pub payload: crate::value::Value,
    pub kind: UnitKind,
    /// Dispatch frames, outermost last.
    pub chain: Vec<DispatchFrame>,
    pub cancel: CancelToken,
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Arc<RequestContext>>> = const { RefCell::new(Vec::new()) };
}

/// Installs `context` for the current thread until the guard drops.
pub(crate) fn push_context(context: Arc<RequestContext>) -> ContextGuard {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(context));
    ContextGuard
}

/// The context of the innermost dispatched unit on this thread, if any.
#[must_use]
pub(crate) fn current_context() -> Option<Arc<RequestContext>> {
    CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
}

pub(crate) struct ContextGuard;

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_token_observes_parent_cancellation() {
        let parent = CancelToken::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_cancellation_does_not_reach_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn context_stack_pushes_and_pops() {
        assert!(current_context().is_none());
        let ctx = Arc::new(RequestContext {
            payload: crate::value::Value::Nil,
            kind: UnitKind::Run,
            chain: Vec::new(),
            cancel: CancelToken::new(),
        });
        {
            let _guard = push_context(ctx);
            assert!(current_context().is_some());
        }
        assert!(current_context().is_none());
    }
}
