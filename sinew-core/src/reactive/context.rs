//! Active-Target Stack
//!
//! The stack tracks which watcher is currently being evaluated. Any
//! intercepted read that happens while a watcher is on top of the stack
//! subscribes that watcher to the property it read.
//!
//! # Implementation
//!
//! We use a thread-local stack. Evaluating a watcher pushes a frame and the
//! returned [`ActiveTarget`] guard pops it when dropped, including when the
//! watcher's getter panics, so a failed evaluation never leaves a stale
//! target behind.
//!
//! Nested evaluation (a watcher reading a computed property, which evaluates
//! its own lazy watcher) stacks naturally. An empty frame pushed by
//! [`untracked`] suspends tracking for the code inside it.

use std::cell::RefCell;

use super::watcher::{Watcher, WatcherId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = RefCell::new(Vec::new());
}

/// Guard for one frame of the active-target stack.
///
/// Dropping the guard pops the frame.
pub struct ActiveTarget {
    watcher_id: Option<WatcherId>,
}

impl ActiveTarget {
    /// Make `watcher` the implicit subscriber for reads until the guard drops.
    pub fn enter(watcher: &Watcher) -> Self {
        TARGET_STACK.with(|stack| stack.borrow_mut().push(Some(watcher.clone())));
        Self {
            watcher_id: Some(watcher.id()),
        }
    }

    /// Push an empty frame: reads register nothing until the guard drops.
    pub fn pause() -> Self {
        TARGET_STACK.with(|stack| stack.borrow_mut().push(None));
        Self { watcher_id: None }
    }

    /// The watcher on top of the stack, if the top frame is not paused.
    pub fn current() -> Option<Watcher> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Whether reads are currently being tracked.
    pub fn is_tracking() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Number of frames on this thread's stack.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ActiveTarget {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.as_ref().map(Watcher::id),
                    self.watcher_id,
                    "active target mismatch"
                );
            }
        });
    }
}

/// Run `f` without tracking any reads it performs.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _frame = ActiveTarget::pause();
    f()
}
