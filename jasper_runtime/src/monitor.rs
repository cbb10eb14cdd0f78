//! Reentrant object monitors with wait/notify.
//!
//! Every object, class, and field carries its own monitor. Acquisition is
//! reentrant with a per-owner depth counter; the wait list is FIFO and only
//! ever mutated while holding the monitor, which `wait` gives up atomically
//! with enqueueing itself. Cancellation is cooperative: a waiting thread
//! observes its interrupt flag and returns early, and `wait` reports
//! whether that happened so the caller can raise the interruption
//! exception.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

/// Interval at which a waiting thread re-checks its interrupt flag.
const INTERRUPT_POLL: Duration = Duration::from_millis(10);

/// Per-thread cooperative interrupt flag.
#[derive(Debug, Default)]
pub struct ThreadInterrupt {
    flag: AtomicBool,
}

impl ThreadInterrupt {
    pub fn new() -> Arc<ThreadInterrupt> {
        Arc::new(ThreadInterrupt::default())
    }

    /// Request interruption of the owning thread.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Read without clearing.
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Read and clear, as consuming the interrupt.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    depth: usize,
    /// Threads parked in `wait`, oldest first.
    wait_queue: VecDeque<ThreadId>,
    /// Threads moved out of the wait queue by notify, eligible to return.
    notified: Vec<ThreadId>,
}

/// A reentrant lock plus condition queue, associated 1:1 with its owner
/// structure.
#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    cond: Condvar,
}

impl Monitor {
    pub fn new() -> Monitor {
        Monitor::default()
    }

    /// Acquire the monitor, blocking until it is free. Reentrant.
    pub fn acquire(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => self.cond.wait(&mut state),
            }
        }
    }

    /// Release one level of ownership.
    ///
    /// Panics if the caller does not own the monitor; unbalanced release
    /// is a bytecode or embedder bug, not a recoverable condition.
    pub fn release(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        assert_eq!(state.owner, Some(me), "monitor released by non-owner");
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.cond.notify_all();
        }
    }

    /// Current recursion depth as seen by the owning thread; 0 if free.
    pub fn depth(&self) -> usize {
        self.state.lock().depth
    }

    /// True if the calling thread owns the monitor.
    pub fn owned_by_current(&self) -> bool {
        self.state.lock().owner == Some(std::thread::current().id())
    }

    /// Release the monitor, park until notified, timed out, or
    /// interrupted, then reacquire at the original depth.
    ///
    /// `timeout_ms` of 0 waits indefinitely. Returns true if the wait
    /// ended because the thread was interrupted (the flag is consumed).
    ///
    /// Panics if the caller does not own the monitor.
    pub fn wait(&self, interrupt: &ThreadInterrupt, timeout_ms: u64) -> bool {
        let me = std::thread::current().id();
        let deadline = (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));

        let mut state = self.state.lock();
        assert_eq!(state.owner, Some(me), "wait on unowned monitor");
        let saved_depth = state.depth;

        state.wait_queue.push_back(me);
        state.owner = None;
        state.depth = 0;
        self.cond.notify_all();

        let mut interrupted = false;
        loop {
            if let Some(pos) = state.notified.iter().position(|&id| id == me) {
                state.notified.swap_remove(pos);
                break;
            }
            if interrupt.is_interrupted() {
                interrupted = true;
                if let Some(pos) = state.wait_queue.iter().position(|&id| id == me) {
                    state.wait_queue.remove(pos);
                }
                break;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        if let Some(pos) = state.wait_queue.iter().position(|&id| id == me) {
                            state.wait_queue.remove(pos);
                        }
                        break;
                    }
                    (deadline - now).min(INTERRUPT_POLL)
                }
                None => INTERRUPT_POLL,
            };
            self.cond.wait_for(&mut state, slice);
        }

        // Reacquire at the saved depth before returning to the caller.
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = saved_depth;
                    break;
                }
                Some(owner) if owner == me => unreachable!("wait reentered owned monitor"),
                Some(_) => self.cond.wait(&mut state),
            }
        }

        if interrupted {
            interrupt.take();
        }
        interrupted
    }

    /// Wake the oldest waiter, if any. Caller must own the monitor.
    pub fn notify(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        assert_eq!(state.owner, Some(me), "notify on unowned monitor");
        if let Some(id) = state.wait_queue.pop_front() {
            state.notified.push(id);
            self.cond.notify_all();
        }
    }

    /// Wake every waiter. Caller must own the monitor.
    pub fn notify_all(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        assert_eq!(state.owner, Some(me), "notify on unowned monitor");
        while let Some(id) = state.wait_queue.pop_front() {
            state.notified.push(id);
        }
        self.cond.notify_all();
    }
}
