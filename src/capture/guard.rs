//! Protocol fault isolation
//!
//! A window can be destroyed or reconfigured by its owner at any instant, so
//! any request naming it may fail on the server side. `FaultGuard::run`
//! brackets a block of requests: errors delivered for them are recorded while
//! the guard is armed and turned into an `Err` once the block has been synced.
//!
//! The guard is the only owner of the armed state. It is not re-entrant: one
//! mutex serialises all guarded blocks on a connection.

use crate::display::{DisplayError, DisplayServer, ProtocolFault};
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static HOLDING_GUARD: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug, Default)]
struct GuardState {
    recorded: Vec<ProtocolFault>,
    runs: u64,
    faulted_runs: u64,
}

/// Armed section; disarms on drop, including during unwinding
struct Armed<'a> {
    state: MutexGuard<'a, GuardState>,
    flag: &'a AtomicBool,
}

impl<'a> Armed<'a> {
    fn arm(mut state: MutexGuard<'a, GuardState>, flag: &'a AtomicBool) -> Self {
        state.recorded.clear();
        flag.store(true, Ordering::Release);
        HOLDING_GUARD.with(|h| h.set(true));
        Self { state, flag }
    }

    fn record(&mut self, faults: Vec<ProtocolFault>) {
        self.state.recorded.extend(faults);
    }
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        HOLDING_GUARD.with(|h| h.set(false));
    }
}

/// Fault guard for one display connection
pub struct FaultGuard<D: ?Sized> {
    display: Arc<D>,
    state: Mutex<GuardState>,
    armed: AtomicBool,
}

impl<D: DisplayServer + ?Sized> FaultGuard<D> {
    pub fn new(display: Arc<D>) -> Self {
        Self {
            display,
            state: Mutex::new(GuardState::default()),
            armed: AtomicBool::new(false),
        }
    }

    pub fn display(&self) -> &Arc<D> {
        &self.display
    }

    /// Run `body` with protocol errors contained.
    ///
    /// Errors raised before the guard was armed are drained and ignored.
    /// After `body` returns the connection is synced so that every error
    /// caused by `body` has arrived; if any did, the first is returned.
    pub fn run<T, F>(&self, body: F) -> Result<T, ProtocolFault>
    where
        F: FnOnce(&D) -> T,
    {
        self.bracket(body, |_| false)
    }

    /// Like `run`, for a body that can stop waiting on the server.
    ///
    /// When the body gives up with `ProtocolFault::Timeout` the server is
    /// still working on the abandoned request and would answer a sync only
    /// after it, so the block ends without syncing.
    pub fn run_bounded<T, F>(&self, body: F) -> Result<T, ProtocolFault>
    where
        F: FnOnce(&D) -> Result<T, DisplayError>,
    {
        let timed_out = |r: &Result<T, DisplayError>| {
            matches!(r, Err(DisplayError::Protocol(ProtocolFault::Timeout)))
        };
        self.bracket(body, timed_out)?.map_err(DisplayError::into_fault)
    }

    fn bracket<T, F, S>(&self, body: F, abandoned: S) -> Result<T, ProtocolFault>
    where
        F: FnOnce(&D) -> T,
        S: FnOnce(&T) -> bool,
    {
        if HOLDING_GUARD.with(|h| h.get()) {
            return Err(ProtocolFault::Reentrant);
        }

        let state = self.state.lock();

        // Whatever is still in flight belongs to earlier, unguarded requests
        if let Err(e) = self.display.sync() {
            return Err(e.into_fault());
        }
        let stale = self.display.take_faults();
        if !stale.is_empty() {
            debug!("Discarding {} fault(s) raised before arming", stale.len());
        }

        let mut armed = Armed::arm(state, &self.armed);
        armed.state.runs += 1;

        let value = body(&*self.display);

        if abandoned(&value) {
            armed.state.faulted_runs += 1;
            debug!("Guarded call abandoned before the server answered");
            return Ok(value);
        }

        let synced = self.display.sync();
        let delivered = self.display.take_faults();
        armed.record(delivered);
        if let Err(e) = synced {
            armed.record(vec![e.into_fault()]);
        }

        let first = armed.state.recorded.drain(..).next();
        if first.is_some() {
            armed.state.faulted_runs += 1;
        }
        drop(armed);

        match first {
            Some(fault) => {
                debug!("Guarded call faulted: {}", fault);
                Err(fault)
            }
            None => Ok(value),
        }
    }

    /// Whether a guarded block is between arming and disarming. A caller
    /// still waiting for the connection does not count.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// (guarded blocks run, blocks that faulted)
    pub fn counters(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.runs, state.faulted_runs)
    }
}
