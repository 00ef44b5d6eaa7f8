//! Process-wide admission control: hard/soft connection caps plus a
//! global inhibit override.
//!
//! Grounded on `cli/src/hub/command_channel.rs`'s `CommandChannelHandle`
//! (an `Arc<AtomicI64>`/`Arc<AtomicBool>` pair shared between a handle
//! and its background task); grouped under one `Mutex` here instead of
//! split atomics because admission needs an atomic check-and-increment.
//!
//! This is distinct from a [`crate::broker::StreamBroker`]'s own
//! per-stream inhibit flag (toggled via the control endpoint for one
//! stream). The controller here gates admission across *all* streams at
//! once — e.g. for a node-wide drain during shutdown — and is always
//! consulted in addition to the broker's own flag.

use std::net::SocketAddr;
use std::sync::Mutex;

/// Process-wide gate on concurrently admitted subscribers.
pub struct AdmissionController {
    state: Mutex<State>,
}

struct State {
    current: usize,
    hard_limit: usize,
    soft_limit: usize,
    inhibit: bool,
}

impl AdmissionController {
    /// Create a controller with the given hard/soft limits (`0` = no cap /
    /// soft limit disabled).
    #[must_use]
    pub fn new(hard_limit: usize, soft_limit: usize) -> Self {
        Self {
            state: Mutex::new(State { current: 0, hard_limit, soft_limit, inhibit: false }),
        }
    }

    /// Attempt to admit one subscriber from `remote`. Atomically checks
    /// and, if admitted, increments the counter.
    ///
    /// `remote` is accepted for future rate-limiting/logging hooks; the
    /// current policy does not key on it.
    pub fn try_admit(&self, _remote: SocketAddr) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let admitted = !state.inhibit && (state.hard_limit == 0 || state.current < state.hard_limit);
        if admitted {
            state.current += 1;
        }
        admitted
    }

    /// Release a subscriber previously admitted by [`try_admit`]. Must be
    /// called exactly once per successful admission.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(state.current > 0, "release() called more times than try_admit() succeeded");
        state.current = state.current.saturating_sub(1);
    }

    /// Set or clear the global admission veto.
    pub fn set_inhibit(&self, flag: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).inhibit = flag;
    }

    /// Current count of admitted subscribers across all streams.
    #[must_use]
    pub fn current(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).current
    }

    /// Configured hard limit (`0` = unlimited).
    #[must_use]
    pub fn maximum(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).hard_limit
    }

    /// Configured soft limit (`0` = disabled).
    #[must_use]
    pub fn soft_limit(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).soft_limit
    }

    /// `true` once `current >= soft_limit` (soft limit enabled). Level
    /// reported, not edge-triggered — see [`crate::events`] for the
    /// edge-triggered notification this same transition also fires.
    #[must_use]
    pub fn is_full(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.soft_limit != 0 && state.current >= state.soft_limit
    }
}
