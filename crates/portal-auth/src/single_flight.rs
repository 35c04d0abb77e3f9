//! Single-flight coalescing for identical concurrent operations.
//!
//! A slot holds at most one pending operation. The first caller creates
//! the operation; every caller that arrives while it is pending awaits
//! the same shared future and observes the same outcome. The slot is
//! cleared when the operation settles, so the next expiry event starts
//! a fresh one.

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

struct Flight<T: Clone> {
    id: u64,
    shared: Shared<BoxFuture<'static, T>>,
}

/// A slot holding at most one pending operation of type `T`.
pub struct SingleFlight<T: Clone> {
    slot: Mutex<Option<Flight<T>>>,
    next_id: AtomicU64,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Whether an operation is currently pending.
    pub fn in_flight(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    /// Join the pending operation, or start one with `make` if the slot
    /// is empty. `make` is only invoked by the caller that wins the slot.
    pub async fn run<F>(&self, make: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let (id, shared) = {
            let mut slot = self.slot.lock().unwrap();
            match slot.as_ref() {
                Some(flight) => (flight.id, flight.shared.clone()),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let shared = make().shared();
                    *slot = Some(Flight {
                        id,
                        shared: shared.clone(),
                    });
                    (id, shared)
                }
            }
        };

        let result = shared.await;

        // Clear the slot once settled. The id guard keeps a slow joiner
        // from evicting a newer flight that already took the slot.
        let mut slot = self.slot.lock().unwrap();
        if slot.as_ref().map(|f| f.id) == Some(id) {
            *slot = None;
        }

        result
    }
}
