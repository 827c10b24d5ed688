//! Semaphore Module
//!
//! Counting semaphore bounding concurrent holders of a resource.
//!
//! Waiters queue in strict FIFO order and are woken by permit hand-off over
//! oneshot channels; there is no polling anywhere. Dropping a pending
//! `acquire` future removes the waiter from the queue without consuming a
//! permit, and a permit that was already handed to a vanished waiter is
//! forwarded to the next one.
//!
//! Permits are RAII guards, so release-on-every-exit-path comes for free.
//! The manual [`release`](Semaphore::release) path (paired with
//! [`SemaphorePermit::forget`]) detects unmatched releases instead of
//! silently corrupting the holder count.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::error;

use crate::error::{Error, Result};

// == Semaphore ==
/// FIFO-fair counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    capacity: usize,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    /// Outstanding permits, including one in flight to a woken waiter
    holders: usize,
    /// Pending acquirers in arrival order
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

impl Semaphore {
    // == Constructor ==
    /// Creates a semaphore with `capacity` permits.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "semaphore capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            state: Mutex::new(State {
                holders: 0,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
            }),
        })
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of outstanding permits.
    pub fn holders(&self) -> usize {
        self.lock().holders
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        let state = self.lock();
        self.capacity - state.holders
    }

    // == Acquire ==
    /// Suspends until a permit is free, then returns an RAII permit.
    ///
    /// Waiters resume in strict arrival order. Cancelling the returned
    /// future (dropping it before completion) removes the waiter from the
    /// queue without consuming a permit.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        let (id, rx) = {
            let mut state = self.lock();
            // Fast path only when nobody is queued, preserving FIFO order
            if state.holders < self.capacity && state.waiters.is_empty() {
                state.holders += 1;
                return Ok(SemaphorePermit {
                    sem: self,
                    released: false,
                });
            }
            let (tx, rx) = oneshot::channel();
            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.waiters.push_back(Waiter { id, tx });
            (id, rx)
        };

        let mut wait = Waiting {
            sem: self,
            id,
            rx,
            finished: false,
        };
        let outcome = (&mut wait.rx).await;
        wait.finished = true;
        match outcome {
            Ok(()) => Ok(SemaphorePermit {
                sem: self,
                released: false,
            }),
            Err(_) => Err(Error::Cancelled),
        }
    }

    /// Like [`acquire`](Self::acquire), but the permit is tied to an `Arc`
    /// so it can move into a spawned task. Call as
    /// `semaphore.clone().acquire_owned()`.
    pub async fn acquire_owned(self: Arc<Self>) -> Result<OwnedSemaphorePermit> {
        let permit = self.acquire().await?;
        permit.forget();
        Ok(OwnedSemaphorePermit {
            sem: self,
            released: false,
        })
    }

    /// Races acquisition against `cancel`; resolves to `Error::Cancelled`
    /// if the signal fires first. The abandoned waiter leaves the queue
    /// without side effects.
    pub async fn acquire_until<F>(&self, cancel: F) -> Result<SemaphorePermit<'_>>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            permit = self.acquire() => permit,
            _ = cancel => Err(Error::Cancelled),
        }
    }

    // == Try Acquire ==
    /// Non-blocking acquire. Returns `None` when no permit is free or when
    /// waiters are already queued ahead.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        let mut state = self.lock();
        if state.holders < self.capacity && state.waiters.is_empty() {
            state.holders += 1;
            Some(SemaphorePermit {
                sem: self,
                released: false,
            })
        } else {
            None
        }
    }

    // == Release ==
    /// Returns a permit obtained through [`SemaphorePermit::forget`].
    ///
    /// Calling this without a matching outstanding acquire is a programming
    /// error: it is reported as `Error::CapacityMisuse` and the holder count
    /// is left untouched.
    pub fn release(&self) -> Result<()> {
        let mut state = self.lock();
        if state.holders == 0 {
            error!("semaphore release without a matching acquire");
            return Err(Error::CapacityMisuse);
        }
        Self::hand_off_or_free(&mut state);
        Ok(())
    }

    /// Infallible release used by permit guards; a live permit proves an
    /// outstanding acquire.
    fn release_permit(&self) {
        let mut state = self.lock();
        debug_assert!(state.holders > 0, "permit outlived its acquire");
        Self::hand_off_or_free(&mut state);
    }

    /// Hands the freed permit to the longest-waiting acquirer, skipping
    /// waiters that vanished; frees the permit when the queue drains.
    fn hand_off_or_free(state: &mut State) {
        loop {
            match state.waiters.pop_front() {
                Some(waiter) => {
                    // Transfer: holder count is unchanged when the permit
                    // moves straight to the woken waiter
                    if waiter.tx.send(()).is_ok() {
                        return;
                    }
                }
                None => {
                    state.holders -= 1;
                    return;
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// == Pending Waiter Guard ==
/// Cleans up after an `acquire` future that was dropped mid-wait.
struct Waiting<'a> {
    sem: &'a Semaphore,
    id: u64,
    rx: oneshot::Receiver<()>,
    finished: bool,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.sem.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
            // Still queued: leave without consuming a permit
            state.waiters.remove(pos);
        } else if self.rx.try_recv().is_ok() {
            // A permit was handed over after we stopped listening; pass it on
            Semaphore::hand_off_or_free(&mut state);
        }
    }
}

// == Permits ==
/// RAII permit returned by [`Semaphore::acquire`]; released on drop.
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    sem: &'a Semaphore,
    released: bool,
}

impl SemaphorePermit<'_> {
    /// Forgets the guard without releasing. The caller takes over the
    /// obligation to call [`Semaphore::release`] exactly once.
    pub fn forget(mut self) {
        self.released = true;
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.sem.release_permit();
        }
    }
}

/// RAII permit holding its semaphore by `Arc`; released on drop.
#[derive(Debug)]
pub struct OwnedSemaphorePermit {
    sem: Arc<Semaphore>,
    released: bool,
}

impl OwnedSemaphorePermit {
    /// See [`SemaphorePermit::forget`].
    pub fn forget(mut self) {
        self.released = true;
    }
}

impl Drop for OwnedSemaphorePermit {
    fn drop(&mut self) {
        if !self.released {
            self.sem.release_permit();
        }
    }
}
