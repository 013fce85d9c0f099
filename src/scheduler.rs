//! FIFO scheduler that caps how many tasks run at once.
//!
//! Each bounded resource gets its own `Scheduler`; clones share one counter.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct State {
    running: usize,
    waiting: VecDeque<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct Shared {
    max_concurrent: usize,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // The lock is never held across user code, so a poisoned lock still
        // holds consistent state
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand our slot to the oldest live waiter, or give it back.
    fn release(&self) {
        let mut state = self.lock();
        while let Some(next) = state.waiting.pop_front() {
            // Fails only if that waiter was cancelled; try the next one
            if next.send(()).is_ok() {
                return;
            }
        }
        state.running -= 1;
    }
}

/// Held while a task runs. Dropping it admits the next waiter, so a slot is
/// freed on success, error, panic, or cancellation alike.
#[derive(Debug)]
struct Slot {
    shared: Arc<Shared>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.shared.release();
    }
}

/// A queued admission request.
struct Waiter {
    shared: Arc<Shared>,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Cancelled while queued. If the slot was handed over in the
        // meantime, pass it on.
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.shared.release();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// `max_concurrent` of zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_concurrent: max_concurrent.max(1),
                state: Mutex::new(State {
                    running: 0,
                    waiting: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent
    }

    /// Number of tasks currently running
    pub fn in_flight(&self) -> usize {
        self.shared.lock().running
    }

    /// Number of queued admission requests, including any cancelled ones that
    /// have not been skipped yet
    pub fn queued(&self) -> usize {
        self.shared.lock().waiting.len()
    }

    async fn acquire(&self) -> Slot {
        loop {
            let rx = {
                let mut state = self.shared.lock();
                if state.running < self.shared.max_concurrent {
                    state.running += 1;
                    return Slot {
                        shared: Arc::clone(&self.shared),
                    };
                }
                let (tx, rx) = oneshot::channel();
                state.waiting.push_back(tx);
                rx
            };

            let mut waiter = Waiter {
                shared: Arc::clone(&self.shared),
                rx,
                settled: false,
            };

            if (&mut waiter.rx).await.is_ok() {
                waiter.settled = true;
                return Slot {
                    shared: Arc::clone(&self.shared),
                };
            }
            // The sender vanished without admitting us; queue again
            waiter.settled = true;
        }
    }

    /// Run `task` once a slot is free and return its output. The task is
    /// only constructed after admission.
    pub async fn schedule<F, Fut>(&self, task: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _slot = self.acquire().await;
        task().await
    }

    /// Schedule `task` on the tokio runtime without waiting for it.
    pub fn spawn<F, Fut>(&self, task: F) -> JoinHandle<Fut::Output>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.schedule(task).await })
    }
}
