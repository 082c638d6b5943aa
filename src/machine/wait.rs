//! Pending "wait until the machine reaches state X" requests.

use crate::core::State;
use crate::error::{MachineError, Result};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// One registered request: the names it accepts and where to deliver the
/// matching state.
#[derive(Debug)]
pub(crate) struct Waiter {
    names: Vec<String>,
    tx: oneshot::Sender<Arc<State>>,
}

impl Waiter {
    fn matches(&self, state: &str) -> bool {
        self.names.iter().any(|name| name == state)
    }

    pub(crate) fn resolve(self, state: Arc<State>) {
        // The receiving side may have been dropped; nobody is waiting then.
        let _ = self.tx.send(state);
    }
}

/// FIFO list of waiters for one machine.
#[derive(Debug, Default)]
pub(crate) struct WaitList {
    entries: VecDeque<Waiter>,
}

impl WaitList {
    pub(crate) fn register(&mut self, names: Vec<String>) -> oneshot::Receiver<Arc<State>> {
        let (tx, rx) = oneshot::channel();
        self.entries.push_back(Waiter { names, tx });
        rx
    }

    /// Remove and return every waiter accepting `state`, in creation order.
    /// Waiters whose receiver is gone are discarded on the way.
    pub(crate) fn take_matching(&mut self, state: &str) -> Vec<Waiter> {
        let mut ready = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for waiter in self.entries.drain(..) {
            if waiter.tx.is_closed() {
                continue;
            }
            if waiter.matches(state) {
                ready.push(waiter);
            } else {
                kept.push_back(waiter);
            }
        }
        self.entries = kept;
        ready
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.iter().filter(|w| !w.tx.is_closed()).count()
    }
}

/// Future returned by [`Machine::wait_for`](crate::Machine::wait_for).
///
/// Resolves with the state that satisfied the request. Resolves to
/// [`MachineError::Abandoned`] if the machine is dropped first.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct WaitFor {
    machine: String,
    inner: WaitState,
}

#[derive(Debug)]
enum WaitState {
    Ready(Option<Arc<State>>),
    Waiting(oneshot::Receiver<Arc<State>>),
}

impl WaitFor {
    pub(crate) fn ready(machine: &str, state: Arc<State>) -> Self {
        Self {
            machine: machine.to_string(),
            inner: WaitState::Ready(Some(state)),
        }
    }

    pub(crate) fn waiting(machine: &str, rx: oneshot::Receiver<Arc<State>>) -> Self {
        Self {
            machine: machine.to_string(),
            inner: WaitState::Waiting(rx),
        }
    }

    /// Whether the request was already satisfied when it was made.
    pub fn is_ready(&self) -> bool {
        matches!(self.inner, WaitState::Ready(Some(_)))
    }
}

impl Future for WaitFor {
    type Output = Result<Arc<State>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match &mut this.inner {
            WaitState::Ready(state) => Poll::Ready(state.take().ok_or_else(|| {
                MachineError::Abandoned {
                    machine: this.machine.clone(),
                }
            })),
            WaitState::Waiting(rx) => Pin::new(rx).poll(cx).map(|result| {
                result.map_err(|_| MachineError::Abandoned {
                    machine: this.machine.clone(),
                })
            }),
        }
    }
}
