//! Pull-based delivery of one job's lifecycle events.
//!
//! Every subscriber owns a [`Rendezvous`] queue: events pushed while nobody
//! waits are buffered, pulls issued while nothing is buffered wait for the
//! next push. Both sides are served in arrival order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

use super::events::EncodingEvent;
use crate::error::{EncodeError, Result};

/// Two-sided FIFO matching pushed items with pending pulls.
#[derive(Debug)]
pub struct Rendezvous<T> {
    state: Mutex<RendezvousState<T>>,
}

#[derive(Debug)]
struct RendezvousState<T> {
    pushed: VecDeque<T>,
    pulls: VecDeque<oneshot::Sender<Option<T>>>,
    closed: bool,
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Rendezvous<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RendezvousState {
                pushed: VecDeque::new(),
                pulls: VecDeque::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RendezvousState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `item` to the oldest waiting pull, or buffer it. Returns `false`
    /// once the queue is closed.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }

        let mut item = item;
        while let Some(pull) = state.pulls.pop_front() {
            match pull.send(Some(item)) {
                Ok(()) => return true,
                // the puller went away; offer the item to the next one
                Err(Some(returned)) => item = returned,
                Err(None) => return true,
            }
        }
        state.pushed.push_back(item);
        true
    }

    /// Next item in push order. `None` once the queue is closed.
    pub async fn pull(&self) -> Option<T> {
        let waiter = {
            let mut state = self.lock();
            if let Some(item) = state.pushed.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            state.pulls.push_back(tx);
            rx
        };

        waiter.await.unwrap_or(None)
    }

    /// Drop buffered items and release every waiting pull with `None`.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.pushed.clear();
        for pull in state.pulls.drain(..) {
            let _ = pull.send(None);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn buffered(&self) -> usize {
        self.lock().pushed.len()
    }
}

/// Fan-out point owned by an `EncodingProcess`: every emitted event is
/// delivered to each live subscriber.
#[derive(Debug, Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Arc<Rendezvous<EncodingEvent>>>>,
    started: AtomicBool,
    terminated: AtomicBool,
}

impl EventHub {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Arc<Rendezvous<EncodingEvent>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(self: &Arc<Self>) -> EventStream {
        let queue = Arc::new(Rendezvous::new());
        let mut subscribers = self.subscribers();
        if self.terminated.load(Ordering::SeqCst) {
            // nothing will ever arrive
            queue.close();
        } else {
            subscribers.push(queue.clone());
        }
        EventStream {
            hub: self.clone(),
            queue,
            done: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    fn unsubscribe(&self, queue: &Arc<Rendezvous<EncodingEvent>>) {
        self.subscribers().retain(|q| !Arc::ptr_eq(q, queue));
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: EncodingEvent) {
        let mut subscribers = self.subscribers();
        debug!("Emitting {} event to {} subscriber(s)", event.kind(), subscribers.len());

        let terminal = event.is_terminal();
        for queue in subscribers.iter() {
            queue.push(event.clone());
        }
        if terminal {
            self.terminated.store(true, Ordering::SeqCst);
            subscribers.clear();
        }
    }
}

/// One subscriber's view of a job's events.
///
/// Single consumer: concurrent `next()` calls on one stream are not
/// supported. `dispose()` may be called from another task while `next()` is
/// waiting, which then resolves to `Ok(None)`.
#[derive(Debug)]
pub struct EventStream {
    hub: Arc<EventHub>,
    queue: Arc<Rendezvous<EncodingEvent>>,
    done: AtomicBool,
    disposed: AtomicBool,
}

impl EventStream {
    /// Next event, or `Ok(None)` once the terminal event was delivered or the
    /// stream was disposed.
    pub async fn next(&self) -> Result<Option<EncodingEvent>> {
        if !self.hub.is_started() {
            return Err(EncodeError::ProcessNotStarted);
        }

        if self.done.load(Ordering::SeqCst) {
            if !self.disposed.load(Ordering::SeqCst) {
                // a concurrent dispose() between the check and here is fine
                let _ = self.dispose();
            }
            return Ok(None);
        }

        match self.queue.pull().await {
            Some(event) => {
                if event.is_terminal() {
                    self.done.store(true, Ordering::SeqCst);
                }
                Ok(Some(event))
            }
            None => {
                self.done.store(true, Ordering::SeqCst);
                Ok(None)
            }
        }
    }

    /// Unsubscribe and release a pending `next()`. Fails when called twice.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(EncodeError::AlreadyDisposed);
        }
        self.hub.unsubscribe(&self.queue);
        self.queue.close();
        self.done.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
