//! Topic router: per-topic ordered handler lists with isolated delivery.
//!
//! Handlers run synchronously on the connection task, in registration order.
//! A handler that returns an error or panics is logged and skipped; the
//! remaining handlers for the same frame still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, warn};

use tacsync_domain::ModelEvent;

use crate::error::{DecodeError, HandlerError};
use crate::topic::{decode_frame, Topic};

/// Topic handler. Receives the decoded payload only.
pub type Handler = Arc<dyn Fn(&ModelEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Observer of every raw inbound frame, called before decoding.
pub type FrameTap = Arc<dyn Fn(&str) + Send + Sync>;

/// Token returned by [`TopicRouter::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`
    pub delivered: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

#[derive(Default)]
struct RouterInner {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(SubscriptionId, Handler)>>,
    tap: Option<FrameTap>,
}

/// Fan-out of decoded frames to subscribed handlers.
#[derive(Default)]
pub struct TopicRouter {
    inner: Mutex<RouterInner>,
}

impl TopicRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`, after any existing handlers.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&ModelEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .handlers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(%topic, "Handler subscribed");
        id
    }

    /// Remove a handler. Returns false if it was not registered for `topic`.
    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let Some(list) = inner.handlers.get_mut(&topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        list.len() < before
    }

    /// Number of handlers registered for `topic`.
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.lock().handlers.get(&topic).map_or(0, Vec::len)
    }

    /// Install or clear the raw frame tap.
    pub fn set_frame_tap(&self, tap: Option<FrameTap>) {
        self.lock().tap = tap;
    }

    /// Tap, decode and dispatch one text frame.
    ///
    /// Decode failures drop the frame and are logged; they never reach handlers.
    pub fn route_text(&self, text: &str) -> Result<DispatchReport, DecodeError> {
        let tap = self.lock().tap.clone();
        if let Some(tap) = tap {
            if catch_unwind(AssertUnwindSafe(|| tap(text))).is_err() {
                warn!("Frame tap panicked");
            }
        }

        match decode_frame(text) {
            Ok(frame) => Ok(self.dispatch(frame.topic, &frame.event)),
            Err(DecodeError::UnknownTopic(topic)) => {
                warn!(topic = %topic, "Ignoring frame on unknown topic");
                Err(DecodeError::UnknownTopic(topic))
            }
            Err(e) => {
                error!(error = %e, "Dropping undecodable frame");
                Err(e)
            }
        }
    }

    /// Deliver `event` to every handler of `topic`, in registration order.
    pub fn dispatch(&self, topic: Topic, event: &ModelEvent) -> DispatchReport {
        // Snapshot the list so handlers may (un)subscribe while running.
        let handlers: Vec<Handler> = self
            .lock()
            .handlers
            .get(&topic)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        let mut report = DispatchReport::default();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(%topic, error = %e, "Topic handler failed");
                    report.failed += 1;
                }
                Err(_) => {
                    error!(%topic, "Topic handler panicked");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn lock(&self) -> MutexGuard<'_, RouterInner> {
        // Handlers never run under this lock, so a poisoned guard still holds
        // a consistent handler table.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("TopicRouter")
            .field("topics", &inner.handlers.len())
            .field("tap", &inner.tap.is_some())
            .finish()
    }
}
