//! Status-event pub/sub plumbing
//!
//! Suites and scenarios publish lifecycle events to registered subscribers
//! (progress UIs, reporters). Publication is observational only: subscribers
//! are plain synchronous callbacks, invoked fire-and-forget, and must never
//! block or reach back into the engine.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Suite-level lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteEvent {
    /// Suite `before_all` hooks are about to run
    BeforeAllExecute,
    /// A scenario is being admitted; suite `before_each` hooks run next
    BeforeEachExecute,
    /// A scenario finished its own `after` hooks; suite `after_each` hooks run next
    AfterEachExecute,
    /// Every scenario reached a terminal state; suite `after_all` hooks run next
    AfterAllExecute,
    /// The suite's `finished` future has been resolved
    Finished,
}

impl fmt::Display for SuiteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeAllExecute => write!(f, "beforeAllExecute"),
            Self::BeforeEachExecute => write!(f, "beforeEachExecute"),
            Self::AfterEachExecute => write!(f, "afterEachExecute"),
            Self::AfterAllExecute => write!(f, "afterAllExecute"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Scenario-level lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioEvent {
    /// The scenario was admitted and its `before` hooks are running
    Executing,
    /// The fetch was dispatched to the adapter
    RequestStarted,
    /// The adapter returned a normalized response
    RequestLoaded,
    /// The scenario opted out via `skip`
    Skipped,
    /// The scenario reached a terminal disposition
    Finished,
}

impl fmt::Display for ScenarioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executing => write!(f, "executing"),
            Self::RequestStarted => write!(f, "requestStarted"),
            Self::RequestLoaded => write!(f, "requestLoaded"),
            Self::Skipped => write!(f, "skipped"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Registered subscriber callback: `(event, subject_title)`
pub type Subscriber<E> = Arc<dyn Fn(E, &str) + Send + Sync>;

/// A list of subscribers for one event type
pub(crate) struct Subscribers<E> {
    list: Mutex<Vec<Subscriber<E>>>,
}

impl<E: Copy> Subscribers<E> {
    pub(crate) fn new() -> Self {
        Self {
            list: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self, subscriber: Subscriber<E>) {
        self.list.lock().unwrap().push(subscriber);
    }

    /// Deliver `event` to every subscriber in registration order.
    pub(crate) fn emit(&self, event: E, subject: &str) {
        // Snapshot under the lock; callbacks run outside it.
        let snapshot: Vec<Subscriber<E>> = self.list.lock().unwrap().clone();
        for subscriber in snapshot {
            subscriber(event, subject);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_every_subscriber_in_order() {
        let subs: Subscribers<SuiteEvent> = Subscribers::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            subs.subscribe(Arc::new(move |event, subject| {
                assert_eq!(event, SuiteEvent::Finished);
                assert_eq!(subject, "smoke");
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        subs.emit(SuiteEvent::Finished, "smoke");
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn event_display_names() {
        assert_eq!(SuiteEvent::BeforeAllExecute.to_string(), "beforeAllExecute");
        assert_eq!(ScenarioEvent::RequestLoaded.to_string(), "requestLoaded");
    }
}
