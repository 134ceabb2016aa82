//! # Sub-task Counter
//!
//! Join primitive for one fan-out round: `expected_count` children each
//! report once, and the single `on_all_complete` continuation fires after the
//! last report, carrying only whether any child failed.
//!
//! Reports may arrive concurrently from any thread. The failure flag is
//! raised before the completion count is bumped, so whichever report
//! observes the final count also observes every earlier failure.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("Sub-task counter {counter_id} already received all {expected} completions")]
    AlreadyComplete { counter_id: Uuid, expected: usize },
}

type Continuation = Box<dyn FnOnce(bool) + Send + 'static>;

pub struct SubTaskCounter {
    id: Uuid,
    expected_count: usize,
    completed_count: AtomicUsize,
    has_failure: AtomicBool,
    on_all_complete: Mutex<Option<Continuation>>,
}

impl SubTaskCounter {
    /// Create a counter; with `expected_count == 0` the continuation fires
    /// immediately with no failure
    pub fn new<F>(expected_count: usize, on_all_complete: F) -> Self
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let counter = Self {
            id: Uuid::new_v4(),
            expected_count,
            completed_count: AtomicUsize::new(0),
            has_failure: AtomicBool::new(false),
            on_all_complete: Mutex::new(Some(Box::new(on_all_complete))),
        };

        if expected_count == 0 {
            counter.fire(false);
        }
        counter
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    pub fn completed_count(&self) -> usize {
        self.completed_count
            .load(Ordering::SeqCst)
            .min(self.expected_count)
    }

    pub fn has_failure(&self) -> bool {
        self.has_failure.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count.load(Ordering::SeqCst) >= self.expected_count
    }

    /// Record one child completion
    ///
    /// Returns `Ok(true)` for the report that fired the continuation.
    pub fn report_completion(&self, error: Option<&str>) -> Result<bool, CounterError> {
        if self.is_complete() {
            return Err(self.overflow());
        }

        if let Some(error) = error {
            debug!(counter_id = %self.id, error = %error, "Sub-task reported failure");
            self.has_failure.store(true, Ordering::SeqCst);
        }

        let previous = self.completed_count.fetch_add(1, Ordering::SeqCst);
        if previous >= self.expected_count {
            return Err(self.overflow());
        }

        if previous + 1 == self.expected_count {
            self.fire(self.has_failure());
            return Ok(true);
        }
        Ok(false)
    }

    fn fire(&self, has_failure: bool) {
        let continuation = self.on_all_complete.lock().take();
        match continuation {
            Some(continuation) => continuation(has_failure),
            None => warn!(counter_id = %self.id, "Sub-task counter continuation already consumed"),
        }
    }

    fn overflow(&self) -> CounterError {
        CounterError::AlreadyComplete {
            counter_id: self.id,
            expected: self.expected_count,
        }
    }
}

impl fmt::Debug for SubTaskCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubTaskCounter")
            .field("id", &self.id)
            .field("expected_count", &self.expected_count)
            .field("completed_count", &self.completed_count())
            .field("has_failure", &self.has_failure())
            .finish()
    }
}
