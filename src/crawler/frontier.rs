//! Frontier: the deduplicated, retry-bounded task queue of one crawl
//!
//! This module handles:
//! - Admitting each task identity at most once per crawl
//! - Re-admitting failed tasks while the attempt limit allows it
//! - Handing tasks to any number of concurrent workers
//! - Tracking outstanding work so the crawl knows when it is drained

use crate::crawler::task::{Handler, Request, Task, TaskKey};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;

/// How many times a task may be admitted before it is given up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawAttemptLimit")]
pub enum AttemptLimit {
    Bounded(u32),
    Unbounded,
}

impl AttemptLimit {
    /// Returns true if an attempt with the given number may run
    ///
    /// The comparison is strict: with a limit of 3, attempts 1 to 3 run and
    /// the 4th admission is refused.
    pub fn allows(&self, attempt: u32) -> bool {
        match self {
            Self::Bounded(limit) => attempt <= *limit,
            Self::Unbounded => true,
        }
    }
}

impl Default for AttemptLimit {
    fn default() -> Self {
        Self::Bounded(3)
    }
}

impl fmt::Display for AttemptLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(limit) => write!(f, "{}", limit),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// TOML form: an integer or the string "unbounded"
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAttemptLimit {
    Count(u32),
    Keyword(String),
}

impl TryFrom<RawAttemptLimit> for AttemptLimit {
    type Error = String;

    fn try_from(raw: RawAttemptLimit) -> Result<Self, Self::Error> {
        match raw {
            RawAttemptLimit::Count(limit) => Ok(Self::Bounded(limit)),
            RawAttemptLimit::Keyword(word) if word.eq_ignore_ascii_case("unbounded") => {
                Ok(Self::Unbounded)
            }
            RawAttemptLimit::Keyword(word) => Err(format!(
                "attempts-limit must be a number or \"unbounded\", got \"{}\"",
                word
            )),
        }
    }
}

/// A retry was refused because the task used up its attempts
#[derive(Debug, Clone, Error)]
#[error("gave up on {request} after {limit} attempts")]
pub struct AttemptsExceeded {
    pub request: Request,
    pub limit: u32,
}

struct FrontierState<T> {
    queue: VecDeque<Task<T>>,
    known: HashSet<TaskKey>,
    /// Admitted tasks not yet acknowledged, queued or in flight
    outstanding: usize,
    closed: bool,
}

/// Per-crawl task queue with dedup, attempt counting and a drain barrier
pub struct Frontier<T> {
    state: Mutex<FrontierState<T>>,
    available: Notify,
    drained: Notify,
    attempts_limit: AttemptLimit,
}

impl<T> Frontier<T> {
    pub fn new(attempts_limit: AttemptLimit) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                queue: VecDeque::new(),
                known: HashSet::new(),
                outstanding: 0,
                closed: false,
            }),
            available: Notify::new(),
            drained: Notify::new(),
            attempts_limit,
        }
    }

    fn state(&self) -> MutexGuard<'_, FrontierState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attempts_limit(&self) -> AttemptLimit {
        self.attempts_limit
    }

    /// Admits a task whose identity has not been seen in this crawl
    ///
    /// Returns false for duplicates, for a closed frontier and when the
    /// attempts limit does not allow even a first attempt.
    pub fn schedule(&self, mut task: Task<T>) -> bool {
        let mut state = self.state();

        if state.closed {
            tracing::debug!("Frontier closed, ignoring {}", task.request());
            return false;
        }

        let key = task.key();
        if state.known.contains(&key) {
            tracing::trace!("Already known: {}", task.request());
            return false;
        }

        let attempt = task.register_attempt();
        if !self.attempts_limit.allows(attempt) {
            tracing::warn!(
                "Attempts limit {} refuses {}",
                self.attempts_limit,
                task.request()
            );
            return false;
        }

        state.known.insert(key);
        state.outstanding += 1;
        state.queue.push_back(task);
        drop(state);

        self.available.notify_one();
        true
    }

    /// Re-admits a known task for another attempt
    ///
    /// The attempt counter is incremented before the limit is checked. When
    /// the limit refuses the attempt the task is dropped; it stays
    /// outstanding, so the frontier will not drain and the caller is
    /// expected to fail the crawl.
    pub fn repeat(&self, mut task: Task<T>) -> Result<(), AttemptsExceeded> {
        let attempt = task.register_attempt();

        if !self.attempts_limit.allows(attempt) {
            let limit = match self.attempts_limit {
                AttemptLimit::Bounded(limit) => limit,
                AttemptLimit::Unbounded => u32::MAX,
            };
            return Err(AttemptsExceeded {
                request: task.request().clone(),
                limit,
            });
        }

        let mut state = self.state();
        debug_assert!(
            state.known.contains(&task.key()),
            "repeat() called for a task that was never scheduled"
        );
        state.queue.push_back(task);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Waits for the next pending task
    ///
    /// Returns `None` once the frontier is closed.
    pub async fn next(&self) -> Option<Task<T>> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before looking at the queue so a concurrent push or
            // close cannot slip between the check and the wait.
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(task) = state.queue.pop_front() {
                    return Some(task);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks one dequeued task as fully processed
    pub fn acknowledge(&self) {
        let mut state = self.state();

        if state.outstanding == 0 {
            tracing::warn!("acknowledge() called more times than tasks were admitted");
            return;
        }

        state.outstanding -= 1;
        let drained = state.outstanding == 0;
        drop(state);

        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Waits until every admitted task has been acknowledged
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_drained() {
                return;
            }

            notified.await;
        }
    }

    /// Stops handing out tasks; every waiting `next()` returns `None`
    pub fn close(&self) {
        self.state().closed = true;
        self.available.notify_waiters();
    }

    pub fn is_drained(&self) -> bool {
        let state = self.state();
        state.outstanding == 0 && state.queue.is_empty()
    }

    /// Number of tasks waiting to be dequeued
    pub fn pending(&self) -> usize {
        self.state().queue.len()
    }

    /// Number of admitted tasks that have not been acknowledged
    pub fn outstanding(&self) -> usize {
        self.state().outstanding
    }

    /// Number of distinct task identities admitted so far
    pub fn known(&self) -> usize {
        self.state().known.len()
    }
}

/// A handler's view of the frontier it runs under
///
/// Handlers use it to schedule follow-up work. It holds no reference to the
/// crawl that owns the frontier.
pub struct Scope<T> {
    frontier: Arc<Frontier<T>>,
}

impl<T> Scope<T> {
    pub(crate) fn new(frontier: Arc<Frontier<T>>) -> Self {
        Self { frontier }
    }

    /// Schedules a task; returns false if an equal task was already seen
    pub fn schedule(&self, task: Task<T>) -> bool {
        self.frontier.schedule(task)
    }

    /// Schedules a GET of `url` processed by `handler`
    pub fn follow(&self, url: impl Into<String>, handler: Arc<dyn Handler<T>>) -> bool
    where
        T: 'static,
    {
        self.frontier.schedule(Task::with_handler(url, handler))
    }

    /// Number of distinct tasks seen by this crawl
    pub fn known(&self) -> usize {
        self.frontier.known()
    }
}

impl<T> Clone for Scope<T> {
    fn clone(&self) -> Self {
        Self {
            frontier: Arc::clone(&self.frontier),
        }
    }
}
