//! FIFO queue that releases outbound calls at a bounded rate.
//!
//! Submissions are started strictly in the order they were made. A task is
//! never refused because of the limit, only delayed. At most one drain timer
//! is pending at any moment: a drain step is started by a submission that
//! finds the queue empty, and otherwise only by the timer the previous step
//! scheduled.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::LimitsConfig;
use crate::error::EnhanceError;

/// Shortest wait when the limit is reached, so the strict expiry check
/// always observes time moving forward.
const MIN_LIMIT_WAIT: Duration = Duration::from_millis(1);

type Task<T> = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = T> + Send>> + Send>;

struct QueueEntry<T> {
    task: Task<T>,
    reply: oneshot::Sender<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub max_per_window: u32,
    pub window: Duration,
}

impl RateLimits {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
        }
    }

    /// Gap between consecutive starts while a backlog is waiting.
    pub fn spacing(&self) -> Duration {
        self.window / self.max_per_window
    }
}

impl From<&LimitsConfig> for RateLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self::new(config.max_per_window, config.window())
    }
}

/// Counter for the current fixed window, plus the start instants of the
/// most recent tasks so the limit also holds across window boundaries.
#[derive(Debug)]
struct RateLimiterState {
    request_count: u32,
    window_start: Instant,
    recent_starts: VecDeque<Instant>,
}

impl RateLimiterState {
    fn new(now: Instant) -> Self {
        Self {
            request_count: 0,
            window_start: now,
            recent_starts: VecDeque::new(),
        }
    }

    fn refresh(&mut self, now: Instant, limits: &RateLimits) {
        if now.duration_since(self.window_start) > limits.window {
            self.request_count = 0;
            self.window_start = now;
        }
        while let Some(&oldest) = self.recent_starts.front() {
            if now.duration_since(oldest) >= limits.window {
                self.recent_starts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records a start at `now`, or returns how long to wait before trying again.
    fn try_start(&mut self, now: Instant, limits: &RateLimits) -> Result<(), Duration> {
        self.refresh(now, limits);
        let max = limits.max_per_window as usize;

        let window_wait = (self.request_count >= limits.max_per_window)
            .then(|| limits.window.saturating_sub(now.duration_since(self.window_start)));
        let sliding_wait = match self.recent_starts.front() {
            Some(&oldest) if self.recent_starts.len() >= max => {
                Some(limits.window.saturating_sub(now.duration_since(oldest)))
            }
            _ => None,
        };

        match window_wait.max(sliding_wait) {
            Some(wait) => Err(wait.max(MIN_LIMIT_WAIT)),
            None => {
                self.request_count += 1;
                self.recent_starts.push_back(now);
                Ok(())
            }
        }
    }
}

struct Inner<T> {
    state: RateLimiterState,
    queue: VecDeque<QueueEntry<T>>,
}

struct Shared<T> {
    limits: RateLimits,
    inner: Mutex<Inner<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-wide dispatcher. Clones share one queue and one limiter.
pub struct RateLimitedDispatcher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RateLimitedDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> RateLimitedDispatcher<T> {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            shared: Arc::new(Shared {
                limits,
                inner: Mutex::new(Inner {
                    state: RateLimiterState::new(Instant::now()),
                    queue: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Enqueues `task` and returns a future for its output.
    ///
    /// The entry is queued before this returns, so submission order is call
    /// order. A task that panics, in `task` itself or in its future, settles
    /// as [`EnhanceError::Abandoned`] and leaves the queue draining.
    pub fn submit<F, Fut>(&self, task: F) -> impl Future<Output = Result<T, EnhanceError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let entry = QueueEntry {
            task: Box::new(move || Box::pin(task()) as Pin<Box<dyn Future<Output = T> + Send>>),
            reply,
        };

        let was_empty = {
            let mut inner = self.shared.lock();
            let was_empty = inner.queue.is_empty();
            inner.queue.push_back(entry);
            was_empty
        };
        if was_empty {
            drain(&self.shared);
        }

        async move { receiver.await.map_err(|_| EnhanceError::Abandoned) }
    }
}

fn drain<T: Send + 'static>(shared: &Arc<Shared<T>>) {
    let mut inner = shared.lock();
    if inner.queue.is_empty() {
        return;
    }

    let next_attempt = match inner.state.try_start(Instant::now(), &shared.limits) {
        Ok(()) => {
            if let Some(entry) = inner.queue.pop_front() {
                tokio::spawn(async move {
                    let running = (entry.task)();
                    let _ = entry.reply.send(running.await);
                });
            }
            (!inner.queue.is_empty()).then(|| shared.limits.spacing())
        }
        Err(wait) => {
            debug!(
                queued = inner.queue.len(),
                wait_ms = wait.as_millis() as u64,
                "rate limit reached, delaying next request"
            );
            Some(wait)
        }
    };
    drop(inner);

    if let Some(delay) = next_attempt {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            sleep(delay).await;
            drain(&shared);
        });
    }
}
