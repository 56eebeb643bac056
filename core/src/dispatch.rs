//! Priority event dispatcher (three levels, strict-priority drain, FIFO
//! within a level) and the bounded critical callback queue used for order
//! events that must never be silently dropped.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DispatcherStats {
    pub pending_high: usize,
    pub pending_normal: usize,
    pub pending_low: usize,
    pub processed_total: u64,
}

struct Queues {
    levels: [VecDeque<Task>; 3],
    stopped: bool,
}

/// A worker pool draining a three-level priority deque. `post` never blocks;
/// `wait_until_drained` blocks (with a timeout) until all levels are empty.
pub struct EventDispatcher {
    queues: Arc<Mutex<Queues>>,
    notify: Arc<Notify>,
    drained_notify: Arc<Notify>,
    processed_total: Arc<AtomicU64>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EventDispatcher {
    pub fn new(worker_threads: usize) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            queues: Arc::new(Mutex::new(Queues {
                levels: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                stopped: false,
            })),
            notify: Arc::new(Notify::new()),
            drained_notify: Arc::new(Notify::new()),
            processed_total: Arc::new(AtomicU64::new(0)),
            workers: Mutex::new(Vec::new()),
        });
        let worker_threads = worker_threads.max(1);
        let mut handles = Vec::with_capacity(worker_threads);
        for _ in 0..worker_threads {
            handles.push(dispatcher.clone().spawn_worker());
        }
        *dispatcher.workers.lock() = handles;
        dispatcher
    }

    fn spawn_worker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let notified = self.notify.notified();
                let task = {
                    let mut queues = self.queues.lock();
                    Self::pop_highest(&mut queues)
                };
                match task {
                    Some(task) => {
                        task();
                        self.processed_total.fetch_add(1, Ordering::Relaxed);
                        if self.pending_count() == 0 {
                            self.drained_notify.notify_waiters();
                        }
                    }
                    None => {
                        if self.is_stopped_and_empty() {
                            return;
                        }
                        notified.await;
                    }
                }
            }
        })
    }

    fn pop_highest(queues: &mut Queues) -> Option<Task> {
        for level in queues.levels.iter_mut() {
            if let Some(task) = level.pop_front() {
                return Some(task);
            }
        }
        None
    }

    fn is_stopped_and_empty(&self) -> bool {
        let queues = self.queues.lock();
        queues.stopped && queues.levels.iter().all(VecDeque::is_empty)
    }

    fn pending_count(&self) -> usize {
        let queues = self.queues.lock();
        queues.levels.iter().map(VecDeque::len).sum()
    }

    /// Appends to the tail of the priority level's deque. Returns `false`
    /// (and drops the task) once `stop` has been called.
    pub fn post(&self, task: Task, priority: Priority) -> bool {
        {
            let mut queues = self.queues.lock();
            if queues.stopped {
                return false;
            }
            queues.levels[priority as usize].push_back(task);
        }
        self.notify.notify_one();
        true
    }

    pub fn stats(&self) -> DispatcherStats {
        let queues = self.queues.lock();
        DispatcherStats {
            pending_high: queues.levels[0].len(),
            pending_normal: queues.levels[1].len(),
            pending_low: queues.levels[2].len(),
            processed_total: self.processed_total.load(Ordering::Relaxed),
        }
    }

    /// Blocks until every level is empty or `timeout` elapses.
    pub async fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending_count() == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let notified = self.drained_notify.notified();
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    /// Cooperative stop: rejects further posts, lets queued work drain, then
    /// joins every worker.
    pub async fn stop(&self) {
        {
            let mut queues = self.queues.lock();
            queues.stopped = true;
        }
        self.notify.notify_waiters();
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Bounded single-worker queue for order callbacks. Non-critical posts are
/// dropped on a full queue; critical posts block for up to `critical_wait`
/// before being dropped.
pub struct CriticalQueue {
    queue: Mutex<VecDeque<(Task, Instant, bool)>>,
    max_queue_size: usize,
    critical_wait: Duration,
    critical_delay_alert: Duration,
    notify: Arc<Notify>,
    space_notify: Arc<Notify>,
    stopped: AtomicBool,
    dropped: AtomicU64,
    critical_timeout: AtomicU64,
    critical_delay_exceeded: AtomicU64,
    max_pending: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CriticalQueue {
    pub fn new(
        max_queue_size: usize,
        critical_wait: Duration,
        critical_delay_alert: Duration,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            max_queue_size: max_queue_size.max(1),
            critical_wait: critical_wait.max(Duration::from_millis(1)),
            critical_delay_alert: critical_delay_alert.max(Duration::from_millis(1)),
            notify: Arc::new(Notify::new()),
            space_notify: Arc::new(Notify::new()),
            stopped: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            critical_timeout: AtomicU64::new(0),
            critical_delay_exceeded: AtomicU64::new(0),
            max_pending: AtomicU64::new(0),
            worker: Mutex::new(None),
        });
        let handle = this.clone().spawn_worker();
        *this.worker.lock() = Some(handle);
        this
    }

    fn spawn_worker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let notified = self.notify.notified();
                let popped = self.queue.lock().pop_front();
                match popped {
                    Some((task, enqueued_at, is_critical)) => {
                        self.space_notify.notify_one();
                        if is_critical {
                            let delay = enqueued_at.elapsed();
                            if delay > self.critical_delay_alert {
                                self.critical_delay_exceeded.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    queue_delay_ms = delay.as_millis() as u64,
                                    alert_threshold_ms = self.critical_delay_alert.as_millis() as u64,
                                    "critical queue delay exceeded"
                                );
                            }
                        }
                        task();
                    }
                    None => {
                        if self.stopped.load(Ordering::Acquire) {
                            return;
                        }
                        notified.await;
                    }
                }
            }
        })
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Pushes if there is room; drop-and-warn for non-critical on a full
    /// queue; block up to `critical_wait` for critical, then drop-and-error
    /// if still full.
    pub async fn post(&self, task: Task, is_critical: bool) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        loop {
            {
                let mut queue = self.queue.lock();
                if queue.len() < self.max_queue_size {
                    queue.push_back((task, Instant::now(), is_critical));
                    let pending = queue.len() as u64;
                    self.max_pending.fetch_max(pending, Ordering::Relaxed);
                    drop(queue);
                    self.notify.notify_one();
                    return true;
                }
            }
            if !is_critical {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    is_critical = false,
                    queue_depth = self.len(),
                    queue_capacity = self.max_queue_size,
                    dropped_total = self.dropped.load(Ordering::Relaxed),
                    action = "drop",
                    "critical queue full"
                );
                return false;
            }
            let waited = tokio::time::timeout(self.critical_wait, self.space_notify.notified())
                .await
                .is_ok();
            if !waited {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.critical_timeout.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    is_critical = true,
                    queue_depth = self.len(),
                    queue_capacity = self.max_queue_size,
                    dropped_total = self.dropped.load(Ordering::Relaxed),
                    critical_timeout_total = self.critical_timeout.load(Ordering::Relaxed),
                    action = "block_failed",
                    "critical queue still full after bounded wait"
                );
                return false;
            }
            // space_notify fired (or spuriously woke): loop re-checks capacity.
        }
    }

    pub fn stats(&self) -> CriticalQueueStats {
        CriticalQueueStats {
            pending: self.len() as u64,
            dropped: self.dropped.load(Ordering::Relaxed),
            critical_timeout: self.critical_timeout.load(Ordering::Relaxed),
            critical_delay_exceeded: self.critical_delay_exceeded.load(Ordering::Relaxed),
            max_pending: self.max_pending.load(Ordering::Relaxed),
            max_queue_size: self.max_queue_size as u64,
        }
    }

    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CriticalQueueStats {
    pub pending: u64,
    pub dropped: u64,
    pub critical_timeout: u64,
    pub critical_delay_exceeded: u64,
    pub max_pending: u64,
    pub max_queue_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn priority_ordering_h_n_l() {
        let dispatcher = EventDispatcher::new(1);
        let order = Arc::new(StdMutex::new(Vec::new()));

        let record = |label: &'static str, order: Arc<StdMutex<Vec<&'static str>>>| {
            Box::new(move || order.lock().unwrap().push(label)) as Task
        };

        dispatcher.post(record("L", order.clone()), Priority::Low);
        dispatcher.post(record("H", order.clone()), Priority::High);
        dispatcher.post(record("N", order.clone()), Priority::Normal);

        assert!(dispatcher.wait_until_drained(Duration::from_secs(1)).await);
        assert_eq!(*order.lock().unwrap(), vec!["H", "N", "L"]);
    }

    #[tokio::test]
    async fn critical_queue_drops_non_critical_when_full() {
        let queue = CriticalQueue::new(1, Duration::from_millis(5), Duration::from_millis(100));
        // fill the single slot with a task that blocks until we let it go
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let holder: Task = Box::new(move || {
            let _ = futures::executor::block_on(rx);
        });
        assert!(queue.post(holder, true).await);
        // worker may have already popped it; either way the next post should
        // not block indefinitely for a non-critical task once the buffer is full
        let rejected = queue.post(Box::new(|| {}), false).await;
        let _ = tx.send(());
        // whichever way it landed, dropped+accepted counts are consistent
        let stats = queue.stats();
        assert!(stats.dropped <= 1);
        let _ = rejected;
    }
}
