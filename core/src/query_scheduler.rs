//! Bounded-QPS priority queue for broker queries (`ReqQry*`-style calls).
//! Scheduling (`try_schedule`) is synchronized under a lock; the collected
//! tasks for a drain are executed *after* the lock is released, so a task
//! that re-enters the scheduler cannot deadlock against its own drain call.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Instant;

/// A drain call never executes more than this many tasks, even if more
/// tokens and tasks are both available — a safety cap so one `drain_once`
/// cannot monopolize the caller's thread indefinitely.
const MAX_TASKS_PER_DRAIN: usize = 1024;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueryPriority {
    High = 0,
    Normal = 1,
    Low = 2,
}

pub type QueryExecutor = Box<dyn FnOnce() + Send + 'static>;

pub struct QueryTask {
    pub request_id: i64,
    pub priority: QueryPriority,
    pub execute: QueryExecutor,
    pub created_at: Instant,
}

struct Inner {
    queues: [VecDeque<QueryTask>; 3],
    tokens: f64,
    max_qps: f64,
    last_refill: Instant,
}

pub struct QueryScheduler {
    inner: Mutex<Inner>,
}

impl QueryScheduler {
    pub fn new(max_qps: f64) -> Self {
        let max_qps = max_qps.max(1.0);
        Self {
            inner: Mutex::new(Inner {
                queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                tokens: max_qps,
                max_qps,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Never blocks, never rejects on capacity: queues are unbounded.
    pub fn try_schedule(&self, task: QueryTask) {
        let mut inner = self.inner.lock();
        inner.queues[task.priority as usize].push_back(task);
    }

    fn refill(inner: &mut Inner) {
        let now = Instant::now();
        let elapsed_ms = now.saturating_duration_since(inner.last_refill).as_secs_f64() * 1_000.0;
        let refill = elapsed_ms * inner.max_qps / 1_000.0;
        inner.tokens = (inner.tokens + refill).min(inner.max_qps);
        inner.last_refill = now;
    }

    /// Refills, then pops up to `floor(tokens)` tasks (shared budget across
    /// High -> Normal -> Low), capped at `MAX_TASKS_PER_DRAIN`, and executes
    /// them after releasing the lock. Returns the number executed.
    pub fn drain_once(&self) -> usize {
        let planned = {
            let mut inner = self.inner.lock();
            Self::refill(&mut inner);
            let mut remaining = inner.tokens.floor() as usize;
            if remaining == 0 {
                return 0;
            }
            let mut planned = Vec::new();
            for level in inner.queues.iter_mut() {
                while remaining > 0 && planned.len() < MAX_TASKS_PER_DRAIN {
                    match level.pop_front() {
                        Some(task) => {
                            planned.push(task);
                            remaining -= 1;
                            inner.tokens -= 1.0;
                        }
                        None => break,
                    }
                }
                if remaining == 0 || planned.len() >= MAX_TASKS_PER_DRAIN {
                    break;
                }
            }
            planned
        };
        let count = planned.len();
        for task in planned {
            (task.execute)();
        }
        count
    }

    /// Clamps `max_qps` to at least 1; a rate decrease also clamps the
    /// current token count down to the new ceiling, a rate increase never
    /// boosts the token count above what it already was.
    pub fn set_rate_limit(&self, max_qps: f64) {
        let mut inner = self.inner.lock();
        inner.max_qps = max_qps.max(1.0);
        inner.tokens = inner.tokens.min(inner.max_qps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task(id: i64, priority: QueryPriority, counter: Arc<AtomicUsize>) -> QueryTask {
        QueryTask {
            request_id: id,
            priority,
            execute: Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            created_at: Instant::now(),
        }
    }

    #[test]
    fn drain_respects_qps_ceiling() {
        let scheduler = QueryScheduler::new(2.0);
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..5 {
            scheduler.try_schedule(task(i, QueryPriority::Normal, counter.clone()));
        }
        let executed = scheduler.drain_once();
        assert_eq!(executed, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn high_priority_drains_before_normal() {
        let scheduler = QueryScheduler::new(1.0);
        let order = Arc::new(Mutex::new(Vec::new()));
        let mk = |id: i64, priority: QueryPriority| {
            let order = order.clone();
            QueryTask {
                request_id: id,
                priority,
                execute: Box::new(move || order.lock().push(id)),
                created_at: Instant::now(),
            }
        };
        scheduler.try_schedule(mk(1, QueryPriority::Normal));
        scheduler.try_schedule(mk(2, QueryPriority::High));
        scheduler.drain_once();
        assert_eq!(*order.lock(), vec![2]);
    }
}
