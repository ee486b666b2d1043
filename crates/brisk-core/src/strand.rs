//! Per-session serialization
//!
//! A [`Strand`] is a mailbox of futures bound to one session. Jobs posted to
//! it run one at a time, in the order they were posted, on whichever worker
//! of the shared runtime picks up the drain task. Different strands run in
//! parallel; jobs of the same strand never do.

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

type Job = BoxFuture<'static, ()>;

/// Serialized executor for one session's continuations
#[derive(Clone)]
pub struct Strand {
    inner: Arc<Inner>,
}

struct Inner {
    handle: Handle,
    queue: Mutex<Queue>,
    executing: AtomicBool,
}

struct Queue {
    jobs: VecDeque<Job>,
    /// A drain task is scheduled or running
    draining: bool,
}

impl Strand {
    /// Create a strand that schedules its jobs on `handle`
    pub fn new(handle: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle,
                queue: Mutex::new(Queue {
                    jobs: VecDeque::new(),
                    draining: false,
                }),
                executing: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueue a job; it runs after every job posted before it has finished
    pub fn post<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let spawn_drain = {
            let mut queue = self.inner.queue.lock();
            queue.jobs.push_back(job.boxed());
            !std::mem::replace(&mut queue.draining, true)
        };

        if spawn_drain {
            let inner = Arc::clone(&self.inner);
            self.inner.handle.spawn(inner.drain());
        }
    }

    /// Jobs waiting to run (not counting the one executing)
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().jobs.len()
    }

    /// No job queued or executing
    pub fn is_idle(&self) -> bool {
        !self.inner.queue.lock().draining
    }
}

impl Inner {
    async fn drain(self: Arc<Self>) {
        loop {
            let job = {
                let mut queue = self.queue.lock();
                match queue.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            let overlapped = self.executing.swap(true, Ordering::AcqRel);
            debug_assert!(!overlapped, "strand jobs overlapped");

            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                tracing::error!("strand job panicked");
            }

            self.executing.store(false, Ordering::Release);
        }
    }
}
