//! Job Queue
//!
//! Deferred work waits here until the host reaches a batching boundary and
//! calls [`JobQueue::flush`].
//!
//! # Algorithm
//!
//! Two stages are kept, each an insertion-ordered map:
//!
//! 1. `pre` holds subscribers queued through [`JobQueue::queue_subscriber`]
//!    (keyed by subscriber id, so repeated queueing is idempotent) and
//!    anonymous jobs queued for [`FlushStage::Pre`];
//! 2. `post` holds anonymous jobs queued for [`FlushStage::Post`].
//!
//! A flush always takes the next `pre` job if there is one, so every `pre`
//! job queued before or during the flush runs ahead of the remaining `post`
//! jobs. Jobs queued while flushing are picked up by the same flush.
//!
//! Only one flush request is outstanding at a time: the host hook fires when
//! the first job of a batch arrives and not again until the batch has been
//! flushed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::reactive::{Subscriber, SubscriberId};

/// Which half of a flush a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushStage {
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum JobKey {
    Subscriber(SubscriberId),
    Task(u64),
}

enum Job {
    Subscriber(Subscriber),
    Task(Box<dyn FnOnce()>),
}

impl Job {
    fn run(self) {
        match self {
            Job::Subscriber(subscriber) => {
                if subscriber.is_active() {
                    subscriber.run();
                }
            }
            Job::Task(task) => task(),
        }
    }
}

/// Resets the flushing flag even if a job panics.
struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Pending deferred work for one runtime.
pub struct JobQueue {
    pre: RefCell<IndexMap<JobKey, Job>>,
    post: RefCell<IndexMap<JobKey, Job>>,
    next_task: Cell<u64>,
    flush_requested: Cell<bool>,
    flushing: Cell<bool>,
    hook: RefCell<Option<Rc<dyn Fn()>>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            pre: RefCell::new(IndexMap::new()),
            post: RefCell::new(IndexMap::new()),
            next_task: Cell::new(0),
            flush_requested: Cell::new(false),
            flushing: Cell::new(false),
            hook: RefCell::new(None),
        }
    }

    /// Queue a subscriber run on the pre stage.
    ///
    /// Returns `false` if the subscriber was already waiting.
    pub fn queue_subscriber(&self, subscriber: &Subscriber) -> bool {
        let key = JobKey::Subscriber(subscriber.id());
        let inserted = {
            let mut pre = self.pre.borrow_mut();
            if pre.contains_key(&key) {
                false
            } else {
                pre.insert(key, Job::Subscriber(subscriber.clone()));
                true
            }
        };
        if inserted {
            self.request_flush();
        }
        inserted
    }

    /// Queue a one-shot job. Jobs queued this way are never de-duplicated.
    pub fn queue_job(&self, stage: FlushStage, job: impl FnOnce() + 'static) {
        let seq = self.next_task.get();
        self.next_task.set(seq + 1);
        let queue = match stage {
            FlushStage::Pre => &self.pre,
            FlushStage::Post => &self.post,
        };
        queue
            .borrow_mut()
            .insert(JobKey::Task(seq), Job::Task(Box::new(job)));
        self.request_flush();
    }

    /// Install the callback invoked when a batch first needs flushing.
    pub fn set_hook(&self, hook: Option<Rc<dyn Fn()>>) {
        *self.hook.borrow_mut() = hook;
    }

    /// Whether any job is waiting.
    pub fn has_pending(&self) -> bool {
        !self.pre.borrow().is_empty() || !self.post.borrow().is_empty()
    }

    /// Number of waiting jobs across both stages.
    pub fn len(&self) -> usize {
        self.pre.borrow().len() + self.post.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    fn request_flush(&self) {
        if self.flushing.get() || self.flush_requested.replace(true) {
            return;
        }
        debug!("flush requested");
        let hook = self.hook.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn next_job(&self) -> Option<Job> {
        let next = self.pre.borrow_mut().shift_remove_index(0);
        next.or_else(|| self.post.borrow_mut().shift_remove_index(0))
            .map(|(_, job)| job)
    }

    /// Run every waiting job, pre stage first.
    ///
    /// A nested call while flushing does nothing. After `max_jobs` jobs the
    /// remaining ones are dropped and an error is logged. Returns the number
    /// of jobs executed.
    pub fn flush(&self, max_jobs: usize) -> usize {
        if self.flushing.replace(true) {
            return 0;
        }
        let _guard = FlushGuard(&self.flushing);
        self.flush_requested.set(false);

        let mut executed = 0;
        while let Some(job) = self.next_job() {
            if executed >= max_jobs {
                let dropped = self.len() + 1;
                self.pre.borrow_mut().clear();
                self.post.borrow_mut().clear();
                error!(
                    max_jobs,
                    dropped, "flush limit reached, possible update loop; dropping remaining jobs"
                );
                break;
            }
            executed += 1;
            job.run();
        }

        debug!(executed, "flushed job queue");
        executed
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("pre", &self.pre.borrow().len())
            .field("post", &self.post.borrow().len())
            .field("flushing", &self.flushing.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn pre_runs_before_post() {
        let queue = JobQueue::new();
        let order = log();

        let o = order.clone();
        queue.queue_job(FlushStage::Post, move || o.borrow_mut().push("post"));
        let o = order.clone();
        queue.queue_job(FlushStage::Pre, move || o.borrow_mut().push("pre"));

        assert_eq!(queue.flush(100), 2);
        assert_eq!(*order.borrow(), vec!["pre", "post"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn subscribers_are_deduplicated() {
        let rt = Runtime::new();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let subscriber = Subscriber::new(&rt, Box::new(move || r.set(r.get() + 1)), None);

        let queue = JobQueue::new();
        assert!(queue.queue_subscriber(&subscriber));
        assert!(!queue.queue_subscriber(&subscriber));
        assert!(!queue.queue_subscriber(&subscriber));

        queue.flush(100);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn hook_fires_once_per_batch() {
        let queue = JobQueue::new();
        let requests = Rc::new(Cell::new(0));
        let r = requests.clone();
        queue.set_hook(Some(Rc::new(move || r.set(r.get() + 1))));

        queue.queue_job(FlushStage::Post, || {});
        queue.queue_job(FlushStage::Post, || {});
        assert_eq!(requests.get(), 1);

        queue.flush(100);
        queue.queue_job(FlushStage::Pre, || {});
        assert_eq!(requests.get(), 2);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_same_flush() {
        let queue = Rc::new(JobQueue::new());
        let order = log();

        let q = queue.clone();
        let o = order.clone();
        queue.queue_job(FlushStage::Post, move || {
            o.borrow_mut().push("first post");
            let o2 = o.clone();
            q.queue_job(FlushStage::Pre, move || o2.borrow_mut().push("late pre"));
        });
        let o = order.clone();
        queue.queue_job(FlushStage::Post, move || o.borrow_mut().push("second post"));

        assert_eq!(queue.flush(100), 3);
        assert_eq!(
            *order.borrow(),
            vec!["first post", "late pre", "second post"]
        );
    }

    #[test]
    fn nested_flush_is_a_no_op() {
        let queue = Rc::new(JobQueue::new());
        let nested = Rc::new(Cell::new(usize::MAX));

        let q = queue.clone();
        let n = nested.clone();
        queue.queue_job(FlushStage::Pre, move || n.set(q.flush(100)));

        queue.flush(100);
        assert_eq!(nested.get(), 0);
        assert!(!queue.is_flushing());
    }

    #[test]
    fn runaway_loops_are_cut_off() {
        fn requeue(queue: Rc<JobQueue>, count: Rc<Cell<usize>>) {
            let q = queue.clone();
            queue.queue_job(FlushStage::Post, move || {
                count.set(count.get() + 1);
                requeue(q, count);
            });
        }

        let queue = Rc::new(JobQueue::new());
        let count = Rc::new(Cell::new(0));
        requeue(queue.clone(), count.clone());

        assert_eq!(queue.flush(5), 5);
        assert_eq!(count.get(), 5);
        assert!(queue.is_empty());
    }
}
