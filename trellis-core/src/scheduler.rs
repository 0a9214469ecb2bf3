//! Update Scheduler
//!
//! The scheduler batches effect re-invocation into ordered flushes. A
//! write to reactive state never runs a render effect synchronously; the
//! effect's policy queues a job here, and the whole batch runs on the next
//! flush in ascending id order.
//!
//! # Flush Cycle
//!
//! One cycle runs three phases to completion:
//!
//! 1. Pre-flush callbacks, drained to exhaustion (a pre-flush callback may
//!    queue further pre-flush callbacks; each batch is re-checked). Used
//!    by watchers that must observe fresh state before the owning render.
//! 2. The main queue, sorted ascending by job id. Component jobs carry
//!    their instance uid, and instances are numbered in creation order, so
//!    ancestors always update before descendants. A job queued while the
//!    pass is running is inserted at its sorted position (binary search),
//!    not appended, so the ordering invariant holds for jobs triggered
//!    mid-flush.
//! 3. Post-flush callbacks, deduplicated and sorted. Used by effects that
//!    must observe the host tree after it was produced.
//!
//! If any phase left new work behind, the whole cycle repeats.
//!
//! # Micro-task Boundary
//!
//! There is no ambient micro-task queue in this runtime, so the boundary
//! is explicit: queueing only marks a flush as pending, and the embedder
//! drives it with [`flush_jobs`] or [`next_tick`]. Everything queued
//! within one synchronous section merges into the single next flush.
//!
//! # Runaway Updates
//!
//! A per-job execution counter trips once a job has run more than
//! `RECURSION_LIMIT` times inside one flush. The flush is abandoned, all
//! queues are cleared, and [`Error::RecursiveUpdate`] is returned: an
//! update loop is a real bug that local recovery cannot fix.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Error;

/// How many times one job may run within a single flush.
const RECURSION_LIMIT: u32 = 100;

/// Counter shared by all job producers, so ids reflect creation order
/// globally (component instances allocate their uid from here too).
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate the next job id.
pub fn next_job_id() -> u64 {
    JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A deferred, id-ordered unit of work.
#[derive(Clone)]
pub struct Job {
    id: u64,
    allow_recurse: bool,
    func: Arc<dyn Fn() + Send + Sync>,
}

impl Job {
    /// Create a job with a freshly allocated id.
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::with_id(next_job_id(), f)
    }

    /// Create a job with a caller-chosen id (component update jobs pass
    /// their instance uid).
    pub fn with_id(id: u64, f: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            id,
            allow_recurse: false,
            func: Arc::new(f),
        }
    }

    /// Permit the job to re-queue itself while it is the one running.
    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    /// The job's ordering identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run the job's callable immediately, outside any queue.
    pub fn invoke(&self) {
        (self.func)();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("allow_recurse", &self.allow_recurse)
            .finish()
    }
}

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Job>,
    flush_index: usize,

    pending_pre: Vec<Job>,
    active_pre: Vec<Job>,
    pre_index: usize,

    pending_post: Vec<Job>,
    active_post: Vec<Job>,
    post_index: usize,

    is_flushing: bool,
    is_flush_pending: bool,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Queue a main-pass job, deduplicated by id against the not-yet-run
/// remainder of the queue. The job never runs synchronously here.
pub fn queue_job(job: Job) {
    STATE.with(|s| {
        let mut st = s.borrow_mut();

        // A job allowing recursion may re-enter while it is the one at
        // flush_index; the dedup scan starts past it in that case.
        let base = if st.is_flushing && job.allow_recurse {
            st.flush_index + 1
        } else {
            st.flush_index
        };
        let scan_from = base.min(st.queue.len());

        if st.queue[scan_from..].iter().any(|j| j.id == job.id) {
            return;
        }

        if st.is_flushing {
            // Sorted insertion keeps the ascending-id invariant for jobs
            // queued mid-flush. Only the unflushed tail is searched.
            let tail_start = (st.flush_index + 1).min(st.queue.len());
            let offset = st.queue[tail_start..].partition_point(|j| j.id <= job.id);
            st.queue.insert(tail_start + offset, job);
        } else {
            st.queue.push(job);
        }
        st.is_flush_pending = true;
    });
}

/// Queue a callback for the pre-flush phase.
pub fn queue_pre_flush_cb(job: Job) {
    STATE.with(|s| {
        let mut st = s.borrow_mut();

        let scan_from = (st.pre_index + if job.allow_recurse { 1 } else { 0 }).min(st.active_pre.len());
        let in_active = st.active_pre[scan_from..].iter().any(|j| j.id == job.id);
        let in_pending = st.pending_pre.iter().any(|j| j.id == job.id);
        if in_active || in_pending {
            return;
        }

        st.pending_pre.push(job);
        st.is_flush_pending = true;
    });
}

/// Queue a callback for the post-flush phase.
pub fn queue_post_flush_cb(job: Job) {
    STATE.with(|s| {
        let mut st = s.borrow_mut();

        let scan_from =
            (st.post_index + if job.allow_recurse { 1 } else { 0 }).min(st.active_post.len());
        let in_active = st.active_post[scan_from..].iter().any(|j| j.id == job.id);
        let in_pending = st.pending_post.iter().any(|j| j.id == job.id);
        if in_active || in_pending {
            return;
        }

        st.pending_post.push(job);
        st.is_flush_pending = true;
    });
}

/// Remove a pending, not-yet-run job. Used when a parent is about to
/// force-update a component whose own self-update is now redundant.
pub fn invalidate_job(id: u64) {
    STATE.with(|s| {
        let mut st = s.borrow_mut();
        let from = if st.is_flushing { st.flush_index + 1 } else { 0 };
        let from = from.min(st.queue.len());
        if let Some(pos) = st.queue[from..].iter().position(|j| j.id == id) {
            st.queue.remove(from + pos);
        }
    });
}

/// Whether any queue holds work for the next flush.
pub fn has_pending_jobs() -> bool {
    STATE.with(|s| {
        let st = s.borrow();
        st.is_flush_pending || st.is_flushing
    })
}

fn check_recursive_updates(seen: &mut HashMap<u64, u32>, job: &Job) -> Result<(), Error> {
    let count = seen.entry(job.id).or_insert(0);
    *count += 1;
    if *count > RECURSION_LIMIT {
        Err(Error::RecursiveUpdate { id: job.id })
    } else {
        Ok(())
    }
}

fn dedup_by_id(jobs: &mut Vec<Job>) {
    let mut seen = Vec::with_capacity(jobs.len());
    jobs.retain(|j| {
        if seen.contains(&j.id) {
            false
        } else {
            seen.push(j.id);
            true
        }
    });
}

fn flush_pre_cbs(seen: &mut HashMap<u64, u32>) -> Result<(), Error> {
    loop {
        let has_batch = STATE.with(|s| {
            let mut st = s.borrow_mut();
            if st.pending_pre.is_empty() {
                return false;
            }
            let mut batch = std::mem::take(&mut st.pending_pre);
            dedup_by_id(&mut batch);
            st.active_pre = batch;
            st.pre_index = 0;
            true
        });
        if !has_batch {
            return Ok(());
        }

        loop {
            let job = STATE.with(|s| {
                let st = s.borrow();
                st.active_pre.get(st.pre_index).cloned()
            });
            let Some(job) = job else { break };

            check_recursive_updates(seen, &job)?;
            (job.func)();
            STATE.with(|s| s.borrow_mut().pre_index += 1);
        }

        STATE.with(|s| {
            let mut st = s.borrow_mut();
            st.active_pre.clear();
            st.pre_index = 0;
        });
        // Loop again: callbacks may have queued more pre-flush work.
    }
}

fn flush_post_cbs(seen: &mut HashMap<u64, u32>) -> Result<(), Error> {
    let has_batch = STATE.with(|s| {
        let mut st = s.borrow_mut();
        if st.pending_post.is_empty() {
            return false;
        }
        let mut batch = std::mem::take(&mut st.pending_post);
        dedup_by_id(&mut batch);
        batch.sort_by_key(|j| j.id);
        st.active_post = batch;
        st.post_index = 0;
        true
    });
    if !has_batch {
        return Ok(());
    }

    loop {
        let job = STATE.with(|s| {
            let st = s.borrow();
            st.active_post.get(st.post_index).cloned()
        });
        let Some(job) = job else { break };

        check_recursive_updates(seen, &job)?;
        (job.func)();
        STATE.with(|s| s.borrow_mut().post_index += 1);
    }

    STATE.with(|s| {
        let mut st = s.borrow_mut();
        st.active_post.clear();
        st.post_index = 0;
    });
    Ok(())
}

fn flush_cycle(seen: &mut HashMap<u64, u32>) -> Result<(), Error> {
    loop {
        flush_pre_cbs(seen)?;

        STATE.with(|s| s.borrow_mut().queue.sort_by_key(|j| j.id));

        loop {
            let job = STATE.with(|s| {
                let st = s.borrow();
                st.queue.get(st.flush_index).cloned()
            });
            let Some(job) = job else { break };

            check_recursive_updates(seen, &job)?;
            (job.func)();
            STATE.with(|s| s.borrow_mut().flush_index += 1);
        }

        STATE.with(|s| {
            let mut st = s.borrow_mut();
            st.queue.clear();
            st.flush_index = 0;
        });

        flush_post_cbs(seen)?;

        let settled = STATE.with(|s| {
            let st = s.borrow();
            st.queue.is_empty() && st.pending_pre.is_empty() && st.pending_post.is_empty()
        });
        if settled {
            return Ok(());
        }
        tracing::trace!("flush cycle produced further work; repeating");
    }
}

/// Run every queued job to completion in order.
///
/// Re-entrant calls (a job calling `flush_jobs`) are no-ops; the outer
/// flush already owns the cycle.
pub fn flush_jobs() -> Result<(), Error> {
    let entered = STATE.with(|s| {
        let mut st = s.borrow_mut();
        if st.is_flushing {
            false
        } else {
            st.is_flushing = true;
            st.is_flush_pending = false;
            true
        }
    });
    if !entered {
        return Ok(());
    }

    let mut seen: HashMap<u64, u32> = HashMap::new();
    let result = flush_cycle(&mut seen);

    STATE.with(|s| {
        let mut st = s.borrow_mut();
        st.is_flushing = false;
        st.is_flush_pending = false;
        if result.is_err() {
            // Abandon the poisoned cycle so the scheduler stays usable.
            st.queue.clear();
            st.flush_index = 0;
            st.pending_pre.clear();
            st.active_pre.clear();
            st.pre_index = 0;
            st.pending_post.clear();
            st.active_post.clear();
            st.post_index = 0;
        }
    });
    result
}

/// Settle all pending updates, then run `f`.
pub fn next_tick<T>(f: impl FnOnce() -> T) -> Result<T, Error> {
    flush_jobs()?;
    Ok(f())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording_job(id: u64, log: &Arc<Mutex<Vec<u64>>>) -> Job {
        let log = log.clone();
        Job::with_id(id, move || log.lock().push(id))
    }

    #[test]
    fn jobs_flush_in_ascending_id_order_exactly_once() {
        let log = Arc::new(Mutex::new(Vec::new()));

        queue_job(recording_job(3, &log));
        queue_job(recording_job(1, &log));
        queue_job(recording_job(2, &log));
        assert!(log.lock().is_empty());

        flush_jobs().unwrap();
        assert_eq!(*log.lock(), vec![1, 2, 3]);

        flush_jobs().unwrap();
        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_job_ids_are_merged() {
        let log = Arc::new(Mutex::new(Vec::new()));

        queue_job(recording_job(7, &log));
        queue_job(recording_job(7, &log));
        flush_jobs().unwrap();

        assert_eq!(*log.lock(), vec![7]);
    }

    #[test]
    fn job_queued_mid_flush_lands_in_sorted_position() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let late = recording_job(5, &log);
        let log_clone = log.clone();
        queue_job(Job::with_id(2, move || {
            log_clone.lock().push(2);
            queue_job(late.clone());
        }));
        queue_job(recording_job(9, &log));

        flush_jobs().unwrap();
        assert_eq!(*log.lock(), vec![2, 5, 9]);
    }

    #[test]
    fn pre_runs_before_main_runs_before_post() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_clone = log.clone();
        queue_post_flush_cb(Job::new(move || log_clone.lock().push("post")));
        let log_clone = log.clone();
        queue_job(Job::new(move || log_clone.lock().push("main")));
        let log_clone = log.clone();
        queue_pre_flush_cb(Job::new(move || log_clone.lock().push("pre")));

        flush_jobs().unwrap();
        assert_eq!(*log.lock(), vec!["pre", "main", "post"]);
    }

    #[test]
    fn pre_flush_queue_drains_to_exhaustion() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_clone = log.clone();
        queue_pre_flush_cb(Job::new(move || {
            log_clone.lock().push("first");
            let log_inner = log_clone.clone();
            queue_pre_flush_cb(Job::new(move || log_inner.lock().push("second")));
        }));

        flush_jobs().unwrap();
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn invalidated_job_never_runs() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let job = recording_job(11, &log);
        queue_job(job.clone());
        invalidate_job(11);
        flush_jobs().unwrap();

        assert!(log.lock().is_empty());
    }

    #[test]
    fn post_flush_work_triggers_another_cycle() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_clone = log.clone();
        queue_post_flush_cb(Job::new(move || {
            log_clone.lock().push("post");
            let log_inner = log_clone.clone();
            queue_job(Job::new(move || log_inner.lock().push("second-cycle")));
        }));

        flush_jobs().unwrap();
        assert_eq!(*log.lock(), vec!["post", "second-cycle"]);
    }

    #[test]
    fn runaway_self_scheduling_fails_fast() {
        let job_id = next_job_id();
        fn requeue(id: u64) {
            queue_job(
                Job::with_id(id, move || requeue(id)).allow_recurse(true),
            );
        }
        requeue(job_id);

        let err = flush_jobs().unwrap_err();
        match err {
            Error::RecursiveUpdate { id } => assert_eq!(id, job_id),
            other => panic!("unexpected error: {other}"),
        }

        // The scheduler must remain usable after the abort.
        let log = Arc::new(Mutex::new(Vec::new()));
        queue_job(recording_job(next_job_id(), &log));
        flush_jobs().unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn next_tick_settles_pending_work_first() {
        let log = Arc::new(Mutex::new(Vec::new()));

        queue_job(recording_job(next_job_id(), &log));
        let observed = next_tick(|| log.lock().len()).unwrap();
        assert_eq!(observed, 1);
    }
}
