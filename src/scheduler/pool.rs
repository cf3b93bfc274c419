//! The parallel task runtime: one process-wide work queue feeding a
//! pool of worker threads.
//!
//! One mutex guards the job stack and all thread bookkeeping; the two
//! sleep teams and the owners each have a condition variable. Worker
//! selection scans the stack from the top, skipping jobs that are not
//! currently runnable: a job is runnable only if one unit of its
//! gating semaphore (if any) can be claimed and the live estimate of
//! assistable threads covers its minimum-thread requirement. Claimed
//! iterations execute with the lock released; nested submission from
//! inside an iteration body is expected and must not deadlock even on
//! a single thread, which is why every submitting thread runs the
//! worker loop itself until its own jobs are done.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use super::semaphore::Semaphore;

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// Hard cap on worker threads, matching the fixed-size bookkeeping of
/// the runtime ABI.
pub const MAX_THREADS: usize = 256;

/// An iteration body: takes the iteration index, returns an exit
/// status (zero for success).
pub type TaskFn = Arc<dyn Fn(i32) -> i32 + Send + Sync + 'static>;

/// One schedulable unit of parallel work.
#[derive(Clone)]
pub struct Task {
    pub body: TaskFn,
    pub min: i32,
    pub extent: i32,
    /// Gating semaphore: one unit is acquired per claimed iteration.
    pub semaphore: Option<Arc<Semaphore>>,
    /// Number of concurrently-running workers this task needs to make
    /// forward progress.
    pub min_threads: usize,
    /// Whether iterations of this task may block (on semaphores or
    /// nested work); blocked runners cannot be counted on to assist
    /// jobs that require guaranteed progress.
    pub may_block: bool,
}

impl Task {
    pub fn new<F>(min: i32, extent: i32, body: F) -> Self
    where
        F: Fn(i32) -> i32 + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
            min,
            extent,
            semaphore: None,
            min_threads: 1,
            may_block: false,
        }
    }

    pub fn gated(mut self, semaphore: Arc<Semaphore>) -> Self {
        self.semaphore = Some(semaphore);
        self
    }

    pub fn min_threads(mut self, n: usize) -> Self {
        self.min_threads = n;
        self
    }

    pub fn may_block(mut self) -> Self {
        self.may_block = true;
        self
    }
}

/// In-flight state of one submitted task.
///
/// The counters are atomics only so that `&Job` can be shared across
/// threads; every mutation happens with the queue mutex held, which
/// also provides the ordering. A job is done only when its iteration
/// range is exhausted AND no worker is still inside an iteration.
struct Job {
    body: TaskFn,
    next: AtomicI32,
    end: i32,
    active_workers: AtomicUsize,
    exit_status: AtomicI32,
    semaphore: Option<Arc<Semaphore>>,
    min_threads: usize,
    may_block: bool,
}

impl Job {
    fn new(task: &Task) -> Self {
        Self {
            body: Arc::clone(&task.body),
            next: AtomicI32::new(task.min),
            end: task.min + task.extent,
            active_workers: AtomicUsize::new(0),
            exit_status: AtomicI32::new(0),
            semaphore: task.semaphore.clone(),
            min_threads: task.min_threads,
            may_block: task.may_block,
        }
    }

    fn has_unclaimed(&self) -> bool {
        self.next.load(Ordering::Relaxed) < self.end
    }

    fn running(&self) -> bool {
        self.has_unclaimed() || self.active_workers.load(Ordering::Relaxed) > 0
    }
}

struct QueueState {
    /// Job stack; the top is the end of the vector.
    jobs: Vec<Arc<Job>>,
    threads: Vec<JoinHandle<()>>,
    threads_created: usize,
    desired_num_threads: usize,
    /// A-team/B-team sleep balancing: workers that wake and find the
    /// A team over target park on the B-team condvar instead.
    a_team_size: usize,
    target_a_team_size: usize,
    /// Threads currently inside the worker loop (owners included).
    workers_in_loop: usize,
    /// Threads currently executing an iteration of a may-block job.
    blocked_runners: usize,
    shutdown: bool,
    initialized: bool,
}

pub(crate) struct PoolInner {
    state: Mutex<QueueState>,
    /// Broadcast when a job completes.
    wakeup_owners: Condvar,
    /// Broadcast whenever work is added or becomes runnable.
    wakeup_a_team: Condvar,
    /// Broadcast when more threads are wanted than the A team holds.
    wakeup_b_team: Condvar,
}

impl PoolInner {
    /// Broadcast every sleeper. Used by semaphore releases: any parked
    /// thread (a pure worker or a submitting owner) may be the one
    /// able to claim the newly runnable work.
    pub(crate) fn wake_all(&self) {
        let _guard = self.state.lock();
        self.wakeup_a_team.notify_all();
        self.wakeup_b_team.notify_all();
        self.wakeup_owners.notify_all();
    }
}

/// A work-queue-backed thread pool. Cloning shares the pool.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn clamp_num_threads(n: usize) -> usize {
    n.clamp(1, MAX_THREADS)
}

/// Default parallelism: `HL_NUM_THREADS` (legacy alias
/// `HL_NUMTHREADS`), else the host logical CPU count.
fn default_desired_num_threads() -> usize {
    let configured = std::env::var("HL_NUM_THREADS")
        .or_else(|_| std::env::var("HL_NUMTHREADS"))
        .ok()
        .map(|s| s.trim().parse::<i64>().unwrap_or(0));
    match configured {
        Some(n) => clamp_num_threads(n.max(0) as usize),
        None => clamp_num_threads(num_cpus()),
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(QueueState {
                    jobs: Vec::new(),
                    threads: Vec::new(),
                    threads_created: 0,
                    desired_num_threads: 0,
                    a_team_size: 0,
                    target_a_team_size: 0,
                    workers_in_loop: 0,
                    blocked_runners: 0,
                    shutdown: false,
                    initialized: false,
                }),
                wakeup_owners: Condvar::new(),
                wakeup_a_team: Condvar::new(),
                wakeup_b_team: Condvar::new(),
            }),
        }
    }

    /// Run `body` for every index in `[min, min + extent)`, possibly
    /// on many threads, and return the aggregate exit status: zero if
    /// every iteration succeeded, otherwise the status of one failing
    /// iteration (whichever was recorded last).
    pub fn parallel_for<F>(&self, min: i32, extent: i32, body: F) -> i32
    where
        F: Fn(i32) -> i32 + Send + Sync + 'static,
    {
        self.parallel_tasks(vec![Task::new(min, extent, body)])
    }

    /// Submit a bundle of tasks and run the worker loop until all of
    /// them are done. Returns the first nonzero status in task order.
    pub fn parallel_tasks(&self, tasks: Vec<Task>) -> i32 {
        // For loops are expected to gracefully handle empty extents.
        let live: Vec<&Task> = tasks.iter().filter(|t| t.extent > 0).collect();
        if live.is_empty() {
            return 0;
        }

        let jobs: Vec<Arc<Job>> = live.iter().map(|t| Arc::new(Job::new(t))).collect();
        let total_extent: usize = live.iter().map(|t| t.extent as usize).sum();

        let mut state = self.inner.state.lock();
        self.initialize(&mut state);

        // Spawn up to the desired head count, minus the submitting
        // thread itself.
        while state.threads_created < state.desired_num_threads.saturating_sub(1) {
            state.threads_created += 1;
            let inner = Arc::clone(&self.inner);
            state.threads.push(std::thread::spawn(move || {
                let mut state = inner.state.lock();
                state.workers_in_loop += 1;
                worker_loop(&inner, &mut state, None);
                state.workers_in_loop -= 1;
            }));
        }

        // With an empty queue and less work than threads, shrink the A
        // team so the surplus parks until a larger job arrives.
        state.target_a_team_size =
            if state.jobs.is_empty() && total_extent < state.desired_num_threads {
                total_extent
            } else {
                state.desired_num_threads
            };

        for task in &live {
            if let Some(sem) = &task.semaphore {
                sem.attach(&self.inner);
            }
        }
        // Push in reverse so the first task ends up on top of the
        // stack and is scanned first.
        state.jobs.extend(jobs.iter().rev().cloned());

        #[cfg(feature = "tracing")]
        debug!(tasks = jobs.len(), total_extent, "jobs_submitted");

        self.inner.wakeup_a_team.notify_all();
        if state.target_a_team_size > state.a_team_size {
            self.inner.wakeup_b_team.notify_all();
        }
        // A parked owner may be the only thread able to pick this up.
        self.inner.wakeup_owners.notify_all();

        // Do some work ourselves; our loop ends when *our* jobs are
        // done, not when the queue shuts down.
        state.workers_in_loop += 1;
        worker_loop(&self.inner, &mut state, Some(jobs.as_slice()));
        state.workers_in_loop -= 1;
        drop(state);

        jobs.iter()
            .map(|j| j.exit_status.load(Ordering::Relaxed))
            .find(|&s| s != 0)
            .unwrap_or(0)
    }

    /// Set the desired worker-thread count. Zero resets to the
    /// environment-configured default; negative counts are a caller
    /// bug. Returns the previous setting.
    pub fn set_num_threads(&self, n: i32) -> i32 {
        assert!(n >= 0, "set_num_threads: thread count must be >= 0");
        let desired = if n == 0 {
            default_desired_num_threads()
        } else {
            clamp_num_threads(n as usize)
        };
        let mut state = self.inner.state.lock();
        let old = state.desired_num_threads;
        state.desired_num_threads = desired;
        old as i32
    }

    /// Wake everyone, wait for every spawned thread to exit, and
    /// return the pool to its uninitialized state. The next submission
    /// re-initializes it.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if !state.initialized {
            return;
        }
        state.shutdown = true;
        self.inner.wakeup_owners.notify_all();
        self.inner.wakeup_a_team.notify_all();
        self.inner.wakeup_b_team.notify_all();
        let threads = std::mem::take(&mut state.threads);
        state.initialized = false;
        drop(state);

        for handle in threads {
            handle.join().expect("worker thread panicked");
        }
    }

    fn initialize(&self, state: &mut QueueState) {
        if state.initialized {
            return;
        }
        state.shutdown = false;
        if state.desired_num_threads == 0 {
            state.desired_num_threads = default_desired_num_threads();
        }
        state.desired_num_threads = clamp_num_threads(state.desired_num_threads);
        state.threads_created = 0;
        // Everyone starts on the A team.
        state.a_team_size = state.desired_num_threads;
        state.target_a_team_size = state.desired_num_threads;
        state.initialized = true;
        #[cfg(feature = "tracing")]
        debug!(threads = state.desired_num_threads, "pool_initialized");
    }
}

/// The core worker loop. Entered with the queue mutex held; the lock
/// is only released while executing an iteration body or sleeping.
///
/// Owners (`owned` is Some) stay until their own jobs are done; pure
/// workers stay until shutdown.
fn worker_loop(inner: &PoolInner, state: &mut MutexGuard<'_, QueueState>, owned: Option<&[Arc<Job>]>) {
    loop {
        let keep_going = match owned {
            Some(jobs) => jobs.iter().any(|j| j.running()),
            None => !state.shutdown,
        };
        if !keep_going {
            return;
        }

        // Scan the stack from the top for a runnable job.
        let mut claimed: Option<(usize, Arc<Job>)> = None;
        // Live estimate of assistable threads: everyone in the loop
        // except those currently inside a may-block iteration.
        let assistable = state.workers_in_loop - state.blocked_runners;
        for (pos, job) in state.jobs.iter().enumerate().rev() {
            if !job.has_unclaimed() {
                continue;
            }
            if job.min_threads > assistable {
                // Starting this job now could deadlock: not enough
                // threads can ever show up to make it progress.
                continue;
            }
            if let Some(sem) = &job.semaphore {
                if !sem.try_acquire(1) {
                    continue;
                }
            }
            claimed = Some((pos, Arc::clone(job)));
            break;
        }

        match claimed {
            Some((pos, job)) => {
                // Claim exactly one iteration. Counters are mutated
                // under the queue mutex.
                let index = job.next.fetch_add(1, Ordering::Relaxed);
                if index + 1 >= job.end {
                    state.jobs.remove(pos);
                }
                job.active_workers.fetch_add(1, Ordering::Relaxed);
                if job.may_block {
                    state.blocked_runners += 1;
                }

                let result =
                    MutexGuard::unlocked(state, || (job.body)(index));

                if job.may_block {
                    state.blocked_runners -= 1;
                }
                if result != 0 {
                    // Last failing iteration wins; see DESIGN.md.
                    job.exit_status.store(result, Ordering::Relaxed);
                }
                job.active_workers.fetch_sub(1, Ordering::Relaxed);

                if !job.running() {
                    inner.wakeup_owners.notify_all();
                }
            }
            None => match owned {
                Some(_) => {
                    // Our job is still running somewhere else; wait
                    // for a worker to finish it (or for new work).
                    inner.wakeup_owners.wait(state);
                }
                None => {
                    if state.a_team_size <= state.target_a_team_size {
                        inner.wakeup_a_team.wait(state);
                    } else {
                        // Too many of us awake: demote to the B team
                        // until more concurrency is demanded.
                        state.a_team_size -= 1;
                        inner.wakeup_b_team.wait(state);
                        state.a_team_size += 1;
                    }
                }
            },
        }
    }
}

static DEFAULT_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// The process-wide pool used by generated pipeline code.
pub fn default_pool() -> &'static ThreadPool {
    DEFAULT_POOL.get_or_init(ThreadPool::new)
}

/// Runtime ABI: run a parallel for loop on the default pool.
pub fn do_parallel_for<F>(min: i32, extent: i32, body: F) -> i32
where
    F: Fn(i32) -> i32 + Send + Sync + 'static,
{
    default_pool().parallel_for(min, extent, body)
}

/// Runtime ABI: run a bundle of tasks on the default pool.
pub fn do_parallel_tasks(tasks: Vec<Task>) -> i32 {
    default_pool().parallel_tasks(tasks)
}

/// Runtime ABI: set the default pool's parallelism, returning the old
/// value.
pub fn set_num_threads(n: i32) -> i32 {
    default_pool().set_num_threads(n)
}

/// Runtime ABI: shut the default pool down, joining every worker.
pub fn shutdown_thread_pool() {
    default_pool().shutdown();
}
