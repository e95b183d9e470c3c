//! Shared background worker pool
//!
//! Loader jobs from every pool instance run on one process-wide executor.
//! The executor is held behind a weak reference: it is created on first
//! use, shared between instances, and torn down when the last instance
//! lets go.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

static GLOBAL_POOL: Mutex<Weak<ThreadPool>> = Mutex::new(Weak::new());

/// Completion handle for an enqueued job.
#[derive(Clone)]
pub struct Task {
    state: Arc<TaskState>,
}

struct TaskState {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Task {
    fn new() -> Self {
        Self {
            state: Arc::new(TaskState {
                done: Mutex::new(false),
                signal: Condvar::new(),
            }),
        }
    }

    fn finish(&self) {
        let mut done = self.state.done.lock();
        *done = true;
        self.state.signal.notify_all();
    }

    /// Block until the job has run.
    pub fn wait(&self) {
        let mut done = self.state.done.lock();
        while !*done {
            self.state.signal.wait(&mut done);
        }
    }

    /// Non-blocking completion check.
    pub fn is_finished(&self) -> bool {
        *self.state.done.lock()
    }
}

/// Fixed-size work-queue executor.
pub struct ThreadPool {
    jobs: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn an executor with `num_workers` worker threads.
    pub fn new(num_workers: usize) -> Self {
        let (jobs, queue) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(num_workers);

        for index in 0..num_workers {
            let queue: Receiver<Job> = queue.clone();
            match thread::Builder::new()
                .name(format!("wavepool-worker-{index}"))
                .spawn(move || {
                    while let Ok(job) = queue.recv() {
                        job();
                    }
                }) {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    log::error!("failed to spawn pool worker {index}: {err}");
                }
            }
        }

        Self { jobs, workers }
    }

    /// The process-wide executor shared by every pool instance, sized to
    /// the hardware concurrency minus the audio and control threads.
    pub fn global() -> Arc<ThreadPool> {
        let mut slot = GLOBAL_POOL.lock();
        if let Some(pool) = slot.upgrade() {
            return pool;
        }
        let num_workers = num_cpus::get().saturating_sub(2).max(1);
        let pool = Arc::new(ThreadPool::new(num_workers));
        *slot = Arc::downgrade(&pool);
        pool
    }

    /// Queue a job; the returned task completes when it has run.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) -> Task {
        let task = Task::new();
        let completion = task.clone();
        let boxed: Job = Box::new(move || {
            job();
            completion.finish();
        });
        if self.jobs.send(boxed).is_err() {
            // Workers are gone (shutdown); resolve the task so nobody hangs.
            task.finish();
        }
        task
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Detach the sender so worker recv loops drain and exit.
        let (detached, _) = unbounded();
        drop(std::mem::replace(&mut self.jobs, detached));
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_enqueued_jobs_run() {
        let pool = ThreadPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<Task> = (0..32)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.enqueue(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();

        for task in &tasks {
            task.wait();
            assert!(task.is_finished());
        }
        assert_eq!(counter.load(Ordering::Relaxed), 32);
    }

    #[test]
    fn test_drop_joins_workers() {
        let pool = ThreadPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        drop(pool);
        // Pending jobs drain before the workers exit.
        assert_eq!(counter.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn test_global_pool_is_shared() {
        let a = ThreadPool::global();
        let b = ThreadPool::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
