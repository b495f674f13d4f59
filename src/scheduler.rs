//! The reduce worker pool.
//!
//! A [`Scheduler`] owns a fixed number of worker threads that pull
//! [`ReduceTask`]s from one shared channel. Each task reports back on its own
//! one-shot completion channel, which the driver waits on through a
//! [`TaskHandle`].
//!
//! Shutdown is a broadcast: the pool drops the sending half of a dedicated
//! shutdown channel and every worker's `select!` wakes up. Workers only look
//! at that channel between tasks, so a task that has started always
//! finishes, and its partition file is never left half-deleted.
//!
//! The pool is an ordinary value, not a global. It can be started, used for
//! any number of runs, shut down and started again.
//!
//! ```no_run
//! use topn::scheduler::Scheduler;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut pool = Scheduler::new(4);
//! pool.start()?;
//! // pool.dispatch(tasks)? for each run ...
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```

use crate::reduce::{ReduceOutcome, ReduceTask, reduce_partition};
use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

struct Job {
    task: ReduceTask,
    done: Sender<Result<ReduceOutcome>>,
}

struct Running {
    tasks: Sender<Job>,
    /// Never sent on; dropping it is the shutdown broadcast.
    shutdown: Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

/// Fixed-size pool of reduce workers.
pub struct Scheduler {
    workers: usize,
    running: Option<Running>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl Scheduler {
    /// An idle pool of `workers` threads (at least one). Call [`start`](Self::start)
    /// before dispatching.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            running: None,
        }
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn the worker threads. They idle until tasks arrive.
    ///
    /// # Errors
    /// Returns an error if the pool is already running or a thread cannot be spawned.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            bail!("scheduler is already running");
        }
        let (tasks, task_rx) = unbounded::<Job>();
        let (shutdown, shutdown_rx) = bounded::<()>(0);
        let mut handles = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let task_rx = task_rx.clone();
            let shutdown_rx = shutdown_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("topn-reduce-{id}"))
                .spawn(move || worker_loop(id, &task_rx, &shutdown_rx))
                .with_context(|| format!("spawn reduce worker {id}"))?;
            handles.push(handle);
        }
        self.running = Some(Running {
            tasks,
            shutdown,
            handles,
        });
        info!(workers = self.workers, "reduce scheduler started");
        Ok(())
    }

    /// Enqueue one task. The returned handle resolves when the task finishes.
    ///
    /// # Errors
    /// Returns an error if the pool is not running.
    pub fn submit(&self, task: ReduceTask) -> Result<TaskHandle> {
        let Some(running) = &self.running else {
            bail!("scheduler is not started");
        };
        let partition = task.partition();
        let (done, done_rx) = bounded(1);
        running
            .tasks
            .send(Job { task, done })
            .map_err(|_| anyhow!("reduce workers have exited"))?;
        Ok(TaskHandle {
            partition,
            done: done_rx,
        })
    }

    /// Enqueue every task, then block until all of them have completed.
    ///
    /// Outcomes are returned ordered by partition id. If any task failed, the
    /// first failure (by partition id) is returned, but only after every
    /// task has finished.
    ///
    /// # Errors
    /// Returns an error if the pool is not running or any task fails.
    pub fn dispatch(&self, tasks: Vec<ReduceTask>) -> Result<Vec<ReduceOutcome>> {
        let handles = tasks
            .into_iter()
            .map(|t| self.submit(t))
            .collect::<Result<Vec<_>>>()?;
        let mut results: Vec<(usize, Result<ReduceOutcome>)> =
            handles.into_iter().map(|h| (h.partition, h.wait())).collect();
        results.sort_by_key(|(p, _)| *p);
        results.into_iter().map(|(_, r)| r).collect()
    }

    /// Stop the workers and wait for them to exit. Tasks still queued are
    /// abandoned; their handles report an error. Calling this on an idle
    /// pool does nothing.
    pub fn shutdown(&mut self) {
        let Some(Running {
            tasks,
            shutdown,
            handles,
        }) = self.running.take()
        else {
            return;
        };
        drop(shutdown);
        drop(tasks);
        for h in handles {
            if h.join().is_err() {
                warn!("reduce worker panicked");
            }
        }
        info!("reduce scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Completion signal of one submitted task.
pub struct TaskHandle {
    partition: usize,
    done: Receiver<Result<ReduceOutcome>>,
}

impl TaskHandle {
    #[must_use]
    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Block until the task has finished.
    ///
    /// # Errors
    /// Returns the task's own error, or an error if the task was abandoned
    /// (its worker panicked or the pool shut down first).
    pub fn wait(self) -> Result<ReduceOutcome> {
        self.done.recv().map_err(|_| {
            anyhow!(
                "reduce task for partition {} ended without reporting",
                self.partition
            )
        })?
    }
}

fn worker_loop(id: usize, tasks: &Receiver<Job>, shutdown: &Receiver<()>) {
    debug!(worker = id, "reduce worker idle");
    loop {
        select! {
            recv(tasks) -> msg => {
                let Ok(Job { task, done }) = msg else {
                    return;
                };
                let partition = task.partition();
                let res = reduce_partition(task);
                if let Err(e) = &res {
                    error!(worker = id, partition, "reduce task failed: {e:#}");
                }
                // The driver may have stopped waiting; nothing to do then.
                let _ = done.send(res);
            }
            recv(shutdown) -> _ => return,
        }
    }
}
