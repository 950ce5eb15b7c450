//! Task executors for callbacks and fire-and-forget writes.
//!
//! # Responsibility
//! - Let callers choose the thread that runs list callbacks and store writes.
//!
//! # Invariants
//! - `WorkerExecutor` runs tasks one at a time in submission order.
//! - Executors never panic on submission; tasks submitted after shutdown are
//!   dropped with a warning.

use crate::locks::lock_or_recover;
use log::{error, warn};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted tasks on an implementation-defined thread.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs each task immediately on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Single named background thread draining a FIFO queue.
pub struct WorkerExecutor {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerExecutor {
    /// Spawns the worker thread.
    ///
    /// # Errors
    /// Returns the OS error when the thread cannot be spawned.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker = thread::Builder::new().name(name.clone()).spawn(move || {
            for task in receiver {
                task();
            }
        })?;
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops accepting tasks and waits for queued tasks to finish.
    ///
    /// Calling this from the worker thread itself only closes the queue.
    pub fn shutdown(&self) {
        drop(lock_or_recover(&self.sender).take());
        let worker = lock_or_recover(&self.worker).take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                error!(
                    "event=executor_shutdown module=exec status=error executor={} error=worker_panicked",
                    self.name
                );
            }
        }
    }
}

impl Executor for WorkerExecutor {
    fn execute(&self, task: Task) {
        let sender = lock_or_recover(&self.sender).clone();
        let delivered = match sender {
            Some(sender) => sender.send(task).is_ok(),
            None => false,
        };
        if !delivered {
            warn!(
                "event=executor_submit module=exec status=dropped executor={}",
                self.name
            );
        }
    }
}

impl Drop for WorkerExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
