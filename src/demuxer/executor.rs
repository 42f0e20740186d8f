//! Execution contexts that run listener callbacks.
//!
//! The worker thread never calls a listener itself; it posts a [`Task`] to
//! the caller's [`Executor`], which runs tasks one at a time in FIFO order.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::{DemuxError, Result};

/// A unit of work run on the caller's execution context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A serial task queue owned by the caller.
pub trait Executor: Send + Sync {
    /// Queues `task`. Fails with `Closed` once the context has shut down.
    fn post(&self, task: Task) -> Result<()>;
}

fn run_task(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        log::error!("listener task panicked");
    }
}

/// Dedicated dispatcher thread draining a channel of tasks.
pub struct MessageLoop {
    sender: Option<Sender<Task>>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl MessageLoop {
    /// Spawns the dispatcher thread under `name`.
    pub fn new(name: &str) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for task in receiver.iter() {
                    run_task(task);
                }
                log::trace!("message loop drained");
            })
            .map_err(|e| DemuxError::ThreadStartFailed(e.to_string()))?;

        Ok(Self {
            sender: Some(sender),
            thread_id: handle.thread().id(),
            handle: Some(handle),
        })
    }

    /// Whether the calling thread is this loop's thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Stops accepting tasks, runs what is queued and joins the thread.
    /// From inside the loop the thread is detached instead.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if self.is_current() {
                return;
            }
            if handle.join().is_err() {
                log::error!("message loop thread panicked");
            }
        }
    }
}

impl Executor for MessageLoop {
    fn post(&self, task: Task) -> Result<()> {
        match &self.sender {
            Some(sender) => sender.send(task).map_err(|_| DemuxError::Closed),
            None => Err(DemuxError::Closed),
        }
    }
}

impl Drop for MessageLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Queue drained by its owner, on the owner's thread.
pub struct PumpedLoop {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl Default for PumpedLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl PumpedLoop {
    /// Empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Runs every task queued so far and returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            run_task(task);
            ran += 1;
        }
        ran
    }

    /// Runs tasks as they arrive until `done` holds or `timeout` passes.
    /// Returns the final value of `done`.
    pub fn run_until<F>(&self, mut done: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(task) => run_task(task),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return done();
                }
            }
        }
    }

    /// Tasks queued and not yet run.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Executor for PumpedLoop {
    fn post(&self, task: Task) -> Result<()> {
        self.sender.send(task).map_err(|_| DemuxError::Closed)
    }
}

/// Runs tasks on one tokio task, for callers living in an async runtime.
pub struct TokioContext {
    sender: tokio::sync::mpsc::UnboundedSender<Task>,
}

impl TokioContext {
    /// Spawns the draining task on `handle`.
    pub fn new(handle: &tokio::runtime::Handle) -> Self {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = receiver.recv().await {
                run_task(task);
            }
        });
        Self { sender }
    }

    /// Context on the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| DemuxError::InvalidState(e.to_string()))?;
        Ok(Self::new(&handle))
    }
}

impl Executor for TokioContext {
    fn post(&self, task: Task) -> Result<()> {
        self.sender.send(task).map_err(|_| DemuxError::Closed)
    }
}
