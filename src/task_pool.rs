//! Single-writer management queue: schema/index/filter/aggregate/trigger
//! mutations are submitted here and run one at a time on a dedicated
//! thread, so they serialize without taking a lock that ingest or queries
//! would ever wait on. Grounded on `rpglot-web/src/background.rs`'s
//! background-task-with-channel shape, reimplemented over
//! `std::sync::mpsc` plus one worker thread — this engine is synchronous
//! by design, unlike an async web-serving layer, so there's no tokio here.

use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single-writer queue of boxed closures, executed strictly in submission
/// order. `submit` blocks the caller until its closure has run and returns
/// its result — "the waiter blocks, but ingest and queries do not" (spec.md §5).
pub struct TaskPool {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl TaskPool {
    pub fn new() -> TaskPool {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = std::thread::Builder::new()
            .name("confluo-management".into())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })
            .expect("failed to spawn management thread");
        TaskPool { sender: Some(sender), handle: Some(handle) }
    }

    pub fn submit<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<T>();
        let job: Job = Box::new(move || {
            let _ = tx.send(f());
        });
        self.sender
            .as_ref()
            .expect("management thread sender dropped before TaskPool")
            .send(job)
            .expect("management thread panicked or exited early");
        rx.recv().expect("management thread dropped without sending a result")
    }
}

impl Default for TaskPool {
    fn default() -> TaskPool {
        TaskPool::new()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Drop the sender first so the worker's `for job in receiver` loop
        // terminates; only then join, or this would deadlock.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
