use std::{
    sync::{
        mpsc::{channel, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Result};
use log::{error, info};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    sender: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

/// Single background thread running jobs in submission order.
///
/// Clones share the same thread. After [`Executor::shutdown`] every clone
/// rejects new jobs.
#[derive(Clone)]
pub struct Executor {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

impl Executor {
    pub fn new(name: &str) -> Result<Self> {
        let (sender, receiver) = channel::<Job>();
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })?;
        info!("executor {name} started");
        Ok(Self {
            name: name.to_string(),
            inner: Arc::new(Mutex::new(Inner {
                sender: Some(sender),
                thread: Some(thread),
            })),
        })
    }

    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("executor {} poisoned", self.name))?;
        match inner.sender.as_ref() {
            None => Err(anyhow!("executor {} is shut down", self.name)),
            Some(sender) => sender
                .send(Box::new(job))
                .map_err(|_| anyhow!("executor {} thread is gone", self.name)),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.sender.is_none())
            .unwrap_or(true)
    }

    /// Lets queued jobs finish, then joins the thread.
    pub fn shutdown(&self) {
        let thread = match self.inner.lock() {
            Ok(mut inner) => {
                inner.sender = None;
                inner.thread.take()
            }
            Err(_) => None,
        };
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("executor {} panicked", self.name);
            }
            info!("executor {} stopped", self.name);
        }
    }
}

/// Joins `handle` once `exited` disconnects, giving up after `timeout`.
///
/// The thread must hold the sender of `exited` until it returns. `None`
/// means the thread is still running and has been detached.
pub fn join_within<T>(
    handle: JoinHandle<T>,
    exited: &Receiver<()>,
    timeout: Duration,
) -> Option<thread::Result<T>> {
    match exited.recv_timeout(timeout) {
        Err(RecvTimeoutError::Timeout) => None,
        _ => Some(handle.join()),
    }
}
