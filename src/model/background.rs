use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error};
use parking_lot::{Condvar, Mutex};

use crate::model::error::ModelError;

/// Shared cancellation flag handed to every background job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ModelError> {
        if self.is_cancelled() {
            Err(ModelError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

type Job = Box<dyn FnOnce(&CancelToken) -> Result<(), ModelError> + Send>;

struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

/// Fixed pool of workers running every piece of background work of one
/// campaign. Shutting it down never returns before all jobs finished or were
/// cancelled.
pub struct BackgroundJobs {
    sender: Option<Sender<(String, Job)>>,
    workers: Vec<JoinHandle<()>>,
    token: CancelToken,
    pending: Arc<Pending>,
}

impl BackgroundJobs {
    pub fn new(workers: usize) -> Result<Self, ModelError> {
        let (sender, receiver) = channel::unbounded::<(String, Job)>();
        let token = CancelToken::default();
        let pending = Arc::new(Pending {
            count: Mutex::new(0),
            idle: Condvar::new(),
        });

        let handles = (0..workers.max(1))
            .map(|i| {
                let receiver = receiver.clone();
                let token = token.clone();
                let pending = pending.clone();
                std::thread::Builder::new()
                    .name(format!("model-background-{}", i))
                    .spawn(move || work(receiver, token, pending))
                    .map_err(|e| ModelError::io("background worker", e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sender: Some(sender),
            workers: handles,
            token,
            pending,
        })
    }

    /// Queue a job. Jobs queued after cancellation are dropped.
    pub fn spawn<F>(&self, name: impl Into<String>, job: F)
    where
        F: FnOnce(&CancelToken) -> Result<(), ModelError> + Send + 'static,
    {
        let name = name.into();
        if self.token.is_cancelled() {
            debug!("not scheduling {} after cancellation", name);
            return;
        }
        let Some(sender) = &self.sender else {
            return;
        };

        *self.pending.count.lock() += 1;
        if sender.send((name, Box::new(job))).is_err() {
            finish_one(&self.pending);
        }
    }

    /// Block until every job queued so far has completed.
    pub fn wait_idle(&self) {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            self.pending.idle.wait(&mut count);
        }
    }

    pub fn pending(&self) -> usize {
        *self.pending.count.lock()
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Let all queued jobs run to completion, then stop the workers.
    pub fn join(mut self) {
        self.wait_idle();
        self.stop();
    }

    /// Cancel outstanding jobs and stop the workers. Jobs already running
    /// observe the token and must not leave partial results behind.
    pub fn cancel_and_join(mut self) {
        self.token.cancel();
        self.stop();
    }

    fn stop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for BackgroundJobs {
    fn drop(&mut self) {
        self.token.cancel();
        self.stop();
    }
}

fn work(receiver: Receiver<(String, Job)>, token: CancelToken, pending: Arc<Pending>) {
    for (name, job) in receiver.iter() {
        if token.is_cancelled() {
            debug!("skipping {} (cancelled)", name);
        } else {
            match job(&token) {
                Ok(()) => debug!("{} done", name),
                Err(ModelError::Cancelled) => debug!("{} cancelled", name),
                Err(e) => error!("{} failed: {}", name, e),
            }
        }
        finish_one(&pending);
    }
}

fn finish_one(pending: &Pending) {
    let mut count = pending.count.lock();
    *count = count.saturating_sub(1);
    if *count == 0 {
        pending.idle.notify_all();
    }
}
