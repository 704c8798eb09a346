//! Named background thread with a shutdown channel.

use crate::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Shutdown signal as seen from inside the worker.
pub(crate) struct Shutdown {
    receiver: Receiver<()>,
}

impl Shutdown {
    /// Sleep up to `timeout`; true once shutdown was requested.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        !matches!(
            self.receiver.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// Non-blocking check.
    pub(crate) fn requested(&self) -> bool {
        !matches!(self.receiver.try_recv(), Err(TryRecvError::Empty))
    }
}

pub(crate) struct Worker {
    name: String,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Shutdown) + Send + 'static,
    {
        let (sender, receiver) = bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(Shutdown { receiver }))?;

        tracing::debug!("Spawned worker thread '{}'", name);
        Ok(Self {
            name: name.to_string(),
            shutdown: Some(sender),
            handle: Some(handle),
        })
    }

    /// Signal shutdown and join. Idempotent.
    pub(crate) fn stop(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Worker thread '{}' panicked", self.name);
            } else {
                tracing::debug!("Joined worker thread '{}'", self.name);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_worker_runs_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut worker = Worker::spawn("test-worker", move |shutdown| {
            while !shutdown.wait(Duration::from_millis(1)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        while ticks.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        worker.stop();
        let after = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::SeqCst), after);

        worker.stop();
    }

    #[test]
    fn test_drop_joins() {
        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);
        let worker = Worker::spawn("drop-worker", move |shutdown| {
            while !shutdown.requested() {
                thread::sleep(Duration::from_millis(1));
            }
            flag.store(1, Ordering::SeqCst);
        })
        .unwrap();

        drop(worker);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
