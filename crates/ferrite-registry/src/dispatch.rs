//! Framework-wide queued event delivery.
//!
//! Listeners that asked for queued (rather than synchronous) delivery run
//! on a single background thread per framework instance, serialized in
//! enqueue order. The thread exits once the queue has sat idle past a
//! grace period and is respawned lazily on the next enqueue, per the
//! cancellation/timeout rules in the concurrency model.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send + 'static>;

const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// A single ordered background worker. Listener dispatch jobs posted here
/// run strictly in the order they were enqueued.
pub struct QueuedDispatcher {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
}

impl QueuedDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(QueuedDispatcher {
            sender: Mutex::new(None),
        })
    }

    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        let mut job: Option<Job> = Some(Box::new(job));
        let mut guard = self.sender.lock();

        if let Some(tx) = guard.as_ref() {
            if let Err(mpsc::SendError(returned)) = tx.send(job.take().unwrap()) {
                job = Some(returned);
            }
        }

        if let Some(job) = job {
            let (tx, rx) = mpsc::channel::<Job>();
            thread::Builder::new()
                .name("ferrite-queued-dispatch".into())
                .spawn(move || loop {
                    match rx.recv_timeout(GRACE_PERIOD) {
                        Ok(job) => job(),
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                })
                .expect("failed to spawn queued dispatch thread");
            tx.send(job).expect("freshly spawned dispatch thread is alive");
            *guard = Some(tx);
        }
    }

    /// Drains any pending work within `timeout`, used during framework
    /// shutdown. Stragglers beyond the deadline are abandoned: the
    /// framework proceeds with teardown regardless.
    pub fn drain(&self, timeout: Duration) {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        self.enqueue(move || {
            let _ = done_tx.send(());
        });
        let _ = done_rx.recv_timeout(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn jobs_run_in_enqueue_order() {
        let dispatcher = QueuedDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            dispatcher.enqueue(move || order.lock().push(i));
        }
        dispatcher.drain(Duration::from_secs(2));
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn drain_waits_for_pending_job() {
        let dispatcher = QueuedDispatcher::new();
        let flag = Arc::new(AtomicUsize::new(0));
        let flag_clone = Arc::clone(&flag);
        dispatcher.enqueue(move || {
            flag_clone.store(1, Ordering::SeqCst);
        });
        dispatcher.drain(Duration::from_secs(2));
        assert_eq!(flag.load(Ordering::SeqCst), 1);
    }
}
