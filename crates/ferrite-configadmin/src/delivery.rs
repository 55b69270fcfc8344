//! One small serialized delivery queue per tracked managed service,
//! rather than a single global pool — so `updated` calls for one PID can
//! never be reordered or interleaved by calls for another, while
//! independent PIDs proceed concurrently.
//!
//! Mirrors the shape of `ferrite_registry::dispatch::QueuedDispatcher`:
//! idle queues exit after a grace period and are respawned lazily on the
//! next enqueue.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Keyed by PID (the generated instance PID for factory configurations).
pub struct DeliveryQueues {
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>,
}

impl DeliveryQueues {
    pub fn new() -> Arc<Self> {
        Arc::new(DeliveryQueues {
            queues: Mutex::new(HashMap::new()),
        })
    }

    pub fn enqueue(&self, pid: &str, job: Job) {
        let mut job = Some(job);
        let mut queues = self.queues.lock();

        if let Some(tx) = queues.get(pid) {
            if let Err(mpsc::error::SendError(returned)) = tx.send(job.take().unwrap()) {
                job = Some(returned);
            }
        }

        if let Some(job) = job {
            let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
            tokio::spawn(async move {
                loop {
                    match tokio::time::timeout(GRACE_PERIOD, rx.recv()).await {
                        Ok(Some(job)) => job.await,
                        Ok(None) | Err(_) => break,
                    }
                }
            });
            tx.send(job).expect("freshly spawned delivery queue is alive");
            queues.insert(pid.to_string(), tx);
        }
    }

    /// Drops every queue's sender, so each worker's next `recv` sees the
    /// channel closed and exits once it has drained what was already
    /// enqueued. Used during framework shutdown, alongside a bounded wait
    /// in the caller.
    pub fn close_all(&self) {
        self.queues.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn deliveries_for_one_pid_run_in_order() {
        let queues = DeliveryQueues::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            queues.enqueue(
                "P",
                Box::pin(async move {
                    order.lock().push(i);
                }),
            );
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn different_pids_get_independent_queues() {
        let queues = DeliveryQueues::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for pid in ["A", "B"] {
            let hits = Arc::clone(&hits);
            queues.enqueue(
                pid,
                Box::pin(async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
