//! Bounded handler worker pool (SPEC_FULL.md §4.7). New code: the teacher
//! has no request-handling concept, so this is grounded structurally on the
//! bounded mpsc + semaphore pattern the pack's `fafhrd91-ntex-h2`
//! dispatcher uses to bound in-flight work, adapted to a plain task-spawn
//! pool rather than a `Service` trait pipeline.

use crate::backpressure::Backpressure;
use crate::handler::{Handler, Request, RequestBody, ResponseWriter};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// One unit of admitted work: a fully-headers-decoded request ready to run
/// against the application [`Handler`].
pub struct Job {
    pub request: Request,
    pub body: RequestBody,
    pub response: ResponseWriter,
}

/// Bounded FIFO queue in front of a capacity-limited set of concurrently
/// running handler invocations. `capacity` bounds concurrency; `queue_cap`
/// bounds how much admitted-but-not-yet-running work can back up.
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
}

impl WorkerPool {
    /// Spawns the dispatch loop and `capacity` concurrent handler slots on
    /// the current Tokio runtime, returning a handle whose `try_submit`
    /// enqueues work without blocking the connection's read loop.
    #[must_use]
    pub fn spawn(handler: Arc<dyn Handler>, capacity: usize, queue_cap: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_cap);
        let semaphore = Arc::new(Semaphore::new(capacity));

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break, // semaphore closed: pool is shutting down
                };
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let _permit = permit;
                    handler.handle(job.request, job.body, job.response).await;
                });
            }
        });

        Self { tx }
    }

    /// Enqueues `job` without waiting for a worker slot. Returns the job
    /// back to the caller on a full queue so it can emit REFUSED_STREAM /
    /// ENHANCE_YOUR_CALM instead of blocking the read loop.
    pub fn try_submit(&self, job: Job) -> Result<(), Job> {
        self.tx.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(job) => job,
            mpsc::error::TrySendError::Closed(job) => job,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpack::HeaderField;
    use crate::metrics::Metrics;
    use bytes::Bytes;

    fn test_backpressure() -> Arc<Backpressure> {
        Backpressure::new(16 * 1024 * 1024, 1024 * 1024, Arc::new(Metrics::new()))
    }

    fn dummy_request() -> Request {
        Request {
            method: Bytes::from_static(b"GET"),
            scheme: Bytes::from_static(b"https"),
            authority: Bytes::from_static(b"example.test"),
            path: Bytes::from_static(b"/"),
            headers: vec![HeaderField::new(&b"x-test"[..], &b"1"[..])],
        }
    }

    #[tokio::test]
    async fn queue_full_returns_job_to_caller() {
        let handler: Arc<dyn Handler> = Arc::new(|_: Request, _: RequestBody, _: ResponseWriter| {
            Box::pin(async move {
                // Never resolves: holds its worker slot so the queue fills up.
                std::future::pending::<()>().await;
            }) as crate::handler::HandlerFuture
        });
        let pool = WorkerPool::spawn(handler, 1, 1);

        let (_body_tx, body_rx) = mpsc::channel(1);
        let (resp_tx, _resp_rx) = mpsc::channel(1);
        let job_one = Job {
            request: dummy_request(),
            body: RequestBody::new(body_rx),
            response: ResponseWriter::new(resp_tx, 1, test_backpressure()),
        };
        assert!(pool.try_submit(job_one).is_ok());

        // Give the dispatch loop a chance to pull the first job and occupy
        // the single worker slot before we try to overflow the queue.
        tokio::task::yield_now().await;

        let (_body_tx2, body_rx2) = mpsc::channel(1);
        let (resp_tx2, _resp_rx2) = mpsc::channel(1);
        let job_two = Job {
            request: dummy_request(),
            body: RequestBody::new(body_rx2),
            response: ResponseWriter::new(resp_tx2, 3, test_backpressure()),
        };
        let job_three = Job {
            request: dummy_request(),
            body: RequestBody::new(mpsc::channel(1).1),
            response: ResponseWriter::new(mpsc::channel(1).0, 5, test_backpressure()),
        };
        let _ = pool.try_submit(job_two);
        assert!(pool.try_submit(job_three).is_err());
    }
}
