use std::{
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    futures::FutureExt,
    sarah_common::panic::{capture_backtrace, panic_message},
    sarah_config::WorkerConfig,
    tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info},
};

#[cfg(feature = "metrics")]
use sarah_metrics::{counter, workers as worker_metrics};

use crate::{
    Error, Result,
    reporter::{LogReporter, Reporter, Stats},
};

/// A unit of work handed to the pool.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Non-blocking job sink shared by bots and the runner.
pub trait Worker: Send + Sync {
    /// Hand `job` to the pool without waiting.
    fn enqueue(&self, job: Job) -> Result<()>;
}

struct Queued {
    job: Job,
    /// Held until the job finishes, so a slot stays taken while it runs.
    permit: OwnedSemaphorePermit,
}

/// Pool of `worker_num` tasks draining a queue of `queue_size` jobs.
pub struct DefaultWorker {
    cancel: CancellationToken,
    tx: mpsc::Sender<Queued>,
    slots: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
}

impl std::fmt::Debug for DefaultWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultWorker")
            .field("free_slots", &self.slots.available_permits())
            .field("queued", &self.queued.load(Ordering::Relaxed))
            .finish()
    }
}

impl Worker for DefaultWorker {
    fn enqueue(&self, job: Job) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::EnqueueAfterShutdown);
        }

        let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
            #[cfg(feature = "metrics")]
            counter!(worker_metrics::JOBS_OVERFLOWED_TOTAL).increment(1);
            return Err(Error::QueueOverflow);
        };

        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.try_send(Queued { job, permit }).is_err() {
            // Every worker has already exited.
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::EnqueueAfterShutdown);
        }

        #[cfg(feature = "metrics")]
        counter!(worker_metrics::JOBS_ENQUEUED_TOTAL).increment(1);
        Ok(())
    }
}

/// Start a pool that reports queue depth through [`LogReporter`].
///
/// Must be called from within a Tokio runtime. The workers stop once
/// `cancel` fires; jobs still queued at that point are dropped.
pub fn run(cancel: CancellationToken, config: &WorkerConfig) -> Arc<DefaultWorker> {
    run_with_reporter(cancel, config, Arc::new(LogReporter))
}

/// Start a pool with a custom queue [`Reporter`].
pub fn run_with_reporter(
    cancel: CancellationToken,
    config: &WorkerConfig,
    reporter: Arc<dyn Reporter>,
) -> Arc<DefaultWorker> {
    let worker_num = config.worker_num.max(1);
    // A running job keeps its slot, so the pool admits at most one job per
    // worker plus `queue_size` waiting ones.
    let capacity = worker_num + config.queue_size;

    let (tx, rx) = mpsc::channel(capacity);
    let rx = Arc::new(Mutex::new(rx));
    let queued = Arc::new(AtomicUsize::new(0));

    for id in 0..worker_num {
        tokio::spawn(work(id, Arc::clone(&rx), cancel.clone(), Arc::clone(&queued)));
    }

    if let Some(interval) = config.supervise_interval() {
        tokio::spawn(supervise(cancel.clone(), interval, reporter, Arc::clone(&queued)));
    }

    info!(worker_num, queue_size = config.queue_size, "worker pool started");

    Arc::new(DefaultWorker {
        cancel,
        tx,
        slots: Arc::new(Semaphore::new(capacity)),
        queued,
    })
}

async fn work(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Queued>>>,
    cancel: CancellationToken,
    queued: Arc<AtomicUsize>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                () = cancel.cancelled() => None,
                next = rx.recv() => next,
            }
        };
        let Some(Queued { job, permit }) = next else {
            break;
        };
        queued.fetch_sub(1, Ordering::SeqCst);

        if let Err(payload) = AssertUnwindSafe(job).catch_unwind().await {
            error!(
                worker = id,
                panic = %panic_message(payload.as_ref()),
                backtrace = %capture_backtrace(),
                "job panicked"
            );
            #[cfg(feature = "metrics")]
            counter!(worker_metrics::JOBS_PANICKED_TOTAL).increment(1);
        }
        drop(permit);
    }
    debug!(worker = id, "worker stopped");
}

async fn supervise(
    cancel: CancellationToken,
    interval: Duration,
    reporter: Arc<dyn Reporter>,
    queued: Arc<AtomicUsize>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                reporter
                    .report(Stats {
                        queue_size: queued.load(Ordering::SeqCst),
                    })
                    .await;
            },
        }
    }
}
