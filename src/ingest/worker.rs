//! Background extraction workers.
//!
//! Uploads are queued on a bounded crossbeam channel; a fixed number of
//! threads drain it through the [`IngestionPipeline`]. A full queue blocks
//! the uploader (backpressure) instead of growing without limit.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, info, warn};

use crate::config::IngestionConfig;
use crate::error::{GalleryDBError, Result};
use crate::types::ImageId;

use super::{panic_message, IngestionPipeline, ProcessingOutcome};

struct Job {
    id: ImageId,
    bytes: Vec<u8>,
}

/// Count of submitted jobs not yet finished.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        while *count > 0 {
            count = self.idle.wait(count).unwrap_or_else(|p| p.into_inner());
        }
    }
}

/// Decrements the in-flight count even if processing panics.
struct FinishGuard<'a>(&'a InFlight);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Processes one job. A job that errors or panics past the extractor
/// leaves its image failed, and the worker moves on to the next job.
fn run_job(pipeline: &IngestionPipeline, job: Job) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(job.id, &job.bytes)));
    let error = match result {
        Ok(Ok(ProcessingOutcome::Completed)) => {
            debug!(id = %job.id, "Ingestion completed");
            return;
        }
        Ok(Ok(outcome)) => {
            debug!(id = %job.id, ?outcome, "Ingestion finished");
            return;
        }
        Ok(Err(e)) => e.to_string(),
        Err(payload) => format!("ingestion panicked: {}", panic_message(payload.as_ref())),
    };

    warn!(id = %job.id, error = %error, "Ingestion aborted");
    if let Err(e) = pipeline.abandon(job.id, &error) {
        // Left pending; failed by recovery on next open
        warn!(id = %job.id, error = %e, "Could not record ingestion failure");
    }
}

/// Pool of extraction threads.
pub(crate) struct IngestionWorkers {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    in_flight: Arc<InFlight>,
}

impl IngestionWorkers {
    /// Spawns `config.workers` threads.
    pub(crate) fn start(pipeline: Arc<IngestionPipeline>, config: &IngestionConfig) -> Result<Self> {
        let (sender, receiver) = bounded::<Job>(config.queue_capacity);
        let in_flight = Arc::new(InFlight::default());

        let mut handles = Vec::with_capacity(config.workers);
        for n in 0..config.workers {
            let receiver = receiver.clone();
            let pipeline = Arc::clone(&pipeline);
            let in_flight = Arc::clone(&in_flight);

            let handle = thread::Builder::new()
                .name(format!("gallerydb-ingest-{}", n))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        let _finish = FinishGuard(&in_flight);
                        run_job(&pipeline, job);
                    }
                })?;
            handles.push(handle);
        }

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Ingestion workers started"
        );

        Ok(Self {
            sender: Some(sender),
            handles,
            in_flight,
        })
    }

    /// Queues an image for extraction. Blocks while the queue is full.
    pub(crate) fn submit(&self, id: ImageId, bytes: Vec<u8>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| GalleryDBError::ingestion("Ingestion workers are shut down"))?;

        self.in_flight.begin();
        if sender.send(Job { id, bytes }).is_err() {
            self.in_flight.finish();
            return Err(GalleryDBError::ingestion("Ingestion queue is closed"));
        }
        Ok(())
    }

    /// Blocks until every submitted job has finished.
    pub(crate) fn wait_idle(&self) {
        self.in_flight.wait_idle();
    }

    /// Stops accepting work, drains the queue and joins the threads.
    pub(crate) fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Ingestion worker panicked");
            }
        }
        info!("Ingestion workers stopped");
    }
}

impl Drop for IngestionWorkers {
    fn drop(&mut self) {
        self.shutdown();
    }
}
