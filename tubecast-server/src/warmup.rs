//! Best-effort pre-fetch of video metadata.
//!
//! A fixed number of workers drain a bounded queue. Jobs are detached from
//! the request that scheduled them; their failures and panics are logged and
//! go nowhere else.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::gateway::ExtractionGateway;

#[derive(Clone)]
pub struct WarmupPool {
    tx: mpsc::Sender<String>,
}

impl WarmupPool {
    /// Start `workers` workers sharing a queue of `queue_depth` pending ids
    pub fn spawn(gateway: ExtractionGateway, workers: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel::<String>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..workers.max(1) {
            let rx = rx.clone();
            let gateway = gateway.clone();
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(video_id) = next else {
                        debug!(worker, "Warmup queue closed");
                        break;
                    };
                    warm(&gateway, video_id).await;
                }
            });
        }

        Self { tx }
    }

    /// Queue a pre-fetch of `video_id`. A full queue drops the job.
    pub fn schedule(&self, video_id: &str) {
        match self.tx.try_send(video_id.to_string()) {
            Ok(()) => debug!(video_id, "Warmup scheduled"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(video_id, "Warmup queue full, skipping")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(video_id, "Warmup pool has stopped")
            }
        }
    }
}

async fn warm(gateway: &ExtractionGateway, video_id: String) {
    let gateway = gateway.clone();
    // A panicking job must not take its worker down with it
    let job = tokio::spawn(async move {
        let result = gateway.resolve_video(&video_id).await;
        (video_id, result)
    });

    match job.await {
        Ok((video_id, Ok(_))) => debug!(video_id, "Warmup finished"),
        Ok((video_id, Err(e))) => warn!(video_id, error = %e, "Warmup failed"),
        Err(e) => warn!(error = %e, "Warmup job aborted"),
    }
}
