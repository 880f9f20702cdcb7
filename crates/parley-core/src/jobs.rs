use crate::llm::LlmClient;
use crate::registry::{SessionEvent, SessionRegistry};
use crate::scorer;
use parley_asr::offline::{OfflineAsrConfig, OfflineTranscriber};
use parley_db::DbPool;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// One queued scoring unit. The answer row is already persisted before the
/// job is enqueued, so a lost job is recoverable from the database.
#[derive(Debug, Clone)]
pub struct ScoringJob {
    pub answer_id: String,
    pub clip_path: Option<String>,
    /// Session to notify when scoring lands; best-effort.
    pub session_id: Option<String>,
}

/// Producer half of the scoring queue, held in `AppState`.
#[derive(Clone)]
pub struct ScoringQueue {
    tx: mpsc::UnboundedSender<ScoringJob>,
}

impl ScoringQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScoringJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: ScoringJob) {
        if self.tx.send(job).is_err() {
            tracing::error!("scoring queue is gone; answer keeps neutral scores");
        }
    }
}

/// Spawn the scorer worker pool. Workers share the receiver and process
/// jobs until the queue closes.
pub fn spawn_workers(
    workers: usize,
    rx: mpsc::UnboundedReceiver<ScoringJob>,
    db: DbPool,
    llm: LlmClient,
    offline_asr: Option<OfflineAsrConfig>,
    registry: SessionRegistry,
) {
    let rx = Arc::new(Mutex::new(rx));
    let transcriber = offline_asr.map(|config| Arc::new(OfflineTranscriber::new(config)));
    for worker in 0..workers.max(1) {
        let rx = rx.clone();
        let db = db.clone();
        let llm = llm.clone();
        let transcriber = transcriber.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            loop {
                let job = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some(job) = job else {
                    break;
                };
                tracing::debug!(worker, answer_id = %job.answer_id, "scoring answer");
                let result = scorer::score_answer(
                    &db,
                    &llm,
                    transcriber.as_deref(),
                    &job.answer_id,
                    job.clip_path.as_deref(),
                )
                .await;
                if let Err(e) = &result {
                    tracing::warn!(answer_id = %job.answer_id, error = %e, "scoring failed");
                }
                if let Some(session_id) = &job.session_id {
                    if let Some(handle) = registry.lookup(session_id) {
                        handle.send(SessionEvent::AnswerScored {
                            answer_id: job.answer_id.clone(),
                        });
                    }
                }
            }
            tracing::debug!(worker, "scorer worker stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_delivers_jobs_in_order() {
        let (queue, mut rx) = ScoringQueue::new();
        for i in 0..3 {
            queue.enqueue(ScoringJob {
                answer_id: format!("a{i}"),
                clip_path: None,
                session_id: None,
            });
        }
        for i in 0..3 {
            let job = rx.recv().await.expect("job");
            assert_eq!(job.answer_id, format!("a{i}"));
        }
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_non_fatal() {
        let (queue, rx) = ScoringQueue::new();
        drop(rx);
        queue.enqueue(ScoringJob {
            answer_id: "a1".to_string(),
            clip_path: None,
            session_id: None,
        });
    }
}
