use dashmap::DashMap;
use parley_asr::AsrEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events delivered into a session's inbound queue by sources other than
/// the client socket: the transcription connector, the proctor, and scorer
/// workers.
pub enum SessionEvent {
    Asr(AsrEvent),
    /// The transcription connector finished connecting (or gave up).
    AsrReady(Option<parley_asr::realtime::TranscriberHandle>),
    /// Per-frame proctor verdict.
    Proctor(parley_media::proctor::ProctorVerdict),
    /// A scorer worker finished an answer. Informational.
    AnswerScored { answer_id: String },
}

#[derive(Clone)]
pub struct SessionHandle {
    pub interview_id: i64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Thread-safe registry of live sessions keyed by session id. Entries are
/// short-lived; scorer callbacks treat a missing entry as best-effort.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        session_id: impl Into<String>,
        interview_id: i64,
        tx: mpsc::UnboundedSender<SessionEvent>,
    ) {
        self.sessions
            .insert(session_id.into(), SessionHandle { interview_id, tx });
    }

    pub fn lookup(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|h| h.value().clone())
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_lookup_remove() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("s1", 42, tx);

        let handle = registry.lookup("s1").expect("registered");
        assert_eq!(handle.interview_id, 42);
        assert!(handle.send(SessionEvent::AnswerScored {
            answer_id: "a1".to_string()
        }));
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionEvent::AnswerScored { .. })
        ));

        registry.remove("s1");
        assert!(registry.lookup("s1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn send_to_dead_session_reports_failure() {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("s1", 1, tx);
        drop(rx);
        let handle = registry.lookup("s1").expect("registered");
        assert!(!handle.send(SessionEvent::AnswerScored {
            answer_id: "a1".to_string()
        }));
    }
}
