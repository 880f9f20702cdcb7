pub mod auth;
pub mod coding;
pub mod error;
pub mod evaluator;
pub mod jobs;
pub mod llm;
pub mod planner;
pub mod registry;
pub mod scorer;
pub mod streams;

use parley_asr::offline::OfflineAsrConfig;
use parley_asr::realtime::RealtimeAsrConfig;
use parley_db::DbPool;
use parley_media::clip::ClipMuxer;
use parley_media::proctor::Proctor;
use std::sync::Arc;

/// Runtime settings shared by the API, the gateway, and the scorer workers.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    /// Root directory for per-question media clips.
    pub clip_dir: String,
    /// Hard deadline for the question planner at session/interview start.
    pub plan_deadline_secs: u64,
    /// Target number of planned interview questions.
    pub question_limit: usize,
    /// Number of coding problems presented in the CODE phase.
    pub coding_problem_limit: usize,
    /// Auto-advance on prolonged silence. Off by default: candidates signal
    /// completion explicitly.
    pub silence_auto_advance: bool,
    pub silence_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_expiry_seconds: 86_400,
            clip_dir: "./interview_clips".to_string(),
            plan_deadline_secs: 5,
            question_limit: 8,
            coding_problem_limit: 3,
            silence_auto_advance: false,
            silence_timeout_secs: 15,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    /// Live sessions, keyed by session id.
    pub registry: registry::SessionRegistry,
    /// Stream groups for observer fan-out and signalling relay.
    pub streams: streams::StreamHub,
    pub llm: llm::LlmClient,
    pub proctor: Arc<Proctor>,
    pub muxer: Arc<ClipMuxer>,
    pub scoring: jobs::ScoringQueue,
    pub asr: RealtimeAsrConfig,
    /// Offline re-transcription for finished clips; `None` disables it.
    pub offline_asr: Option<OfflineAsrConfig>,
}
