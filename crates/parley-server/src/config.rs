use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub asr: AsrConfig,
    #[serde(default)]
    pub offline_asr: OfflineAsrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub proctor: ProctorConfig,
    #[serde(default)]
    pub interview: InterviewConfig,
}

impl Config {
    /// Load from TOML; a missing file yields defaults so a bare binary can
    /// start for local development.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).is_file() {
            tracing::warn!(path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/parley.db?mode=rwc".into(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    16
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "generate_random_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: generate_random_secret(),
            jwt_expiry_seconds: default_jwt_expiry(),
        }
    }
}

fn default_jwt_expiry() -> u64 {
    86_400
}

fn generate_random_secret() -> String {
    let mut rng = rand::thread_rng();
    (0..64)
        .map(|_| format!("{:x}", rng.gen_range(0..16)))
        .collect()
}

/// Streaming transcription vendor. An empty endpoint disables live
/// captions; the interview then relies on manual text answers.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AsrConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OfflineAsrConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: default_llm_model(),
            request_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "qwen2.5-omni-7b".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MediaConfig {
    pub clip_dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            clip_dir: "./interview_clips".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProctorConfig {
    /// Safetensors weights for the person detector; unset disables the
    /// proctor entirely.
    pub model_path: Option<String>,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Serialize)]
pub struct InterviewConfig {
    #[serde(default = "default_plan_deadline_secs")]
    pub plan_deadline_secs: u64,
    #[serde(default = "default_question_limit")]
    pub question_limit: usize,
    #[serde(default = "default_coding_problem_limit")]
    pub coding_problem_limit: usize,
    #[serde(default)]
    pub silence_auto_advance: bool,
    #[serde(default = "default_silence_timeout_secs")]
    pub silence_timeout_secs: u64,
    #[serde(default = "default_scorer_workers")]
    pub scorer_workers: usize,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            plan_deadline_secs: default_plan_deadline_secs(),
            question_limit: default_question_limit(),
            coding_problem_limit: default_coding_problem_limit(),
            silence_auto_advance: false,
            silence_timeout_secs: default_silence_timeout_secs(),
            scorer_workers: default_scorer_workers(),
        }
    }
}

fn default_plan_deadline_secs() -> u64 {
    5
}

fn default_question_limit() -> usize {
    8
}

fn default_coding_problem_limit() -> usize {
    3
}

fn default_silence_timeout_secs() -> u64 {
    15
}

fn default_scorer_workers() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.auth.jwt_secret.len(), 64);
        assert!(!config.interview.silence_auto_advance);
        assert_eq!(config.interview.plan_deadline_secs, 5);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let raw = r#"
            [server]
            bind_address = "127.0.0.1:9000"

            [interview]
            silence_auto_advance = true
        "#;
        let config: Config = toml::from_str(raw).expect("parse");
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert!(config.interview.silence_auto_advance);
        assert_eq!(config.interview.silence_timeout_secs, 15);
        assert_eq!(config.database.max_connections, 16);
    }
}
