use crate::AsrError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha1::Sha1;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OfflineAsrConfig {
    /// Vendor base URL, e.g. `https://raasr.example.cn/v2/api`.
    pub endpoint: String,
    pub app_id: String,
    pub secret_key: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for OfflineAsrConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            app_id: String::new(),
            secret_key: String::new(),
            poll_interval: Duration::from_secs(5),
            max_polls: 60,
        }
    }
}

/// Upload-then-poll transcription for finished answer clips. Used by the
/// scorer to replace live captions with a cleaner offline transcript.
pub struct OfflineTranscriber {
    http: reqwest::Client,
    config: OfflineAsrConfig,
}

impl OfflineTranscriber {
    pub fn new(config: OfflineAsrConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn transcribe(&self, audio_path: &Path) -> Result<String, AsrError> {
        let data = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("clip.wav")
            .to_string();
        let ts = chrono::Utc::now().timestamp().to_string();
        let signa = self.signature(&ts);
        let file_size = data.len().to_string();

        let upload: Value = self
            .http
            .post(format!("{}/upload", self.config.endpoint))
            .query(&[
                ("appId", self.config.app_id.as_str()),
                ("signa", signa.as_str()),
                ("ts", ts.as_str()),
                ("fileSize", file_size.as_str()),
                ("fileName", file_name.as_str()),
                ("duration", "200"),
            ])
            .body(data)
            .send()
            .await
            .map_err(|e| AsrError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| AsrError::InvalidResponse(e.to_string()))?;

        if !response_ok(&upload) {
            return Err(AsrError::Vendor(format!("upload rejected: {upload}")));
        }
        let order_id = upload
            .pointer("/content/orderId")
            .or_else(|| upload.get("orderId"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| AsrError::InvalidResponse("missing orderId".to_string()))?
            .to_string();

        for _ in 0..self.config.max_polls {
            let result: Value = self
                .http
                .post(format!("{}/getResult", self.config.endpoint))
                .query(&[
                    ("appId", self.config.app_id.as_str()),
                    ("signa", signa.as_str()),
                    ("ts", ts.as_str()),
                    ("orderId", order_id.as_str()),
                    ("resultType", "transfer"),
                ])
                .send()
                .await
                .map_err(|e| AsrError::Http(e.to_string()))?
                .json()
                .await
                .map_err(|e| AsrError::InvalidResponse(e.to_string()))?;

            match result.pointer("/content/orderInfo/status").and_then(Value::as_i64) {
                // 3 = still transcribing.
                Some(3) => tokio::time::sleep(self.config.poll_interval).await,
                // 4 = done.
                Some(4) => {
                    let raw = result
                        .pointer("/content/orderResult")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            AsrError::InvalidResponse("missing orderResult".to_string())
                        })?;
                    return parse_order_result(raw);
                }
                other => {
                    return Err(AsrError::Vendor(format!(
                        "transcription failed with status {other:?}"
                    )))
                }
            }
        }
        Err(AsrError::Vendor("transcription timed out".to_string()))
    }

    fn signature(&self, ts: &str) -> String {
        let digest = format!("{:x}", md5::compute(format!("{}{}", self.config.app_id, ts)));
        let mut mac = Hmac::<Sha1>::new_from_slice(self.config.secret_key.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(digest.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

fn response_ok(value: &Value) -> bool {
    value.get("ok").and_then(Value::as_i64) == Some(0)
        || value.get("code").and_then(|c| c.as_str()) == Some("000000")
}

/// Flatten the vendor's best-path lattice into plain text.
///
/// `lattice2` entries carry `json_1best` inline; the older `lattice` format
/// carries it as a JSON-encoded string; the oldest format is a list of
/// `onebest` sentences.
pub fn parse_order_result(raw: &str) -> Result<String, AsrError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AsrError::InvalidResponse(format!("orderResult not json: {e}")))?;

    let mut words = Vec::new();
    match &value {
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("lattice2") {
                for item in items {
                    if let Some(best) = item.get("json_1best") {
                        collect_best_path_words(best, &mut words);
                    }
                }
            } else if let Some(Value::Array(items)) = map.get("lattice") {
                for item in items {
                    if let Some(encoded) = item.get("json_1best").and_then(|v| v.as_str()) {
                        if let Ok(best) = serde_json::from_str::<Value>(encoded) {
                            collect_best_path_words(&best, &mut words);
                        }
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if let Some(sentence) = item.get("onebest").and_then(|v| v.as_str()) {
                    words.push(sentence.to_string());
                }
            }
        }
        _ => {}
    }

    Ok(words.concat())
}

fn collect_best_path_words(best: &Value, words: &mut Vec<String>) {
    let Some(segments) = best.pointer("/st/rt").and_then(Value::as_array) else {
        return;
    };
    for segment in segments {
        let Some(ws) = segment.get("ws").and_then(Value::as_array) else {
            continue;
        };
        for w in ws {
            let Some(cw) = w.get("cw").and_then(Value::as_array) else {
                continue;
            };
            for candidate in cw {
                if let Some(word) = candidate.get("w").and_then(|v| v.as_str()) {
                    if !word.is_empty() {
                        words.push(word.to_string());
                    }
                }
            }
        }
    }
}
