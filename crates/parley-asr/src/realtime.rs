use crate::{extract_chinese_text, AsrError, AsrEvent};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha1::Sha1;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const AUDIO_CHANNEL_CAPACITY: usize = 256;
const END_FRAME: &str = r#"{"end": true}"#;

#[derive(Debug, Clone)]
pub struct RealtimeAsrConfig {
    /// Vendor websocket endpoint, e.g. `wss://rtasr.example.cn/v1/ws`.
    pub endpoint: String,
    pub app_id: String,
    pub api_key: String,
    pub connect_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RealtimeAsrConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            app_id: String::new(),
            api_key: String::new(),
            connect_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Signed connection URL:
/// `<endpoint>?appid=<id>&ts=<unix>&signa=urlencode(base64(hmac_sha1(api_key, md5_hex(appid + ts))))`.
pub fn signed_url(config: &RealtimeAsrConfig, ts: i64) -> String {
    let digest = format!("{:x}", md5::compute(format!("{}{}", config.app_id, ts)));
    let mut mac = Hmac::<Sha1>::new_from_slice(config.api_key.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(digest.as_bytes());
    let signa = BASE64.encode(mac.finalize().into_bytes());
    format!(
        "{}?appid={}&ts={}&signa={}",
        config.endpoint,
        config.app_id,
        ts,
        urlencoding::encode(&signa)
    )
}

enum AudioChunk {
    Pcm(Vec<u8>),
    End,
}

/// Handle owned by the session task. Sends are buffered and never block the
/// orchestrator; dropping the handle tears the socket down.
pub struct TranscriberHandle {
    audio_tx: mpsc::Sender<AudioChunk>,
}

impl TranscriberHandle {
    /// Forward one PCM chunk. Returns false when the connector is gone or
    /// the buffer is full (both are degraded-mode conditions, not errors).
    pub fn send_audio(&self, pcm: Vec<u8>) -> bool {
        self.audio_tx.try_send(AudioChunk::Pcm(pcm)).is_ok()
    }

    /// Deliver the end-of-stream terminator.
    pub fn finish(&self) {
        let _ = self.audio_tx.try_send(AudioChunk::End);
    }
}

/// Open the vendor stream, retrying per config. On success, two background
/// tasks run until the socket closes: a writer draining the audio channel
/// and a reader delivering [`AsrEvent`]s to the session.
pub async fn connect(
    config: RealtimeAsrConfig,
    events: mpsc::UnboundedSender<AsrEvent>,
) -> Result<TranscriberHandle, AsrError> {
    let attempts = config.connect_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        let url = signed_url(&config, chrono::Utc::now().timestamp());
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                tracing::debug!(attempt, "transcription stream connected");
                let (mut writer, mut reader) = stream.split();

                let (audio_tx, mut audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);

                tokio::spawn(async move {
                    while let Some(chunk) = audio_rx.recv().await {
                        let frame = match chunk {
                            AudioChunk::Pcm(pcm) => Message::Binary(pcm.into()),
                            AudioChunk::End => Message::Text(END_FRAME.into()),
                        };
                        if writer.send(frame).await.is_err() {
                            break;
                        }
                    }
                    let _ = writer.close().await;
                });

                let reader_events = events.clone();
                tokio::spawn(async move {
                    while let Some(message) = reader.next().await {
                        match message {
                            Ok(Message::Text(text)) => {
                                if let Some(event) = parse_vendor_message(&text) {
                                    let stop = matches!(event, AsrEvent::Error(_));
                                    if reader_events.send(event).is_err() || stop {
                                        return;
                                    }
                                }
                            }
                            Ok(Message::Close(_)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                    let _ = reader_events.send(AsrEvent::Closed);
                });

                return Ok(TranscriberHandle { audio_tx });
            }
            Err(e) => {
                last_error = e.to_string();
                tracing::warn!(attempt, error = %last_error, "transcription connect failed");
                if attempt < attempts {
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }
    tracing::warn!(attempts, error = %last_error, "transcription unavailable, continuing without live captions");
    Err(AsrError::ConnectExhausted(attempts))
}

/// Map one vendor frame to an event. `action == "result"` carries a nested
/// transcription payload; `action == "error"` closes the stream. Anything
/// else (handshake acks, heartbeats) is ignored.
fn parse_vendor_message(text: &str) -> Option<AsrEvent> {
    let value: Value = serde_json::from_str(text).ok()?;
    match value.get("action").and_then(|a| a.as_str()) {
        Some("result") => {
            let data = value.get("data")?;
            let fragment = match data.as_str() {
                Some(raw) => extract_chinese_text(raw),
                None => crate::extract_chinese(data),
            };
            if fragment.is_empty() {
                None
            } else {
                Some(AsrEvent::Fragment(fragment))
            }
        }
        Some("error") => Some(AsrEvent::Error(
            value
                .get("desc")
                .and_then(|d| d.as_str())
                .unwrap_or("transcription stream error")
                .to_string(),
        )),
        _ => None,
    }
}
