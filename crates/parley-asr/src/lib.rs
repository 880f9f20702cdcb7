pub mod offline;
pub mod realtime;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsrError {
    #[error("connect failed after {0} attempts")]
    ConnectExhausted(u32),
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("vendor error: {0}")]
    Vendor(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Events delivered from the streaming transcriber to the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsrEvent {
    /// Extracted Chinese text from one vendor result message.
    Fragment(String),
    /// The vendor reported an error; the stream is closed.
    Error(String),
    /// The stream ended.
    Closed,
}

/// Pull Chinese text out of an arbitrarily nested vendor payload, in order.
///
/// Keeps CJK Unified Ideographs (U+4E00..=U+9FA5) and common Chinese
/// punctuation; everything else (markup, pinyin, confidence numbers) is
/// dropped.
pub fn extract_chinese(value: &Value) -> String {
    let mut out = String::new();
    collect_chinese(value, &mut out);
    out
}

/// Like [`extract_chinese`], but accepts raw text that may or may not be
/// JSON. Vendor `data` fields arrive as JSON-encoded strings.
pub fn extract_chinese_text(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => extract_chinese(&value),
        Err(_) => filter_chinese(raw),
    }
}

fn collect_chinese(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(&filter_chinese(s)),
        Value::Array(items) => {
            for item in items {
                collect_chinese(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_chinese(item, out);
            }
        }
        _ => {}
    }
}

fn filter_chinese(text: &str) -> String {
    text.chars()
        .filter(|&c| is_chinese_char(c))
        .collect()
}

fn is_chinese_char(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fa5}')
        || matches!(
            c,
            '，' | '。' | '！' | '？' | '、' | '；' | '：' | '（' | '）' | '“' | '”'
        )
}
