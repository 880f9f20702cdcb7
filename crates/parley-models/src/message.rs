use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::problem::CodingProblemPayload;

/// Interview phase label carried on `interview_message` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseLabel {
    Intro,
    Question,
    Code,
}

/// Frames the candidate client sends over the interview socket.
///
/// Every frame is a JSON object with a string `type` discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateStream {
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
        interview_id: i64,
    },
    JoinStream {
        stream_id: String,
    },
    Offer {
        offer: Value,
        #[serde(default)]
        target_peer: Option<String>,
    },
    Answer {
        answer: Value,
        target_peer: String,
    },
    IceCandidate {
        candidate: Value,
        target_peer: String,
    },
    AudioFrame {
        #[serde(default)]
        audio_data: String,
        #[serde(default)]
        end: bool,
    },
    VideoFrame {
        frame_data: String,
        #[serde(default = "default_frame_type")]
        frame_type: String,
    },
    RequestNextQuestion {},
    AnswerCompleted {
        #[serde(default)]
        answer_text: Option<String>,
    },
    ManualAnswerText {
        text: String,
    },
    RequestNextCodingProblem {},
    SubmitCodingAnswer {
        code: String,
        language: String,
    },
    Disconnect {},
}

fn default_frame_type() -> String {
    "keyframe".to_string()
}

/// Frames the server pushes to interview clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        session_id: String,
        text: String,
    },
    StreamCreated {
        stream_id: String,
        peer_id: String,
    },
    StreamJoined {
        stream_id: String,
        title: String,
        text: String,
    },
    InterviewMessage {
        phase: PhaseLabel,
        text: String,
    },
    NextQuestion {
        question: String,
    },
    AsrResult {
        text: String,
    },
    AsrStatus {
        status: String,
        message: String,
    },
    CheatDetected {
        text: String,
    },
    CodingProblem {
        phase: PhaseLabel,
        problem: CodingProblemPayload,
    },
    CodingAnswerSubmitted {
        text: String,
    },
    ManualAnswerReceived {
        text: String,
    },
    InterviewFinished {
        text: String,
    },
    Error {
        text: String,
    },
    // Relay frames forwarded unchanged to other viewers of the same stream.
    Offer {
        offer: Value,
        peer_id: String,
    },
    Answer {
        answer: Value,
        peer_id: String,
    },
    IceCandidate {
        candidate: Value,
        peer_id: String,
    },
    VideoFrame {
        frame_data: String,
        frame_type: String,
        peer_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_round_trip_with_type_tag() {
        let raw = r#"{"type":"audio_frame","audio_data":"AAAA","end":false}"#;
        let msg: ClientMessage = serde_json::from_str(raw).expect("parse");
        assert!(matches!(msg, ClientMessage::AudioFrame { ref audio_data, end: false } if audio_data == "AAAA"));
    }

    #[test]
    fn audio_frame_end_flag_defaults_to_false() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"audio_frame","audio_data":"QQ=="}"#).expect("parse");
        assert!(matches!(msg, ClientMessage::AudioFrame { end: false, .. }));
    }

    #[test]
    fn video_frame_type_defaults_to_keyframe() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"video_frame","frame_data":"QQ=="}"#).expect("parse");
        match msg {
            ClientMessage::VideoFrame { frame_type, .. } => assert_eq!(frame_type, "keyframe"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"start_karaoke"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn server_messages_serialize_snake_case_tags() {
        let msg = ServerMessage::InterviewMessage {
            phase: PhaseLabel::Intro,
            text: "请开始自我介绍吧".to_string(),
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["type"], "interview_message");
        assert_eq!(json["phase"], "intro");
    }
}
