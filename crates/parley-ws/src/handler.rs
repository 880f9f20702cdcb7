use crate::session::{contains_completion_phrase, CurrentQuestion, InterviewSession, Phase};
use axum::extract::ws::{Message, WebSocket};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures_util::{SinkExt, StreamExt};
use parley_asr::AsrEvent;
use parley_core::jobs::ScoringJob;
use parley_core::registry::SessionEvent;
use parley_core::{coding, planner, AppState};
use parley_db::coding::CodingProblemRow;
use parley_db::{answers, coding as coding_db, interviews, resumes};
use parley_media::proctor::ProctorVerdict;
use parley_models::interview::{PositionType, ResumeProfile};
use parley_models::message::{ClientMessage, PhaseLabel, ServerMessage};
use parley_models::problem::{CodingExampleData, CodingProblemPayload, Difficulty};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const INTRO_PROMPT: &str = "请开始自我介绍吧";
const INTRO_DONE: &str = "自我介绍结束，下面开始问问题。";
const CODE_PHASE_PROMPT: &str = "问答环节结束，下面进入代码题环节。";
const FINISHED_TEXT: &str = "面试已结束，感谢参与！";
const NO_MORE_QUESTIONS: &str = "已无更多问题";
const EMPTY_ANSWER_PLACEHOLDER: &str = "（未作答）";

pub async fn handle_connection(socket: WebSocket, state: AppState, user_id: i64) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // All outbound frames funnel through one writer task so stream-relay
    // fan-in and the orchestrator share a single ordered lane.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "outbound frame failed to serialize"),
            }
        }
        let _ = ws_sender.close().await;
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let mut orchestrator = Orchestrator::new(state, user_id, out_tx, event_tx);
    orchestrator.send(ServerMessage::ConnectionEstablished {
        session_id: orchestrator.session.session_id.clone(),
        text: "面试连接已建立".to_string(),
    });
    tracing::info!(
        session_id = %orchestrator.session.session_id,
        user_id,
        "interview session connected"
    );

    loop {
        let silence_deadline = orchestrator.silence_deadline;
        let keep_running = tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => orchestrator.handle_client_text(&text).await,
                Some(Ok(Message::Close(_))) | None => false,
                Some(Ok(_)) => true,
                Some(Err(e)) => {
                    tracing::info!(error = %e, "websocket receive error");
                    false
                }
            },
            event = event_rx.recv() => match event {
                Some(event) => orchestrator.handle_session_event(event).await,
                None => true,
            },
            () = sleep_until_or_forever(silence_deadline) => {
                orchestrator.handle_silence().await
            }
        };
        if !keep_running {
            break;
        }
    }

    orchestrator.teardown();
    // Dropping the orchestrator closes the outbound lane; the writer then
    // drains any final frames (e.g. interview_finished) and closes the socket.
    drop(orchestrator);
    let _ = writer.await;
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Orchestrator {
    state: AppState,
    session: InterviewSession,
    out: mpsc::UnboundedSender<ServerMessage>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    transcriber: Option<parley_asr::realtime::TranscriberHandle>,
    resume: ResumeProfile,
    silence_deadline: Option<Instant>,
}

impl Orchestrator {
    fn new(
        state: AppState,
        user_id: i64,
        out: mpsc::UnboundedSender<ServerMessage>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            state,
            session: InterviewSession::new(user_id),
            out,
            event_tx,
            transcriber: None,
            resume: ResumeProfile::default(),
            silence_deadline: None,
        }
    }

    fn send(&self, message: ServerMessage) {
        let _ = self.out.send(message);
    }

    fn send_error(&self, text: impl Into<String>) {
        self.send(ServerMessage::Error { text: text.into() });
    }

    /// Arm the silence timer when the policy allows auto-advance; reset on
    /// every transcription fragment.
    fn arm_silence_timer(&mut self) {
        if self.state.config.silence_auto_advance {
            self.silence_deadline = Some(
                Instant::now() + Duration::from_secs(self.state.config.silence_timeout_secs),
            );
        }
    }

    fn disarm_silence_timer(&mut self) {
        self.silence_deadline = None;
    }

    async fn handle_client_text(&mut self, text: &str) -> bool {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => {
                self.send_error("无效的JSON格式");
                return true;
            }
        };
        let message: ClientMessage = match serde_json::from_value(value.clone()) {
            Ok(message) => message,
            Err(_) => {
                let kind = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("<missing>");
                self.send_error(format!("未知或格式错误的消息类型: {kind}"));
                return true;
            }
        };
        self.handle_client_message(message).await
    }

    async fn handle_client_message(&mut self, message: ClientMessage) -> bool {
        match message {
            ClientMessage::CreateStream {
                title,
                interview_id,
                ..
            } => self.handle_create_stream(title, interview_id).await,
            ClientMessage::JoinStream { stream_id } => {
                self.handle_join_stream(&stream_id);
                true
            }
            ClientMessage::Offer { offer, target_peer } => {
                self.relay(target_peer.as_deref(), |peer_id| ServerMessage::Offer {
                    offer,
                    peer_id,
                });
                true
            }
            ClientMessage::Answer {
                answer,
                target_peer,
            } => {
                self.relay(Some(&target_peer), |peer_id| ServerMessage::Answer {
                    answer,
                    peer_id,
                });
                true
            }
            ClientMessage::IceCandidate {
                candidate,
                target_peer,
            } => {
                self.relay(Some(&target_peer), |peer_id| ServerMessage::IceCandidate {
                    candidate,
                    peer_id,
                });
                true
            }
            ClientMessage::AudioFrame { audio_data, end } => {
                self.handle_audio_frame(&audio_data, end);
                true
            }
            ClientMessage::VideoFrame {
                frame_data,
                frame_type,
            } => {
                self.handle_video_frame(frame_data, frame_type);
                true
            }
            ClientMessage::RequestNextQuestion {} => self.handle_request_next_question().await,
            ClientMessage::AnswerCompleted { answer_text } => {
                self.handle_answer_completed(answer_text).await
            }
            ClientMessage::ManualAnswerText { text } => {
                self.handle_manual_answer_text(text);
                true
            }
            ClientMessage::RequestNextCodingProblem {} => self.advance_coding_problem().await,
            ClientMessage::SubmitCodingAnswer { code, language } => {
                self.handle_submit_coding_answer(&code, &language).await;
                true
            }
            ClientMessage::Disconnect {} => false,
        }
    }

    // ── Session setup ─────────────────────────────────────────────────────

    async fn handle_create_stream(&mut self, title: String, interview_id: i64) -> bool {
        if self.session.started() {
            self.send_error("面试会话已创建");
            return true;
        }

        let interview = match interviews::get_interview(&self.state.db, interview_id).await {
            Ok(Some(interview)) => interview,
            Ok(None) => {
                self.send_error("面试记录不存在");
                return false;
            }
            Err(e) => {
                tracing::error!(interview_id, error = %e, "interview lookup failed");
                self.send_error("初始化失败，请稍后重试");
                return false;
            }
        };
        if interview.user_id != self.session.user_id {
            // Ownership failures close the session outright.
            self.send_error("无权访问该面试");
            return false;
        }

        self.session.interview_id = Some(interview.id);
        self.session.position_type = PositionType::parse(&interview.position_type);

        if let Some(resume_id) = interview.resume_id {
            match resumes::get_user_resume(&self.state.db, resume_id, self.session.user_id).await {
                Ok(Some(row)) => self.resume = row.profile,
                Ok(None) => {
                    self.send_error("关联简历不存在或不属于当前用户");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(resume_id, error = %e, "resume lookup failed, planning without it");
                }
            }
        }

        // Re-plan only when the stored queue is empty, under a hard deadline.
        let mut queue = interview.question_queue.clone();
        if queue.is_empty() {
            let position = planner::PositionContext {
                position_type: self.session.position_type,
                position_name: interview.position_name.clone(),
                company_name: interview.company_name.clone(),
                description: interview.position_description.clone(),
            };
            queue = planner::plan_questions(
                &self.state.llm,
                Duration::from_secs(self.state.config.plan_deadline_secs),
                self.state.config.question_limit,
                &position,
                &self.resume,
            )
            .await;
            if let Err(e) = interviews::set_question_queue(&self.state.db, interview.id, &queue).await
            {
                tracing::warn!(interview_id, error = %e, "failed to persist planned questions");
            }
        }
        self.session.question_queue = queue;

        let stream_id = uuid::Uuid::new_v4().to_string();
        self.state.streams.create(
            stream_id.clone(),
            title,
            self.session.peer_id.clone(),
            self.out.clone(),
        );
        self.session.stream_id = Some(stream_id.clone());

        self.state.registry.register(
            self.session.session_id.clone(),
            interview.id,
            self.event_tx.clone(),
        );

        self.spawn_transcription_connector();

        self.send(ServerMessage::StreamCreated {
            stream_id,
            peer_id: self.session.peer_id.clone(),
        });
        self.send(ServerMessage::InterviewMessage {
            phase: PhaseLabel::Intro,
            text: INTRO_PROMPT.to_string(),
        });
        self.session.current = Some(CurrentQuestion::intro(planner::default_knowledge_points(
            self.session.position_type,
        )));
        self.arm_silence_timer();
        true
    }

    /// Connect to the transcription vendor in the background; the session
    /// continues captionless until (and unless) the connector reports in.
    fn spawn_transcription_connector(&self) {
        let event_tx = self.event_tx.clone();
        if self.state.asr.endpoint.is_empty() {
            let _ = event_tx.send(SessionEvent::AsrReady(None));
            return;
        }
        let (asr_tx, mut asr_rx) = mpsc::unbounded_channel::<AsrEvent>();
        let forward_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = asr_rx.recv().await {
                if forward_tx.send(SessionEvent::Asr(event)).is_err() {
                    break;
                }
            }
        });
        let config = self.state.asr.clone();
        tokio::spawn(async move {
            let handle = parley_asr::realtime::connect(config, asr_tx).await.ok();
            let _ = event_tx.send(SessionEvent::AsrReady(handle));
        });
    }

    fn handle_join_stream(&mut self, stream_id: &str) {
        match self
            .state
            .streams
            .join(stream_id, self.session.peer_id.clone(), self.out.clone())
        {
            Some(title) => {
                self.session.stream_id = Some(stream_id.to_string());
                self.send(ServerMessage::StreamJoined {
                    stream_id: stream_id.to_string(),
                    title,
                    text: "成功加入视频流".to_string(),
                });
            }
            None => self.send_error("视频流不存在"),
        }
    }

    /// Relay a signalling frame to the stream group or one targeted peer.
    fn relay<F>(&self, target_peer: Option<&str>, build: F)
    where
        F: FnOnce(String) -> ServerMessage,
    {
        let Some(stream_id) = self.session.stream_id.clone() else {
            self.send_error("尚未加入视频流");
            return;
        };
        let message = build(self.session.peer_id.clone());
        match target_peer {
            Some(peer) => {
                if !self.state.streams.send_to_peer(&stream_id, peer, message) {
                    self.send_error("目标peer不存在");
                }
            }
            None => {
                self.state
                    .streams
                    .broadcast_except(&stream_id, &self.session.peer_id, &message);
            }
        }
    }

    // ── Media ingress ─────────────────────────────────────────────────────

    fn handle_audio_frame(&mut self, audio_data: &str, end: bool) {
        if !self.session.started() {
            self.send_error("未初始化面试，请先创建会话");
            return;
        }
        if end {
            if let Some(transcriber) = &self.transcriber {
                transcriber.finish();
            }
            return;
        }
        if audio_data.is_empty() {
            self.send_error("缺少音频数据");
            return;
        }
        let pcm = match BASE64.decode(audio_data) {
            Ok(pcm) => pcm,
            Err(_) => {
                self.send_error("音频数据不是有效的base64");
                return;
            }
        };
        if let Some(transcriber) = &self.transcriber {
            // Buffered send; a full lane drops the chunk from captions only.
            transcriber.send_audio(pcm.clone());
        }
        self.session.buffers.push_audio(pcm);
    }

    fn handle_video_frame(&mut self, frame_data: String, frame_type: String) {
        if !self.session.started() {
            self.send_error("未初始化面试，请先创建会话");
            return;
        }
        // Browsers send data-URL framed captures; strip to the raw base64.
        let raw = frame_data
            .rsplit_once("base64,")
            .map(|(_, b64)| b64)
            .unwrap_or(frame_data.as_str());
        let jpeg = match BASE64.decode(raw) {
            Ok(jpeg) => jpeg,
            Err(_) => {
                self.send_error("帧数据不是有效的base64");
                return;
            }
        };
        if !jpeg.starts_with(&[0xFF, 0xD8]) {
            self.send_error("无法解码图像数据");
            return;
        }

        if self.state.proctor.enabled() {
            let proctor = self.state.proctor.clone();
            let event_tx = self.event_tx.clone();
            let frame = jpeg.clone();
            tokio::task::spawn_blocking(move || {
                let verdict = proctor.inspect(&frame);
                let _ = event_tx.send(SessionEvent::Proctor(verdict));
            });
        }

        self.session.buffers.push_frame(jpeg);

        if let Some(stream_id) = self.session.stream_id.clone() {
            self.state.streams.broadcast_except(
                &stream_id,
                &self.session.peer_id,
                &ServerMessage::VideoFrame {
                    frame_data: raw.to_string(),
                    frame_type,
                    peer_id: self.session.peer_id.clone(),
                },
            );
        }
    }

    // ── Inbound queue events ──────────────────────────────────────────────

    async fn handle_session_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::AsrReady(handle) => {
                let connected = handle.is_some();
                self.transcriber = handle;
                self.send(ServerMessage::AsrStatus {
                    status: if connected { "connected" } else { "failed" }.to_string(),
                    message: if connected {
                        "实时转写已就绪".to_string()
                    } else {
                        "实时转写不可用，可使用文字作答".to_string()
                    },
                });
                true
            }
            SessionEvent::Asr(AsrEvent::Fragment(text)) => self.handle_asr_fragment(text).await,
            SessionEvent::Asr(AsrEvent::Error(message)) => {
                tracing::warn!(session_id = %self.session.session_id, %message, "transcription stream error");
                self.transcriber = None;
                self.send(ServerMessage::AsrStatus {
                    status: "failed".to_string(),
                    message,
                });
                true
            }
            SessionEvent::Asr(AsrEvent::Closed) => {
                self.transcriber = None;
                true
            }
            SessionEvent::Proctor(verdict) => {
                match verdict {
                    ProctorVerdict::MultiplePersons(count) => {
                        tracing::info!(
                            session_id = %self.session.session_id,
                            count,
                            "multiple persons in frame"
                        );
                        self.send(ServerMessage::CheatDetected {
                            text: "检测到画面中有多人，疑似作弊！".to_string(),
                        });
                    }
                    ProctorVerdict::DecodeError => self.send_error("无法解码图像数据"),
                    ProctorVerdict::Clear | ProctorVerdict::Disabled => {}
                }
                true
            }
            SessionEvent::AnswerScored { answer_id } => {
                tracing::debug!(session_id = %self.session.session_id, answer_id, "answer scored");
                true
            }
        }
    }

    async fn handle_asr_fragment(&mut self, text: String) -> bool {
        self.arm_silence_timer();
        if let Some(current) = self.session.current.as_mut() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                current.sentences.push(trimmed.to_string());
            }
        }
        self.send(ServerMessage::AsrResult { text: text.clone() });

        if contains_completion_phrase(&text) {
            return self.complete_current_answer().await;
        }
        true
    }

    async fn handle_silence(&mut self) -> bool {
        self.disarm_silence_timer();
        tracing::debug!(session_id = %self.session.session_id, "silence timeout, auto-advancing");
        match self.session.phase {
            Phase::Intro | Phase::Question => self.complete_current_answer().await,
            Phase::Code | Phase::Finished => true,
        }
    }

    // ── Answer lifecycle ──────────────────────────────────────────────────

    async fn handle_answer_completed(&mut self, answer_text: Option<String>) -> bool {
        match self.session.phase {
            Phase::Intro | Phase::Question => {
                if let (Some(text), Some(current)) =
                    (answer_text, self.session.current.as_mut())
                {
                    if !text.trim().is_empty() {
                        // Explicit final text wins over accumulated fragments.
                        current.sentences = vec![text.trim().to_string()];
                    }
                }
                self.complete_current_answer().await
            }
            Phase::Code => self.advance_coding_problem().await,
            Phase::Finished => true,
        }
    }

    fn handle_manual_answer_text(&mut self, text: String) {
        let Some(current) = self.session.current.as_mut() else {
            self.send_error("当前没有进行中的问题");
            return;
        };
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            current.sentences.push(trimmed.to_string());
        }
        self.send(ServerMessage::ManualAnswerReceived {
            text: "已记录文字回答".to_string(),
        });
    }

    /// Shared completion path for `answer_completed`, the completion phrase,
    /// and the silence policy.
    async fn complete_current_answer(&mut self) -> bool {
        match self.session.phase {
            Phase::Intro => {
                self.flush_current_answer().await;
                self.session.advance_phase(Phase::Question);
                self.send(ServerMessage::InterviewMessage {
                    phase: self.session.phase.label(),
                    text: INTRO_DONE.to_string(),
                });
                self.advance_question().await
            }
            Phase::Question => {
                self.flush_current_answer().await;
                self.advance_question().await
            }
            Phase::Code | Phase::Finished => true,
        }
    }

    /// Flush-and-advance step 1–5: persist the answer, finalise the clip,
    /// schedule scoring, clear per-question state. Failures surface to the
    /// client but never trap the candidate in the current question.
    async fn flush_current_answer(&mut self) {
        self.disarm_silence_timer();
        let Some(current) = self.session.current.take() else {
            return;
        };
        let Some(interview_id) = self.session.interview_id else {
            return;
        };

        let answer_text = if current.sentences.is_empty() {
            EMPTY_ANSWER_PLACEHOLDER.to_string()
        } else {
            current.sentences.join("\n")
        };
        let answer_id = uuid::Uuid::new_v4().to_string();
        let inserted = match answers::create_answer(
            &self.state.db,
            &answer_id,
            interview_id,
            current.index,
            &current.text,
            &answer_text,
            &current.knowledge_points,
        )
        .await
        {
            Ok(inserted) => inserted,
            Err(e) => {
                tracing::error!(
                    interview_id,
                    question_index = current.index,
                    error = %e,
                    "answer write failed"
                );
                self.send_error("保存答案失败，面试将继续");
                false
            }
        };

        let snapshot = self.session.buffers.take();
        let clip_path = match self
            .state
            .muxer
            .finalize(&self.session.session_id, current.index as usize, snapshot)
            .await
        {
            Ok(artifacts) => artifacts
                .best_path()
                .map(|p| p.to_string_lossy().into_owned()),
            Err(e) => {
                tracing::warn!(error = %e, "clip finalization failed");
                None
            }
        };

        if inserted {
            if let Some(path) = &clip_path {
                if let Err(e) = answers::set_clip_path(&self.state.db, &answer_id, path).await {
                    tracing::warn!(answer_id, error = %e, "clip path update failed");
                }
            }
            // Insert and enqueue happen back to back on this task, so a
            // worker can never observe the job before the row.
            self.state.scoring.enqueue(ScoringJob {
                answer_id,
                clip_path,
                session_id: Some(self.session.session_id.clone()),
            });
        }
    }

    async fn advance_question(&mut self) -> bool {
        if self.session.questions_remaining() {
            if let Some(current) = self.session.begin_next_question() {
                let text = current.text.clone();
                self.send(ServerMessage::InterviewMessage {
                    phase: self.session.phase.label(),
                    text,
                });
            }
            self.arm_silence_timer();
            true
        } else {
            self.enter_code_phase().await
        }
    }

    async fn handle_request_next_question(&mut self) -> bool {
        if !self.session.started() {
            self.send_error("未初始化面试，请先创建会话");
            return true;
        }
        match self.session.phase {
            Phase::Intro | Phase::Question => {
                // Explicit skip: nothing is persisted for the current question.
                self.session.discard_current();
                self.session.advance_phase(Phase::Question);
                if self.session.questions_remaining() {
                    if let Some(current) = self.session.begin_next_question() {
                        let question = current.text.clone();
                        self.send(ServerMessage::NextQuestion { question });
                    }
                    self.arm_silence_timer();
                    true
                } else {
                    self.send(ServerMessage::NextQuestion {
                        question: NO_MORE_QUESTIONS.to_string(),
                    });
                    self.enter_code_phase().await
                }
            }
            Phase::Code | Phase::Finished => {
                self.send(ServerMessage::NextQuestion {
                    question: NO_MORE_QUESTIONS.to_string(),
                });
                true
            }
        }
    }

    // ── CODE phase ────────────────────────────────────────────────────────

    async fn enter_code_phase(&mut self) -> bool {
        self.disarm_silence_timer();
        self.session.advance_phase(Phase::Code);
        self.send(ServerMessage::InterviewMessage {
            phase: self.session.phase.label(),
            text: CODE_PHASE_PROMPT.to_string(),
        });

        let problems = match coding_db::all_problems(&self.state.db).await {
            Ok(problems) => problems,
            Err(e) => {
                tracing::error!(error = %e, "coding problem load failed");
                Vec::new()
            }
        };
        self.session.coding_problems = coding::select_problems(
            problems,
            self.session.position_type,
            &self.resume,
            self.state.config.coding_problem_limit,
        );
        self.session.coding_idx = 0;

        if self.session.coding_problems.is_empty() {
            return self.finish_interview().await;
        }
        self.send_current_coding_problem().await;
        true
    }

    async fn send_current_coding_problem(&mut self) {
        let Some(problem) = self.session.current_coding_problem().cloned() else {
            return;
        };
        let example = match coding_db::list_examples(&self.state.db, problem.id).await {
            Ok(examples) => examples.into_iter().next().map(|e| CodingExampleData {
                input_data: e.input_data,
                output_data: e.output_data,
                explanation: e.explanation,
            }),
            Err(e) => {
                tracing::warn!(problem_id = problem.id, error = %e, "example load failed");
                None
            }
        };
        self.send(ServerMessage::CodingProblem {
            phase: PhaseLabel::Code,
            problem: problem_payload(&problem, example),
        });
    }

    async fn advance_coding_problem(&mut self) -> bool {
        if self.session.phase != Phase::Code {
            self.send_error("当前不在代码题环节");
            return true;
        }
        self.session.coding_idx += 1;
        if self.session.current_coding_problem().is_some() {
            self.send_current_coding_problem().await;
            true
        } else {
            self.finish_interview().await
        }
    }

    async fn handle_submit_coding_answer(&mut self, code: &str, language: &str) {
        if self.session.phase != Phase::Code {
            self.send_error("当前不在代码题环节");
            return;
        }
        let (Some(interview_id), Some(problem)) = (
            self.session.interview_id,
            self.session.current_coding_problem(),
        ) else {
            self.send_error("当前没有进行中的代码题");
            return;
        };
        let id = uuid::Uuid::new_v4().to_string();
        match coding_db::create_coding_answer(
            &self.state.db,
            &id,
            interview_id,
            problem.id,
            code,
            language,
        )
        .await
        {
            Ok(true) => self.send(ServerMessage::CodingAnswerSubmitted {
                text: "代码答案已提交".to_string(),
            }),
            Ok(false) => self.send(ServerMessage::CodingAnswerSubmitted {
                text: "该题已提交过，保留首次答案".to_string(),
            }),
            Err(e) => {
                tracing::error!(interview_id, problem_id = problem.id, error = %e, "coding answer write failed");
                self.send_error("保存代码答案失败");
            }
        }
    }

    async fn finish_interview(&mut self) -> bool {
        self.session.advance_phase(Phase::Finished);
        if let Some(interview_id) = self.session.interview_id {
            if let Err(e) = interviews::mark_completed(&self.state.db, interview_id).await {
                tracing::warn!(interview_id, error = %e, "failed to mark interview completed");
            }
        }
        self.send(ServerMessage::InterviewFinished {
            text: FINISHED_TEXT.to_string(),
        });
        tracing::info!(
            session_id = %self.session.session_id,
            interview_id = ?self.session.interview_id,
            "interview finished"
        );
        false
    }

    /// Session teardown: deregister, leave the stream group, drop the
    /// transcriber (closing its socket). Unflushed answers are discarded.
    fn teardown(&mut self) {
        self.state.registry.remove(&self.session.session_id);
        if let Some(stream_id) = &self.session.stream_id {
            self.state.streams.leave(stream_id, &self.session.peer_id);
        }
        self.transcriber = None;
        tracing::info!(
            session_id = %self.session.session_id,
            user_id = self.session.user_id,
            "interview session closed"
        );
    }
}

fn problem_payload(
    problem: &CodingProblemRow,
    example: Option<CodingExampleData>,
) -> CodingProblemPayload {
    CodingProblemPayload {
        id: problem.id,
        number: problem.number.clone(),
        title: problem.title.clone(),
        description: problem.description.clone(),
        difficulty: Difficulty::parse(&problem.difficulty),
        tags: problem.tags.clone(),
        example,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::jobs::ScoringQueue;
    use parley_core::llm::{LlmClient, LlmConfig};
    use parley_media::clip::ClipMuxer;
    use parley_media::proctor::Proctor;
    use parley_models::interview::{PlannedQuestion, ResumeProfile};
    use std::sync::Arc;

    struct Harness {
        orchestrator: Orchestrator,
        out_rx: mpsc::UnboundedReceiver<ServerMessage>,
        scoring_rx: mpsc::UnboundedReceiver<ScoringJob>,
        db: parley_db::DbPool,
        interview_id: i64,
        _clip_dir: tempfile::TempDir,
    }

    impl Harness {
        async fn new(questions: &[&str]) -> Self {
            let db = parley_db::create_pool("sqlite::memory:", 1)
                .await
                .expect("pool");
            parley_db::run_migrations(&db).await.expect("migrations");

            let resume_id = parley_db::resumes::create_resume(&db, 1, &ResumeProfile::default())
                .await
                .expect("resume");
            let interview = parley_db::interviews::create_interview(
                &db,
                1,
                Some(resume_id),
                chrono::Utc::now(),
                "后端开发工程师",
                "示例科技",
                "负责服务端开发",
                "backend",
            )
            .await
            .expect("interview");
            let queue: Vec<PlannedQuestion> = questions
                .iter()
                .map(|q| PlannedQuestion {
                    question: q.to_string(),
                    knowledge_points: vec!["基础".to_string()],
                })
                .collect();
            parley_db::interviews::set_question_queue(&db, interview.id, &queue)
                .await
                .expect("queue");

            let clip_dir = tempfile::tempdir().expect("tempdir");
            let (scoring, scoring_rx) = ScoringQueue::new();
            let state = AppState {
                db: db.clone(),
                config: parley_core::AppConfig {
                    jwt_secret: "ws-test-secret".to_string(),
                    clip_dir: clip_dir.path().to_string_lossy().into_owned(),
                    ..parley_core::AppConfig::default()
                },
                registry: parley_core::registry::SessionRegistry::new(),
                streams: parley_core::streams::StreamHub::new(),
                llm: LlmClient::new(LlmConfig::default()),
                proctor: Arc::new(Proctor::new(None, 0.5)),
                muxer: Arc::new(ClipMuxer::new(clip_dir.path())),
                scoring,
                asr: parley_asr::realtime::RealtimeAsrConfig::default(),
                offline_asr: None,
            };
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (event_tx, _event_rx) = mpsc::unbounded_channel();
            let orchestrator = Orchestrator::new(state, 1, out_tx, event_tx);
            Self {
                orchestrator,
                out_rx,
                scoring_rx,
                db,
                interview_id: interview.id,
                _clip_dir: clip_dir,
            }
        }

        async fn start(&mut self) {
            let keep = self
                .orchestrator
                .handle_create_stream("测试面试间".to_string(), self.interview_id)
                .await;
            assert!(keep, "create_stream must keep the session alive");
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(message) = self.out_rx.try_recv() {
                out.push(message);
            }
            out
        }

        async fn answers(&self) -> Vec<parley_db::answers::AnswerRow> {
            parley_db::answers::list_for_interview(&self.db, self.interview_id)
                .await
                .expect("answers")
        }
    }

    fn interview_texts(messages: &[ServerMessage]) -> Vec<(PhaseLabel, String)> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::InterviewMessage { phase, text } => Some((*phase, text.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn create_stream_enters_intro() {
        let mut h = Harness::new(&["第一题"]).await;
        h.start().await;

        let messages = h.drain();
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::StreamCreated { .. })));
        let prompts = interview_texts(&messages);
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].0, PhaseLabel::Intro);
        assert_eq!(h.orchestrator.session.phase, Phase::Intro);
        assert_eq!(
            h.orchestrator.session.current.as_ref().map(|c| c.index),
            Some(0)
        );
    }

    #[tokio::test]
    async fn foreign_interview_closes_the_session() {
        let mut h = Harness::new(&["第一题"]).await;
        let foreign = parley_db::interviews::create_interview(
            &h.db,
            2,
            None,
            chrono::Utc::now(),
            "别人的面试",
            "",
            "",
            "backend",
        )
        .await
        .expect("interview");

        let keep = h
            .orchestrator
            .handle_create_stream(String::new(), foreign.id)
            .await;
        assert!(!keep);
        assert!(h
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn completion_phrase_flushes_and_advances() {
        let mut h = Harness::new(&["第一题", "第二题"]).await;
        h.start().await;
        h.drain();

        // Intro answered via live captions.
        assert!(h.orchestrator.handle_asr_fragment("大家好我叫张三".to_string()).await);
        assert!(h.orchestrator.handle_asr_fragment("说完了".to_string()).await);

        let messages = h.drain();
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::AsrResult { .. })));
        let prompts = interview_texts(&messages);
        assert_eq!(prompts.last().map(|p| p.1.as_str()), Some("第一题"));
        assert_eq!(h.orchestrator.session.phase, Phase::Question);

        let answers = h.answers().await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].question_index, 0);
        assert!(answers[0].answer.contains("大家好我叫张三"));
        assert!(answers[0].answer.contains("说完了"));
        // One scoring job per flushed answer.
        assert!(h.scoring_rx.try_recv().is_ok());
        assert!(h.scoring_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn manual_fallback_completes_without_captions() {
        let mut h = Harness::new(&["第一题"]).await;
        h.start().await;
        // No transcriber at all: degraded mode.
        h.orchestrator.handle_manual_answer_text("我擅长 Java 后端".to_string());
        assert!(h.orchestrator.handle_answer_completed(None).await);
        h.drain();

        let answers = h.answers().await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].answer, "我擅长 Java 后端");
        assert_eq!(h.orchestrator.session.phase, Phase::Question);
    }

    #[tokio::test]
    async fn explicit_answer_text_overrides_fragments() {
        let mut h = Harness::new(&["第一题"]).await;
        h.start().await;
        assert!(h.orchestrator.handle_asr_fragment("有杂音的片段".to_string()).await);
        assert!(h
            .orchestrator
            .handle_answer_completed(Some("最终版本的回答".to_string()))
            .await);

        let answers = h.answers().await;
        assert_eq!(answers[0].answer, "最终版本的回答");
    }

    #[tokio::test]
    async fn skip_writes_no_answer() {
        let mut h = Harness::new(&["第一题", "第二题"]).await;
        h.start().await;
        // Finish the intro, then skip question one.
        assert!(h.orchestrator.handle_answer_completed(None).await);
        h.drain();
        assert!(h.orchestrator.handle_request_next_question().await);

        let messages = h.drain();
        assert!(messages.iter().any(
            |m| matches!(m, ServerMessage::NextQuestion { question } if question == "第二题")
        ));
        // Intro answer only; the skipped question left no row.
        let answers = h.answers().await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].question_index, 0);
    }

    #[tokio::test]
    async fn exhausting_questions_enters_code_and_finishes() {
        let mut h = Harness::new(&["第一题"]).await;
        h.start().await;
        let problem_id = parley_db::coding::create_problem(
            &h.db,
            "P001",
            "两数之和",
            "……",
            "easy",
            &["数组".to_string()],
            &[],
            &["backend".to_string()],
        )
        .await
        .expect("problem");

        assert!(h.orchestrator.handle_answer_completed(None).await); // intro
        assert!(h.orchestrator.handle_answer_completed(None).await); // question 1 -> CODE
        let messages = h.drain();
        assert!(interview_texts(&messages)
            .iter()
            .any(|(phase, _)| *phase == PhaseLabel::Code));
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::CodingProblem { .. })));
        assert_eq!(h.orchestrator.session.phase, Phase::Code);

        h.orchestrator
            .handle_submit_coding_answer("print('ok')", "python")
            .await;
        let submitted =
            parley_db::coding::count_coding_answers(&h.db, h.interview_id)
                .await
                .expect("count");
        assert_eq!(submitted, 1);
        assert_eq!(problem_id, h.orchestrator.session.coding_problems[0].id);

        // Last problem: advancing finishes the interview and closes the loop.
        let keep = h.orchestrator.advance_coding_problem().await;
        assert!(!keep);
        assert!(h
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::InterviewFinished { .. })));
        assert_eq!(h.orchestrator.session.phase, Phase::Finished);

        let interview = parley_db::interviews::get_interview(&h.db, h.interview_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(interview.status, "completed");
    }

    #[tokio::test]
    async fn empty_problem_set_finishes_directly() {
        let mut h = Harness::new(&[]).await;
        h.start().await;
        // No planned questions and no coding problems: intro completion runs
        // straight through CODE to FINISHED.
        let keep = h.orchestrator.handle_answer_completed(None).await;
        assert!(!keep);
        assert_eq!(h.orchestrator.session.phase, Phase::Finished);
        assert_eq!(h.answers().await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_frames_are_protocol_errors() {
        let mut h = Harness::new(&["第一题"]).await;
        h.start().await;
        h.drain();

        h.orchestrator.handle_audio_frame("not-base64!!", false);
        h.orchestrator
            .handle_video_frame("also not base64!!".to_string(), "keyframe".to_string());
        let messages = h.drain();
        let errors = messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::Error { .. }))
            .count();
        assert_eq!(errors, 2);
        assert!(h.orchestrator.session.buffers.is_empty());
    }

    #[tokio::test]
    async fn valid_frames_land_in_buffers() {
        let mut h = Harness::new(&["第一题"]).await;
        h.start().await;

        let pcm = base64::engine::general_purpose::STANDARD.encode([0u8, 1, 2, 3]);
        h.orchestrator.handle_audio_frame(&pcm, false);
        let jpeg = base64::engine::general_purpose::STANDARD.encode([0xFFu8, 0xD8, 0xFF, 0xD9]);
        h.orchestrator.handle_video_frame(jpeg, "keyframe".to_string());

        assert_eq!(h.orchestrator.session.buffers.audio_chunks(), 1);
        assert_eq!(h.orchestrator.session.buffers.frame_count(), 1);

        // Flushing the answer clears the media buffers with the transition.
        assert!(h.orchestrator.handle_answer_completed(None).await);
        assert!(h.orchestrator.session.buffers.is_empty());
    }

    #[tokio::test]
    async fn unknown_message_types_do_not_kill_the_session() {
        let mut h = Harness::new(&["第一题"]).await;
        h.start().await;
        h.drain();

        assert!(h.orchestrator.handle_client_text(r#"{"type":"start_karaoke"}"#).await);
        assert!(h.orchestrator.handle_client_text("not json at all").await);
        let messages = h.drain();
        assert_eq!(messages.len(), 2);
        assert!(messages
            .iter()
            .all(|m| matches!(m, ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn messages_before_create_stream_are_rejected() {
        let mut h = Harness::new(&["第一题"]).await;
        h.orchestrator.handle_audio_frame("QQ==", false);
        assert!(h
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::Error { .. })));
    }
}
