use parley_db::coding::CodingProblemRow;
use parley_media::buffers::QuestionBuffers;
use parley_models::interview::{PlannedQuestion, PositionType};
use parley_models::message::PhaseLabel;

/// Phrases that end an answer when they appear in a transcription fragment.
const COMPLETION_PHRASES: [&str; 2] = ["说完了", "完毕"];

/// Question index reserved for the self-introduction answer.
pub const INTRO_QUESTION_INDEX: i64 = 0;

pub fn contains_completion_phrase(fragment: &str) -> bool {
    COMPLETION_PHRASES.iter().any(|p| fragment.contains(p))
}

/// Monotone interview phases: INTRO → QUESTION → CODE → FINISHED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Intro,
    Question,
    Code,
    Finished,
}

impl Phase {
    pub fn label(self) -> PhaseLabel {
        match self {
            Self::Intro => PhaseLabel::Intro,
            Self::Question => PhaseLabel::Question,
            Self::Code | Self::Finished => PhaseLabel::Code,
        }
    }
}

/// The question currently awaiting an answer, plus its accumulated
/// transcription fragments and manual text.
#[derive(Debug)]
pub struct CurrentQuestion {
    pub index: i64,
    pub text: String,
    pub knowledge_points: Vec<String>,
    pub sentences: Vec<String>,
}

impl CurrentQuestion {
    pub fn intro(knowledge_points: Vec<String>) -> Self {
        Self {
            index: INTRO_QUESTION_INDEX,
            text: "自我介绍".to_string(),
            knowledge_points,
            sentences: Vec::new(),
        }
    }
}

/// Runtime twin of one Interview while its candidate is connected. Owned
/// exclusively by the session task; no internal locking.
pub struct InterviewSession {
    pub session_id: String,
    pub user_id: i64,
    pub peer_id: String,
    pub phase: Phase,
    pub interview_id: Option<i64>,
    pub position_type: PositionType,
    pub stream_id: Option<String>,
    pub question_queue: Vec<PlannedQuestion>,
    /// Index into `question_queue` of the next question to ask.
    pub next_question: usize,
    pub current: Option<CurrentQuestion>,
    pub buffers: QuestionBuffers,
    pub coding_problems: Vec<CodingProblemRow>,
    pub coding_idx: usize,
}

impl InterviewSession {
    pub fn new(user_id: i64) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            peer_id: uuid::Uuid::new_v4().to_string(),
            phase: Phase::Intro,
            interview_id: None,
            position_type: PositionType::Other,
            stream_id: None,
            question_queue: Vec::new(),
            next_question: 0,
            current: None,
            buffers: QuestionBuffers::new(),
            coding_problems: Vec::new(),
            coding_idx: 0,
        }
    }

    pub fn started(&self) -> bool {
        self.interview_id.is_some()
    }

    /// Advance the phase. Backward transitions are a bug, not a request.
    pub fn advance_phase(&mut self, next: Phase) {
        debug_assert!(self.phase <= next, "phase transitions are monotone");
        if next > self.phase {
            self.phase = next;
        }
    }

    /// Pop the next planned question and make it current. Buffers are
    /// cleared so the new question starts from silence.
    pub fn begin_next_question(&mut self) -> Option<&CurrentQuestion> {
        let planned = self.question_queue.get(self.next_question)?.clone();
        self.next_question += 1;
        self.buffers.clear();
        self.current = Some(CurrentQuestion {
            index: self.next_question as i64,
            text: planned.question,
            knowledge_points: planned.knowledge_points,
            sentences: Vec::new(),
        });
        self.current.as_ref()
    }

    pub fn questions_remaining(&self) -> bool {
        self.next_question < self.question_queue.len()
    }

    /// Drop the current question without persisting anything.
    pub fn discard_current(&mut self) {
        self.current = None;
        self.buffers.clear();
    }

    pub fn current_coding_problem(&self) -> Option<&CodingProblemRow> {
        self.coding_problems.get(self.coding_idx)
    }
}
