use serde::{Deserialize, Serialize};

/// Per-dimension radar values on the 0–100 percentile scale, one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarData {
    pub professional_knowledge: f64,
    pub skill_matching: f64,
    pub communication: f64,
    pub logical_thinking: f64,
    pub innovation: f64,
    pub stress_handling: f64,
}

impl RadarData {
    pub fn values(&self) -> [f64; 6] {
        [
            self.professional_knowledge,
            self.skill_matching,
            self.communication,
            self.logical_thinking,
            self.innovation,
            self.stress_handling,
        ]
    }
}

/// Knowledge-point occurrence count across an interview's answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieSlice {
    pub name: String,
    pub count: i64,
}

/// Knowledge-point mastery on the 0–100 scale (mean correctness / 5 × 100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryBar {
    pub name: String,
    pub score: f64,
}

/// One trend sample: answers of one calendar day averaged across the six
/// ability dimensions, rescaled to 0–100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub score: f64,
}

/// Delta against the caller's most recent prior interview of the same
/// position type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub previous_interview_id: i64,
    pub overall_delta: f64,
    pub dimension_deltas: RadarData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportComments {
    pub radar: String,
    pub pie: String,
    pub mastery: String,
    pub summary: String,
}

/// Cross-interview summary for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOverview {
    pub total_interviews: i64,
    pub total_answers: i64,
    pub radar: RadarData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub interview_id: i64,
    pub total_answers: i64,
    pub radar: RadarData,
    pub pie: Vec<PieSlice>,
    pub mastery: Vec<MasteryBar>,
    pub trend: Vec<TrendPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
    pub comments: ReportComments,
}
