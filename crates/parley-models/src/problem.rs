use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingExampleData {
    pub input_data: String,
    pub output_data: String,
    #[serde(default)]
    pub explanation: String,
}

/// Coding problem shape pushed to clients on CODE-phase entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingProblemPayload {
    pub id: i64,
    pub number: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<CodingExampleData>,
}
