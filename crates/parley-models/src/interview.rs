use serde::{Deserialize, Serialize};

/// Job position categories an interview can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Backend,
    Frontend,
    Algo,
    Pm,
    Qa,
    Data,
    Other,
}

impl PositionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Algo => "algo",
            Self::Pm => "pm",
            Self::Qa => "qa",
            Self::Data => "data",
            Self::Other => "other",
        }
    }

    /// Unknown values map to `Other` so stale rows never fail to load.
    pub fn parse(value: &str) -> Self {
        match value {
            "backend" => Self::Backend,
            "frontend" => Self::Frontend,
            "algo" => Self::Algo,
            "pm" => Self::Pm,
            "qa" => Self::Qa,
            "data" => Self::Data,
            _ => Self::Other,
        }
    }
}

/// One entry of an interview's planned question queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedQuestion {
    pub question: String,
    #[serde(default)]
    pub knowledge_points: Vec<String>,
}

/// Résumé content consumed by the planners. Authored elsewhere; read-only here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub expected_position: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub work_experiences: Vec<WorkExperience>,
    #[serde(default)]
    pub project_experiences: Vec<ProjectExperience>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkExperience {
    pub company_name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectExperience {
    pub project_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_type_parse_is_total() {
        assert_eq!(PositionType::parse("backend"), PositionType::Backend);
        assert_eq!(PositionType::parse("devops"), PositionType::Other);
        assert_eq!(PositionType::parse(""), PositionType::Other);
    }

    #[test]
    fn planned_question_tolerates_missing_knowledge_points() {
        let q: PlannedQuestion =
            serde_json::from_str(r#"{"question":"请介绍一下你的项目。"}"#).expect("parse");
        assert!(q.knowledge_points.is_empty());
    }
}
