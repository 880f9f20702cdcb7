use crate::{datetime_from_db_text, json_to_db_text, json_vec_from_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use parley_models::answer::RubricScores;

#[derive(Debug, Clone)]
pub struct AnswerRow {
    pub id: String,
    pub interview_id: i64,
    pub question_index: i64,
    pub question: String,
    pub answer: String,
    pub knowledge_points: Vec<String>,
    pub clip_path: Option<String>,
    pub scores: RubricScores,
    pub ai_analysis: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RawAnswer {
    id: String,
    interview_id: i64,
    question_index: i64,
    question: String,
    answer: String,
    knowledge_points: String,
    clip_path: Option<String>,
    professional_knowledge: f64,
    skill_matching: f64,
    communication: f64,
    logical_thinking: f64,
    innovation: f64,
    stress_handling: f64,
    correctness: f64,
    ai_analysis: Option<String>,
    created_at: String,
}

impl TryFrom<RawAnswer> for AnswerRow {
    type Error = sqlx::Error;

    fn try_from(raw: RawAnswer) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: raw.id,
            interview_id: raw.interview_id,
            question_index: raw.question_index,
            question: raw.question,
            answer: raw.answer,
            knowledge_points: json_vec_from_db_text(&raw.knowledge_points)?,
            clip_path: raw.clip_path,
            scores: RubricScores {
                professional_knowledge: raw.professional_knowledge,
                skill_matching: raw.skill_matching,
                communication: raw.communication,
                logical_thinking: raw.logical_thinking,
                innovation: raw.innovation,
                stress_handling: raw.stress_handling,
                correctness: raw.correctness,
            },
            ai_analysis: raw.ai_analysis,
            created_at: datetime_from_db_text(&raw.created_at)?,
        })
    }
}

const ANSWER_COLUMNS: &str = "id, interview_id, question_index, question, answer, \
     knowledge_points, clip_path, professional_knowledge, skill_matching, communication, \
     logical_thinking, innovation, stress_handling, correctness, ai_analysis, created_at";

/// Insert an answer for `(interview_id, question_index)`. The uniqueness
/// constraint makes retries no-ops; returns whether a row was inserted.
pub async fn create_answer(
    pool: &DbPool,
    id: &str,
    interview_id: i64,
    question_index: i64,
    question: &str,
    answer: &str,
    knowledge_points: &[String],
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO answers (id, interview_id, question_index, question, answer, knowledge_points)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(interview_id, question_index) DO NOTHING",
    )
    .bind(id)
    .bind(interview_id)
    .bind(question_index)
    .bind(question)
    .bind(answer)
    .bind(json_to_db_text(&knowledge_points)?)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_answer(pool: &DbPool, id: &str) -> Result<Option<AnswerRow>, DbError> {
    let raw = sqlx::query_as::<_, RawAnswer>(&format!(
        "SELECT {ANSWER_COLUMNS} FROM answers WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(raw.map(AnswerRow::try_from).transpose()?)
}

pub async fn get_by_question(
    pool: &DbPool,
    interview_id: i64,
    question_index: i64,
) -> Result<Option<AnswerRow>, DbError> {
    let raw = sqlx::query_as::<_, RawAnswer>(&format!(
        "SELECT {ANSWER_COLUMNS} FROM answers WHERE interview_id = ?1 AND question_index = ?2"
    ))
    .bind(interview_id)
    .bind(question_index)
    .fetch_optional(pool)
    .await?;
    Ok(raw.map(AnswerRow::try_from).transpose()?)
}

pub async fn list_for_interview(
    pool: &DbPool,
    interview_id: i64,
) -> Result<Vec<AnswerRow>, DbError> {
    let raws = sqlx::query_as::<_, RawAnswer>(&format!(
        "SELECT {ANSWER_COLUMNS} FROM answers WHERE interview_id = ?1 ORDER BY question_index ASC"
    ))
    .bind(interview_id)
    .fetch_all(pool)
    .await?;
    raws.into_iter()
        .map(|raw| AnswerRow::try_from(raw).map_err(DbError::from))
        .collect()
}

/// All answers across a user's interviews, for the overview evaluation.
pub async fn list_for_user(pool: &DbPool, user_id: i64) -> Result<Vec<AnswerRow>, DbError> {
    let raws = sqlx::query_as::<_, RawAnswer>(&format!(
        "SELECT a.{} FROM answers a
         JOIN interviews i ON i.id = a.interview_id
         WHERE i.user_id = ?1
         ORDER BY a.created_at ASC",
        ANSWER_COLUMNS.replace(", ", ", a."),
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    raws.into_iter()
        .map(|raw| AnswerRow::try_from(raw).map_err(DbError::from))
        .collect()
}

pub async fn set_clip_path(pool: &DbPool, id: &str, clip_path: &str) -> Result<(), DbError> {
    sqlx::query("UPDATE answers SET clip_path = ?2 WHERE id = ?1")
        .bind(id)
        .bind(clip_path)
        .execute(pool)
        .await?;
    Ok(())
}

/// Overwrite the answer text with an offline re-transcription.
pub async fn update_answer_text(pool: &DbPool, id: &str, answer: &str) -> Result<(), DbError> {
    sqlx::query("UPDATE answers SET answer = ?2 WHERE id = ?1")
        .bind(id)
        .bind(answer)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_scores(
    pool: &DbPool,
    id: &str,
    scores: &RubricScores,
    ai_analysis: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE answers SET professional_knowledge = ?2, skill_matching = ?3, \
         communication = ?4, logical_thinking = ?5, innovation = ?6, stress_handling = ?7, \
         correctness = ?8, ai_analysis = ?9 WHERE id = ?1",
    )
    .bind(id)
    .bind(scores.professional_knowledge)
    .bind(scores.skill_matching)
    .bind(scores.communication)
    .bind(scores.logical_thinking)
    .bind(scores.innovation)
    .bind(scores.stress_handling)
    .bind(scores.correctness)
    .bind(ai_analysis)
    .execute(pool)
    .await?;
    Ok(())
}
