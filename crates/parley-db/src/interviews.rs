use crate::{datetime_from_db_text, datetime_to_db_text, json_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use parley_models::interview::PlannedQuestion;

#[derive(Debug, Clone)]
pub struct InterviewRow {
    pub id: i64,
    pub user_id: i64,
    pub resume_id: Option<i64>,
    pub interview_time: DateTime<Utc>,
    pub position_name: String,
    pub company_name: String,
    pub position_description: String,
    pub position_type: String,
    pub question_queue: Vec<PlannedQuestion>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RawInterview {
    id: i64,
    user_id: i64,
    resume_id: Option<i64>,
    interview_time: String,
    position_name: String,
    company_name: String,
    position_description: String,
    position_type: String,
    question_queue: String,
    status: String,
    created_at: String,
}

impl TryFrom<RawInterview> for InterviewRow {
    type Error = sqlx::Error;

    fn try_from(raw: RawInterview) -> Result<Self, sqlx::Error> {
        let question_queue: Vec<PlannedQuestion> = serde_json::from_str(&raw.question_queue)
            .map_err(|e| sqlx::Error::Protocol(format!("invalid question_queue json: {e}")))?;
        Ok(Self {
            id: raw.id,
            user_id: raw.user_id,
            resume_id: raw.resume_id,
            interview_time: datetime_from_db_text(&raw.interview_time)?,
            position_name: raw.position_name,
            company_name: raw.company_name,
            position_description: raw.position_description,
            position_type: raw.position_type,
            question_queue,
            status: raw.status,
            created_at: datetime_from_db_text(&raw.created_at)?,
        })
    }
}

const INTERVIEW_COLUMNS: &str = "id, user_id, resume_id, interview_time, position_name, \
     company_name, position_description, position_type, question_queue, status, created_at";

#[allow(clippy::too_many_arguments)]
pub async fn create_interview(
    pool: &DbPool,
    user_id: i64,
    resume_id: Option<i64>,
    interview_time: DateTime<Utc>,
    position_name: &str,
    company_name: &str,
    position_description: &str,
    position_type: &str,
) -> Result<InterviewRow, DbError> {
    let raw = sqlx::query_as::<_, RawInterview>(&format!(
        "INSERT INTO interviews (user_id, resume_id, interview_time, position_name, \
         company_name, position_description, position_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING {INTERVIEW_COLUMNS}"
    ))
    .bind(user_id)
    .bind(resume_id)
    .bind(datetime_to_db_text(interview_time))
    .bind(position_name)
    .bind(company_name)
    .bind(position_description)
    .bind(position_type)
    .fetch_one(pool)
    .await?;
    Ok(raw.try_into()?)
}

pub async fn get_interview(pool: &DbPool, id: i64) -> Result<Option<InterviewRow>, DbError> {
    let raw = sqlx::query_as::<_, RawInterview>(&format!(
        "SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(raw.map(InterviewRow::try_from).transpose()?)
}

pub async fn list_user_interviews(
    pool: &DbPool,
    user_id: i64,
) -> Result<Vec<InterviewRow>, DbError> {
    let raws = sqlx::query_as::<_, RawInterview>(&format!(
        "SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE user_id = ?1 ORDER BY interview_time DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    raws.into_iter()
        .map(|raw| InterviewRow::try_from(raw).map_err(DbError::from))
        .collect()
}

pub async fn set_question_queue(
    pool: &DbPool,
    id: i64,
    queue: &[PlannedQuestion],
) -> Result<(), DbError> {
    sqlx::query("UPDATE interviews SET question_queue = ?2 WHERE id = ?1")
        .bind(id)
        .bind(json_to_db_text(&queue)?)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_completed(pool: &DbPool, id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE interviews SET status = 'completed' WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// The caller's most recent earlier interview of the same position type that
/// has at least one answer. Feeds the evaluation comparison. Ids are
/// creation-ordered, which also breaks same-second `created_at` ties.
pub async fn latest_prior_with_answers(
    pool: &DbPool,
    user_id: i64,
    position_type: &str,
    before_interview_id: i64,
) -> Result<Option<InterviewRow>, DbError> {
    let raw = sqlx::query_as::<_, RawInterview>(&format!(
        "SELECT {INTERVIEW_COLUMNS} FROM interviews
         WHERE user_id = ?1 AND position_type = ?2 AND id < ?3
           AND EXISTS (SELECT 1 FROM answers WHERE answers.interview_id = interviews.id)
         ORDER BY id DESC LIMIT 1"
    ))
    .bind(user_id)
    .bind(position_type)
    .bind(before_interview_id)
    .fetch_optional(pool)
    .await?;
    Ok(raw.map(InterviewRow::try_from).transpose()?)
}
