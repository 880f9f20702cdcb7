use crate::{DbError, DbPool};
use parley_models::interview::{ProjectExperience, ResumeProfile, WorkExperience};

#[derive(Debug, Clone)]
pub struct ResumeRow {
    pub id: i64,
    pub user_id: i64,
    pub profile: ResumeProfile,
}

#[derive(sqlx::FromRow)]
struct RawResume {
    id: i64,
    user_id: i64,
    name: String,
    expected_position: String,
    skills: String,
    work_experiences: String,
    project_experiences: String,
}

impl TryFrom<RawResume> for ResumeRow {
    type Error = sqlx::Error;

    fn try_from(raw: RawResume) -> Result<Self, sqlx::Error> {
        let work_experiences: Vec<WorkExperience> = serde_json::from_str(&raw.work_experiences)
            .map_err(|e| sqlx::Error::Protocol(format!("invalid work_experiences json: {e}")))?;
        let project_experiences: Vec<ProjectExperience> =
            serde_json::from_str(&raw.project_experiences).map_err(|e| {
                sqlx::Error::Protocol(format!("invalid project_experiences json: {e}"))
            })?;
        Ok(Self {
            id: raw.id,
            user_id: raw.user_id,
            profile: ResumeProfile {
                name: raw.name,
                expected_position: raw.expected_position,
                skills: raw.skills,
                work_experiences,
                project_experiences,
            },
        })
    }
}

/// Fetch a résumé owned by `user_id`. Foreign résumés read as absent.
pub async fn get_user_resume(
    pool: &DbPool,
    id: i64,
    user_id: i64,
) -> Result<Option<ResumeRow>, DbError> {
    let raw = sqlx::query_as::<_, RawResume>(
        "SELECT id, user_id, name, expected_position, skills, work_experiences, project_experiences
         FROM resumes WHERE id = ?1 AND user_id = ?2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(raw.map(ResumeRow::try_from).transpose()?)
}

pub async fn create_resume(
    pool: &DbPool,
    user_id: i64,
    profile: &ResumeProfile,
) -> Result<i64, DbError> {
    let work = serde_json::to_string(&profile.work_experiences)
        .map_err(|e| DbError::Sqlx(sqlx::Error::Protocol(format!("json encode failed: {e}"))))?;
    let projects = serde_json::to_string(&profile.project_experiences)
        .map_err(|e| DbError::Sqlx(sqlx::Error::Protocol(format!("json encode failed: {e}"))))?;
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO resumes (user_id, name, expected_position, skills, work_experiences, project_experiences)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING id",
    )
    .bind(user_id)
    .bind(&profile.name)
    .bind(&profile.expected_position)
    .bind(&profile.skills)
    .bind(work)
    .bind(projects)
    .fetch_one(pool)
    .await?;
    Ok(id)
}
