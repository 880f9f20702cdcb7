use crate::error::ApiError;
use crate::middleware::AuthUser;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use parley_core::{planner, AppState};
use parley_db::{answers, interviews, resumes};
use parley_models::interview::PositionType;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct CreateInterviewRequest {
    pub resume_id: i64,
    pub position_name: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub position_description: String,
    #[serde(default = "default_position_type")]
    pub position_type: String,
    #[serde(default)]
    pub interview_time: Option<DateTime<Utc>>,
}

fn default_position_type() -> String {
    "backend".to_string()
}

/// Create an interview and populate its question queue. The planner runs
/// under the configured deadline; its fallback keeps creation fast.
pub async fn create_interview(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateInterviewRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if request.position_name.trim().is_empty() {
        return Err(ApiError::BadRequest("缺少岗位名称".to_string()));
    }
    let resume = resumes::get_user_resume(&state.db, request.resume_id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("指定的简历不存在或不属于当前用户".to_string()))?;

    let interview = interviews::create_interview(
        &state.db,
        auth.user_id,
        Some(resume.id),
        request.interview_time.unwrap_or_else(Utc::now),
        &request.position_name,
        &request.company_name,
        &request.position_description,
        &request.position_type,
    )
    .await?;

    let position = planner::PositionContext {
        position_type: PositionType::parse(&request.position_type),
        position_name: request.position_name.clone(),
        company_name: request.company_name.clone(),
        description: request.position_description.clone(),
    };
    let queue = planner::plan_questions(
        &state.llm,
        Duration::from_secs(state.config.plan_deadline_secs),
        state.config.question_limit,
        &position,
        &resume.profile,
    )
    .await;
    interviews::set_question_queue(&state.db, interview.id, &queue).await?;

    tracing::info!(
        interview_id = interview.id,
        user_id = auth.user_id,
        questions = queue.len(),
        "interview created"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": interview.id,
            "interview_time": interview.interview_time.to_rfc3339(),
            "position_name": interview.position_name,
            "company_name": interview.company_name,
            "position_type": interview.position_type,
            "question_count": queue.len(),
            "msg": "面试创建成功",
        })),
    ))
}

pub async fn list_interviews(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let rows = interviews::list_user_interviews(&state.db, auth.user_id).await?;
    let items: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "id": row.id,
                "interview_time": row.interview_time.to_rfc3339(),
                "position_name": row.position_name,
                "company_name": row.company_name,
                "position_type": row.position_type,
                "status": row.status,
                "question_count": row.question_queue.len(),
                "created_at": row.created_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(Json(json!({ "interviews": items, "total": rows.len() })))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-dimension score means on the native 0–5 scale.
pub async fn get_interview_scores(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(interview_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let interview = interviews::get_interview(&state.db, interview_id)
        .await?
        .filter(|row| row.user_id == auth.user_id)
        .ok_or(ApiError::NotFound)?;

    let rows = answers::list_for_interview(&state.db, interview.id).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound);
    }

    let n = rows.len() as f64;
    let mut sums = [0.0f64; 6];
    for row in &rows {
        for (sum, value) in sums.iter_mut().zip(row.scores.ability_values()) {
            *sum += value;
        }
    }
    let means: Vec<f64> = sums.iter().map(|sum| round2(sum / n)).collect();
    let total = round2(means.iter().sum::<f64>() / 6.0);

    Ok(Json(json!({
        "interview_id": interview.id,
        "total_answers": rows.len(),
        "scores": {
            "professional_knowledge": means[0],
            "skill_matching": means[1],
            "communication": means[2],
            "logical_thinking": means[3],
            "innovation": means[4],
            "stress_handling": means[5],
        },
        "total_score": total,
    })))
}
