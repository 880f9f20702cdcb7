use crate::error::ApiError;
use crate::middleware::AuthUser;
use axum::{
    extract::{Path, State},
    Json,
};
use parley_core::{evaluator, AppState};
use parley_db::interviews;
use parley_models::report::{EvaluationReport, UserOverview};

/// Full multi-dimensional report for one interview. Numeric datasets are
/// deterministic; comment text may come from the LLM or its fallback.
pub async fn get_interview_evaluation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(interview_id): Path<i64>,
) -> Result<Json<EvaluationReport>, ApiError> {
    interviews::get_interview(&state.db, interview_id)
        .await?
        .filter(|row| row.user_id == auth.user_id)
        .ok_or(ApiError::NotFound)?;

    let report = evaluator::evaluate(&state.db, &state.llm, interview_id).await?;
    Ok(Json(report))
}

pub async fn get_user_overview(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserOverview>, ApiError> {
    let overview = evaluator::user_overview(&state.db, auth.user_id).await?;
    Ok(Json(overview))
}
