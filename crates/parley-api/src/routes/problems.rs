use crate::error::ApiError;
use crate::middleware::AuthUser;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use parley_core::AppState;
use parley_db::coding::{self, ProblemFilter};
use serde::Deserialize;
use serde_json::{json, Value};

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ProblemQuery {
    pub difficulty: Option<String>,
    pub position_type: Option<String>,
    pub tag: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

pub async fn list_problems(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ProblemQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = ProblemFilter {
        difficulty: query.difficulty,
        position_type: query.position_type,
        tag: query.tag,
    };
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.max(0);
    let rows = coding::list_problems(&state.db, &filter, limit, offset).await?;

    let items: Vec<Value> = rows
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "number": p.number,
                "title": p.title,
                "difficulty": p.difficulty,
                "tags": p.tags,
                "companies": p.companies,
                "position_types": p.position_types,
            })
        })
        .collect();
    Ok(Json(json!({ "problems": items, "count": items.len() })))
}

pub async fn get_problem(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(problem_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let problem = coding::get_problem(&state.db, problem_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let examples = coding::list_examples(&state.db, problem_id).await?;

    let examples: Vec<Value> = examples
        .iter()
        .map(|e| {
            json!({
                "input_data": e.input_data,
                "output_data": e.output_data,
                "explanation": e.explanation,
                "order": e.ord,
            })
        })
        .collect();
    Ok(Json(json!({
        "id": problem.id,
        "number": problem.number,
        "title": problem.title,
        "description": problem.description,
        "difficulty": problem.difficulty,
        "tags": problem.tags,
        "companies": problem.companies,
        "position_types": problem.position_types,
        "examples": examples,
    })))
}
