use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("llm error: {0}")]
    Llm(String),
    #[error("database error: {0}")]
    Database(#[from] parley_db::DbError),
    #[error("internal error: {0}")]
    Internal(String),
}
