use crate::{json_to_db_text, json_vec_from_db_text, DbError, DbPool};

#[derive(Debug, Clone)]
pub struct CodingProblemRow {
    pub id: i64,
    pub number: String,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub tags: Vec<String>,
    pub companies: Vec<String>,
    pub position_types: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct RawProblem {
    id: i64,
    number: String,
    title: String,
    description: String,
    difficulty: String,
    tags: String,
    companies: String,
    position_types: String,
}

impl TryFrom<RawProblem> for CodingProblemRow {
    type Error = sqlx::Error;

    fn try_from(raw: RawProblem) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: raw.id,
            number: raw.number,
            title: raw.title,
            description: raw.description,
            difficulty: raw.difficulty,
            tags: json_vec_from_db_text(&raw.tags)?,
            companies: json_vec_from_db_text(&raw.companies)?,
            position_types: json_vec_from_db_text(&raw.position_types)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CodingExampleRow {
    pub id: i64,
    pub problem_id: i64,
    pub input_data: String,
    pub output_data: String,
    pub explanation: String,
    pub ord: i64,
}

const PROBLEM_COLUMNS: &str =
    "id, number, title, description, difficulty, tags, companies, position_types";

#[derive(Debug, Clone, Default)]
pub struct ProblemFilter {
    pub difficulty: Option<String>,
    pub position_type: Option<String>,
    pub tag: Option<String>,
}

pub async fn all_problems(pool: &DbPool) -> Result<Vec<CodingProblemRow>, DbError> {
    let raws = sqlx::query_as::<_, RawProblem>(&format!(
        "SELECT {PROBLEM_COLUMNS} FROM coding_problems ORDER BY number ASC"
    ))
    .fetch_all(pool)
    .await?;
    raws.into_iter()
        .map(|raw| CodingProblemRow::try_from(raw).map_err(DbError::from))
        .collect()
}

/// Filtered problem listing. The JSON-array columns are matched with a
/// quoted LIKE pattern, so tags filter on whole values, not substrings.
pub async fn list_problems(
    pool: &DbPool,
    filter: &ProblemFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<CodingProblemRow>, DbError> {
    let mut sql = format!(
        "SELECT {PROBLEM_COLUMNS} FROM coding_problems WHERE 1 = 1"
    );
    if filter.difficulty.is_some() {
        sql.push_str(" AND difficulty = ?1");
    }
    if filter.position_type.is_some() {
        sql.push_str(" AND position_types LIKE ?2");
    }
    if filter.tag.is_some() {
        sql.push_str(" AND tags LIKE ?3");
    }
    sql.push_str(" ORDER BY number ASC LIMIT ?4 OFFSET ?5");

    let raws = sqlx::query_as::<_, RawProblem>(&sql)
        .bind(filter.difficulty.clone().unwrap_or_default())
        .bind(
            filter
                .position_type
                .as_deref()
                .map(json_value_pattern)
                .unwrap_or_default(),
        )
        .bind(filter.tag.as_deref().map(json_value_pattern).unwrap_or_default())
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    raws.into_iter()
        .map(|raw| CodingProblemRow::try_from(raw).map_err(DbError::from))
        .collect()
}

fn json_value_pattern(value: &str) -> String {
    format!("%\"{}\"%", value.replace('%', "").replace('_', ""))
}

pub async fn get_problem(pool: &DbPool, id: i64) -> Result<Option<CodingProblemRow>, DbError> {
    let raw = sqlx::query_as::<_, RawProblem>(&format!(
        "SELECT {PROBLEM_COLUMNS} FROM coding_problems WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(raw.map(CodingProblemRow::try_from).transpose()?)
}

pub async fn list_examples(
    pool: &DbPool,
    problem_id: i64,
) -> Result<Vec<CodingExampleRow>, DbError> {
    let rows = sqlx::query_as::<_, CodingExampleRow>(
        "SELECT id, problem_id, input_data, output_data, explanation, ord
         FROM coding_examples WHERE problem_id = ?1 ORDER BY ord ASC",
    )
    .bind(problem_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn create_problem(
    pool: &DbPool,
    number: &str,
    title: &str,
    description: &str,
    difficulty: &str,
    tags: &[String],
    companies: &[String],
    position_types: &[String],
) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO coding_problems (number, title, description, difficulty, tags, companies, position_types)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id",
    )
    .bind(number)
    .bind(title)
    .bind(description)
    .bind(difficulty)
    .bind(json_to_db_text(&tags)?)
    .bind(json_to_db_text(&companies)?)
    .bind(json_to_db_text(&position_types)?)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn create_example(
    pool: &DbPool,
    problem_id: i64,
    input_data: &str,
    output_data: &str,
    explanation: &str,
    ord: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO coding_examples (problem_id, input_data, output_data, explanation, ord)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(problem_id)
    .bind(input_data)
    .bind(output_data)
    .bind(explanation)
    .bind(ord)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert a coding answer; at most one per (interview, problem).
pub async fn create_coding_answer(
    pool: &DbPool,
    id: &str,
    interview_id: i64,
    problem_id: i64,
    code: &str,
    language: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO coding_answers (id, interview_id, problem_id, code, language)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(interview_id, problem_id) DO NOTHING",
    )
    .bind(id)
    .bind(interview_id)
    .bind(problem_id)
    .bind(code)
    .bind(language)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_coding_answers(pool: &DbPool, interview_id: i64) -> Result<i64, DbError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM coding_answers WHERE interview_id = ?1")
            .bind(interview_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, interviews, run_migrations};

    async fn test_pool() -> DbPool {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    async fn seed_problem(pool: &DbPool, number: &str, difficulty: &str, tags: &[&str]) -> i64 {
        create_problem(
            pool,
            number,
            "题目",
            "描述",
            difficulty,
            &tags.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            &[],
            &["backend".to_string()],
        )
        .await
        .expect("problem")
    }

    #[tokio::test]
    async fn filters_match_whole_json_values() {
        let pool = test_pool().await;
        seed_problem(&pool, "P001", "easy", &["数组"]).await;
        seed_problem(&pool, "P002", "hard", &["动态规划"]).await;

        let filter = ProblemFilter {
            tag: Some("数组".to_string()),
            ..Default::default()
        };
        let rows = list_problems(&pool, &filter, 10, 0).await.expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].number, "P001");

        let filter = ProblemFilter {
            difficulty: Some("hard".to_string()),
            position_type: Some("backend".to_string()),
            ..Default::default()
        };
        let rows = list_problems(&pool, &filter, 10, 0).await.expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].number, "P002");
    }

    #[tokio::test]
    async fn coding_answer_is_unique_per_problem() {
        let pool = test_pool().await;
        let problem_id = seed_problem(&pool, "P003", "medium", &["栈"]).await;
        let interview = interviews::create_interview(
            &pool,
            1,
            None,
            chrono::Utc::now(),
            "后端",
            "",
            "",
            "backend",
        )
        .await
        .expect("interview");

        let first = create_coding_answer(
            &pool,
            &uuid::Uuid::new_v4().to_string(),
            interview.id,
            problem_id,
            "print('ok')",
            "python",
        )
        .await
        .expect("insert");
        let second = create_coding_answer(
            &pool,
            &uuid::Uuid::new_v4().to_string(),
            interview.id,
            problem_id,
            "print('again')",
            "python",
        )
        .await
        .expect("insert");
        assert!(first);
        assert!(!second);
        assert_eq!(
            count_coding_answers(&pool, interview.id).await.expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn examples_come_back_ordered() {
        let pool = test_pool().await;
        let problem_id = seed_problem(&pool, "P004", "easy", &[]).await;
        create_example(&pool, problem_id, "2 7", "9", "", 2)
            .await
            .expect("example");
        create_example(&pool, problem_id, "1 1", "2", "基本情形", 1)
            .await
            .expect("example");

        let examples = list_examples(&pool, problem_id).await.expect("list");
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].input_data, "1 1");
    }
}
