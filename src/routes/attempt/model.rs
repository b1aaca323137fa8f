use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::scoring::ScoreResult;

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Serialize, FromRow)]
pub struct Attempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub score: i32,
    pub total_points: i32,
    pub percentage: f32,
    pub passed: bool,
    pub time_spent_secs: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

const ATTEMPT_COLUMNS: &str = "id, quiz_id, user_id, status, score, total_points, percentage, \
     passed, time_spent_secs, started_at, completed_at";

pub async fn insert_attempt(
    pool: &PgPool,
    quiz_id: Uuid,
    user_id: Uuid,
) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        r#"
        INSERT INTO quiz_attempts (quiz_id, user_id)
        VALUES ($1, $2)
        RETURNING {ATTEMPT_COLUMNS}
        "#,
    ))
    .bind(quiz_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn find_attempt(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1 AND user_id = $2",
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// 整卷答案一条语句写入；重复提交按 (attempt, question) 覆盖，
/// 不会留下同题多行
pub async fn insert_answers(
    pool: &PgPool,
    attempt_id: Uuid,
    answers: &[GradedAnswer],
) -> Result<(), sqlx::Error> {
    let question_ids: Vec<Uuid> = answers.iter().map(|a| a.question_id).collect();
    let option_ids: Vec<Uuid> = answers.iter().map(|a| a.option_id).collect();
    let correct_flags: Vec<bool> = answers.iter().map(|a| a.is_correct).collect();

    sqlx::query(
        r#"
        INSERT INTO quiz_answers (attempt_id, question_id, option_id, is_correct)
        SELECT $1, q, o, c
        FROM UNNEST($2::uuid[], $3::uuid[], $4::bool[]) AS t(q, o, c)
        ON CONFLICT (attempt_id, question_id)
        DO UPDATE SET option_id = EXCLUDED.option_id, is_correct = EXCLUDED.is_correct
        "#,
    )
    .bind(attempt_id)
    .bind(&question_ids)
    .bind(&option_ids)
    .bind(&correct_flags)
    .execute(pool)
    .await?;
    Ok(())
}

/// 校验通过的单题判分结果
#[derive(Debug, PartialEq, Eq)]
pub struct GradedAnswer {
    pub question_id: Uuid,
    pub option_id: Uuid,
    pub points: i32,
    pub is_correct: bool,
}

/// 判分结束后一次性写入终态
pub async fn finalize_attempt(
    pool: &PgPool,
    attempt_id: Uuid,
    result: &ScoreResult,
    time_spent_secs: i32,
) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        r#"
        UPDATE quiz_attempts
        SET status = $2, score = $3, total_points = $4, percentage = $5,
            passed = $6, time_spent_secs = $7, completed_at = now()
        WHERE id = $1
        RETURNING {ATTEMPT_COLUMNS}
        "#,
    ))
    .bind(attempt_id)
    .bind(STATUS_COMPLETED)
    .bind(result.score)
    .bind(result.total_points)
    .bind(result.percentage)
    .bind(result.passed)
    .bind(time_spent_secs)
    .fetch_one(pool)
    .await
}

pub async fn list_attempts(pool: &PgPool, user_id: Uuid) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE user_id = $1 ORDER BY started_at DESC",
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}
