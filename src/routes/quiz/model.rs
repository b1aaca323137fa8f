use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::wizard::WizardSession;

pub const DEFAULT_PASS_SCORE: i32 = 70;

// 向导会话缓存
const WIZARD_CACHE_PREFIX: &str = "wizard:"; // 会话键前缀

#[derive(Debug, Serialize, FromRow)]
pub struct Quiz {
    pub id: Uuid,
    pub company_id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub pass_score: i32,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct QuizListItem {
    pub id: Uuid,
    pub title: String,
    pub category_name: String,
    pub pass_score: i32,
    pub is_active: bool,
    pub question_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub question_text: String,
    pub explanation: Option<String>,
    pub points: i32,
    pub order_index: i32,
}

#[derive(Debug, Serialize, FromRow)]
pub struct OptionRow {
    pub id: Uuid,
    pub question_id: Uuid,
    pub option_text: String,
    pub is_correct: bool,
    pub order_index: i32,
}

#[derive(Debug, Serialize, FromRow)]
pub struct AssignedQuiz {
    pub quiz_id: Uuid,
    pub title: String,
    pub pass_score: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_at: DateTime<Utc>,
}

const QUIZ_COLUMNS: &str =
    "id, company_id, category_id, title, description, pass_score, is_active, created_by, created_at";

pub async fn insert_quiz(
    pool: &PgPool,
    company_id: Uuid,
    category_id: Uuid,
    title: &str,
    description: Option<&str>,
    pass_score: i32,
    created_by: Uuid,
) -> Result<Quiz, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(&format!(
        r#"
        INSERT INTO quizzes (company_id, category_id, title, description, pass_score, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {QUIZ_COLUMNS}
        "#,
    ))
    .bind(company_id)
    .bind(category_id)
    .bind(title)
    .bind(description)
    .bind(pass_score)
    .bind(created_by)
    .fetch_one(pool)
    .await
}

pub async fn insert_question(
    pool: &PgPool,
    quiz_id: Uuid,
    question_text: &str,
    explanation: Option<&str>,
    points: i32,
    order_index: i32,
) -> Result<Uuid, sqlx::Error> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO quiz_questions (quiz_id, question_text, explanation, points, order_index)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(quiz_id)
    .bind(question_text)
    .bind(explanation)
    .bind(points)
    .bind(order_index)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn insert_option(
    pool: &PgPool,
    question_id: Uuid,
    option_text: &str,
    is_correct: bool,
    order_index: i32,
) -> Result<Uuid, sqlx::Error> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO quiz_options (question_id, option_text, is_correct, order_index)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(question_id)
    .bind(option_text)
    .bind(is_correct)
    .bind(order_index)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn find_quiz(
    pool: &PgPool,
    id: Uuid,
    company_id: Uuid,
) -> Result<Option<Quiz>, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(&format!(
        "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1 AND company_id = $2",
    ))
    .bind(id)
    .bind(company_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_quizzes(pool: &PgPool, company_id: Uuid) -> Result<Vec<QuizListItem>, sqlx::Error> {
    sqlx::query_as::<_, QuizListItem>(
        r#"
        SELECT q.id, q.title, c.name AS category_name, q.pass_score, q.is_active,
               (SELECT COUNT(*) FROM quiz_questions qq WHERE qq.quiz_id = q.id) AS question_count,
               q.created_at
        FROM quizzes q
        JOIN categories c ON c.id = q.category_id
        WHERE q.company_id = $1
        ORDER BY q.created_at DESC
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await
}

/// 按 order_index 排好的题目与选项
pub async fn load_questions(
    pool: &PgPool,
    quiz_id: Uuid,
) -> Result<Vec<(QuestionRow, Vec<OptionRow>)>, sqlx::Error> {
    let questions = sqlx::query_as::<_, QuestionRow>(
        r#"
        SELECT id, quiz_id, question_text, explanation, points, order_index
        FROM quiz_questions WHERE quiz_id = $1 ORDER BY order_index
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    let mut result = Vec::with_capacity(questions.len());
    for question in questions {
        let options = sqlx::query_as::<_, OptionRow>(
            r#"
            SELECT id, question_id, option_text, is_correct, order_index
            FROM quiz_options WHERE question_id = $1 ORDER BY order_index
            "#,
        )
        .bind(question.id)
        .fetch_all(pool)
        .await?;
        result.push((question, options));
    }
    Ok(result)
}

/// 重复分配直接忽略，返回是否新增
pub async fn insert_assignment(
    pool: &PgPool,
    quiz_id: Uuid,
    user_id: Uuid,
    assigned_by: Uuid,
    due_date: Option<DateTime<Utc>>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO quiz_assignments (quiz_id, user_id, assigned_by, due_date)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (quiz_id, user_id) DO NOTHING
        "#,
    )
    .bind(quiz_id)
    .bind(user_id)
    .bind(assigned_by)
    .bind(due_date)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_assigned(pool: &PgPool, user_id: Uuid) -> Result<Vec<AssignedQuiz>, sqlx::Error> {
    sqlx::query_as::<_, AssignedQuiz>(
        r#"
        SELECT q.id AS quiz_id, q.title, q.pass_score, a.due_date, a.created_at AS assigned_at
        FROM quiz_assignments a
        JOIN quizzes q ON q.id = a.quiz_id
        WHERE a.user_id = $1 AND q.is_active
        ORDER BY a.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

fn wizard_key(session_id: Uuid) -> String {
    format!("{}{}", WIZARD_CACHE_PREFIX, session_id)
}

pub async fn store_session(
    redis: &Arc<RedisClient>,
    session: &WizardSession,
    ttl_secs: u64,
) -> Result<(), redis::RedisError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let payload = serde_json::to_string(session).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "serialize", e.to_string()))
    })?;
    let _: () = conn.set_ex(wizard_key(session.id), payload, ttl_secs).await?;
    Ok(())
}

pub async fn load_session(
    redis: &Arc<RedisClient>,
    session_id: Uuid,
) -> Result<Option<WizardSession>, redis::RedisError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let payload: Option<String> = conn.get(wizard_key(session_id)).await?;
    match payload {
        Some(payload) => match serde_json::from_str(&payload) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!("会话反序列化失败，视为过期: {}", e);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

pub async fn delete_session(
    redis: &Arc<RedisClient>,
    session_id: Uuid,
) -> Result<(), redis::RedisError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let _: () = conn.del(wizard_key(session_id)).await?;
    Ok(())
}

/// 落库链路：测验 → 题目 → 选项，顺序执行；
/// 任一步失败原样上抛，已写入的行不回滚（已知缺口）
pub async fn persist_wizard_quiz(
    pool: &PgPool,
    session: &WizardSession,
    category_id: Uuid,
    title: &str,
    description: Option<&str>,
    pass_score: i32,
) -> Result<Uuid, sqlx::Error> {
    let quiz = insert_quiz(
        pool,
        session.company_id,
        category_id,
        title,
        description,
        pass_score,
        session.created_by,
    )
    .await?;

    for (index, question) in session.questions.iter().enumerate() {
        let question_id = insert_question(
            pool,
            quiz.id,
            &question.question,
            Some(&question.explanation),
            question.points,
            index as i32,
        )
        .await?;
        for (option_index, option) in question.options.iter().enumerate() {
            insert_option(
                pool,
                question_id,
                &option.text,
                option.is_correct,
                option_index as i32,
            )
            .await?;
        }
    }

    Ok(quiz.id)
}
