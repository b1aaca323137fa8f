use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// 文档状态
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Serialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub company_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_name: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub content_type: String,
    pub file_size: i64,
    #[serde(skip_serializing)]
    pub ocr_text: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DocumentInfo {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub quiz_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct DocumentIdQuery {
    pub document_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDocumentRequest {
    pub document_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuizRequest {
    pub document_id: Uuid,
    pub page_images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateQuizSummary {
    pub categories: i64,
    pub quizzes: i64,
    pub questions: i64,
}

const SELECT_COLUMNS: &str = "id, company_id, uploaded_by, file_name, file_path, content_type, \
                              file_size, ocr_text, status, created_at";

impl Document {
    pub async fn create(
        pool: &PgPool,
        company_id: Uuid,
        uploaded_by: Uuid,
        file_name: &str,
        file_path: &str,
        content_type: &str,
        file_size: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!(
            r#"
            INSERT INTO documents (company_id, uploaded_by, file_name, file_path, content_type, file_size, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SELECT_COLUMNS}
            "#,
        ))
        .bind(company_id)
        .bind(uploaded_by)
        .bind(file_name)
        .bind(file_path)
        .bind(content_type)
        .bind(file_size)
        .bind(STATUS_PROCESSING)
        .fetch_one(pool)
        .await
    }

    /// 查询始终按公司过滤，跨公司不可见
    pub async fn find(
        pool: &PgPool,
        id: Uuid,
        company_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {SELECT_COLUMNS} FROM documents WHERE id = $1 AND company_id = $2",
        ))
        .bind(id)
        .bind(company_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &PgPool, company_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {SELECT_COLUMNS} FROM documents WHERE company_id = $1 ORDER BY created_at DESC",
        ))
        .bind(company_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE documents SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 缓存整理后的文本，重开文档时直接复用
    pub async fn update_ocr_text(pool: &PgPool, id: Uuid, text: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE documents SET ocr_text = $2 WHERE id = $1")
            .bind(id)
            .bind(text)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &PgPool, id: Uuid, company_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1 AND company_id = $2")
            .bind(id)
            .bind(company_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 由该文档生成的测验数（经分类关联）
    pub async fn quiz_count(pool: &PgPool, id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM quizzes q
            JOIN categories c ON q.category_id = c.id
            WHERE c.document_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
