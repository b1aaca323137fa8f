use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::ai::CategoryPath;
use crate::utils::slugify;

#[derive(Debug, Serialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub company_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "id, company_id, parent_id, name, slug, document_id, created_at";

/// 同层级重复的分类直接复用，不存在时创建。
/// 自带 slug 的（AI 建议路径，罗马化后互不相同）按 slug 去重；
/// slug 由名称派生的按名称去重：非拉丁名称派生 slug 大量坍缩为 "_"，
/// 按 slug 去重会把同层级的不同分类误并成一个
pub async fn find_or_create(
    pool: &PgPool,
    company_id: Uuid,
    parent_id: Option<Uuid>,
    name: &str,
    slug: Option<&str>,
    document_id: Option<Uuid>,
) -> Result<Category, sqlx::Error> {
    let dedup_col = dedup_column(slug);
    let (slug, dedup_value) = match slug {
        Some(slug) => (slug.to_string(), slug.to_string()),
        None => (slugify(name), name.to_string()),
    };

    let existing = sqlx::query_as::<_, Category>(&format!(
        r#"
        SELECT {SELECT_COLUMNS} FROM categories
        WHERE company_id = $1 AND {dedup_col} = $2 AND parent_id IS NOT DISTINCT FROM $3
        "#,
    ))
    .bind(company_id)
    .bind(&dedup_value)
    .bind(parent_id)
    .fetch_optional(pool)
    .await?;

    if let Some(category) = existing {
        return Ok(category);
    }

    sqlx::query_as::<_, Category>(&format!(
        r#"
        INSERT INTO categories (company_id, parent_id, name, slug, document_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {SELECT_COLUMNS}
        "#,
    ))
    .bind(company_id)
    .bind(parent_id)
    .bind(name)
    .bind(&slug)
    .bind(document_id)
    .fetch_one(pool)
    .await
}

/// 按 大/中/小 三级依次建链，返回叶子分类ID；源文档挂在叶子层
pub async fn ensure_path(
    pool: &PgPool,
    company_id: Uuid,
    path: &CategoryPath,
    document_id: Option<Uuid>,
) -> Result<Uuid, sqlx::Error> {
    let level1 = find_or_create(
        pool,
        company_id,
        None,
        &path.level1.name,
        Some(&path.level1.slug),
        None,
    )
    .await?;
    let level2 = find_or_create(
        pool,
        company_id,
        Some(level1.id),
        &path.level2.name,
        Some(&path.level2.slug),
        None,
    )
    .await?;
    let level3 = find_or_create(
        pool,
        company_id,
        Some(level2.id),
        &path.level3.name,
        Some(&path.level3.slug),
        document_id,
    )
    .await?;
    Ok(level3.id)
}

pub async fn list(pool: &PgPool, company_id: Uuid) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(&format!(
        "SELECT {SELECT_COLUMNS} FROM categories WHERE company_id = $1 ORDER BY created_at",
    ))
    .bind(company_id)
    .fetch_all(pool)
    .await
}

fn dedup_column(slug: Option<&str>) -> &'static str {
    if slug.is_some() { "slug" } else { "name" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_slugs_collide_so_manual_dedup_uses_name() {
        // 全韩文名称派生的 slug 全部坍缩为同一个值
        assert_eq!(slugify("인사 규정"), slugify("안전 교육"));
        // 手工创建（无显式 slug）必须按名称匹配，否则第二个分类被静默吞并
        assert_eq!(dedup_column(None), "name");
        assert_eq!(dedup_column(Some("insa_gyujeong")), "slug");
    }
}
