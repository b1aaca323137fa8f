use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::roles::Role;
use crate::utils::hash_password;

#[derive(Debug, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Profile {
    pub user_id: Uuid,
    pub name: String,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub company_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub company_name: String,
    pub job_title: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub home: &'static str,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub company_id: Uuid,
    pub role: Role,
    pub home: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub job_title: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MemberRow {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub user_id: Uuid,
    pub role: String,
}

impl User {
    /// 邮箱唯一冲突由调用方按 unique constraint 识别
    pub async fn create(pool: &PgPool, email: &str, password: &str) -> Result<Self, sqlx::Error> {
        let password_hash = hash_password(password)
            .map_err(|e| sqlx::Error::Protocol(format!("Failed to hash password: {}", e)))?;

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, email, password_hash FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await
    }
}

impl Profile {
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        name: &str,
        job_title: Option<&str>,
        department: Option<&str>,
        company_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (user_id, name, job_title, department, company_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id, name, job_title, department, company_id
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(job_title)
        .bind(department)
        .bind(company_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            "SELECT user_id, name, job_title, department, company_id FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        req: &UpdateProfileRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET name = COALESCE($2, name),
                job_title = COALESCE($3, job_title),
                department = COALESCE($4, department)
            WHERE user_id = $1
            RETURNING user_id, name, job_title, department, company_id
            "#,
        )
        .bind(user_id)
        .bind(req.name.as_deref())
        .bind(req.job_title.as_deref())
        .bind(req.department.as_deref())
        .fetch_optional(pool)
        .await
    }

    /// 公司全部成员（含有效角色列），供用户管理与分配列表使用
    pub async fn list_members(pool: &PgPool, company_id: Uuid) -> Result<Vec<MemberRow>, sqlx::Error> {
        sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT p.user_id, u.email, p.name, p.job_title, p.department,
                   (SELECT string_agg(r.role, ',') FROM user_roles r WHERE r.user_id = p.user_id) AS role
            FROM profiles p
            JOIN users u ON u.id = p.user_id
            WHERE p.company_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(company_id)
        .fetch_all(pool)
        .await
    }
}

/// 公司按名称查找或创建，返回 (公司ID, 现有成员数)
pub async fn find_or_create_company(
    pool: &PgPool,
    name: &str,
) -> Result<(Uuid, i64), sqlx::Error> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM companies WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    let company_id = match existing {
        Some((id,)) => id,
        None => {
            let (id,): (Uuid,) =
                sqlx::query_as("INSERT INTO companies (name) VALUES ($1) RETURNING id")
                    .bind(name)
                    .fetch_one(pool)
                    .await?;
            id
        }
    };

    let (member_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM profiles WHERE company_id = $1")
            .bind(company_id)
            .fetch_one(pool)
            .await?;

    Ok((company_id, member_count))
}

pub async fn insert_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(user_id)
        .bind(role.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// 管理端改角色：覆盖目标用户的全部角色行
pub async fn replace_roles(pool: &PgPool, user_id: Uuid, role: Role) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    insert_role(pool, user_id, role).await
}
