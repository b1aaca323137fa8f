use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[axum::debug_handler]
pub async fn list_categories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let Some(company_id) = claims.company() else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        );
    };

    match model::list(&state.pool, company_id).await {
        Ok(categories) => (StatusCode::OK, success_to_api_response(categories)),
        Err(e) => {
            tracing::error!("查询分类失败: {}", e);
            (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询分类失败".to_string()),
            )
        }
    }
}

/// 手工建分类（管理端），slug 由服务端派生
#[axum::debug_handler]
pub async fn create_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCategoryRequest>,
) -> impl IntoResponse {
    let Some(company_id) = claims.company() else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        );
    };

    if req.name.trim().is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "分类名称不能为空".to_string()),
        );
    }

    match model::find_or_create(&state.pool, company_id, req.parent_id, req.name.trim(), None, None)
        .await
    {
        Ok(category) => (StatusCode::OK, success_to_api_response(category)),
        Err(e) => {
            tracing::error!("创建分类失败: {}", e);
            (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "创建分类失败".to_string()),
            )
        }
    }
}
