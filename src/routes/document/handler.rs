use axum::{
    extract::{Extension, Json, Multipart, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::stream::{FuturesUnordered, StreamExt};
use uuid::Uuid;

use crate::{
    AppState,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{
    DeleteDocumentRequest, Document, DocumentIdQuery, DocumentInfo, GenerateQuizRequest,
    GenerateQuizSummary, STATUS_APPROVED,
};
use crate::routes::category::model as category_model;
use crate::routes::quiz::model as quiz_model;

/// multipart 上传，文件落盘后写入 processing 状态的文档行
#[axum::debug_handler]
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Response {
    let (Some(user_id), Some(company_id)) = (claims.user_id(), claims.company()) else {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        )
            .into_response();
    };

    let mut file: Option<(String, String, Vec<u8>)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                let file_name = field
                    .file_name()
                    .unwrap_or("document")
                    .to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        file = Some((file_name, content_type, bytes.to_vec()));
                        break;
                    }
                    Err(e) => {
                        tracing::error!("读取上传内容失败: {}", e);
                        return (
                            StatusCode::OK,
                            error_to_api_response::<()>(
                                error_codes::VALIDATION_ERROR,
                                "读取上传内容失败".to_string(),
                            ),
                        )
                            .into_response();
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("解析 multipart 失败: {}", e);
                return (
                    StatusCode::OK,
                    error_to_api_response::<()>(
                        error_codes::VALIDATION_ERROR,
                        "上传格式无效".to_string(),
                    ),
                )
                    .into_response();
            }
        }
    }

    let Some((file_name, content_type, bytes)) = file else {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(error_codes::VALIDATION_ERROR, "缺少文件字段".to_string()),
        )
            .into_response();
    };
    if bytes.is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(error_codes::VALIDATION_ERROR, "文件内容为空".to_string()),
        )
            .into_response();
    }

    if let Err(e) = tokio::fs::create_dir_all(&state.config.storage_dir).await {
        tracing::error!("创建存储目录失败: {}", e);
        return (
            StatusCode::OK,
            error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "存储文件失败".to_string()),
        )
            .into_response();
    }
    let stored_name = format!("{}_{}", Uuid::new_v4(), file_name);
    let file_path = format!("{}/{}", state.config.storage_dir, stored_name);
    if let Err(e) = tokio::fs::write(&file_path, &bytes).await {
        tracing::error!("写入文件失败: {}", e);
        return (
            StatusCode::OK,
            error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "存储文件失败".to_string()),
        )
            .into_response();
    }

    match Document::create(
        &state.pool,
        company_id,
        user_id,
        &file_name,
        &file_path,
        &content_type,
        bytes.len() as i64,
    )
    .await
    {
        Ok(document) => (StatusCode::OK, success_to_api_response(document)).into_response(),
        Err(e) => {
            tracing::error!("写入文档记录失败: {}", e);
            (
                StatusCode::OK,
                error_to_api_response::<()>(
                    error_codes::INTERNAL_ERROR,
                    "写入文档记录失败".to_string(),
                ),
            )
                .into_response()
        }
    }
}

/// 文档列表，逐项并发查询测验数，完成顺序不保证
#[axum::debug_handler]
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let Some(company_id) = claims.company() else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        );
    };

    let documents = match Document::list(&state.pool, company_id).await {
        Ok(documents) => documents,
        Err(e) => {
            tracing::error!("查询文档列表失败: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询文档列表失败".to_string()),
            );
        }
    };

    let mut lookups: FuturesUnordered<_> = documents
        .into_iter()
        .map(|document| {
            let pool = state.pool.clone();
            async move {
                let quiz_count = Document::quiz_count(&pool, document.id).await.unwrap_or(0);
                DocumentInfo {
                    id: document.id,
                    file_name: document.file_name,
                    content_type: document.content_type,
                    file_size: document.file_size,
                    status: document.status,
                    created_at: document.created_at,
                    quiz_count,
                }
            }
        })
        .collect();

    let mut infos = Vec::new();
    while let Some(info) = lookups.next().await {
        infos.push(info);
    }
    infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    (StatusCode::OK, success_to_api_response(infos))
}

/// 原文件下载，抽取失败后的人工兜底入口
#[axum::debug_handler]
pub async fn download(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DocumentIdQuery>,
) -> Response {
    let Some(company_id) = claims.company() else {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        )
            .into_response();
    };

    let document = match Document::find(&state.pool, query.document_id, company_id).await {
        Ok(Some(document)) => document,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response::<()>(error_codes::NOT_FOUND, "文档不存在".to_string()),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("查询文档失败: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "查询文档失败".to_string()),
            )
                .into_response();
        }
    };

    match tokio::fs::read(&document.file_path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, document.content_type.clone()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", document.file_name),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("读取文件失败: {}", e);
            (
                StatusCode::OK,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "读取文件失败".to_string()),
            )
                .into_response()
        }
    }
}

/// 级联删除文档及其磁盘文件（管理端）
#[axum::debug_handler]
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteDocumentRequest>,
) -> impl IntoResponse {
    let Some(company_id) = claims.company() else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        );
    };

    let document = match Document::find(&state.pool, req.document_id, company_id).await {
        Ok(Some(document)) => document,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::NOT_FOUND, "文档不存在".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("查询文档失败: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "删除文档失败".to_string()),
            );
        }
    };

    match Document::delete(&state.pool, document.id, company_id).await {
        Ok(true) => {
            if let Err(e) = tokio::fs::remove_file(&document.file_path).await {
                tracing::warn!("删除磁盘文件失败: {}", e);
            }
            (StatusCode::OK, success_to_api_response(()))
        }
        Ok(false) => (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "文档不存在".to_string()),
        ),
        Err(e) => {
            tracing::error!("删除文档失败: {}", e);
            (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "删除文档失败".to_string()),
            )
        }
    }
}

/// 页面图片变体：AI 返回嵌套结构，由服务端完成全部落库并标记文档 approved。
/// 写入链路无事务，中途失败按已知缺口直接报告
#[axum::debug_handler]
pub async fn generate_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GenerateQuizRequest>,
) -> impl IntoResponse {
    let (Some(user_id), Some(company_id)) = (claims.user_id(), claims.company()) else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        );
    };

    if req.page_images.is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "页面图片不能为空".to_string()),
        );
    }

    let document = match Document::find(&state.pool, req.document_id, company_id).await {
        Ok(Some(document)) => document,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::NOT_FOUND, "文档不存在".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("查询文档失败: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询文档失败".to_string()),
            );
        }
    };

    let tree = match state
        .ai
        .generate_quiz_from_images(document.id, &req.page_images)
        .await
    {
        Ok(tree) => tree,
        Err(e) => {
            tracing::warn!("AI 出题失败: {}", e);
            return (StatusCode::OK, error_to_api_response(e.code(), e.to_string()));
        }
    };

    let mut summary = GenerateQuizSummary {
        categories: 0,
        quizzes: 0,
        questions: 0,
    };

    for category in &tree.categories {
        let category_id = match category_model::find_or_create(
            &state.pool,
            company_id,
            None,
            &category.name,
            None,
            Some(document.id),
        )
        .await
        {
            Ok(category) => {
                summary.categories += 1;
                category.id
            }
            Err(e) => {
                tracing::error!("写入分类失败: {}", e);
                return (
                    StatusCode::OK,
                    error_to_api_response(error_codes::INTERNAL_ERROR, "写入分类失败".to_string()),
                );
            }
        };

        for quiz in &category.quizzes {
            let quiz_row = match quiz_model::insert_quiz(
                &state.pool,
                company_id,
                category_id,
                &quiz.title,
                None,
                quiz_model::DEFAULT_PASS_SCORE,
                user_id,
            )
            .await
            {
                Ok(quiz_row) => {
                    summary.quizzes += 1;
                    quiz_row
                }
                Err(e) => {
                    tracing::error!("写入测验失败: {}", e);
                    return (
                        StatusCode::OK,
                        error_to_api_response(error_codes::INTERNAL_ERROR, "写入测验失败".to_string()),
                    );
                }
            };

            let question_id = match quiz_model::insert_question(
                &state.pool,
                quiz_row.id,
                &quiz.question.question,
                Some(&quiz.question.explanation),
                1,
                0,
            )
            .await
            {
                Ok(id) => {
                    summary.questions += 1;
                    id
                }
                Err(e) => {
                    tracing::error!("写入题目失败: {}", e);
                    return (
                        StatusCode::OK,
                        error_to_api_response(error_codes::INTERNAL_ERROR, "写入题目失败".to_string()),
                    );
                }
            };

            for (index, option) in quiz.question.options.iter().enumerate() {
                if let Err(e) = quiz_model::insert_option(
                    &state.pool,
                    question_id,
                    &option.text,
                    option.is_correct,
                    index as i32,
                )
                .await
                {
                    tracing::error!("写入选项失败: {}", e);
                    return (
                        StatusCode::OK,
                        error_to_api_response(error_codes::INTERNAL_ERROR, "写入选项失败".to_string()),
                    );
                }
            }
        }
    }

    if let Err(e) = Document::update_status(&state.pool, document.id, STATUS_APPROVED).await {
        tracing::error!("更新文档状态失败: {}", e);
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::INTERNAL_ERROR, "更新文档状态失败".to_string()),
        );
    }

    (StatusCode::OK, success_to_api_response(summary))
}
