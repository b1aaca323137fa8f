use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState, positions,
    roles::Role,
    routes::user::model::{MemberRow, Profile},
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model;

#[derive(Debug, Serialize)]
pub struct OptionView {
    pub id: Uuid,
    pub option_text: String,
    pub order_index: i32,
    /// 仅管理侧可见；员工侧不下发正确答案
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub question_text: String,
    pub explanation: Option<String>,
    pub points: i32,
    pub order_index: i32,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Serialize)]
pub struct QuizDetail {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub pass_score: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub quiz_id: Uuid,
    pub user_ids: Vec<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AssignOutcome {
    pub user_id: Uuid,
    pub status: &'static str,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        error_to_api_response::<()>(error_codes::AUTH_FAILED, "令牌无效".to_string()),
    )
        .into_response()
}

fn internal(msg: &str) -> Response {
    (
        StatusCode::OK,
        error_to_api_response::<()>(error_codes::INTERNAL_ERROR, msg.to_string()),
    )
        .into_response()
}

#[axum::debug_handler]
pub async fn list_quizzes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let Some(company_id) = claims.company() else {
        return unauthorized();
    };
    match model::list_quizzes(&state.pool, company_id).await {
        Ok(items) => (StatusCode::OK, success_to_api_response(items)).into_response(),
        Err(e) => {
            tracing::error!("查询测验列表失败: {}", e);
            internal("查询测验列表失败")
        }
    }
}

/// 测验详情；员工侧看同一接口，正确答案字段整体剥除
#[axum::debug_handler]
pub async fn quiz_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<Uuid>,
) -> Response {
    let (Some(user_id), Some(company_id)) = (claims.user_id(), claims.company()) else {
        return unauthorized();
    };

    let quiz = match model::find_quiz(&state.pool, quiz_id, company_id).await {
        Ok(Some(quiz)) => quiz,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response::<()>(error_codes::NOT_FOUND, "测验不存在".to_string()),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("查询测验失败: {}", e);
            return internal("查询测验失败");
        }
    };

    let reveal_answers = Role::effective(&state.pool, user_id).await.is_elevated();

    let questions = match model::load_questions(&state.pool, quiz.id).await {
        Ok(questions) => questions,
        Err(e) => {
            tracing::error!("查询题目失败: {}", e);
            return internal("查询题目失败");
        }
    };

    let questions = questions
        .into_iter()
        .map(|(question, options)| QuestionView {
            id: question.id,
            question_text: question.question_text,
            explanation: question.explanation,
            points: question.points,
            order_index: question.order_index,
            options: options
                .into_iter()
                .map(|option| OptionView {
                    id: option.id,
                    option_text: option.option_text,
                    order_index: option.order_index,
                    is_correct: reveal_answers.then_some(option.is_correct),
                })
                .collect(),
        })
        .collect();

    let detail = QuizDetail {
        id: quiz.id,
        title: quiz.title,
        description: quiz.description,
        pass_score: quiz.pass_score,
        is_active: quiz.is_active,
        created_at: quiz.created_at,
        questions,
    };
    (StatusCode::OK, success_to_api_response(detail)).into_response()
}

/// 按发起人职级过滤出可被分配的成员
#[axum::debug_handler]
pub async fn assignable_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let (Some(user_id), Some(company_id)) = (claims.user_id(), claims.company()) else {
        return unauthorized();
    };

    let assigner_title = match Profile::find(&state.pool, user_id).await {
        Ok(Some(profile)) => profile.job_title,
        Ok(None) => None,
        Err(e) => {
            tracing::error!("查询档案失败: {}", e);
            return internal("查询档案失败");
        }
    };

    let members = match Profile::list_members(&state.pool, company_id).await {
        Ok(members) => members,
        Err(e) => {
            tracing::error!("查询成员失败: {}", e);
            return internal("查询成员失败");
        }
    };

    let assignable: Vec<&MemberRow> = positions::filter_assignable_members(
        assigner_title.as_deref(),
        &members,
        |m: &MemberRow| m.job_title.as_deref(),
    )
    .into_iter()
    .filter(|m| m.user_id != user_id)
    .collect();

    (StatusCode::OK, success_to_api_response(assignable)).into_response()
}

/// 批量分配测验。每个目标单独校验并单独计结果，个别失败不影响其余目标
#[axum::debug_handler]
pub async fn assign_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AssignRequest>,
) -> Response {
    let (Some(user_id), Some(company_id)) = (claims.user_id(), claims.company()) else {
        return unauthorized();
    };
    if req.user_ids.is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(
                error_codes::VALIDATION_ERROR,
                "分配对象不能为空".to_string(),
            ),
        )
            .into_response();
    }

    let assigner_title = match Profile::find(&state.pool, user_id).await {
        Ok(Some(profile)) => profile.job_title,
        _ => None,
    };
    // super_admin 不受职级表约束
    let role = Role::effective(&state.pool, user_id).await;
    let exempt = role == Role::SuperAdmin;
    if !exempt && !positions::can_assign(assigner_title.as_deref()) {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(
                error_codes::PERMISSION_DENIED,
                "当前职级无分配权限".to_string(),
            ),
        )
            .into_response();
    }

    match model::find_quiz(&state.pool, req.quiz_id, company_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response::<()>(error_codes::NOT_FOUND, "测验不存在".to_string()),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("查询测验失败: {}", e);
            return internal("查询测验失败");
        }
    }

    let mut outcomes = Vec::with_capacity(req.user_ids.len());
    for target_id in req.user_ids {
        let target = match Profile::find(&state.pool, target_id).await {
            Ok(Some(profile)) if profile.company_id == company_id => profile,
            Ok(_) => {
                outcomes.push(AssignOutcome {
                    user_id: target_id,
                    status: "not_found",
                });
                continue;
            }
            Err(e) => {
                tracing::error!("查询目标档案失败: {}", e);
                outcomes.push(AssignOutcome {
                    user_id: target_id,
                    status: "error",
                });
                continue;
            }
        };

        if !exempt
            && !positions::can_assign_to_member(
                assigner_title.as_deref(),
                target.job_title.as_deref(),
            )
        {
            outcomes.push(AssignOutcome {
                user_id: target_id,
                status: "not_allowed",
            });
            continue;
        }

        match model::insert_assignment(&state.pool, req.quiz_id, target_id, user_id, req.due_date)
            .await
        {
            Ok(true) => outcomes.push(AssignOutcome {
                user_id: target_id,
                status: "assigned",
            }),
            Ok(false) => outcomes.push(AssignOutcome {
                user_id: target_id,
                status: "duplicate",
            }),
            Err(e) => {
                tracing::error!("写入分配失败: {}", e);
                outcomes.push(AssignOutcome {
                    user_id: target_id,
                    status: "error",
                });
            }
        }
    }

    (StatusCode::OK, success_to_api_response(outcomes)).into_response()
}

/// 员工端：分配给自己的测验列表
#[axum::debug_handler]
pub async fn assigned_quizzes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let Some(user_id) = claims.user_id() else {
        return unauthorized();
    };
    match model::list_assigned(&state.pool, user_id).await {
        Ok(items) => (StatusCode::OK, success_to_api_response(items)).into_response(),
        Err(e) => {
            tracing::error!("查询分配列表失败: {}", e);
            internal("查询分配列表失败")
        }
    }
}
