use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState, extract, highlight, pipeline, positions,
    roles::Role,
    routes::category::model as category_model,
    routes::document::model::{Document, STATUS_APPROVED, STATUS_FAILED},
    routes::user::model::Profile,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
    wizard::{EntityRef, WizardError, WizardEvent, WizardSession, WizardState, can_cancel},
};

use super::model::{self, DEFAULT_PASS_SCORE};

/// 分类建议调用截取的文档文本长度（字符）
const SUGGEST_TEXT_LIMIT: usize = 8000;

#[derive(Debug, Deserialize)]
pub struct StartWizardRequest {
    pub document_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SessionIdQuery {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTextRequest {
    pub session_id: Uuid,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub session_id: Uuid,
    pub question_id: EntityRef,
    pub question: Option<String>,
    pub explanation: Option<String>,
    pub option_texts: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct MarkCorrectRequest {
    pub session_id: Uuid,
    pub question_id: EntityRef,
    pub option_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuestionRequest {
    pub session_id: Uuid,
    pub question_id: EntityRef,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuestionsRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SuggestCategoriesRequest {
    pub session_id: Uuid,
    pub quiz_title: String,
}

#[derive(Debug, Deserialize)]
pub struct LevelInput {
    pub name: String,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryPathInput {
    pub level1: LevelInput,
    pub level2: LevelInput,
    pub level3: LevelInput,
}

#[derive(Debug, Deserialize)]
pub struct SaveWizardRequest {
    pub session_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub pass_score: Option<i32>,
    pub category: CategoryPathInput,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct WizardSnapshot {
    pub session_id: Uuid,
    pub state: WizardState,
    pub progress: u8,
    pub stage: pipeline::PipelineStage,
    pub text: String,
    pub paragraphs: Vec<highlight::Paragraph>,
    pub questions: Vec<crate::wizard::DraftQuestion>,
}

impl WizardSnapshot {
    fn from_session(session: &WizardSession) -> Self {
        Self {
            session_id: session.id,
            state: session.state,
            progress: session.progress(),
            stage: session.stage,
            text: session.text.clone(),
            paragraphs: highlight::render(&session.text),
            questions: session.questions.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaveWizardResponse {
    pub quiz_id: Uuid,
    pub category_id: Uuid,
}

fn wizard_error_code(e: &WizardError) -> i32 {
    match e {
        WizardError::Validation(_) => error_codes::VALIDATION_ERROR,
        WizardError::QuestionNotFound => error_codes::NOT_FOUND,
        WizardError::InvalidTransition { .. } | WizardError::CancelBlocked => {
            error_codes::WIZARD_STATE_ERROR
        }
    }
}

fn wizard_error_response(e: &WizardError) -> Response {
    (
        StatusCode::OK,
        error_to_api_response::<()>(wizard_error_code(e), e.to_string()),
    )
        .into_response()
}

fn session_expired_response() -> Response {
    (
        StatusCode::OK,
        error_to_api_response::<()>(
            error_codes::WIZARD_SESSION_EXPIRED,
            "向导会话不存在或已过期".to_string(),
        ),
    )
        .into_response()
}

fn internal_response(msg: &str) -> Response {
    (
        StatusCode::OK,
        error_to_api_response::<()>(error_codes::INTERNAL_ERROR, msg.to_string()),
    )
        .into_response()
}

/// 会话归属校验：发起人与公司都必须匹配
async fn load_owned_session(
    state: &AppState,
    claims: &Claims,
    session_id: Uuid,
) -> Result<WizardSession, Response> {
    let (Some(user_id), Some(company_id)) = (claims.user_id(), claims.company()) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        )
            .into_response());
    };

    match model::load_session(&state.redis, session_id).await {
        Ok(Some(session)) if session.created_by == user_id && session.company_id == company_id => {
            Ok(session)
        }
        Ok(_) => Err(session_expired_response()),
        Err(e) => {
            tracing::error!("读取会话失败: {}", e);
            Err(internal_response("读取会话失败"))
        }
    }
}

async fn store_and_snapshot(state: &AppState, session: &WizardSession) -> Response {
    if let Err(e) =
        model::store_session(&state.redis, session, state.config.wizard_session_ttl_secs).await
    {
        tracing::error!("保存会话失败: {}", e);
        return internal_response("保存会话失败");
    }
    (
        StatusCode::OK,
        success_to_api_response(WizardSnapshot::from_session(session)),
    )
        .into_response()
}

/// 启动向导：复用缓存文本或执行 抽取 → 整理管线，落到文本审阅态。
/// 抽取不到任何文本对该文档是终态失败，绝不再调用 AI 链路
#[axum::debug_handler]
pub async fn start_wizard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartWizardRequest>,
) -> Response {
    let (Some(user_id), Some(company_id)) = (claims.user_id(), claims.company()) else {
        return (
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        )
            .into_response();
    };

    // 职级门槛：super_admin 豁免，其余按职级表
    let job_title = match Profile::find(&state.pool, user_id).await {
        Ok(Some(profile)) => profile.job_title,
        _ => None,
    };
    let role = Role::effective(&state.pool, user_id).await;
    if role != Role::SuperAdmin && !positions::can_create_quiz(job_title.as_deref()) {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(
                error_codes::PERMISSION_DENIED,
                "当前职级无出题权限".to_string(),
            ),
        )
            .into_response();
    }

    let document = match Document::find(&state.pool, req.document_id, company_id).await {
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
            return internal_response("查询文档失败");
        }
    };

    // 已处理过的文档直接复用缓存文本，不再抽取与调用 AI
    if let Some(cached) = document.ocr_text.as_deref() {
        if highlight::is_processed(cached) {
            let session = WizardSession::new(
                company_id,
                user_id,
                document.id,
                document.file_name.clone(),
                cached.to_string(),
                pipeline::PipelineStage::Formatted,
            );
            return store_and_snapshot(&state, &session).await;
        }
    }

    if !extract::is_extractable(&document.content_type, &document.file_name) {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(
                error_codes::EXTRACTION_UNSUPPORTED,
                "该文件类型不支持自动抽取，请下载原文件人工处理".to_string(),
            ),
        )
            .into_response();
    }

    let bytes = match tokio::fs::read(&document.file_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("读取文件失败: {}", e);
            return internal_response("读取文件失败");
        }
    };

    let raw = match extract::extract_pdf_text(&bytes) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("文本抽取失败: document_id={} err={}", document.id, e);
            if let Err(e) = Document::update_status(&state.pool, document.id, STATUS_FAILED).await {
                tracing::error!("更新文档状态失败: {}", e);
            }
            return (
                StatusCode::OK,
                error_to_api_response::<()>(
                    error_codes::EXTRACTION_FAILED,
                    "未找到可抽取的文本，请下载原文件人工处理".to_string(),
                ),
            )
                .into_response();
        }
    };

    let outcome = pipeline::run(&state.ai, &raw).await;
    // 整理结果写回缓存，失败只记日志
    if let Err(e) = Document::update_ocr_text(&state.pool, document.id, &outcome.text).await {
        tracing::warn!("缓存整理文本失败: {}", e);
    }

    let session = WizardSession::new(
        company_id,
        user_id,
        document.id,
        document.file_name.clone(),
        outcome.text,
        outcome.stage,
    );
    store_and_snapshot(&state, &session).await
}

#[axum::debug_handler]
pub async fn wizard_state(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SessionIdQuery>,
) -> Response {
    match load_owned_session(&state, &claims, query.session_id).await {
        Ok(session) => (
            StatusCode::OK,
            success_to_api_response(WizardSnapshot::from_session(&session)),
        )
            .into_response(),
        Err(response) => response,
    }
}

#[axum::debug_handler]
pub async fn update_text(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateTextRequest>,
) -> Response {
    let mut session = match load_owned_session(&state, &claims, req.session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if let Err(e) = session.require_state(WizardState::TextReview) {
        return wizard_error_response(&e);
    }
    if req.text.trim().is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(
                error_codes::VALIDATION_ERROR,
                "文本内容不能为空".to_string(),
            ),
        )
            .into_response();
    }
    session.text = req.text;
    store_and_snapshot(&state, &session).await
}

/// 文本确认后调用 AI 生成题目；失败退回文本审阅并保留编辑内容
#[axum::debug_handler]
pub async fn generate_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GenerateRequest>,
) -> Response {
    let mut session = match load_owned_session(&state, &claims, req.session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    if let Err(e) = session.apply(WizardEvent::ConfirmText) {
        return wizard_error_response(&e);
    }
    // 先落 Generating 态，让并发的状态查询能看到合成进度
    if let Err(e) =
        model::store_session(&state.redis, &session, state.config.wizard_session_ttl_secs).await
    {
        tracing::error!("保存会话失败: {}", e);
        return internal_response("保存会话失败");
    }

    match state.ai.generate_questions(&session.text).await {
        Ok(generated) => {
            if let Err(e) = session.accept_generated(generated) {
                return wizard_error_response(&e);
            }
            store_and_snapshot(&state, &session).await
        }
        Err(e) => {
            tracing::warn!("AI 生成题目失败: {}", e);
            // 编辑过的文本保留在会话里，重试无数据丢失
            if let Err(apply_err) = session.apply(WizardEvent::GenerationFailed) {
                return wizard_error_response(&apply_err);
            }
            if let Err(store_err) =
                model::store_session(&state.redis, &session, state.config.wizard_session_ttl_secs)
                    .await
            {
                tracing::error!("保存会话失败: {}", store_err);
            }
            (StatusCode::OK, error_to_api_response::<()>(e.code(), e.to_string())).into_response()
        }
    }
}

#[axum::debug_handler]
pub async fn update_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateQuestionRequest>,
) -> Response {
    let mut session = match load_owned_session(&state, &claims, req.session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if let Err(e) =
        session.update_question(req.question_id, req.question, req.explanation, req.option_texts)
    {
        return wizard_error_response(&e);
    }
    store_and_snapshot(&state, &session).await
}

#[axum::debug_handler]
pub async fn mark_correct(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkCorrectRequest>,
) -> Response {
    let mut session = match load_owned_session(&state, &claims, req.session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if let Err(e) = session.mark_correct(req.question_id, req.option_index) {
        return wizard_error_response(&e);
    }
    store_and_snapshot(&state, &session).await
}

#[axum::debug_handler]
pub async fn delete_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteQuestionRequest>,
) -> Response {
    let mut session = match load_owned_session(&state, &claims, req.session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if let Err(e) = session.delete_question(req.question_id) {
        return wizard_error_response(&e);
    }
    store_and_snapshot(&state, &session).await
}

#[axum::debug_handler]
pub async fn confirm_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ConfirmQuestionsRequest>,
) -> Response {
    let mut session = match load_owned_session(&state, &claims, req.session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if let Err(e) = session.confirm_questions() {
        return wizard_error_response(&e);
    }
    store_and_snapshot(&state, &session).await
}

/// 标题录入阶段的 AI 分类建议；响应不合约定时整体拒绝，分类列表保持为空
#[axum::debug_handler]
pub async fn suggest_categories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SuggestCategoriesRequest>,
) -> Response {
    let session = match load_owned_session(&state, &claims, req.session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if let Err(e) = session.require_state(WizardState::TitleInput) {
        return wizard_error_response(&e);
    }

    let company_name = match sqlx::query_as::<_, (String,)>(
        "SELECT name FROM companies WHERE id = $1",
    )
    .bind(session.company_id)
    .fetch_one(&state.pool)
    .await
    {
        Ok((name,)) => name,
        Err(e) => {
            tracing::error!("查询公司失败: {}", e);
            return internal_response("查询公司失败");
        }
    };

    let text: String = session.text.chars().take(SUGGEST_TEXT_LIMIT).collect();
    match state
        .ai
        .suggest_categories(&company_name, &session.document_title, &req.quiz_title, &text)
        .await
    {
        Ok(paths) => (StatusCode::OK, success_to_api_response(paths)).into_response(),
        Err(e) => {
            tracing::warn!("分类建议失败: {}", e);
            (StatusCode::OK, error_to_api_response::<()>(e.code(), e.to_string())).into_response()
        }
    }
}

/// 保存链路：分类建链 → 测验 → 题目 → 选项 → 文档置 approved。
/// 中途失败报告错误并停留在 Saving，不做补偿回滚
#[axum::debug_handler]
pub async fn save_wizard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SaveWizardRequest>,
) -> Response {
    let mut session = match load_owned_session(&state, &claims, req.session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let title = req.title.trim();
    if title.is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response::<()>(
                error_codes::VALIDATION_ERROR,
                "测验标题不能为空".to_string(),
            ),
        )
            .into_response();
    }

    if let Err(e) = session.apply(WizardEvent::StartSave) {
        return wizard_error_response(&e);
    }
    if let Err(e) =
        model::store_session(&state.redis, &session, state.config.wizard_session_ttl_secs).await
    {
        tracing::error!("保存会话失败: {}", e);
        return internal_response("保存会话失败");
    }

    let path = resolve_category_path(&req.category);
    let save_result = async {
        let category_id = category_model::ensure_path(
            &state.pool,
            session.company_id,
            &path,
            Some(session.document_id),
        )
        .await?;
        let quiz_id = model::persist_wizard_quiz(
            &state.pool,
            &session,
            category_id,
            title,
            req.description.as_deref(),
            req.pass_score.unwrap_or(DEFAULT_PASS_SCORE),
        )
        .await?;
        Document::update_status(&state.pool, session.document_id, STATUS_APPROVED).await?;
        Ok::<(Uuid, Uuid), sqlx::Error>((quiz_id, category_id))
    }
    .await;

    match save_result {
        Ok((quiz_id, category_id)) => {
            if let Err(e) = session.apply(WizardEvent::SaveSucceeded) {
                return wizard_error_response(&e);
            }
            if let Err(e) =
                model::store_session(&state.redis, &session, state.config.wizard_session_ttl_secs)
                    .await
            {
                tracing::warn!("保存会话失败: {}", e);
            }
            (
                StatusCode::OK,
                success_to_api_response(SaveWizardResponse {
                    quiz_id,
                    category_id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("保存测验失败（可能存在部分写入）: {}", e);
            if let Err(apply_err) = session.apply(WizardEvent::SaveFailed) {
                return wizard_error_response(&apply_err);
            }
            if let Err(store_err) =
                model::store_session(&state.redis, &session, state.config.wizard_session_ttl_secs)
                    .await
            {
                tracing::error!("保存会话失败: {}", store_err);
            }
            internal_response("保存测验失败，请重试")
        }
    }
}

/// 生成与落库进行中不可取消；其余状态丢弃会话即可，尚无任何持久化副作用
#[axum::debug_handler]
pub async fn cancel_wizard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CancelRequest>,
) -> Response {
    let session = match load_owned_session(&state, &claims, req.session_id).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    if !can_cancel(session.state) {
        return wizard_error_response(&WizardError::CancelBlocked);
    }
    if let Err(e) = model::delete_session(&state.redis, session.id).await {
        tracing::error!("删除会话失败: {}", e);
        return internal_response("删除会话失败");
    }
    (StatusCode::OK, success_to_api_response(())).into_response()
}

/// 建议路径自带 slug 直接沿用，手工输入的层级由名称派生
fn resolve_category_path(input: &CategoryPathInput) -> crate::ai::CategoryPath {
    let level = |level: &LevelInput| crate::ai::CategoryLevel {
        name: level.name.clone(),
        slug: level
            .slug
            .clone()
            .filter(|slug| !slug.trim().is_empty())
            .unwrap_or_else(|| crate::utils::slugify(&level.name)),
    };
    crate::ai::CategoryPath {
        level1: level(&input.level1),
        level2: level(&input.level2),
        level3: level(&input.level3),
    }
}
