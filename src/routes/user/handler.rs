use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    roles::{self, Role},
    utils::{
        Claims, error_codes, error_to_api_response, generate_token, success_to_api_response,
        verify_password,
    },
};

use super::model::{
    LoginRequest, LoginResponse, MeResponse, Profile, RegisterRequest, RegisterResponse,
    UpdateProfileRequest, UpdateRoleRequest, User, find_or_create_company, insert_role,
    replace_roles,
};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if !req.email.contains('@') {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "邮箱格式无效".to_string()),
        );
    }
    if req.password.len() < 8 {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "密码长度不能少于8位".to_string(),
            ),
        );
    }
    if req.name.trim().is_empty() || req.company_name.trim().is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "姓名与公司名称不能为空".to_string(),
            ),
        );
    }

    let (company_id, member_count) =
        match find_or_create_company(&state.pool, req.company_name.trim()).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("创建公司失败: {}", e);
                return (
                    StatusCode::OK,
                    error_to_api_response(error_codes::INTERNAL_ERROR, "创建公司失败".to_string()),
                );
            }
        };

    let user = match User::create(&state.pool, &req.email, &req.password).await {
        Ok(user) => user,
        Err(e) => {
            if e.to_string().contains("unique constraint") {
                return (
                    StatusCode::OK,
                    error_to_api_response(error_codes::USER_EXISTS, "该邮箱已注册".to_string()),
                );
            }
            tracing::error!("创建用户失败: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "创建用户失败".to_string()),
            );
        }
    };

    if let Err(e) = Profile::create(
        &state.pool,
        user.id,
        req.name.trim(),
        req.job_title.as_deref(),
        req.department.as_deref(),
        company_id,
    )
    .await
    {
        tracing::error!("创建档案失败: {}", e);
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::INTERNAL_ERROR, "创建档案失败".to_string()),
        );
    }

    // 公司首位用户固定为 super_admin，其余按职级映射默认角色
    let role = if member_count == 0 {
        Role::SuperAdmin
    } else {
        roles::default_role_for_title(req.job_title.as_deref())
    };
    if let Err(e) = insert_role(&state.pool, user.id, role).await {
        tracing::error!("写入角色失败: {}", e);
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::INTERNAL_ERROR, "写入角色失败".to_string()),
        );
    }

    match generate_token(user.id, company_id, &state.config) {
        Ok((token, _)) => (
            StatusCode::OK,
            success_to_api_response(RegisterResponse {
                user_id: user.id,
                role,
                token,
            }),
        ),
        Err(_) => (
            StatusCode::OK,
            error_to_api_response(error_codes::INTERNAL_ERROR, "生成令牌失败".to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = match User::find_by_email(&state.pool, &req.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::AUTH_FAILED, "邮箱或密码错误".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("查询用户失败: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "登录失败".to_string()),
            );
        }
    };

    match verify_password(&req.password, &user.password_hash) {
        Ok(true) => {}
        _ => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::AUTH_FAILED, "邮箱或密码错误".to_string()),
            );
        }
    }

    let profile = match Profile::find(&state.pool, user.id).await {
        Ok(Some(profile)) => profile,
        _ => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "用户档案缺失".to_string()),
            );
        }
    };

    let role = Role::effective(&state.pool, user.id).await;

    match generate_token(user.id, profile.company_id, &state.config) {
        Ok((token, _)) => (
            StatusCode::OK,
            success_to_api_response(LoginResponse {
                user_id: user.id,
                role,
                home: roles::home_for_role(role),
                token,
            }),
        ),
        Err(_) => (
            StatusCode::OK,
            error_to_api_response(error_codes::INTERNAL_ERROR, "生成令牌失败".to_string()),
        ),
    }
}

/// 身份与角色快照，前端据此完成路由跳转
#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let Some(user_id) = claims.user_id() else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        );
    };

    let profile = match Profile::find(&state.pool, user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::NOT_FOUND, "用户档案不存在".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("查询档案失败: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询档案失败".to_string()),
            );
        }
    };

    let email = match sqlx::query_as::<_, (String,)>("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await
    {
        Ok((email,)) => email,
        Err(e) => {
            tracing::error!("查询用户失败: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询用户失败".to_string()),
            );
        }
    };

    let role = Role::effective(&state.pool, user_id).await;

    (
        StatusCode::OK,
        success_to_api_response(MeResponse {
            user_id,
            email,
            name: profile.name,
            job_title: profile.job_title,
            department: profile.department,
            company_id: profile.company_id,
            role,
            home: roles::home_for_role(role),
        }),
    )
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let Some(user_id) = claims.user_id() else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        );
    };

    match Profile::update(&state.pool, user_id, &req).await {
        Ok(Some(profile)) => (StatusCode::OK, success_to_api_response(profile)),
        Ok(None) => (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "用户档案不存在".to_string()),
        ),
        Err(e) => {
            tracing::error!("更新档案失败: {}", e);
            (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "更新档案失败".to_string()),
            )
        }
    }
}

/// 公司成员列表（管理端）
#[axum::debug_handler]
pub async fn list_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let Some(company_id) = claims.company() else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        );
    };

    match Profile::list_members(&state.pool, company_id).await {
        Ok(members) => (StatusCode::OK, success_to_api_response(members)),
        Err(e) => {
            tracing::error!("查询成员列表失败: {}", e);
            (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询成员列表失败".to_string()),
            )
        }
    }
}

/// 管理端改角色，目标必须属于同一公司
#[axum::debug_handler]
pub async fn update_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateRoleRequest>,
) -> impl IntoResponse {
    let Some(company_id) = claims.company() else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "令牌无效".to_string()),
        );
    };

    let Some(role) = Role::from_str(&req.role) else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "未知角色".to_string()),
        );
    };

    let same_company = match Profile::find(&state.pool, req.user_id).await {
        Ok(Some(profile)) => profile.company_id == company_id,
        Ok(None) => false,
        Err(e) => {
            tracing::error!("查询目标档案失败: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "更新角色失败".to_string()),
            );
        }
    };
    if !same_company {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "用户不存在".to_string()),
        );
    }

    match replace_roles(&state.pool, req.user_id, role).await {
        Ok(()) => (StatusCode::OK, success_to_api_response(())),
        Err(e) => {
            tracing::error!("更新角色失败: {}", e);
            (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "更新角色失败".to_string()),
            )
        }
    }
}
