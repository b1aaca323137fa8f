use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    AppState,
    roles::{Role, home_for_role},
    utils::{ApiResponse, Claims, error_codes, error_to_api_response},
};

#[derive(Serialize)]
struct RedirectData {
    redirect_to: &'static str,
}

/// 管理端路由守卫：每个请求重新解析有效角色（失败降级为 member）。
/// 权限不足不报硬错误，返回角色对应首页作为跳转目标
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(user_id) = request
        .extensions()
        .get::<Claims>()
        .and_then(|claims| claims.user_id())
    else {
        return (
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(error_codes::AUTH_FAILED, "认证失败，请重新登录".into()),
        )
            .into_response();
    };

    let role = Role::effective(&state.pool, user_id).await;
    if role.is_elevated() {
        next.run(request).await
    } else {
        (
            StatusCode::OK,
            Json(ApiResponse {
                code: error_codes::PERMISSION_DENIED,
                msg: "无访问权限".into(),
                resp_data: Some(RedirectData {
                    redirect_to: home_for_role(role),
                }),
            }),
        )
            .into_response()
    }
}
