use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// 系统角色，按优先级从高到低排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    Member,
}

/// 角色优先级顺序，解析有效角色时按此顺序扫描
pub const ROLE_PRIORITY: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Manager, Role::Member];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Member => "member",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "super_admin" => Some(Role::SuperAdmin),
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "member" => Some(Role::Member),
            _ => None,
        }
    }

    /// 管理端角色（super_admin / admin / manager）
    pub fn is_elevated(&self) -> bool {
        !matches!(self, Role::Member)
    }

    /// 查询用户的全部角色行并解析出有效角色。
    /// 查询失败时降级为 member，绝不降级为更高权限
    pub async fn effective(pool: &PgPool, user_id: Uuid) -> Role {
        let rows: Result<Vec<(String,)>, sqlx::Error> =
            sqlx::query_as("SELECT role FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(pool)
                .await;

        match rows {
            Ok(rows) => {
                let roles: Vec<Role> = rows
                    .iter()
                    .filter_map(|(r,)| Role::from_str(r))
                    .collect();
                resolve_role(&roles)
            }
            Err(e) => {
                tracing::warn!("查询用户角色失败，降级为 member: {}", e);
                Role::Member
            }
        }
    }
}

/// 从角色集合解析单一有效角色：按优先级取第一个命中的，空集合返回 member
pub fn resolve_role(roles: &[Role]) -> Role {
    for candidate in ROLE_PRIORITY {
        if roles.contains(&candidate) {
            return candidate;
        }
    }
    Role::Member
}

/// 注册时根据职级推导默认角色；公司首位用户另行赋予 super_admin
pub fn default_role_for_title(job_title: Option<&str>) -> Role {
    let level = crate::positions::position_level(job_title);
    if level <= 3 {
        Role::Admin
    } else if level <= 5 {
        Role::Manager
    } else {
        Role::Member
    }
}

/// 角色对应的前端首页路由，权限不足时作为跳转目标返回
pub fn home_for_role(role: Role) -> &'static str {
    if role.is_elevated() { "/admin" } else { "/dashboard" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_highest_priority() {
        assert_eq!(resolve_role(&[Role::Manager, Role::Member]), Role::Manager);
        assert_eq!(resolve_role(&[Role::Member, Role::Admin]), Role::Admin);
        assert_eq!(
            resolve_role(&[Role::Member, Role::Manager, Role::Admin, Role::SuperAdmin]),
            Role::SuperAdmin
        );
    }

    #[test]
    fn resolve_all_nonempty_subsets_match_priority_order() {
        // 每个非空子集的解析结果必须等于子集中优先级最靠前的成员
        for mask in 1u8..16 {
            let subset: Vec<Role> = ROLE_PRIORITY
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, r)| *r)
                .collect();
            let expected = *ROLE_PRIORITY
                .iter()
                .find(|r| subset.contains(r))
                .unwrap();
            assert_eq!(resolve_role(&subset), expected);
        }
    }

    #[test]
    fn empty_set_defaults_to_member() {
        assert_eq!(resolve_role(&[]), Role::Member);
    }

    #[test]
    fn resolve_is_idempotent() {
        let set = [Role::Admin, Role::Member];
        assert_eq!(resolve_role(&set), resolve_role(&set));
    }

    #[test]
    fn role_string_round_trip() {
        for role in ROLE_PRIORITY {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("root"), None);
    }

    #[test]
    fn default_role_follows_position_level() {
        assert_eq!(default_role_for_title(Some("이사")), Role::Admin);
        assert_eq!(default_role_for_title(Some("과장")), Role::Manager);
        assert_eq!(default_role_for_title(Some("사원")), Role::Member);
        assert_eq!(default_role_for_title(None), Role::Member);
    }

    #[test]
    fn home_routes_by_role() {
        assert_eq!(home_for_role(Role::SuperAdmin), "/admin");
        assert_eq!(home_for_role(Role::Manager), "/admin");
        assert_eq!(home_for_role(Role::Member), "/dashboard");
    }
}
