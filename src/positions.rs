/// 职级表：职位名称到职级与权限的静态映射。
/// 这是组织策略而非租户数据，所有公司共用同一张表（已知限制）

/// 未知或缺失职位的哨兵职级，永远排在最末
pub const UNKNOWN_LEVEL: i32 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionInfo {
    pub level: i32,
    pub can_create_quiz: bool,
    pub can_assign: bool,
}

// 数字越小职级越高
const POSITIONS: [(&str, PositionInfo); 8] = [
    ("대표", PositionInfo { level: 1, can_create_quiz: true, can_assign: true }),
    ("이사", PositionInfo { level: 2, can_create_quiz: true, can_assign: true }),
    ("부장", PositionInfo { level: 3, can_create_quiz: true, can_assign: true }),
    ("차장", PositionInfo { level: 4, can_create_quiz: true, can_assign: true }),
    ("과장", PositionInfo { level: 5, can_create_quiz: true, can_assign: true }),
    ("대리", PositionInfo { level: 6, can_create_quiz: false, can_assign: true }),
    ("주임", PositionInfo { level: 7, can_create_quiz: false, can_assign: false }),
    ("사원", PositionInfo { level: 8, can_create_quiz: false, can_assign: false }),
];

pub fn position_info(job_title: &str) -> Option<&'static PositionInfo> {
    POSITIONS
        .iter()
        .find(|(title, _)| *title == job_title)
        .map(|(_, info)| info)
}

/// 未知或缺失的职位返回哨兵值 999，缺失职位绝不授予更高权限
pub fn position_level(job_title: Option<&str>) -> i32 {
    job_title
        .and_then(position_info)
        .map(|info| info.level)
        .unwrap_or(UNKNOWN_LEVEL)
}

/// 只能向严格低于自己职级的人分配测验，同级之间互相不可分配
pub fn can_assign_to_member(assigner_title: Option<&str>, target_title: Option<&str>) -> bool {
    position_level(target_title) > position_level(assigner_title)
}

/// 按分配规则过滤成员列表，保留可被分配的子集
pub fn filter_assignable_members<'a, T>(
    assigner_title: Option<&str>,
    members: &'a [T],
    title_of: impl Fn(&T) -> Option<&str>,
) -> Vec<&'a T> {
    members
        .iter()
        .filter(|m| can_assign_to_member(assigner_title, title_of(m)))
        .collect()
}

pub fn can_create_quiz(job_title: Option<&str>) -> bool {
    job_title
        .and_then(position_info)
        .map(|info| info.can_create_quiz)
        .unwrap_or(false)
}

pub fn can_assign(job_title: Option<&str>) -> bool {
    job_title
        .and_then(position_info)
        .map(|info| info.can_assign)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_title_fails_closed() {
        assert_eq!(position_level(None), 999);
        assert_eq!(position_level(Some("인턴")), 999);
        assert!(!can_create_quiz(None));
        assert!(!can_create_quiz(Some("인턴")));
        assert!(!can_assign(None));
        assert!(!can_assign(Some("인턴")));
    }

    #[test]
    fn assignment_is_strictly_downward() {
        assert!(can_assign_to_member(Some("이사"), Some("사원")));
        assert!(!can_assign_to_member(Some("사원"), Some("이사")));
    }

    #[test]
    fn peers_cannot_assign_to_each_other() {
        for (title, _) in POSITIONS {
            assert!(
                !can_assign_to_member(Some(title), Some(title)),
                "同级分配必须被拒绝: {}",
                title
            );
        }
        // 双方职位都未知时同为 999，同样拒绝
        assert!(!can_assign_to_member(None, None));
    }

    #[test]
    fn unknown_target_ranks_below_everyone() {
        assert!(can_assign_to_member(Some("사원"), Some("인턴")));
        assert!(!can_assign_to_member(Some("인턴"), Some("사원")));
    }

    #[test]
    fn filter_keeps_only_assignable() {
        let members = vec![
            ("kim", Some("사원")),
            ("lee", Some("이사")),
            ("park", Some("부장")),
            ("choi", None),
        ];
        let assignable =
            filter_assignable_members(Some("부장"), &members, |(_, title)| *title);
        let names: Vec<&str> = assignable.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["kim", "choi"]);
    }
}
