/// 测验计分：按题目分值累加答对的分数，换算百分比后与及格线比较

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    pub score: i32,
    pub total_points: i32,
    pub percentage: f32,
    pub passed: bool,
}

/// `answers` 中每项为 (题目分值, 选中的选项是否为正确答案)。
/// 总分为 0 时百分比记 0，避免除零
pub fn score_attempt(answers: &[(i32, bool)], pass_score: i32) -> ScoreResult {
    let total_points: i32 = answers.iter().map(|(points, _)| points).sum();
    let score: i32 = answers
        .iter()
        .filter(|(_, correct)| *correct)
        .map(|(points, _)| points)
        .sum();

    let percentage = if total_points > 0 {
        score as f32 * 100.0 / total_points as f32
    } else {
        0.0
    };

    ScoreResult {
        score,
        total_points,
        percentage,
        passed: percentage >= pass_score as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_two_point_question_correct_yields_fifty_percent() {
        let result = score_attempt(&[(1, false), (1, false), (2, true)], 70);
        assert_eq!(result.score, 2);
        assert_eq!(result.total_points, 4);
        assert_eq!(result.percentage, 50.0);
        assert!(!result.passed);
    }

    #[test]
    fn all_correct_passes() {
        let result = score_attempt(&[(1, true), (1, true), (2, true)], 70);
        assert_eq!(result.percentage, 100.0);
        assert!(result.passed);
    }

    #[test]
    fn pass_threshold_is_inclusive() {
        // 10 题答对 7 题，及格线 70 → 恰好及格
        let answers: Vec<(i32, bool)> = (0..10).map(|i| (1, i < 7)).collect();
        let result = score_attempt(&answers, 70);
        assert_eq!(result.percentage, 70.0);
        assert!(result.passed);
    }

    #[test]
    fn empty_quiz_scores_zero_without_panic() {
        let result = score_attempt(&[], 70);
        assert_eq!(result.total_points, 0);
        assert_eq!(result.percentage, 0.0);
        assert!(!result.passed);
    }

    #[test]
    fn scoring_is_deterministic() {
        let answers = [(1, true), (3, false), (2, true)];
        assert_eq!(score_attempt(&answers, 60), score_attempt(&answers, 60));
    }
}
