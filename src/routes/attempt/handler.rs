use std::collections::HashMap;

use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState, scoring,
    routes::quiz::model as quiz_model,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{self, GradedAnswer, STATUS_IN_PROGRESS};

#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub quiz_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AnswerInput {
    pub question_id: Uuid,
    pub option_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub attempt_id: Uuid,
    pub answers: Vec<AnswerInput>,
}

#[derive(Debug, Serialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: Uuid,
    pub score: i32,
    pub total_points: i32,
    pub percentage: f32,
    pub passed: bool,
    pub time_spent_secs: i32,
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

fn validation(msg: &str) -> Response {
    (
        StatusCode::OK,
        error_to_api_response::<()>(error_codes::VALIDATION_ERROR, msg.to_string()),
    )
        .into_response()
}

/// 只有被分配过的测验才能开始作答
#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartAttemptRequest>,
) -> Response {
    let (Some(user_id), Some(company_id)) = (claims.user_id(), claims.company()) else {
        return unauthorized();
    };

    match quiz_model::find_quiz(&state.pool, req.quiz_id, company_id).await {
        Ok(Some(quiz)) if quiz.is_active => {}
        Ok(_) => {
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

    let assigned = sqlx::query_as::<_, (i64,)>(
        "SELECT COUNT(*) FROM quiz_assignments WHERE quiz_id = $1 AND user_id = $2",
    )
    .bind(req.quiz_id)
    .bind(user_id)
    .fetch_one(&state.pool)
    .await;
    match assigned {
        Ok((count,)) if count > 0 => {}
        Ok(_) => {
            return (
                StatusCode::OK,
                error_to_api_response::<()>(
                    error_codes::PERMISSION_DENIED,
                    "未被分配该测验".to_string(),
                ),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("查询分配记录失败: {}", e);
            return internal("查询分配记录失败");
        }
    }

    match model::insert_attempt(&state.pool, req.quiz_id, user_id).await {
        Ok(attempt) => (StatusCode::OK, success_to_api_response(attempt)).into_response(),
        Err(e) => {
            tracing::error!("创建作答失败: {}", e);
            internal("创建作答失败")
        }
    }
}

/// 整卷提交：要求每道题恰好一个答案，选项必须属于对应题目。
/// 校验通过才写答案并判分，半途失败不会留下已完成的残卷
#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Response {
    let (Some(user_id), Some(company_id)) = (claims.user_id(), claims.company()) else {
        return unauthorized();
    };

    let attempt = match model::find_attempt(&state.pool, req.attempt_id, user_id).await {
        Ok(Some(attempt)) => attempt,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response::<()>(error_codes::NOT_FOUND, "作答记录不存在".to_string()),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("查询作答记录失败: {}", e);
            return internal("查询作答记录失败");
        }
    };
    if attempt.status != STATUS_IN_PROGRESS {
        return validation("该作答已提交");
    }

    let quiz = match quiz_model::find_quiz(&state.pool, attempt.quiz_id, company_id).await {
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

    let questions = match quiz_model::load_questions(&state.pool, quiz.id).await {
        Ok(questions) => questions,
        Err(e) => {
            tracing::error!("查询题目失败: {}", e);
            return internal("查询题目失败");
        }
    };

    let graded = match grade_submission(&questions, &req.answers) {
        Ok(graded) => graded,
        Err(msg) => return validation(msg),
    };

    let scored: Vec<(i32, bool)> = graded.iter().map(|a| (a.points, a.is_correct)).collect();
    let result = scoring::score_attempt(&scored, quiz.pass_score);

    if let Err(e) = model::insert_answers(&state.pool, attempt.id, &graded).await {
        tracing::error!("写入答案失败: {}", e);
        return internal("写入答案失败");
    }

    let time_spent_secs = (Utc::now() - attempt.started_at).num_seconds().max(0) as i32;
    match model::finalize_attempt(&state.pool, attempt.id, &result, time_spent_secs).await {
        Ok(finalized) => (
            StatusCode::OK,
            success_to_api_response(SubmitAttemptResponse {
                attempt_id: finalized.id,
                score: finalized.score,
                total_points: finalized.total_points,
                percentage: finalized.percentage,
                passed: finalized.passed,
                time_spent_secs,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("结算作答失败: {}", e);
            internal("结算作答失败")
        }
    }
}

#[axum::debug_handler]
pub async fn my_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let Some(user_id) = claims.user_id() else {
        return unauthorized();
    };
    match model::list_attempts(&state.pool, user_id).await {
        Ok(items) => (StatusCode::OK, success_to_api_response(items)).into_response(),
        Err(e) => {
            tracing::error!("查询作答历史失败: {}", e);
            internal("查询作答历史失败")
        }
    }
}

/// 整卷校验并判分：每题恰好一个答案、选项必须属于该题。
/// 任一校验不过整卷拒绝，不产生任何部分结果
fn grade_submission(
    questions: &[(quiz_model::QuestionRow, Vec<quiz_model::OptionRow>)],
    answers: &[AnswerInput],
) -> Result<Vec<GradedAnswer>, &'static str> {
    let mut chosen: HashMap<Uuid, Uuid> = HashMap::with_capacity(answers.len());
    for answer in answers {
        if chosen.insert(answer.question_id, answer.option_id).is_some() {
            return Err("同一题目重复作答");
        }
    }
    if chosen.len() != questions.len() {
        return Err("存在未作答的题目");
    }

    let mut graded = Vec::with_capacity(questions.len());
    for (question, options) in questions {
        let Some(option_id) = chosen.get(&question.id) else {
            return Err("存在未作答的题目");
        };
        let Some(option) = options.iter().find(|o| o.id == *option_id) else {
            return Err("选项与题目不匹配");
        };
        graded.push(GradedAnswer {
            question_id: question.id,
            option_id: option.id,
            points: question.points,
            is_correct: option.is_correct,
        });
    }
    Ok(graded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::quiz::model::{OptionRow, QuestionRow};

    fn question(points: i32, correct_index: usize) -> (QuestionRow, Vec<OptionRow>) {
        let question_id = Uuid::new_v4();
        let options = (0..4)
            .map(|i| OptionRow {
                id: Uuid::new_v4(),
                question_id,
                option_text: format!("보기 {}", i + 1),
                is_correct: i == correct_index,
                order_index: i as i32,
            })
            .collect();
        (
            QuestionRow {
                id: question_id,
                quiz_id: Uuid::new_v4(),
                question_text: "문항".into(),
                explanation: None,
                points,
                order_index: 0,
            },
            options,
        )
    }

    fn answer_picking(q: &(QuestionRow, Vec<OptionRow>), index: usize) -> AnswerInput {
        AnswerInput {
            question_id: q.0.id,
            option_id: q.1[index].id,
        }
    }

    #[test]
    fn grades_every_question_exactly_once() {
        let questions = vec![question(1, 0), question(1, 1), question(2, 2)];
        let answers = vec![
            answer_picking(&questions[0], 3),
            answer_picking(&questions[1], 1),
            answer_picking(&questions[2], 2),
        ];
        let graded = grade_submission(&questions, &answers).unwrap();
        assert_eq!(graded.len(), 3);
        // 每题恰好一条判分结果，重复提交也不会翻倍
        let mut ids: Vec<Uuid> = graded.iter().map(|a| a.question_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        let flags: Vec<bool> = graded.iter().map(|a| a.is_correct).collect();
        assert_eq!(flags, vec![false, true, true]);
    }

    #[test]
    fn duplicate_answer_for_same_question_rejected() {
        let questions = vec![question(1, 0)];
        let answers = vec![
            answer_picking(&questions[0], 0),
            answer_picking(&questions[0], 1),
        ];
        assert!(grade_submission(&questions, &answers).is_err());
    }

    #[test]
    fn unanswered_question_rejected() {
        let questions = vec![question(1, 0), question(1, 0)];
        let answers = vec![answer_picking(&questions[0], 0)];
        assert!(grade_submission(&questions, &answers).is_err());
    }

    #[test]
    fn option_from_another_question_rejected() {
        let questions = vec![question(1, 0), question(1, 0)];
        let answers = vec![
            AnswerInput {
                question_id: questions[0].0.id,
                option_id: questions[1].1[0].id,
            },
            answer_picking(&questions[1], 0),
        ];
        assert!(grade_submission(&questions, &answers).is_err());
    }
}
