use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ai::GeneratedQuestion;
use crate::pipeline::PipelineStage;

/// 出题向导的线性状态机：
/// Extracting → TextReview → Generating → QuizReview → TitleInput → Saving → Complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardState {
    Extracting,
    TextReview,
    Generating,
    QuizReview,
    TitleInput,
    Saving,
    Complete,
}

/// 触发状态迁移的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardEvent {
    ExtractionFinished,
    ConfirmText,
    GenerationSucceeded,
    GenerationFailed,
    ConfirmQuestions,
    StartSave,
    SaveSucceeded,
    SaveFailed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("当前状态 {state:?} 不允许该操作")]
    InvalidTransition { state: WizardState },
    #[error("{0}")]
    Validation(String),
    #[error("题目不存在")]
    QuestionNotFound,
    #[error("生成过程中不允许取消")]
    CancelBlocked,
}

/// 迁移表：当前状态 × 事件 → 下一状态，未列出的组合一律拒绝
pub fn transition(state: WizardState, event: WizardEvent) -> Result<WizardState, WizardError> {
    use WizardEvent::*;
    use WizardState::*;

    match (state, event) {
        (Extracting, ExtractionFinished) => Ok(TextReview),
        (TextReview, ConfirmText) => Ok(Generating),
        (Generating, GenerationSucceeded) => Ok(QuizReview),
        // 生成失败退回文本审阅，已编辑文本由会话保留
        (Generating, GenerationFailed) => Ok(TextReview),
        (QuizReview, ConfirmQuestions) => Ok(TitleInput),
        (TitleInput, StartSave) => Ok(Saving),
        (Saving, SaveSucceeded) => Ok(Complete),
        // 写入中途失败停留在 Saving，不做回滚；
        // 重新提交保存视为重试，原地接受
        (Saving, SaveFailed) => Ok(Saving),
        (Saving, StartSave) => Ok(Saving),
        (state, _) => Err(WizardError::InvalidTransition { state }),
    }
}

/// AI 调用进行中与落库开始后不可取消
pub fn can_cancel(state: WizardState) -> bool {
    !matches!(state, WizardState::Generating | WizardState::Saving)
}

/// 合成进度：等待生成期间按时间单调递增到 90，收到响应后由状态记 100。
/// 纯装饰用途，与真实子进度无关
pub fn synthetic_progress(elapsed_secs: i64) -> u8 {
    (10 + elapsed_secs.max(0).saturating_mul(8)).min(90) as u8
}

/// 草稿实体标识：已落库的行带服务端 id，未保存的草稿用本地序号。
/// 持久化逻辑据此判断行是否已存在，不做任何字符串前缀匹配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EntityRef {
    Saved(Uuid),
    Draft(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftOption {
    pub id: EntityRef,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftQuestion {
    pub id: EntityRef,
    pub question: String,
    pub explanation: String,
    pub points: i32,
    pub options: Vec<DraftOption>,
}

/// 向导会话，序列化后存入 Redis，带 TTL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardSession {
    pub id: Uuid,
    pub company_id: Uuid,
    pub created_by: Uuid,
    pub document_id: Uuid,
    pub document_title: String,
    pub state: WizardState,
    pub text: String,
    pub stage: PipelineStage,
    pub questions: Vec<DraftQuestion>,
    pub next_draft_id: u32,
    /// 生成调用开始的时间戳（秒），用于合成进度
    pub generation_started_at: Option<i64>,
}

impl WizardSession {
    pub fn new(
        company_id: Uuid,
        created_by: Uuid,
        document_id: Uuid,
        document_title: String,
        text: String,
        stage: PipelineStage,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            created_by,
            document_id,
            document_title,
            state: WizardState::TextReview,
            text,
            stage,
            questions: Vec::new(),
            next_draft_id: 0,
            generation_started_at: None,
        }
    }

    pub fn apply(&mut self, event: WizardEvent) -> Result<(), WizardError> {
        self.state = transition(self.state, event)?;
        if self.state == WizardState::Generating {
            self.generation_started_at = Some(Utc::now().timestamp());
        }
        Ok(())
    }

    /// 生成进度快照，0-100
    pub fn progress(&self) -> u8 {
        match self.state {
            WizardState::Generating => {
                let started = self.generation_started_at.unwrap_or_else(|| Utc::now().timestamp());
                synthetic_progress(Utc::now().timestamp() - started)
            }
            WizardState::TextReview | WizardState::Extracting => 0,
            _ => 100,
        }
    }

    /// 生成成功：为每道题和选项分配本地草稿标识，进入题目审阅
    pub fn accept_generated(&mut self, generated: Vec<GeneratedQuestion>) -> Result<(), WizardError> {
        self.apply(WizardEvent::GenerationSucceeded)?;
        let mut questions = Vec::with_capacity(generated.len());
        for q in generated {
            let mut options = Vec::with_capacity(q.options.len());
            for o in q.options {
                options.push(DraftOption {
                    id: self.next_ref(),
                    text: o.text,
                    is_correct: o.is_correct,
                });
            }
            questions.push(DraftQuestion {
                id: self.next_ref(),
                question: q.question,
                explanation: q.explanation,
                points: 1,
                options,
            });
        }
        self.questions = questions;
        Ok(())
    }

    fn next_ref(&mut self) -> EntityRef {
        let id = self.next_draft_id;
        self.next_draft_id += 1;
        EntityRef::Draft(id)
    }

    fn question_mut(&mut self, id: EntityRef) -> Result<&mut DraftQuestion, WizardError> {
        self.questions
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or(WizardError::QuestionNotFound)
    }

    pub fn update_question(
        &mut self,
        id: EntityRef,
        question: Option<String>,
        explanation: Option<String>,
        option_texts: Option<Vec<String>>,
    ) -> Result<(), WizardError> {
        self.require_state(WizardState::QuizReview)?;
        let q = self.question_mut(id)?;
        if let Some(text) = question {
            q.question = text;
        }
        if let Some(text) = explanation {
            q.explanation = text;
        }
        if let Some(texts) = option_texts {
            if texts.len() != q.options.len() {
                return Err(WizardError::Validation("选项数不可变更".into()));
            }
            for (option, text) in q.options.iter_mut().zip(texts) {
                option.text = text;
            }
        }
        Ok(())
    }

    /// 把某个选项标为正确答案，并清除该题其它选项的正确标记。
    /// 编辑期就地维持单一正确答案不变量
    pub fn mark_correct(&mut self, id: EntityRef, option_index: usize) -> Result<(), WizardError> {
        self.require_state(WizardState::QuizReview)?;
        let q = self.question_mut(id)?;
        if option_index >= q.options.len() {
            return Err(WizardError::Validation("选项序号越界".into()));
        }
        for (i, option) in q.options.iter_mut().enumerate() {
            option.is_correct = i == option_index;
        }
        Ok(())
    }

    /// 只从内存工作集中移除，落库前不影响任何已持久化行
    pub fn delete_question(&mut self, id: EntityRef) -> Result<(), WizardError> {
        self.require_state(WizardState::QuizReview)?;
        let before = self.questions.len();
        self.questions.retain(|q| q.id != id);
        if self.questions.len() == before {
            return Err(WizardError::QuestionNotFound);
        }
        Ok(())
    }

    /// 进入标题录入前的校验：至少一题，每题题干非空且有正确选项。
    /// 违反时阻塞迁移并返回校验消息，不做静默修正
    pub fn confirm_questions(&mut self) -> Result<(), WizardError> {
        self.require_state(WizardState::QuizReview)?;
        if self.questions.is_empty() {
            return Err(WizardError::Validation("至少需要保留一道题目".into()));
        }
        for (i, q) in self.questions.iter().enumerate() {
            if q.question.trim().is_empty() {
                return Err(WizardError::Validation(format!("第 {} 题题干为空", i + 1)));
            }
            if !q.options.iter().any(|o| o.is_correct) {
                return Err(WizardError::Validation(format!(
                    "第 {} 题未标记正确答案",
                    i + 1
                )));
            }
        }
        self.apply(WizardEvent::ConfirmQuestions)
    }

    pub fn require_state(&self, expected: WizardState) -> Result<(), WizardError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WizardError::InvalidTransition { state: self.state })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{GeneratedOption, GeneratedQuestion};

    fn generated(correct_index: usize) -> GeneratedQuestion {
        GeneratedQuestion {
            question: "다음 중 맞는 것은?".into(),
            options: (0..4)
                .map(|i| GeneratedOption {
                    text: format!("보기 {}", i + 1),
                    is_correct: i == correct_index,
                })
                .collect(),
            explanation: "해설".into(),
        }
    }

    fn session_in_review(question_count: usize) -> WizardSession {
        let mut session = WizardSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "入社ガイド.pdf".into(),
            "정리된 본문".into(),
            PipelineStage::Formatted,
        );
        session.apply(WizardEvent::ConfirmText).unwrap();
        session
            .accept_generated((0..question_count).map(|_| generated(0)).collect())
            .unwrap();
        session
    }

    #[test]
    fn happy_path_walks_all_states() {
        let mut state = WizardState::Extracting;
        for event in [
            WizardEvent::ExtractionFinished,
            WizardEvent::ConfirmText,
            WizardEvent::GenerationSucceeded,
            WizardEvent::ConfirmQuestions,
            WizardEvent::StartSave,
            WizardEvent::SaveSucceeded,
        ] {
            state = transition(state, event).unwrap();
        }
        assert_eq!(state, WizardState::Complete);
    }

    #[test]
    fn generation_failure_returns_to_text_review() {
        assert_eq!(
            transition(WizardState::Generating, WizardEvent::GenerationFailed).unwrap(),
            WizardState::TextReview
        );
    }

    #[test]
    fn save_failure_stays_in_saving() {
        assert_eq!(
            transition(WizardState::Saving, WizardEvent::SaveFailed).unwrap(),
            WizardState::Saving
        );
    }

    #[test]
    fn save_failure_allows_retry_to_completion() {
        // 失败后再次提交保存必须被接受，否则会话卡死到 TTL 过期
        let mut state = transition(WizardState::Saving, WizardEvent::SaveFailed).unwrap();
        state = transition(state, WizardEvent::StartSave).unwrap();
        assert_eq!(state, WizardState::Saving);
        assert_eq!(
            transition(state, WizardEvent::SaveSucceeded).unwrap(),
            WizardState::Complete
        );
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(transition(WizardState::TextReview, WizardEvent::StartSave).is_err());
        assert!(transition(WizardState::Complete, WizardEvent::ConfirmText).is_err());
        assert!(transition(WizardState::QuizReview, WizardEvent::GenerationSucceeded).is_err());
    }

    #[test]
    fn cancel_blocked_while_generating_and_saving() {
        assert!(can_cancel(WizardState::TextReview));
        assert!(can_cancel(WizardState::QuizReview));
        assert!(!can_cancel(WizardState::Generating));
        assert!(!can_cancel(WizardState::Saving));
    }

    #[test]
    fn synthetic_progress_is_monotone_and_capped() {
        let mut last = 0;
        for secs in 0..30 {
            let p = synthetic_progress(secs);
            assert!(p >= last);
            assert!(p <= 90);
            last = p;
        }
        assert_eq!(synthetic_progress(600), 90);
    }

    #[test]
    fn generation_failure_preserves_edited_text() {
        let mut session = WizardSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "guide.pdf".into(),
            "원본".into(),
            PipelineStage::Raw,
        );
        session.text = "편집된 본문".into();
        session.apply(WizardEvent::ConfirmText).unwrap();
        session.apply(WizardEvent::GenerationFailed).unwrap();
        assert_eq!(session.state, WizardState::TextReview);
        assert_eq!(session.text, "편집된 본문");
    }

    #[test]
    fn mark_correct_clears_siblings() {
        // 初始正确答案在 0 号，改标 2 号后其余必须全部清除
        let mut session = session_in_review(1);
        let id = session.questions[0].id;
        session.mark_correct(id, 2).unwrap();
        let flags: Vec<bool> = session.questions[0]
            .options
            .iter()
            .map(|o| o.is_correct)
            .collect();
        assert_eq!(flags, vec![false, false, true, false]);

        // 任意先前配置下再标 1 号，仍只有一个正确
        session.questions[0].options[3].is_correct = true;
        session.mark_correct(id, 1).unwrap();
        let count = session.questions[0]
            .options
            .iter()
            .filter(|o| o.is_correct)
            .count();
        assert_eq!(count, 1);
        assert!(session.questions[0].options[1].is_correct);
    }

    #[test]
    fn delete_question_shrinks_working_set_only() {
        let mut session = session_in_review(2);
        let id = session.questions[0].id;
        session.delete_question(id).unwrap();
        assert_eq!(session.questions.len(), 1);
        assert!(matches!(
            session.delete_question(id),
            Err(WizardError::QuestionNotFound)
        ));
    }

    #[test]
    fn confirm_requires_at_least_one_question() {
        let mut session = session_in_review(1);
        let id = session.questions[0].id;
        session.delete_question(id).unwrap();
        assert!(matches!(
            session.confirm_questions(),
            Err(WizardError::Validation(_))
        ));
        assert_eq!(session.state, WizardState::QuizReview);
    }

    #[test]
    fn confirm_requires_text_and_correct_option() {
        let mut session = session_in_review(1);
        session.questions[0].question = "  ".into();
        assert!(session.confirm_questions().is_err());

        session.questions[0].question = "질문".into();
        for option in &mut session.questions[0].options {
            option.is_correct = false;
        }
        assert!(session.confirm_questions().is_err());

        session.questions[0].options[0].is_correct = true;
        session.confirm_questions().unwrap();
        assert_eq!(session.state, WizardState::TitleInput);
    }

    #[test]
    fn draft_ids_are_unique() {
        let session = session_in_review(3);
        let mut ids: Vec<EntityRef> = session.questions.iter().map(|q| q.id).collect();
        for q in &session.questions {
            ids.extend(q.options.iter().map(|o| o.id));
        }
        let unique: std::collections::HashSet<EntityRef> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn update_question_rejects_option_count_change() {
        let mut session = session_in_review(1);
        let id = session.questions[0].id;
        assert!(
            session
                .update_question(id, None, None, Some(vec!["하나".into()]))
                .is_err()
        );
        session
            .update_question(
                id,
                Some("새 질문".into()),
                None,
                Some(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
            )
            .unwrap();
        assert_eq!(session.questions[0].question, "새 질문");
        assert_eq!(session.questions[0].options[2].text, "c");
    }
}
