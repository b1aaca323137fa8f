use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 每道生成题的固定选项数
pub const OPTION_COUNT: usize = 4;
/// 分类建议必须恰好返回的路径数
pub const SUGGESTED_PATH_COUNT: usize = 3;

#[derive(Debug, Error)]
pub enum AiError {
    /// 上游返回 429
    #[error("AI 服务请求过于频繁，请稍后重试")]
    RateLimited,
    /// 上游返回 402
    #[error("AI 服务额度不足")]
    PaymentRequired,
    #[error("AI 服务调用失败: {0}")]
    Upstream(String),
    #[error("请求 AI 服务失败: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP 调用成功但响应内容不符合约定，整体拒绝
    #[error("AI 服务返回格式无效: {0}")]
    InvalidResponse(String),
}

impl AiError {
    /// 对应的接口错误码，限流与额度问题单独区分
    pub fn code(&self) -> i32 {
        use crate::utils::error_codes;
        match self {
            AiError::RateLimited => error_codes::AI_RATE_LIMITED,
            AiError::PaymentRequired => error_codes::AI_PAYMENT_REQUIRED,
            AiError::InvalidResponse(_) => error_codes::AI_INVALID_RESPONSE,
            AiError::Upstream(_) | AiError::Network(_) => error_codes::AI_SERVICE_ERROR,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryLevel {
    pub name: String,
    pub slug: String,
}

/// 三级分类路径（大/中/小分类，各带规范化 slug）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryPath {
    pub level1: CategoryLevel,
    pub level2: CategoryLevel,
    pub level3: CategoryLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedOption {
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
    pub options: Vec<GeneratedOption>,
    pub explanation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedQuizTree {
    pub categories: Vec<GeneratedCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedCategory {
    pub name: String,
    pub quizzes: Vec<GeneratedQuiz>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedQuiz {
    pub title: String,
    pub question: GeneratedQuestion,
}

#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CleanResponse {
    cleaned_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormatResponse {
    formatted_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HighlightResponse {
    highlighted_text: String,
}

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    suggested_category_paths: Vec<WireCategoryPath>,
}

#[derive(Debug, Deserialize)]
struct WireCategoryPath {
    level1: Option<WireCategoryLevel>,
    level2: Option<WireCategoryLevel>,
    level3: Option<WireCategoryLevel>,
}

#[derive(Debug, Deserialize)]
struct WireCategoryLevel {
    name: Option<String>,
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    questions: Vec<GeneratedQuestion>,
}

impl AiClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T, AiError> {
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, endpoint))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AiError::RateLimited);
        }
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            return Err(AiError::PaymentRequired);
        }
        if !status.is_success() {
            let msg = response
                .json::<UpstreamError>()
                .await
                .ok()
                .and_then(|e| e.error)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(AiError::Upstream(msg));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))
    }

    /// 清理 OCR 噪声（URL、残缺标记、断行），保留原结构与措辞
    pub async fn clean_text(&self, text: &str) -> Result<String, AiError> {
        let resp: CleanResponse = self
            .call("clean-ocr-text", &serde_json::json!({ "text": text }))
            .await?;
        Ok(resp.cleaned_text)
    }

    /// 重组为固定章节结构并插入 <highlight> 标记
    pub async fn format_text(&self, text: &str) -> Result<String, AiError> {
        let resp: FormatResponse = self
            .call("format-ocr-text", &serde_json::json!({ "text": text }))
            .await?;
        Ok(resp.formatted_text)
    }

    /// 仅插入高亮标记的简化兜底
    pub async fn highlight_text(&self, text: &str) -> Result<String, AiError> {
        let resp: HighlightResponse = self
            .call("highlight-text", &serde_json::json!({ "text": text }))
            .await?;
        Ok(resp.highlighted_text)
    }

    /// 分类建议：必须恰好返回 3 条完整三级路径，否则整体拒绝
    pub async fn suggest_categories(
        &self,
        company_name: &str,
        document_title: &str,
        quiz_title: &str,
        document_text: &str,
    ) -> Result<Vec<CategoryPath>, AiError> {
        let resp: SuggestResponse = self
            .call(
                "suggest-categories",
                &serde_json::json!({
                    "company_name": company_name,
                    "onboarding_document_title": document_title,
                    "quiz_title": quiz_title,
                    "onboarding_document_plaintext": document_text,
                }),
            )
            .await?;
        validate_category_paths(resp.suggested_category_paths)
    }

    /// 根据整理后的文档文本生成选择题列表
    pub async fn generate_questions(&self, text: &str) -> Result<Vec<GeneratedQuestion>, AiError> {
        let resp: GenerateResponse = self
            .call("generate-quiz-questions", &serde_json::json!({ "text": text }))
            .await?;
        validate_questions(resp.questions)
    }

    /// 页面图片变体：AI 返回 分类→测验→单题 的嵌套结构，由服务端落库
    pub async fn generate_quiz_from_images(
        &self,
        document_id: uuid::Uuid,
        page_images: &[String],
    ) -> Result<GeneratedQuizTree, AiError> {
        let tree: GeneratedQuizTree = self
            .call(
                "generate-quiz",
                &serde_json::json!({
                    "document_id": document_id,
                    "page_images": page_images,
                }),
            )
            .await?;
        for category in &tree.categories {
            for quiz in &category.quizzes {
                validate_question(&quiz.question)?;
            }
        }
        Ok(tree)
    }
}

fn validate_category_paths(paths: Vec<WireCategoryPath>) -> Result<Vec<CategoryPath>, AiError> {
    if paths.len() != SUGGESTED_PATH_COUNT {
        return Err(AiError::InvalidResponse(format!(
            "分类路径数必须为 {}，实际 {}",
            SUGGESTED_PATH_COUNT,
            paths.len()
        )));
    }
    paths
        .into_iter()
        .map(|path| {
            Ok(CategoryPath {
                level1: validate_level(path.level1, "level1")?,
                level2: validate_level(path.level2, "level2")?,
                level3: validate_level(path.level3, "level3")?,
            })
        })
        .collect()
}

fn validate_level(
    level: Option<WireCategoryLevel>,
    which: &str,
) -> Result<CategoryLevel, AiError> {
    let level =
        level.ok_or_else(|| AiError::InvalidResponse(format!("分类路径缺少 {}", which)))?;
    match (level.name, level.slug) {
        (Some(name), Some(slug)) if !name.trim().is_empty() && !slug.trim().is_empty() => {
            Ok(CategoryLevel { name, slug })
        }
        _ => Err(AiError::InvalidResponse(format!(
            "分类路径 {} 的名称或 slug 为空",
            which
        ))),
    }
}

fn validate_questions(
    questions: Vec<GeneratedQuestion>,
) -> Result<Vec<GeneratedQuestion>, AiError> {
    if questions.is_empty() {
        return Err(AiError::InvalidResponse("未生成任何题目".into()));
    }
    for question in &questions {
        validate_question(question)?;
    }
    Ok(questions)
}

fn validate_question(question: &GeneratedQuestion) -> Result<(), AiError> {
    if question.options.len() != OPTION_COUNT {
        return Err(AiError::InvalidResponse(format!(
            "题目选项数必须为 {}，实际 {}",
            OPTION_COUNT,
            question.options.len()
        )));
    }
    let correct = question.options.iter().filter(|o| o.is_correct).count();
    if correct != 1 {
        return Err(AiError::InvalidResponse(format!(
            "题目必须恰好有 1 个正确选项，实际 {}",
            correct
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_level(name: &str, slug: &str) -> Option<WireCategoryLevel> {
        Some(WireCategoryLevel {
            name: Some(name.into()),
            slug: Some(slug.into()),
        })
    }

    fn full_path() -> WireCategoryPath {
        WireCategoryPath {
            level1: wire_level("인사", "insa"),
            level2: wire_level("온보딩", "onboding"),
            level3: wire_level("규정", "gyujeong"),
        }
    }

    #[test]
    fn exactly_three_complete_paths_accepted() {
        let result = validate_category_paths(vec![full_path(), full_path(), full_path()]);
        let paths = result.unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0].level1.slug, "insa");
    }

    #[test]
    fn two_paths_rejected_wholesale() {
        let result = validate_category_paths(vec![full_path(), full_path()]);
        assert!(matches!(result, Err(AiError::InvalidResponse(_))));
    }

    #[test]
    fn four_paths_rejected() {
        let result =
            validate_category_paths(vec![full_path(), full_path(), full_path(), full_path()]);
        assert!(matches!(result, Err(AiError::InvalidResponse(_))));
    }

    #[test]
    fn missing_level_rejected() {
        let mut incomplete = full_path();
        incomplete.level3 = None;
        let result = validate_category_paths(vec![full_path(), incomplete, full_path()]);
        assert!(matches!(result, Err(AiError::InvalidResponse(_))));
    }

    #[test]
    fn empty_slug_rejected() {
        let mut bad = full_path();
        bad.level2 = Some(WireCategoryLevel {
            name: Some("온보딩".into()),
            slug: Some("  ".into()),
        });
        let result = validate_category_paths(vec![full_path(), bad, full_path()]);
        assert!(matches!(result, Err(AiError::InvalidResponse(_))));
    }

    fn question(correct_count: usize) -> GeneratedQuestion {
        GeneratedQuestion {
            question: "회사의 핵심 가치는?".into(),
            options: (0..OPTION_COUNT)
                .map(|i| GeneratedOption {
                    text: format!("보기 {}", i + 1),
                    is_correct: i < correct_count,
                })
                .collect(),
            explanation: "해설".into(),
        }
    }

    #[test]
    fn question_with_single_correct_accepted() {
        assert!(validate_questions(vec![question(1)]).is_ok());
    }

    #[test]
    fn question_with_zero_or_two_correct_rejected() {
        assert!(validate_questions(vec![question(0)]).is_err());
        assert!(validate_questions(vec![question(2)]).is_err());
    }

    #[test]
    fn wrong_option_count_rejected() {
        let mut q = question(1);
        q.options.pop();
        assert!(validate_questions(vec![q]).is_err());
    }

    #[test]
    fn empty_question_list_rejected() {
        assert!(validate_questions(vec![]).is_err());
    }
}
