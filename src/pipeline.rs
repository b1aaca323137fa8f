use crate::ai::{AiClient, AiError};

/// 文本整理管线最终到达的阶段，按降级顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// 结构化重组 + 高亮
    Formatted,
    /// 仅高亮
    Highlighted,
    /// 仅清理
    Cleaned,
    /// 原始 OCR 文本
    Raw,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub text: String,
    pub stage: PipelineStage,
}

/// 管线依赖的文本转换服务，测试中以桩实现替换
pub trait TextTransform {
    async fn clean(&self, text: &str) -> Result<String, AiError>;
    async fn format(&self, text: &str) -> Result<String, AiError>;
    async fn highlight(&self, text: &str) -> Result<String, AiError>;
}

impl TextTransform for AiClient {
    async fn clean(&self, text: &str) -> Result<String, AiError> {
        self.clean_text(text).await
    }

    async fn format(&self, text: &str) -> Result<String, AiError> {
        self.format_text(text).await
    }

    async fn highlight(&self, text: &str) -> Result<String, AiError> {
        self.highlight_text(text).await
    }
}

/// 顺序执行 清理 → 结构化 → 高亮兜底 三步，每步失败都有降级路径。
/// 对非空输入永远返回非空文本，步骤 2、3 的失败不会上抛
pub async fn run<T: TextTransform>(service: &T, raw: &str) -> PipelineOutcome {
    let (cleaned, clean_ok) = match service.clean(raw).await {
        Ok(text) if !text.trim().is_empty() => (text, true),
        Ok(_) => {
            tracing::warn!("清理结果为空，继续使用原始文本");
            (raw.to_string(), false)
        }
        Err(e) => {
            tracing::warn!("清理调用失败，继续使用原始文本: {}", e);
            (raw.to_string(), false)
        }
    };

    match service.format(&cleaned).await {
        Ok(text) if !text.trim().is_empty() => {
            return PipelineOutcome {
                text,
                stage: PipelineStage::Formatted,
            };
        }
        Ok(_) => tracing::warn!("结构化结果为空，降级为仅高亮"),
        Err(e) => tracing::warn!("结构化调用失败，降级为仅高亮: {}", e),
    }

    match service.highlight(&cleaned).await {
        Ok(text) if !text.trim().is_empty() => {
            return PipelineOutcome {
                text,
                stage: PipelineStage::Highlighted,
            };
        }
        Ok(_) => tracing::warn!("高亮结果为空，返回未高亮文本"),
        Err(e) => tracing::warn!("高亮调用失败，返回未高亮文本: {}", e),
    }

    PipelineOutcome {
        text: cleaned,
        stage: if clean_ok {
            PipelineStage::Cleaned
        } else {
            PipelineStage::Raw
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct StubService {
        fail_clean: bool,
        fail_format: bool,
        fail_highlight: bool,
        format_inputs: RefCell<Vec<String>>,
        highlight_inputs: RefCell<Vec<String>>,
    }

    impl TextTransform for StubService {
        async fn clean(&self, text: &str) -> Result<String, AiError> {
            if self.fail_clean {
                Err(AiError::Upstream("clean failed".into()))
            } else {
                Ok(format!("cleaned:{}", text))
            }
        }

        async fn format(&self, text: &str) -> Result<String, AiError> {
            self.format_inputs.borrow_mut().push(text.to_string());
            if self.fail_format {
                Err(AiError::RateLimited)
            } else {
                Ok(format!("<highlight>{}</highlight>", text))
            }
        }

        async fn highlight(&self, text: &str) -> Result<String, AiError> {
            self.highlight_inputs.borrow_mut().push(text.to_string());
            if self.fail_highlight {
                Err(AiError::Upstream("highlight failed".into()))
            } else {
                Ok(format!("hl:{}", text))
            }
        }
    }

    #[tokio::test]
    async fn full_chain_reaches_formatted() {
        let service = StubService::default();
        let outcome = run(&service, "원문").await;
        assert_eq!(outcome.stage, PipelineStage::Formatted);
        assert_eq!(outcome.text, "<highlight>cleaned:원문</highlight>");
        // 兜底高亮不应被调用
        assert!(service.highlight_inputs.borrow().is_empty());
    }

    #[tokio::test]
    async fn clean_failure_passes_raw_text_unchanged() {
        let service = StubService {
            fail_clean: true,
            ..Default::default()
        };
        let outcome = run(&service, "원문").await;
        assert_eq!(outcome.stage, PipelineStage::Formatted);
        assert_eq!(service.format_inputs.borrow().as_slice(), ["원문"]);
    }

    #[tokio::test]
    async fn format_failure_falls_back_to_highlight() {
        let service = StubService {
            fail_format: true,
            ..Default::default()
        };
        let outcome = run(&service, "원문").await;
        assert_eq!(outcome.stage, PipelineStage::Highlighted);
        assert_eq!(outcome.text, "hl:cleaned:원문");
        assert_eq!(service.highlight_inputs.borrow().as_slice(), ["cleaned:원문"]);
    }

    #[tokio::test]
    async fn format_and_highlight_failure_returns_cleaned() {
        let service = StubService {
            fail_format: true,
            fail_highlight: true,
            ..Default::default()
        };
        let outcome = run(&service, "원문").await;
        assert_eq!(outcome.stage, PipelineStage::Cleaned);
        assert_eq!(outcome.text, "cleaned:원문");
    }

    #[tokio::test]
    async fn all_failures_return_raw_unmodified() {
        let service = StubService {
            fail_clean: true,
            fail_format: true,
            fail_highlight: true,
            ..Default::default()
        };
        let outcome = run(&service, "원문").await;
        assert_eq!(outcome.stage, PipelineStage::Raw);
        assert_eq!(outcome.text, "원문");
        assert!(!outcome.text.is_empty());
    }
}
