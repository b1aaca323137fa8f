use serde::Serialize;

/// 高亮标记，AI 管线在重点内容两侧插入的字面量
pub const OPEN_TAG: &str = "<highlight>";
pub const CLOSE_TAG: &str = "</highlight>";

/// 段落内的一个渲染片段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    pub emphasized: bool,
}

/// 渲染后的段落，按空行切分
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paragraph {
    pub segments: Vec<Segment>,
}

impl Paragraph {
    /// 段落的纯文本（去掉标记后的内容拼接）
    pub fn plain_text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

/// 文本中已包含高亮标记即视为管线处理过，重新打开时跳过抽取与 AI 调用
pub fn is_processed(text: &str) -> bool {
    text.contains(OPEN_TAG)
}

/// 把带 <highlight> 标记的文本渲染为段落片段列表。
/// 标记本身绝不出现在输出里；缺失闭合标记时段落剩余部分保持高亮
pub fn render(text: &str) -> Vec<Paragraph> {
    text.split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(render_paragraph)
        .collect()
}

fn render_paragraph(paragraph: &str) -> Paragraph {
    let mut segments = Vec::new();
    let mut rest = paragraph;
    let mut emphasized = false;

    loop {
        let tag = if emphasized { CLOSE_TAG } else { OPEN_TAG };
        match rest.find(tag) {
            Some(pos) => {
                if pos > 0 {
                    segments.push(Segment {
                        text: rest[..pos].to_string(),
                        emphasized,
                    });
                }
                rest = &rest[pos + tag.len()..];
                emphasized = !emphasized;
            }
            None => {
                if !rest.is_empty() {
                    segments.push(Segment {
                        text: rest.to_string(),
                        emphasized,
                    });
                }
                break;
            }
        }
    }

    Paragraph { segments }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_strips_tags_and_flags_span() {
        let paragraphs = render("a <highlight>b</highlight> c");
        assert_eq!(paragraphs.len(), 1);
        let p = &paragraphs[0];
        assert_eq!(p.plain_text(), "a b c");
        assert!(!p.plain_text().contains("<highlight>"));
        assert!(!p.plain_text().contains("</highlight>"));
        assert_eq!(
            p.segments,
            vec![
                Segment { text: "a ".into(), emphasized: false },
                Segment { text: "b".into(), emphasized: true },
                Segment { text: " c".into(), emphasized: false },
            ]
        );
    }

    #[test]
    fn splits_on_blank_lines() {
        let paragraphs = render("첫 단락\n\n<highlight>둘째</highlight> 단락");
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].plain_text(), "첫 단락");
        assert!(paragraphs[1].segments[0].emphasized);
    }

    #[test]
    fn unclosed_tag_emphasizes_remainder() {
        let paragraphs = render("보통 <highlight>끝까지 강조");
        let segs = &paragraphs[0].segments;
        assert_eq!(segs.len(), 2);
        assert!(!segs[0].emphasized);
        assert!(segs[1].emphasized);
        assert_eq!(segs[1].text, "끝까지 강조");
    }

    #[test]
    fn plain_text_renders_single_segment() {
        let paragraphs = render("표시할 내용");
        assert_eq!(paragraphs[0].segments.len(), 1);
        assert!(!paragraphs[0].segments[0].emphasized);
    }

    #[test]
    fn processed_marker_detection() {
        assert!(is_processed("내용 <highlight>중요</highlight>"));
        assert!(!is_processed("원본 OCR 텍스트"));
    }
}
