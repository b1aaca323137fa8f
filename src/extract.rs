use lopdf::Document;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// 文件解析失败
    #[error("PDF 解析失败: {0}")]
    Parse(String),
    /// 所有页面都抽不出文本，对该文档属于终态失败
    #[error("文档中未找到可抽取的文本")]
    Empty,
    /// 仅支持 PDF 的自动抽取，其它类型只存储不处理
    #[error("不支持自动抽取的文件类型: {0}")]
    Unsupported(String),
}

/// 是否支持自动文本抽取（当前仅 PDF）
pub fn is_extractable(content_type: &str, file_name: &str) -> bool {
    content_type == "application/pdf" || file_name.to_lowercase().ends_with(".pdf")
}

/// 逐页抽取 PDF 文本，页与页之间以空行分隔，整体 trim。
/// 个别页面抽取失败只记录日志，全部为空才算失败
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractError::Parse(e.to_string()))?;

    let mut pages_text: Vec<String> = Vec::new();
    for (page_number, _) in doc.get_pages() {
        match doc.extract_text(&[page_number]) {
            Ok(text) => {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    pages_text.push(text);
                }
            }
            Err(e) => {
                tracing::warn!("第 {} 页文本抽取失败: {}", page_number, e);
            }
        }
    }

    let joined = pages_text.join("\n\n").trim().to_string();
    if joined.is_empty() {
        Err(ExtractError::Empty)
    } else {
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    fn pdf_with_text(lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), 700.into()]),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("Td", vec![0.into(), (-20).into()]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        bytes
    }

    #[test]
    fn extracts_text_from_pdf() {
        let bytes = pdf_with_text(&["Welcome to the company"]);
        let text = extract_pdf_text(&bytes).unwrap();
        assert!(text.contains("Welcome to the company"));
    }

    #[test]
    fn empty_pdf_is_terminal_failure() {
        let bytes = pdf_with_text(&[]);
        assert!(matches!(extract_pdf_text(&bytes), Err(ExtractError::Empty)));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        assert!(matches!(
            extract_pdf_text(b"not a pdf"),
            Err(ExtractError::Parse(_))
        ));
    }

    #[test]
    fn only_pdf_is_extractable() {
        assert!(is_extractable("application/pdf", "guide.pdf"));
        assert!(is_extractable("application/octet-stream", "Guide.PDF"));
        assert!(!is_extractable(
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "slides.pptx"
        ));
        assert!(!is_extractable("image/png", "scan.png"));
    }
}
