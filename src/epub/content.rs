//! 内容文档访问
//!
//! 资源只在被访问时读取：XML类媒体类型解析为元素树，其他类型（图片、字体、音频）返回原始字节。

use crate::epub::archive::EntryReader;
use crate::epub::error::{EpubError, Result};
use crate::epub::opf::ManifestItem;
use crate::epub::xml::{ElementTree, read_tree};
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector, node::Node};

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("body选择器"));

/// 资源内容
#[derive(Debug, Clone)]
pub enum Content {
    /// 解析后的XML文档
    Tree(ElementTree),
    /// 非XML资源的原始字节
    Raw(Vec<u8>),
}

impl Content {
    pub fn as_tree(&self) -> Option<&ElementTree> {
        match self {
            Content::Tree(tree) => Some(tree),
            Content::Raw(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Content::Tree(_) => None,
            Content::Raw(bytes) => Some(bytes),
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Content::Tree(_))
    }
}

/// 按清单项的媒体类型读取资源
///
/// 条目不存在时返回 `ResourceNotFound`，XML内容无法解析时返回 `MalformedResource`。
pub(crate) fn open(reader: &dyn EntryReader, item: &ManifestItem, encoding: &'static Encoding) -> Result<Content> {
    if item.is_xml() {
        let tree = read_tree(reader, &item.href, encoding, |reason| EpubError::MalformedResource {
            path: item.href.to_string(),
            reason,
        })?;
        Ok(Content::Tree(tree))
    } else {
        reader.read(item.href.as_str()).map(Content::Raw)
    }
}

/// 提取HTML文档body中的纯文本
///
/// 块级元素之间插入换行，连续空行压缩为一个。
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut result = String::new();
    match document.select(&BODY).next() {
        Some(body) => collect_text(body, &mut result),
        None => collect_text(document.root_element(), &mut result),
    }
    clean_excessive_newlines(&result)
}

fn collect_text(element: ElementRef, result: &mut String) {
    let tag_name = element.value().name();
    if matches!(tag_name, "head" | "script" | "style" | "img") {
        return;
    }

    for node in element.children() {
        match node.value() {
            Node::Text(text) => result.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(node) {
                    collect_text(child, result);
                }
            }
            _ => {}
        }
    }

    match tag_name {
        "br" | "p" | "div" | "li" | "tr" | "section" | "blockquote" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            result.push('\n')
        }
        _ => {}
    }
}

/// 每行去掉首尾空白，最多保留一个空行
fn clean_excessive_newlines(text: &str) -> String {
    let mut result = String::new();
    let mut blank = 0;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            blank += 1;
            continue;
        }
        if !result.is_empty() {
            result.push_str(if blank > 1 { "\n\n" } else { "\n" });
        }
        result.push_str(line);
        blank = 0;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::archive::MemoryEntries;
    use crate::epub::error::ErrorKind;
    use crate::epub::path::ArchivePath;
    use crate::epub::testing::CHAPTER1;
    use encoding_rs::UTF_8;

    fn item(href: &str, media_type: &str) -> ManifestItem {
        ManifestItem::new("item", ArchivePath::new(href).unwrap(), media_type)
    }

    #[test]
    fn test_open_by_media_type() {
        let entries = MemoryEntries::new("memory")
            .with_entry("OEBPS/chap1.xhtml", CHAPTER1)
            .with_entry("OEBPS/cover.jpg", vec![0xFFu8, 0xD8, 0xFF]);

        let chapter = open(&entries, &item("OEBPS/chap1.xhtml", "application/xhtml+xml"), UTF_8).unwrap();
        assert!(chapter.is_tree());
        assert!(chapter.as_tree().unwrap().root().is("html"));

        let image = open(&entries, &item("OEBPS/cover.jpg", "image/jpeg"), UTF_8).unwrap();
        assert_eq!(image.as_bytes(), Some(&[0xFFu8, 0xD8, 0xFF][..]));
        assert!(image.as_tree().is_none());
    }

    #[test]
    fn test_open_missing_and_malformed() {
        let entries = MemoryEntries::new("memory").with_entry("OEBPS/broken.xhtml", "<html><body></html>");

        let err = open(&entries, &item("OEBPS/ghost.xhtml", "application/xhtml+xml"), UTF_8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
        let err = open(&entries, &item("OEBPS/ghost.png", "image/png"), UTF_8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);

        let err = open(&entries, &item("OEBPS/broken.xhtml", "application/xhtml+xml"), UTF_8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResource);
    }

    #[test]
    fn test_extract_text() {
        assert_eq!(extract_text(CHAPTER1), "第一章\n这是第一章的内容。");

        let html = "<html><head><style>p{}</style></head><body><p>A<br/>B</p><script>x()</script><p>C</p></body></html>";
        assert_eq!(extract_text(html), "A\nB\nC");
    }
}
