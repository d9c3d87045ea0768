//! 归档内路径解析模块
//!
//! EPUB中的所有href都是相对于声明它的文档的URL。这里把它们解析成
//! 归档内的规范路径，并拒绝外部URI以及越出归档根目录的引用。

use crate::epub::error::{EpubError, Result};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::fmt;

/// 归档内的规范路径
///
/// 使用 `/` 分隔，不含 `.`、`..` 和空段，也不以 `/` 开头。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// 归档根目录（只作为解析基准使用）
    pub fn root() -> Self {
        ArchivePath(String::new())
    }

    /// 把相对于归档根目录的路径规范化
    pub fn new(raw: &str) -> Result<Self> {
        Self::root().resolve(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// 所在目录，根目录下的文件返回空字符串
    pub fn directory(&self) -> &str {
        self.0.rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    /// 文件名
    pub fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }

    /// 小写的扩展名
    pub fn extension(&self) -> Option<String> {
        self.file_name()
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// 以当前路径所在目录为基准解析引用
    ///
    /// 引用可以是字符串（相对href，片段会被丢弃），也可以是已经规范化的 `ArchivePath`，
    /// 后者原样返回，所以对规范路径的解析是幂等的。
    pub fn resolve<H: Href + ?Sized>(&self, href: &H) -> Result<ArchivePath> {
        href.resolve_against(self)
    }

    /// 解析引用，同时返回片段标识符（`#`之后的部分）
    pub fn resolve_with_fragment(&self, reference: &str) -> Result<(ArchivePath, Option<String>)> {
        resolve_reference(self, reference)
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ArchivePath {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ArchivePath {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// 可以相对某个文档路径解析的引用
pub trait Href {
    fn resolve_against(&self, base: &ArchivePath) -> Result<ArchivePath>;
}

impl Href for str {
    fn resolve_against(&self, base: &ArchivePath) -> Result<ArchivePath> {
        resolve_reference(base, self).map(|(path, _)| path)
    }
}

impl Href for String {
    fn resolve_against(&self, base: &ArchivePath) -> Result<ArchivePath> {
        self.as_str().resolve_against(base)
    }
}

impl Href for ArchivePath {
    fn resolve_against(&self, _base: &ArchivePath) -> Result<ArchivePath> {
        Ok(self.clone())
    }
}

/// 拆分引用中的片段标识符
pub fn split_fragment(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (reference, None),
    }
}

/// 引用是否带有URI scheme（如 `http:`、`urn:`）
fn has_scheme(reference: &str) -> bool {
    let Some((scheme, _)) = reference.split_once(':') else {
        return false;
    };
    if scheme.contains('/') {
        return false;
    }
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn resolve_reference(base: &ArchivePath, reference: &str) -> Result<(ArchivePath, Option<String>)> {
    let invalid = |reason: &str| EpubError::InvalidReference {
        base: base.to_string(),
        reference: reference.to_string(),
        reason: reason.to_string(),
    };

    let reference_trimmed = reference.trim();
    let (without_fragment, fragment) = split_fragment(reference_trimmed);
    let fragment = fragment.map(str::to_string);
    let path_part = without_fragment
        .split_once('?')
        .map_or(without_fragment, |(path, _)| path);

    if has_scheme(path_part) {
        return Err(invalid("不允许外部绝对URI"));
    }
    if path_part.starts_with("//") {
        return Err(invalid("不允许网络路径引用"));
    }

    // 空引用指向文档自身
    if path_part.is_empty() {
        if base.is_root() {
            return Err(invalid("引用指向归档根目录"));
        }
        return Ok((base.clone(), fragment));
    }

    let decoded = percent_decode_str(path_part)
        .decode_utf8()
        .map_err(|_| invalid("百分号编码不是有效的UTF-8"))?;

    let mut segments: Vec<&str> = if decoded.starts_with('/') || base.directory().is_empty() {
        Vec::new()
    } else {
        base.directory().split('/').collect()
    };

    for part in decoded.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(invalid("引用越出了归档根目录"));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(invalid("引用指向归档根目录"));
    }

    Ok((ArchivePath(segments.join("/")), fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::error::ErrorKind;
    use proptest::prelude::*;

    fn base() -> ArchivePath {
        ArchivePath::new("OEBPS/content.opf").unwrap()
    }

    #[test]
    fn test_resolve_relative() {
        let path = base().resolve("text/chapter1.xhtml").unwrap();
        assert_eq!(path, "OEBPS/text/chapter1.xhtml");
        assert_eq!(path.directory(), "OEBPS/text");
        assert_eq!(path.file_name(), "chapter1.xhtml");
        assert_eq!(path.extension(), Some("xhtml".to_string()));
    }

    #[test]
    fn test_resolve_dot_segments() {
        assert_eq!(base().resolve("./a/../b.xhtml").unwrap(), "OEBPS/b.xhtml");
        assert_eq!(base().resolve("../Styles/main.css").unwrap(), "Styles/main.css");
    }

    #[test]
    fn test_resolve_is_idempotent_on_canonical_paths() {
        let base = base();
        let once = base.resolve("./x").unwrap();
        assert_eq!(base.resolve(&once).unwrap(), base.resolve("x").unwrap());
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let base = ArchivePath::new("a/b/container.xml").unwrap();
        let err = base.resolve("../../../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
        // 恰好回到根目录是允许的
        assert_eq!(base.resolve("../../top.xhtml").unwrap(), "top.xhtml");
    }

    #[test]
    fn test_resolve_rejects_external_uri() {
        for reference in ["http://example.com/a.xhtml", "mailto:someone@example.com", "//cdn/x.css"] {
            let err = base().resolve(reference).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidReference, "{}", reference);
        }
    }

    #[test]
    fn test_resolve_with_fragment() {
        let (path, fragment) = base().resolve_with_fragment("chap1.xhtml#sec-2").unwrap();
        assert_eq!(path, "OEBPS/chap1.xhtml");
        assert_eq!(fragment.as_deref(), Some("sec-2"));

        let (path, fragment) = base().resolve_with_fragment("#note").unwrap();
        assert_eq!(path, "OEBPS/content.opf");
        assert_eq!(fragment.as_deref(), Some("note"));
    }

    #[test]
    fn test_percent_decoding_and_query() {
        let path = base().resolve("Text/My%20Chapter.xhtml?x=1").unwrap();
        assert_eq!(path, "OEBPS/Text/My Chapter.xhtml");
    }

    #[test]
    fn test_root_relative_reference() {
        assert_eq!(base().resolve("/images/cover.jpg").unwrap(), "images/cover.jpg");
    }

    #[test]
    fn test_root_level_base() {
        let base = ArchivePath::new("content.opf").unwrap();
        assert_eq!(base.directory(), "");
        assert_eq!(base.resolve("chap.xhtml").unwrap(), "chap.xhtml");
        assert!(base.resolve("../chap.xhtml").is_err());
    }

    #[test]
    fn test_split_fragment() {
        assert_eq!(split_fragment("a.xhtml#b"), ("a.xhtml", Some("b")));
        assert_eq!(split_fragment("a.xhtml#"), ("a.xhtml", None));
        assert_eq!(split_fragment("a.xhtml"), ("a.xhtml", None));
    }

    fn segments() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[A-Za-z0-9_-]{1,8}(\\.[a-z]{1,4})?", 1..5)
    }

    fn base_in(directories: &[String]) -> ArchivePath {
        let mut parts = directories.to_vec();
        parts.push("content.opf".to_string());
        ArchivePath::new(&parts.join("/")).unwrap()
    }

    proptest! {
        #[test]
        fn prop_resolve_is_idempotent(
            directories in prop::collection::vec("[a-z]{1,6}", 0..4),
            reference in segments(),
        ) {
            let base = base_in(&directories);
            let reference = reference.join("/");

            let direct = base.resolve(&reference).unwrap();
            let dotted = base.resolve(&format!("./{}", reference)).unwrap();
            prop_assert_eq!(&base.resolve(&dotted).unwrap(), &direct);
            prop_assert_eq!(&ArchivePath::new(direct.as_str()).unwrap(), &direct);
        }

        #[test]
        fn prop_resolve_rejects_escape(
            directories in prop::collection::vec("[a-z]{1,6}", 0..4),
            extra in 1usize..4,
            tail in segments(),
        ) {
            let base = base_in(&directories);
            let reference = format!("{}{}", "../".repeat(directories.len() + extra), tail.join("/"));
            let err = base.resolve(&reference).unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::InvalidReference);
        }
    }
}
