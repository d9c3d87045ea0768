//! guide模块（EPUB 2的结构性引用，EPUB 3中由landmarks取代）

use crate::epub::path::ArchivePath;
use serde::Serialize;

/// guide中的reference元素
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuideReference {
    /// type属性(如cover、toc、text)
    pub kind: String,
    pub title: Option<String>,
    pub href: ArchivePath,
    pub fragment: Option<String>,
}

impl GuideReference {
    /// 是否为指定类型，忽略大小写（旧书常写成 `Cover`）
    pub fn is(&self, kind: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
    }
}
