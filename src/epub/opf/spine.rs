//! 脊柱模块
//!
//! 提供EPUB包中阅读顺序（脊柱）的结构定义。

use serde::Serialize;
use std::collections::BTreeSet;

/// 脊柱项信息(阅读顺序)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpineItem {
    /// 引用的清单项ID
    pub idref: String,
    /// 是否线性阅读
    pub linear: bool,
    pub id: Option<String>,
    /// 属性(如page-spread-left)
    pub properties: BTreeSet<String>,
}

impl SpineItem {
    /// 创建新的脊柱项
    pub fn new(idref: impl Into<String>) -> Self {
        Self::with_linear(idref, true)
    }

    /// 创建非线性的脊柱项
    pub fn new_non_linear(idref: impl Into<String>) -> Self {
        Self::with_linear(idref, false)
    }

    /// 创建指定线性属性的脊柱项
    pub fn with_linear(idref: impl Into<String>, linear: bool) -> Self {
        Self {
            idref: idref.into(),
            linear,
            id: None,
            properties: BTreeSet::new(),
        }
    }

    /// 检查是否为线性阅读
    pub fn is_linear(&self) -> bool {
        self.linear
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.contains(property)
    }
}

/// 脊柱：阅读顺序及其全局属性
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Spine {
    /// toc属性，指向NCX清单项的ID
    pub toc: Option<String>,
    /// 翻页方向(ltr、rtl或default)
    pub page_progression_direction: Option<String>,
    pub items: Vec<SpineItem>,
}

impl Spine {
    pub fn iter(&self) -> std::slice::Iter<'_, SpineItem> {
        self.items.iter()
    }

    /// 只包含线性阅读的项
    pub fn linear_items(&self) -> impl Iterator<Item = &SpineItem> {
        self.items.iter().filter(|item| item.is_linear())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 是否为从右到左翻页
    pub fn is_rtl(&self) -> bool {
        self.page_progression_direction.as_deref() == Some("rtl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_items() {
        let spine = Spine {
            toc: None,
            page_progression_direction: Some("rtl".to_string()),
            items: vec![
                SpineItem::new("cover"),
                SpineItem::new_non_linear("notes"),
                SpineItem::with_linear("chap1", true),
            ],
        };
        let linear: Vec<&str> = spine.linear_items().map(|i| i.idref.as_str()).collect();
        assert_eq!(linear, vec!["cover", "chap1"]);
        assert_eq!(spine.len(), 3);
        assert!(spine.is_rtl());
        assert!(!Spine::default().is_rtl());
    }
}
