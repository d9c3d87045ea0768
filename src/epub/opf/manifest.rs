//! 清单模块
//!
//! 提供EPUB包中文件清单的结构定义。

use crate::epub::path::ArchivePath;
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};

/// NCX文件的媒体类型
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// 清单项信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestItem {
    /// 项目ID
    pub id: String,
    /// 归档内的绝对路径（已相对OPF文件解析）
    pub href: ArchivePath,
    /// 媒体类型
    pub media_type: String,
    /// 属性(如nav、cover-image等)
    pub properties: BTreeSet<String>,
    /// 回退项ID
    pub fallback: Option<String>,
    /// 媒体覆盖层项ID
    pub media_overlay: Option<String>,
}

impl ManifestItem {
    /// 创建新的清单项
    pub fn new(id: impl Into<String>, href: ArchivePath, media_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href,
            media_type: media_type.into(),
            properties: BTreeSet::new(),
            fallback: None,
            media_overlay: None,
        }
    }

    /// 设置属性（空白分隔的列表）
    pub fn with_properties(mut self, properties: &str) -> Self {
        self.properties = properties.split_whitespace().map(str::to_string).collect();
        self
    }

    /// 检查是否包含指定属性
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.contains(property)
    }

    /// 检查是否为导航文档
    pub fn is_nav(&self) -> bool {
        self.has_property("nav")
    }

    /// 检查是否为封面图片
    pub fn is_cover_image(&self) -> bool {
        self.has_property("cover-image")
    }

    /// 检查是否为图片文件
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// 检查是否为CSS文件
    pub fn is_css(&self) -> bool {
        self.media_type == "text/css"
    }

    /// 检查是否为XHTML文件
    pub fn is_xhtml(&self) -> bool {
        self.media_type == "application/xhtml+xml"
    }

    /// 检查是否为NCX文件
    pub fn is_ncx(&self) -> bool {
        self.media_type == NCX_MEDIA_TYPE
    }

    /// 检查内容是否为XML（可以解析成元素树）
    pub fn is_xml(&self) -> bool {
        let media_type = self.media_type.as_str();
        media_type.ends_with("+xml")
            || media_type == "application/xml"
            || media_type == "text/xml"
            || media_type == "application/x-dtbook+xml"
    }
}

/// 清单：按声明顺序保存的清单项，附带ID索引
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    items: Vec<ManifestItem>,
    index: HashMap<String, usize>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加清单项，ID已存在时原样返回被拒绝的项
    pub fn try_insert(&mut self, item: ManifestItem) -> std::result::Result<(), ManifestItem> {
        if self.index.contains_key(&item.id) {
            return Err(item);
        }
        self.index.insert(item.id.clone(), self.items.len());
        self.items.push(item);
        Ok(())
    }

    /// 按ID查找
    pub fn get(&self, id: &str) -> Option<&ManifestItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// 按路径查找
    pub fn find_by_href(&self, href: &ArchivePath) -> Option<&ManifestItem> {
        self.items.iter().find(|item| &item.href == href)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestItem;
    type IntoIter = std::slice::Iter<'a, ManifestItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.items)
    }
}
