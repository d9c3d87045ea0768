//! 导航树数据结构
//!
//! EPUB 3导航文档和EPUB 2 NCX最终都归一到这里的 `Navigation`。

use crate::epub::archive::EntryReader;
use crate::epub::error::{EpubError, ParseWarning, Result};
use crate::epub::nav::{ncx, xhtml};
use crate::epub::opf::{NavigationSource, Package};
use crate::epub::path::ArchivePath;
use crate::epub::xml::{ElementTree, read_tree};
use encoding_rs::Encoding;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// 导航节点指向的位置
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NavTarget {
    pub path: ArchivePath,
    pub fragment: Option<String>,
}

impl NavTarget {
    pub fn new(path: ArchivePath, fragment: Option<String>) -> Self {
        Self { path, fragment }
    }
}

impl fmt::Display for NavTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "{}#{}", self.path, fragment),
            None => write!(f, "{}", self.path),
        }
    }
}

/// 导航节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavPoint {
    pub id: Option<String>,
    /// 显示文本
    pub label: String,
    pub target: NavTarget,
    /// 节点语义（landmarks的epub:type或pageTarget的type）
    pub kind: Option<String>,
    pub children: Vec<NavPoint>,
}

impl NavPoint {
    pub fn new(label: impl Into<String>, target: NavTarget) -> Self {
        Self {
            id: None,
            label: label.into(),
            target,
            kind: None,
            children: Vec::new(),
        }
    }

    /// 以当前节点为根的子树深度（叶子为1）
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(NavPoint::depth).max().unwrap_or(0)
    }

    /// 子树中的节点总数（包括自身）
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(NavPoint::count).sum::<usize>()
    }
}

/// 规范化后的导航信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub title: Option<String>,
    /// 目录树
    pub toc: Vec<NavPoint>,
    pub page_list: Vec<NavPoint>,
    pub landmarks: Vec<NavPoint>,
    /// 导航文件路径，没有导航来源时为None
    pub source: Option<ArchivePath>,
}

impl Navigation {
    /// 空导航
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.toc.is_empty() && self.page_list.is_empty() && self.landmarks.is_empty()
    }

    /// 目录树最大深度
    pub fn depth(&self) -> usize {
        self.toc.iter().map(NavPoint::depth).max().unwrap_or(0)
    }

    /// 目录节点总数
    pub fn len(&self) -> usize {
        self.toc.iter().map(NavPoint::count).sum()
    }

    /// 按先序遍历展开目录，附带层级（顶层为0）
    pub fn flatten(&self) -> Vec<(usize, &NavPoint)> {
        fn walk<'a>(points: &'a [NavPoint], level: usize, out: &mut Vec<(usize, &'a NavPoint)>) {
            for point in points {
                out.push((level, point));
                walk(&point.children, level + 1, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.toc, 0, &mut out);
        out
    }

    /// 指向指定文档的所有目录节点
    pub fn points_to(&self, path: &ArchivePath) -> Vec<&NavPoint> {
        self.flatten()
            .into_iter()
            .map(|(_, point)| point)
            .filter(|point| &point.target.path == path)
            .collect()
    }
}

/// 解析包的导航来源
///
/// 没有导航来源时返回 `NoNavigationSource`；导航文件无法读取或解析时返回
/// `MalformedNavigation`。单个节点的问题只记录警告，不影响其他节点。
pub fn resolve_navigation(
    reader: &dyn EntryReader,
    package: &Package,
    encoding: &'static Encoding,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Navigation> {
    let source = package
        .navigation_source
        .as_ref()
        .ok_or_else(|| EpubError::NoNavigationSource {
            package: package.location.to_string(),
        })?;

    let navigation = match source {
        NavigationSource::InBand(id) => {
            let item = package.manifest.get(id).ok_or_else(|| {
                EpubError::malformed_navigation(id.as_str(), "导航文档不在清单中")
            })?;
            let tree = load(reader, &item.href, encoding)?;
            xhtml::parse_nav_document(&tree, &item.href, warnings)?
        }
        NavigationSource::Legacy(path) => {
            let tree = load(reader, path, encoding)?;
            ncx::parse_ncx(&tree, path, warnings)?
        }
    };

    debug!(
        "导航解析完成: {} 个目录节点, 深度 {}",
        navigation.len(),
        navigation.depth()
    );
    Ok(navigation)
}

/// 读取导航文件，读取失败统一视为导航错误
fn load(reader: &dyn EntryReader, path: &ArchivePath, encoding: &'static Encoding) -> Result<ElementTree> {
    read_tree(reader, path, encoding, |reason| {
        EpubError::malformed_navigation(path.as_str(), reason)
    })
    .map_err(|e| match e {
        e @ (EpubError::MalformedNavigation { .. } | EpubError::ArchiveClosed { .. }) => e,
        other => EpubError::malformed_navigation(path.as_str(), other.to_string()),
    })
}
