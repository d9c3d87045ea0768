//! OPF解析器模块
//!
//! 提供OPF（Open Packaging Format）包文档的解析功能，并校验清单与脊柱之间的引用完整性。

use crate::epub::archive::EntryReader;
use crate::epub::config::ResourceCheck;
use crate::epub::error::{EpubError, ParseWarning, Result, record};
use crate::epub::opf::{
    guide::GuideReference,
    manifest::{Manifest, ManifestItem},
    metadata::Metadata,
    spine::{Spine, SpineItem},
};
use crate::epub::path::ArchivePath;
use crate::epub::xml::{Element, ElementTree, read_tree};
use encoding_rs::Encoding;
use serde::Serialize;
use tracing::debug;

/// 包的导航来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NavigationSource {
    /// EPUB 3导航文档，值为清单项ID
    InBand(String),
    /// EPUB 2的NCX文件
    Legacy(ArchivePath),
}

/// 包文档所属的格式版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Generation {
    /// 2.x及更早
    Legacy,
    /// 3.x
    Current,
}

/// OPF文件解析结果
#[derive(Debug, Clone, Serialize)]
pub struct Package {
    /// 包文档在归档中的路径
    pub location: ArchivePath,
    /// 在容器rendition列表中的位置
    pub rendition: usize,
    /// EPUB版本
    pub version: String,
    /// unique-identifier属性，指向某个dc:identifier的id
    pub unique_identifier: Option<String>,
    pub prefix: Option<String>,
    pub lang: Option<String>,
    pub dir: Option<String>,
    /// 元数据
    pub metadata: Metadata,
    /// 清单项(文件列表)
    pub manifest: Manifest,
    /// 脊柱(阅读顺序)
    pub spine: Spine,
    pub guide: Vec<GuideReference>,
    pub navigation_source: Option<NavigationSource>,
}

impl Package {
    /// 从归档中读取并解析包文档
    ///
    /// # 参数
    /// * `reader` - 归档条目读取器
    /// * `location` - 包文档路径（rootfile的full-path）
    /// * `rendition` - rootfile在容器中的序号
    /// * `encoding` - 没有BOM时使用的文本编码
    /// * `warnings` - 收集非致命问题
    pub fn parse(
        reader: &dyn EntryReader,
        location: &ArchivePath,
        rendition: usize,
        encoding: &'static Encoding,
        warnings: &mut Vec<ParseWarning>,
    ) -> Result<Package> {
        let tree = read_tree(reader, location, encoding, |reason| {
            EpubError::malformed_package(location.as_str(), reason)
        })?;
        let package = Self::from_tree(&tree, location, rendition, warnings)?;
        debug!(
            "OPF解析完成: {} (版本 {}, {} 个清单项, {} 个脊柱项)",
            location,
            package.version,
            package.manifest.len(),
            package.spine.len()
        );
        Ok(package)
    }

    /// 解析OPF文件内容
    ///
    /// # 参数
    /// * `xml_content` - OPF文件的XML内容
    /// * `location` - 包文档路径，清单href相对它解析
    pub fn parse_xml(xml_content: &str, location: &ArchivePath, warnings: &mut Vec<ParseWarning>) -> Result<Package> {
        let tree = ElementTree::parse_str(xml_content)
            .map_err(|e| EpubError::malformed_package(location.as_str(), e.to_string()))?;
        Self::from_tree(&tree, location, 0, warnings)
    }

    fn from_tree(
        tree: &ElementTree,
        location: &ArchivePath,
        rendition: usize,
        warnings: &mut Vec<ParseWarning>,
    ) -> Result<Package> {
        let malformed = |reason: &str| EpubError::malformed_package(location.as_str(), reason);

        let root = tree.root();
        if !root.is("package") {
            return Err(EpubError::malformed_package(
                location.as_str(),
                format!("根元素应为package，找到 {}", root.local_name()),
            ));
        }
        let metadata_element = root.child("metadata").ok_or_else(|| malformed("缺少metadata元素"))?;
        let manifest_element = root.child("manifest").ok_or_else(|| malformed("缺少manifest元素"))?;
        let spine_element = root.child("spine").ok_or_else(|| malformed("缺少spine元素"))?;

        let metadata = Metadata::from_element(metadata_element, location);
        let manifest = parse_manifest(manifest_element, location)?;
        let spine = parse_spine(spine_element, &manifest, location)?;
        let guide = root
            .child("guide")
            .map(|guide| parse_guide(guide, location, warnings))
            .unwrap_or_default();

        check_cover(&metadata, &manifest, location)?;
        let navigation_source = navigation_source(&manifest, &spine, location, warnings);

        Ok(Package {
            location: location.clone(),
            rendition,
            version: root.attr("version").unwrap_or_default().trim().to_string(),
            unique_identifier: root.attr("unique-identifier").map(str::to_string),
            prefix: root.attr("prefix").map(str::to_string),
            lang: root.lang().map(str::to_string),
            dir: root.attr("dir").map(str::to_string),
            metadata,
            manifest,
            spine,
            guide,
            navigation_source,
        })
    }

    /// 按版本号区分格式代际
    pub fn generation(&self) -> Generation {
        if self.version.starts_with('3') {
            Generation::Current
        } else {
            Generation::Legacy
        }
    }

    /// 根据ID获取清单项
    pub fn get_manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.get(id)
    }

    /// 按脊柱顺序排列的清单项
    pub fn reading_order(&self) -> Vec<&ManifestItem> {
        self.spine_items().map(|(_, item)| item).collect()
    }

    /// 脊柱项及其对应的清单项
    pub fn spine_items(&self) -> impl Iterator<Item = (&SpineItem, &ManifestItem)> {
        // 解析时已保证每个idref都存在
        self.spine
            .iter()
            .filter_map(|itemref| self.manifest.get(&itemref.idref).map(|item| (itemref, item)))
    }

    /// 线性阅读的章节路径
    pub fn chapter_paths(&self) -> Vec<&ArchivePath> {
        self.spine_items()
            .filter(|(itemref, _)| itemref.is_linear())
            .map(|(_, item)| &item.href)
            .collect()
    }

    /// 导航文档清单项（EPUB 3）
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        match &self.navigation_source {
            Some(NavigationSource::InBand(id)) => self.manifest.get(id),
            _ => None,
        }
    }

    /// 封面图片清单项
    ///
    /// 优先使用cover-image属性，其次是 `<meta name="cover">`。
    pub fn cover_image(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.is_cover_image()).or_else(|| {
            let cover = self.metadata.cover_id()?;
            self.manifest.get(&cover).or_else(|| {
                let path = self.location.resolve(cover.as_str()).ok()?;
                self.manifest.find_by_href(&path)
            })
        })
    }

    /// unique-identifier指向的标识符值
    pub fn unique_identifier_value(&self) -> Option<String> {
        let id = self.unique_identifier.as_deref()?;
        self.metadata
            .identifiers()
            .into_iter()
            .find(|identifier| identifier.id.as_deref() == Some(id))
            .map(|identifier| identifier.value)
    }

    /// 获取所有图片清单项
    pub fn image_items(&self) -> Vec<&ManifestItem> {
        self.manifest.iter().filter(|item| item.is_image()).collect()
    }

    /// 获取所有CSS清单项
    pub fn css_items(&self) -> Vec<&ManifestItem> {
        self.manifest.iter().filter(|item| item.is_css()).collect()
    }

    /// 检查清单项指向的条目是否存在
    ///
    /// `Lazy` 模式下缺失的资源记为警告，`Eager` 模式下返回第一个 `ResourceNotFound`。
    pub fn check_resources(
        &self,
        reader: &dyn EntryReader,
        check: ResourceCheck,
        warnings: &mut Vec<ParseWarning>,
    ) -> Result<()> {
        for item in &self.manifest {
            if reader.contains(item.href.as_str()) {
                continue;
            }
            match check {
                ResourceCheck::Eager => {
                    return Err(EpubError::ResourceNotFound {
                        path: item.href.to_string(),
                    });
                }
                ResourceCheck::Lazy => record(
                    warnings,
                    ParseWarning::MissingResource {
                        id: item.id.clone(),
                        path: item.href.to_string(),
                    },
                ),
            }
        }
        Ok(())
    }
}

fn parse_manifest(element: &Element, location: &ArchivePath) -> Result<Manifest> {
    let mut manifest = Manifest::new();
    for item in element.children_named("item") {
        let required = |name: &str| {
            item.attr(name)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| EpubError::malformed_package(location.as_str(), format!("清单项缺少{}属性", name)))
        };
        let id = required("id")?;
        let href = location.resolve(required("href")?)?;
        let media_type = required("media-type")?;

        let mut manifest_item = ManifestItem::new(id, href, media_type)
            .with_properties(item.attr("properties").unwrap_or_default());
        manifest_item.fallback = item.attr("fallback").map(|s| s.trim().to_string());
        manifest_item.media_overlay = item.attr("media-overlay").map(|s| s.trim().to_string());

        if let Err(rejected) = manifest.try_insert(manifest_item) {
            return Err(EpubError::DuplicateManifestId {
                package: location.to_string(),
                id: rejected.id,
            });
        }
    }
    if manifest.is_empty() {
        return Err(EpubError::malformed_package(location.as_str(), "清单中没有任何项"));
    }

    for item in &manifest {
        for (attribute, target) in [("fallback", &item.fallback), ("media-overlay", &item.media_overlay)] {
            if let Some(target) = target
                && !manifest.contains(target)
            {
                return Err(EpubError::malformed_package(
                    location.as_str(),
                    format!("清单项 {} 的{}引用了不存在的ID: {}", item.id, attribute, target),
                ));
            }
        }
    }
    Ok(manifest)
}

fn parse_spine(element: &Element, manifest: &Manifest, location: &ArchivePath) -> Result<Spine> {
    let toc = element.attr("toc").map(|s| s.trim().to_string());
    if let Some(toc) = &toc
        && !manifest.contains(toc)
    {
        return Err(EpubError::malformed_package(
            location.as_str(),
            format!("spine的toc属性引用了不存在的清单项: {}", toc),
        ));
    }

    let mut items = Vec::new();
    for itemref in element.children_named("itemref") {
        let idref = itemref
            .attr("idref")
            .map(str::trim)
            .ok_or_else(|| EpubError::malformed_package(location.as_str(), "itemref缺少idref属性"))?;
        if !manifest.contains(idref) {
            return Err(EpubError::DanglingSpineReference {
                package: location.to_string(),
                idref: idref.to_string(),
            });
        }

        let linear = itemref.attr("linear").map(str::trim) != Some("no");
        let mut item = SpineItem::with_linear(idref, linear);
        item.id = itemref.attr("id").map(str::to_string);
        item.properties = itemref
            .attr("properties")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        items.push(item);
    }

    Ok(Spine {
        toc,
        page_progression_direction: element.attr("page-progression-direction").map(str::to_string),
        items,
    })
}

/// 解析guide，引用无效的条目跳过并记录警告
fn parse_guide(element: &Element, location: &ArchivePath, warnings: &mut Vec<ParseWarning>) -> Vec<GuideReference> {
    let mut references = Vec::new();
    for reference in element.children_named("reference") {
        let href = reference.attr("href").unwrap_or_default().trim();
        let resolved = if href.is_empty() {
            Err(EpubError::malformed_package(location.as_str(), "reference缺少href属性"))
        } else {
            location.resolve_with_fragment(href)
        };
        match resolved {
            Ok((path, fragment)) => references.push(GuideReference {
                kind: reference.attr("type").unwrap_or_default().trim().to_string(),
                title: reference.attr("title").map(str::to_string),
                href: path,
                fragment,
            }),
            Err(e) => record(
                warnings,
                ParseWarning::GuideReferenceSkipped {
                    href: href.to_string(),
                    reason: e.to_string(),
                },
            ),
        }
    }
    references
}

/// `<meta name="cover">` 必须指向清单项：按ID匹配，兼容直接写路径的旧书
fn check_cover(metadata: &Metadata, manifest: &Manifest, location: &ArchivePath) -> Result<()> {
    let Some(cover) = metadata.cover_id() else {
        return Ok(());
    };
    if manifest.contains(&cover) {
        return Ok(());
    }
    let by_href = location
        .resolve(cover.as_str())
        .ok()
        .and_then(|path| manifest.find_by_href(&path));
    if by_href.is_some() {
        return Ok(());
    }
    Err(EpubError::malformed_package(
        location.as_str(),
        format!("封面元数据引用了不存在的清单项: {}", cover),
    ))
}

/// 确定导航来源：导航文档优先，其次是spine的toc，最后是任意NCX清单项
fn navigation_source(
    manifest: &Manifest,
    spine: &Spine,
    location: &ArchivePath,
    warnings: &mut Vec<ParseWarning>,
) -> Option<NavigationSource> {
    let nav_items: Vec<&ManifestItem> = manifest.iter().filter(|item| item.is_nav()).collect();
    if let Some(first) = nav_items.first() {
        if nav_items.len() > 1 {
            record(
                warnings,
                ParseWarning::MultipleNavigationDocuments {
                    chosen: first.id.clone(),
                },
            );
        }
        return Some(NavigationSource::InBand(first.id.clone()));
    }

    // toc引用已在parse_spine中校验
    if let Some(item) = spine.toc.as_deref().and_then(|toc| manifest.get(toc)) {
        return Some(NavigationSource::Legacy(item.href.clone()));
    }

    if let Some(item) = manifest.iter().find(|item| item.is_ncx()) {
        debug!("spine未声明toc，使用清单中的NCX: {}", item.href);
        return Some(NavigationSource::Legacy(item.href.clone()));
    }

    record(
        warnings,
        ParseWarning::NoNavigationSource {
            package: location.to_string(),
        },
    );
    None
}
