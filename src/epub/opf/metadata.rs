//! 元数据处理模块
//!
//! OPF的metadata部分是可扩展的：除了Dublin Core之外，任何词汇表都可以出现。
//! 这里按声明顺序保存所有条目，不做词汇表校验，只在其上提供常用字段的查询。

use crate::epub::path::ArchivePath;
use crate::epub::xml::{Element, ns};
use serde::Serialize;
use std::collections::BTreeMap;

/// 元数据条目的来源形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    /// Dublin Core元素，如 `<dc:title>`
    DublinCore,
    /// 基于name属性的meta标签，如 `<meta name="cover" content="cover-image"/>`
    NameBased,
    /// 基于property属性的meta标签，如 `<meta property="dcterms:modified">...</meta>`
    PropertyBased,
    /// 其他词汇表的元素，原样保留
    Extension,
}

/// 通过 `refines` 附加到某个条目上的精化信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Refinement {
    /// property属性值（如role、file-as、display-seq等）
    pub property: String,
    pub value: String,
    /// scheme属性（如marc:relators）
    pub scheme: Option<String>,
    pub id: Option<String>,
}

/// 单个元数据条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataEntry {
    /// 条目名称：Dublin Core统一为 `dc:` 前缀，meta标签为name或property的值
    pub term: String,
    pub value: String,
    pub kind: EntryKind,
    pub id: Option<String>,
    pub lang: Option<String>,
    /// 元素上的全部属性，键为源文档中的限定名
    pub attributes: BTreeMap<String, String>,
    pub refinements: Vec<Refinement>,
}

impl MetadataEntry {
    /// 按本地名称查找属性，`role` 可以匹配 `opf:role`
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes.get(local).map(String::as_str).or_else(|| {
            self.attributes
                .iter()
                .find(|(key, _)| key.rsplit_once(':').is_some_and(|(_, name)| name == local))
                .map(|(_, value)| value.as_str())
        })
    }

    /// 第一个指定property的精化值
    pub fn refinement(&self, property: &str) -> Option<&str> {
        self.refinements
            .iter()
            .find(|r| r.property == property)
            .map(|r| r.value.as_str())
    }
}

/// 元数据中的link元素
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataLink {
    /// 原始href，可能是外部URL
    pub href: String,
    /// href是归档内相对引用时的解析结果
    pub resolved: Option<ArchivePath>,
    pub rel: Option<String>,
    pub media_type: Option<String>,
    pub refines: Option<String>,
    pub properties: Option<String>,
    pub id: Option<String>,
}

/// 创建者信息(作者、编辑者等)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    /// 创建者姓名
    pub name: String,
    /// 角色(如author、editor等)
    pub role: Option<String>,
    /// 排序用名称
    pub file_as: Option<String>,
    /// 显示顺序
    pub display_seq: Option<u32>,
    /// 元素ID（用于关联refines元数据）
    pub id: Option<String>,
}

/// 标识符信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    /// 标识符值
    pub value: String,
    /// 标识符类型(如ISBN、UUID等)
    pub scheme: Option<String>,
    pub id: Option<String>,
}

/// OPF文件中的元数据信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    entries: Vec<MetadataEntry>,
    links: Vec<MetadataLink>,
}

impl Metadata {
    /// 创建新的元数据实例
    pub fn new() -> Self {
        Self::default()
    }

    /// 从metadata元素构造
    ///
    /// `location` 是包文档的路径，用于解析link的href。
    pub fn from_element(element: &Element, location: &ArchivePath) -> Self {
        let mut metadata = Metadata::new();
        let mut pending: Vec<(String, Refinement)> = Vec::new();

        // OPF 2.0允许把元素包在dc-metadata/x-metadata中
        let children = element.children().flat_map(|child| {
            if child.is("dc-metadata") || child.is("x-metadata") {
                child.children().collect::<Vec<_>>()
            } else {
                vec![child]
            }
        });

        for child in children {
            if child.namespace() == Some(ns::DC) {
                metadata.push(entry_from(child, format!("dc:{}", child.local_name()), EntryKind::DublinCore));
                continue;
            }

            let in_opf = matches!(child.namespace(), None | Some(ns::OPF));
            if in_opf && child.is("meta") {
                let content = child.attr("content").map(str::to_string);
                let text = child.normalized_text();
                let value = if text.is_empty() { content.clone().unwrap_or_default() } else { text };

                match (child.attr("refines"), child.attr("property"), child.attr("name")) {
                    (Some(refines), Some(property), _) => {
                        let target = refines.trim().trim_start_matches('#').to_string();
                        pending.push((
                            target,
                            Refinement {
                                property: property.to_string(),
                                value,
                                scheme: child.attr("scheme").map(str::to_string),
                                id: child.attr("id").map(str::to_string),
                            },
                        ));
                    }
                    (None, Some(property), _) => {
                        let mut entry = entry_from(child, property.to_string(), EntryKind::PropertyBased);
                        entry.value = value;
                        metadata.push(entry);
                    }
                    (_, None, Some(name)) => {
                        let mut entry = entry_from(child, name.to_string(), EntryKind::NameBased);
                        entry.value = content.unwrap_or_default();
                        metadata.push(entry);
                    }
                    _ => metadata.push(entry_from(child, "meta".to_string(), EntryKind::Extension)),
                }
                continue;
            }

            if in_opf && child.is("link") {
                let href = child.attr("href").unwrap_or_default().trim().to_string();
                metadata.links.push(MetadataLink {
                    resolved: Some(href.as_str())
                        .filter(|h| !h.is_empty())
                        .and_then(|h| location.resolve(h).ok()),
                    href,
                    rel: child.attr("rel").map(str::to_string),
                    media_type: child.attr("media-type").map(str::to_string),
                    refines: child.attr("refines").map(str::to_string),
                    properties: child.attr("properties").map(str::to_string),
                    id: child.attr("id").map(str::to_string),
                });
                continue;
            }

            metadata.push(entry_from(child, child.name.qualified(), EntryKind::Extension));
        }

        for (target, refinement) in pending {
            match metadata.entries.iter_mut().find(|e| e.id.as_deref() == Some(target.as_str())) {
                Some(entry) => entry.refinements.push(refinement),
                None => {
                    // 精化对象不是元数据条目（例如清单项），作为独立条目保留
                    let mut attributes = BTreeMap::new();
                    attributes.insert("refines".to_string(), format!("#{}", target));
                    metadata.push(MetadataEntry {
                        term: refinement.property,
                        value: refinement.value,
                        kind: EntryKind::PropertyBased,
                        id: refinement.id,
                        lang: None,
                        attributes,
                        refinements: Vec::new(),
                    });
                }
            }
        }

        metadata
    }

    /// 追加条目
    pub fn push(&mut self, entry: MetadataEntry) {
        self.entries.push(entry);
    }

    /// 按声明顺序的所有条目
    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn links(&self) -> &[MetadataLink] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 指定名称的所有条目
    pub fn get(&self, term: &str) -> Vec<&MetadataEntry> {
        self.entries.iter().filter(|e| e.term == term).collect()
    }

    /// 指定名称的第一个条目的值
    pub fn first_value(&self, term: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|e| e.term == term && !e.value.is_empty())
            .map(|e| e.value.clone())
    }

    /// 按ID查找条目
    pub fn find_by_id(&self, id: &str) -> Option<&MetadataEntry> {
        self.entries.iter().find(|e| e.id.as_deref() == Some(id))
    }

    /// 获取标题
    pub fn title(&self) -> Option<String> {
        self.first_value("dc:title")
    }

    /// 获取所有标题
    pub fn titles(&self) -> Vec<String> {
        self.values("dc:title")
    }

    /// 获取所有创建者
    pub fn creators(&self) -> Vec<Creator> {
        self.people("dc:creator")
    }

    /// 获取所有贡献者
    pub fn contributors(&self) -> Vec<Creator> {
        self.people("dc:contributor")
    }

    /// 获取语言
    pub fn language(&self) -> Option<String> {
        self.first_value("dc:language")
    }

    /// 获取所有标识符
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.get("dc:identifier")
            .into_iter()
            .map(|entry| Identifier {
                value: entry.value.clone(),
                scheme: entry
                    .attribute("scheme")
                    .or_else(|| entry.refinement("identifier-type"))
                    .map(str::to_string),
                id: entry.id.clone(),
            })
            .collect()
    }

    /// 获取出版社
    pub fn publisher(&self) -> Option<String> {
        self.first_value("dc:publisher")
    }

    /// 获取出版日期
    pub fn date(&self) -> Option<String> {
        self.first_value("dc:date")
    }

    /// 获取描述
    pub fn description(&self) -> Option<String> {
        self.first_value("dc:description")
    }

    /// 获取所有主题
    pub fn subjects(&self) -> Vec<String> {
        self.values("dc:subject")
    }

    /// 获取版权信息
    pub fn rights(&self) -> Option<String> {
        self.first_value("dc:rights")
    }

    /// 获取修改时间
    pub fn modified(&self) -> Option<String> {
        self.first_value("dcterms:modified")
    }

    /// `<meta name="cover">` 的content，通常是清单项ID
    pub fn cover_id(&self) -> Option<String> {
        self.entries
            .iter()
            .find(|e| e.kind == EntryKind::NameBased && e.term == "cover")
            .map(|e| e.value.clone())
    }

    fn values(&self, term: &str) -> Vec<String> {
        self.get(term).into_iter().map(|e| e.value.clone()).collect()
    }

    /// 提取创建者信息（支持EPUB3的refines关联）
    fn people(&self, term: &str) -> Vec<Creator> {
        let mut people: Vec<Creator> = self
            .get(term)
            .into_iter()
            .map(|entry| Creator {
                name: entry.value.clone(),
                role: entry
                    .refinement("role")
                    .or_else(|| entry.attribute("role"))
                    .map(expand_role),
                file_as: entry
                    .refinement("file-as")
                    .or_else(|| entry.attribute("file-as"))
                    .map(str::to_string),
                display_seq: entry.refinement("display-seq").and_then(|s| s.trim().parse().ok()),
                id: entry.id.clone(),
            })
            .collect();
        // 有display-seq的按其排序，其余保持声明顺序
        people.sort_by_key(|c| c.display_seq.unwrap_or(u32::MAX));
        people
    }
}

/// 把marc:relators代码展开为可读的角色名
fn expand_role(code: &str) -> String {
    match code.trim() {
        "aut" => "author".to_string(),
        "edt" => "editor".to_string(),
        "trl" => "translator".to_string(),
        "ill" => "illustrator".to_string(),
        "nrt" => "narrator".to_string(),
        other => other.to_string(),
    }
}

fn entry_from(element: &Element, term: String, kind: EntryKind) -> MetadataEntry {
    MetadataEntry {
        term,
        value: element.normalized_text(),
        kind,
        id: element.attr("id").map(str::to_string),
        lang: element.lang().map(str::to_string),
        attributes: element
            .attributes
            .iter()
            .map(|a| (a.name.qualified(), a.value.clone()))
            .collect(),
        refinements: Vec::new(),
    }
}
