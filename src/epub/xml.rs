//! XML元素树模块
//!
//! 把条目字节解码后用quick-xml构造成带命名空间的元素树，
//! 供container、OPF、导航文档和内容文档共用。

use crate::epub::archive::EntryReader;
use crate::epub::error::{EpubError, Result};
use crate::epub::path::ArchivePath;
use encoding_rs::Encoding;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use thiserror::Error;

/// 常用命名空间
pub mod ns {
    pub const CONTAINER: &str = "urn:oasis:names:tc:opendocument:xmlns:container";
    pub const OPF: &str = "http://www.idpf.org/2007/opf";
    pub const DC: &str = "http://purl.org/dc/elements/1.1/";
    pub const NCX: &str = "http://www.daisy.org/z3986/2005/ncx/";
    pub const XHTML: &str = "http://www.w3.org/1999/xhtml";
    pub const OPS: &str = "http://www.idpf.org/2007/ops";
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLENC: &str = "http://www.w3.org/2001/04/xmlenc#";
}

/// 元素树构造错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("字符编码错误: {0}")]
    Encoding(String),
    #[error("XML格式错误: {0}")]
    Syntax(String),
}

/// 带命名空间的名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    /// 源文档中的写法，如 `dc:title`
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    pub fn namespace(&self) -> Option<&str> {
        self.name.namespace.as_deref()
    }

    /// 本地名称是否匹配（忽略命名空间）
    pub fn is(&self, local: &str) -> bool {
        self.name.local == local
    }

    /// 命名空间和本地名称是否都匹配
    pub fn is_in(&self, namespace: &str, local: &str) -> bool {
        self.namespace() == Some(namespace) && self.is(local)
    }

    /// 无命名空间的属性
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace.is_none() && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// 指定命名空间的属性
    pub fn attr_ns(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace.as_deref() == Some(namespace) && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// 按本地名称查找属性，优先无命名空间的属性
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attr(local).or_else(|| {
            self.attributes
                .iter()
                .find(|a| a.name.local == local)
                .map(|a| a.value.as_str())
        })
    }

    /// `xml:lang` 属性
    pub fn lang(&self) -> Option<&str> {
        self.attr_ns(ns::XML, "lang").or_else(|| {
            self.attributes
                .iter()
                .find(|a| a.name.prefix.as_deref() == Some("xml") && a.name.local == "lang")
                .map(|a| a.value.as_str())
        })
    }

    /// 子元素
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// 指定本地名称的子元素
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children().filter(move |e| e.is(local))
    }

    /// 第一个指定本地名称的子元素
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.children().find(|e| e.is(local))
    }

    /// 先序遍历所有后代元素（不含自身）
    pub fn descendants(&self) -> Descendants<'_> {
        let mut stack: Vec<&Element> = self.children().collect();
        stack.reverse();
        Descendants { stack }
    }

    /// 按路径查找第一个元素
    ///
    /// 路径由 `/` 分隔的本地名称组成，`*` 匹配任意元素，以 `//` 开头时第一段在所有后代中查找。
    pub fn find(&self, path: &str) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }

    /// 按路径查找所有元素
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        let (deep, rest) = match path.strip_prefix("//") {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let Some(first) = segments.next() else {
            return Vec::new();
        };

        let matches = |e: &Element, segment: &str| segment == "*" || e.is(segment);
        let mut current: Vec<&Element> = if deep {
            self.descendants().filter(|e| matches(*e, first)).collect()
        } else {
            self.children().filter(|e| matches(*e, first)).collect()
        };

        for segment in segments {
            current = current
                .into_iter()
                .flat_map(|e| e.children().filter(move |c| matches(*c, segment)))
                .collect();
        }
        current
    }

    /// 所有后代文本节点拼接后的文本
    pub fn text(&self) -> String {
        let mut result = String::new();
        collect_text(self, &mut result);
        result
    }

    /// 合并连续空白并去掉首尾空白后的文本
    pub fn normalized_text(&self) -> String {
        self.text().split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

/// 先序遍历迭代器
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        let element = self.stack.pop()?;
        let start = self.stack.len();
        self.stack.extend(element.children());
        self.stack[start..].reverse();
        Some(element)
    }
}

/// 解析后的XML文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementTree {
    root: Element,
}

impl ElementTree {
    /// 解码字节并解析
    ///
    /// 有BOM时以BOM为准，否则使用 `encoding`。无效的字节序列直接报错，不做替换。
    pub fn parse(bytes: &[u8], encoding: &'static Encoding) -> std::result::Result<Self, TreeError> {
        let text = decode(bytes, encoding)?;
        Self::parse_str(&text)
    }

    /// 解析已经解码的文本
    pub fn parse_str(text: &str) -> std::result::Result<Self, TreeError> {
        let mut reader = NsReader::from_str(text);
        reader.config_mut().expand_empty_elements = true;

        let syntax = |e: &dyn std::fmt::Display| TreeError::Syntax(e.to_string());
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position();
            let (resolved, event) = reader.read_resolved_event().map_err(|e| syntax(&e))?;
            let namespace = namespace_of(resolved);

            match event {
                Event::Start(e) => {
                    if root.is_some() && stack.is_empty() {
                        return Err(TreeError::Syntax(format!("位置 {} 处出现多个根元素", position)));
                    }
                    let name = QName {
                        namespace,
                        prefix: e.name().prefix().map(|p| utf8(p.as_ref())),
                        local: utf8(e.local_name().as_ref()),
                    };

                    let mut attributes = Vec::new();
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| syntax(&e))?;
                        if attr.key.as_namespace_binding().is_some() {
                            continue;
                        }
                        let (resolved, local) = reader.resolve_attribute(attr.key);
                        let attr_name = QName {
                            namespace: namespace_of(resolved),
                            prefix: attr.key.prefix().map(|p| utf8(p.as_ref())),
                            local: utf8(local.as_ref()),
                        };
                        let value = attr
                            .unescape_value_with(resolve_entity)
                            .map_err(|e| syntax(&e))?
                            .into_owned();
                        attributes.push(Attribute { name: attr_name, value });
                    }

                    stack.push(Element {
                        name,
                        attributes,
                        children: Vec::new(),
                    });
                }
                Event::End(_) => {
                    let Some(element) = stack.pop() else {
                        return Err(TreeError::Syntax(format!("位置 {} 处出现多余的结束标签", position)));
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::Text(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = e.unescape_with(resolve_entity).map_err(|e| syntax(&e))?;
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8(e.into_inner().into_owned())
                            .map_err(|e| syntax(&e))?;
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(TreeError::Syntax(format!("元素 <{}> 没有闭合", open.name.qualified())));
        }
        root.map(|root| ElementTree { root })
            .ok_or_else(|| TreeError::Syntax("文档中没有根元素".to_string()))
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn into_root(self) -> Element {
        self.root
    }
}

/// 读取条目并解析为元素树
///
/// 编码错误映射为 `SourceUnreadable`，语法错误交给 `malformed` 构造对应层级的错误。
pub(crate) fn read_tree(
    reader: &dyn EntryReader,
    path: &ArchivePath,
    encoding: &'static Encoding,
    malformed: impl FnOnce(String) -> EpubError,
) -> Result<ElementTree> {
    let bytes = reader.read(path.as_str())?;
    ElementTree::parse(&bytes, encoding).map_err(|e| match e {
        TreeError::Encoding(reason) => EpubError::unreadable(format!("{}!{}", reader.origin(), path), reason),
        TreeError::Syntax(reason) => malformed(reason),
    })
}

pub(crate) fn decode(bytes: &[u8], fallback: &'static Encoding) -> std::result::Result<String, TreeError> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_length)) => (encoding, &bytes[bom_length..]),
        None => (fallback, bytes),
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
        .ok_or_else(|| TreeError::Encoding(format!("不是有效的{}字节序列", encoding.name())))
}

fn namespace_of(resolved: ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(namespace) => Some(utf8(namespace.as_ref())),
        _ => None,
    }
}

fn utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// XML预定义实体以及XHTML内容中常见的命名实体
fn resolve_entity(entity: &str) -> Option<&'static str> {
    let value = match entity {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        "nbsp" => "\u{a0}",
        "ensp" => "\u{2002}",
        "emsp" => "\u{2003}",
        "thinsp" => "\u{2009}",
        "shy" => "\u{ad}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "hellip" => "\u{2026}",
        "middot" => "\u{b7}",
        "bull" => "\u{2022}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        _ => return None,
    };
    Some(value)
}
