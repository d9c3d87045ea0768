//! EPUB 3导航文档解析
//!
//! 导航文档是普通的XHTML，目录由 `epub:type` 标记的 `nav` 元素给出，
//! 内部是嵌套的 `ol/li/a` 列表。链接相对导航文档自身的路径解析。

use crate::epub::error::{EpubError, ParseWarning, Result, record};
use crate::epub::nav::navigation::{NavPoint, NavTarget, Navigation};
use crate::epub::path::ArchivePath;
use crate::epub::xml::{Element, ElementTree, ns};

/// 从导航文档元素树构建导航
pub(crate) fn parse_nav_document(
    tree: &ElementTree,
    location: &ArchivePath,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Navigation> {
    let root = tree.root();
    if !root.is("html") {
        return Err(EpubError::malformed_navigation(
            location.as_str(),
            format!("根元素应为html，找到 {}", root.local_name()),
        ));
    }

    let navs: Vec<&Element> = root.descendants().filter(|e| e.is("nav")).collect();
    let toc_nav = navs
        .iter()
        .find(|nav| has_type(nav, "toc"))
        // 没有标记类型时退回第一个未标记的nav
        .or_else(|| navs.iter().find(|nav| epub_type(nav).is_none()))
        .copied()
        .ok_or_else(|| EpubError::malformed_navigation(location.as_str(), "没有找到epub:type=\"toc\"的nav元素"))?;

    let title = heading(toc_nav).or_else(|| {
        root.find("head/title")
            .map(Element::normalized_text)
            .filter(|t| !t.is_empty())
    });

    let mut navigation = Navigation {
        title,
        toc: parse_list(toc_nav, location, warnings),
        source: Some(location.clone()),
        ..Navigation::empty()
    };
    if let Some(nav) = navs.iter().find(|nav| has_type(nav, "page-list")) {
        navigation.page_list = parse_list(nav, location, warnings);
    }
    if let Some(nav) = navs.iter().find(|nav| has_type(nav, "landmarks")) {
        navigation.landmarks = parse_list(nav, location, warnings);
    }
    Ok(navigation)
}

fn epub_type(element: &Element) -> Option<&str> {
    element
        .attr_ns(ns::OPS, "type")
        .or_else(|| element.attr_local("type"))
}

fn has_type(element: &Element, kind: &str) -> bool {
    epub_type(element).is_some_and(|types| types.split_whitespace().any(|t| t == kind))
}

/// nav下第一个标题元素的文本
fn heading(nav: &Element) -> Option<String> {
    nav.children()
        .find(|e| matches!(e.local_name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6"))
        .map(Element::normalized_text)
        .filter(|t| !t.is_empty())
}

fn parse_list(container: &Element, location: &ArchivePath, warnings: &mut Vec<ParseWarning>) -> Vec<NavPoint> {
    let mut points = Vec::new();
    if let Some(list) = container.child("ol").or_else(|| container.child("ul")) {
        for item in list.children_named("li") {
            parse_item(item, location, warnings, &mut points);
        }
    }
    points
}

/// 解析一个li；没有可用链接时丢弃该节点，子节点提升到上一层
fn parse_item(item: &Element, location: &ArchivePath, warnings: &mut Vec<ParseWarning>, out: &mut Vec<NavPoint>) {
    let children = parse_list(item, location, warnings);
    let link = item.child("a").or_else(|| item.child("span"));
    let label = link.map(label_of).unwrap_or_default();

    let href = link.filter(|l| l.is("a")).and_then(|a| a.attr("href")).map(str::trim);
    let resolved = match href {
        Some(href) => location.resolve_with_fragment(href).map_err(|e| e.to_string()),
        None => Err("没有链接".to_string()),
    };

    match resolved {
        Ok((path, fragment)) => {
            let mut point = NavPoint::new(label, NavTarget::new(path, fragment));
            point.id = item.attr("id").map(str::to_string);
            point.kind = link.and_then(epub_type).map(str::to_string);
            point.children = children;
            out.push(point);
        }
        Err(reason) => {
            record(warnings, ParseWarning::NavPointSkipped { label, reason });
            out.extend(children);
        }
    }
}

/// 链接文本；纯图片链接使用title或alt
fn label_of(link: &Element) -> String {
    let text = link.normalized_text();
    if !text.is_empty() {
        return text;
    }
    link.attr("title")
        .or_else(|| link.descendants().find(|e| e.is("img")).and_then(|img| img.attr("alt")))
        .unwrap_or_default()
        .trim()
        .to_string()
}
