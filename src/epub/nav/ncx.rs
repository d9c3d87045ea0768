//! NCX（Navigation Control file for XML）解析
//!
//! EPUB 2的目录格式：navMap中嵌套的navPoint，每个带navLabel和content。

use crate::epub::error::{EpubError, ParseWarning, Result, record};
use crate::epub::nav::navigation::{NavPoint, NavTarget, Navigation};
use crate::epub::path::ArchivePath;
use crate::epub::xml::{Element, ElementTree};

/// 从NCX元素树构建导航，href相对NCX文件解析
pub(crate) fn parse_ncx(
    tree: &ElementTree,
    location: &ArchivePath,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Navigation> {
    let root = tree.root();
    if !root.is("ncx") {
        return Err(EpubError::malformed_navigation(
            location.as_str(),
            format!("根元素应为ncx，找到 {}", root.local_name()),
        ));
    }
    let nav_map = root
        .child("navMap")
        .ok_or_else(|| EpubError::malformed_navigation(location.as_str(), "缺少navMap元素"))?;

    let mut toc = Vec::new();
    for nav_point in nav_map.children_named("navPoint") {
        parse_point(nav_point, "navPoint", location, warnings, &mut toc);
    }

    let mut page_list = Vec::new();
    if let Some(list) = root.child("pageList") {
        for target in list.children_named("pageTarget") {
            parse_point(target, "pageTarget", location, warnings, &mut page_list);
        }
    }

    Ok(Navigation {
        title: root
            .find("docTitle/text")
            .map(Element::normalized_text)
            .filter(|t| !t.is_empty()),
        toc,
        page_list,
        landmarks: Vec::new(),
        source: Some(location.clone()),
    })
}

/// 解析navPoint或pageTarget；content无效时跳过该节点，保留其子节点
fn parse_point(
    element: &Element,
    child_name: &str,
    location: &ArchivePath,
    warnings: &mut Vec<ParseWarning>,
    out: &mut Vec<NavPoint>,
) {
    let mut children = Vec::new();
    for child in element.children_named(child_name) {
        parse_point(child, child_name, location, warnings, &mut children);
    }

    let label = element
        .find("navLabel/text")
        .map(Element::normalized_text)
        .unwrap_or_default();
    let src = element.child("content").and_then(|c| c.attr("src")).map(str::trim);
    let resolved = match src {
        Some(src) => location.resolve_with_fragment(src).map_err(|e| e.to_string()),
        None => Err("缺少content元素".to_string()),
    };

    match resolved {
        Ok((path, fragment)) => {
            let mut point = NavPoint::new(label, NavTarget::new(path, fragment));
            point.id = element.attr("id").map(str::to_string);
            point.kind = element.attr("type").map(str::to_string);
            point.children = children;
            out.push(point);
        }
        Err(reason) => {
            record(warnings, ParseWarning::NavPointSkipped { label, reason });
            out.extend(children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::error::ErrorKind;
    use crate::epub::testing::TOC_NCX;

    fn parse(xml: &str) -> (Result<Navigation>, Vec<ParseWarning>) {
        let tree = ElementTree::parse_str(xml).unwrap();
        let mut warnings = Vec::new();
        let result = parse_ncx(&tree, &ArchivePath::new("OEBPS/toc.ncx").unwrap(), &mut warnings);
        (result, warnings)
    }

    #[test]
    fn test_parse_nav_map() {
        let (result, warnings) = parse(TOC_NCX);
        let navigation = result.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(navigation.title.as_deref(), Some("Legacy Book"));
        assert_eq!(navigation.source.as_ref().unwrap(), "OEBPS/toc.ncx");

        let first = &navigation.toc[0];
        assert_eq!(first.id.as_deref(), Some("np1"));
        assert_eq!(first.label, "Chapter 1");
        assert_eq!(first.target.path, "OEBPS/text/chap1.xhtml");
        assert_eq!(first.children[0].label, "Section 1.1");
        assert_eq!(first.children[0].target.fragment.as_deref(), Some("s1"));
        assert_eq!(navigation.toc[1].target.path, "OEBPS/text/chap2.xhtml");
        assert_eq!(navigation.depth(), 2);
    }

    #[test]
    fn test_bad_nav_point_keeps_children() {
        let xml = TOC_NCX.replace(r#"<content src="text/chap1.xhtml"/>"#, r#"<content src="https://example.com"/>"#);
        let (result, warnings) = parse(&xml);
        let navigation = result.unwrap();
        let labels: Vec<&str> = navigation.toc.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Section 1.1", "Chapter 2"]);
        assert!(matches!(&warnings[..], [ParseWarning::NavPointSkipped { label, .. }] if label == "Chapter 1"));
    }

    #[test]
    fn test_page_list() {
        let xml = TOC_NCX.replace(
            "</navMap>",
            r#"</navMap>
    <pageList>
        <pageTarget id="p1" type="normal" value="1">
            <navLabel><text>1</text></navLabel>
            <content src="text/chap1.xhtml#page1"/>
        </pageTarget>
    </pageList>"#,
        );
        let (result, _) = parse(&xml);
        let navigation = result.unwrap();
        assert_eq!(navigation.page_list.len(), 1);
        assert_eq!(navigation.page_list[0].kind.as_deref(), Some("normal"));
        assert_eq!(navigation.page_list[0].target.fragment.as_deref(), Some("page1"));
    }

    #[test]
    fn test_malformed_ncx() {
        let (result, _) = parse(r#"<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/"><head/></ncx>"#);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::MalformedNavigation);

        let (result, _) = parse("<html/>");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::MalformedNavigation);
    }
}
