//! 测试用的归档构造工具

use std::io::{Cursor, Write};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// 在内存中构造zip归档
#[derive(Debug, Clone, Default)]
pub(crate) struct ZipBuilder {
    // 压缩方式为None的条目是目录
    entries: Vec<(String, Vec<u8>, Option<CompressionMethod>)>,
}

impl ZipBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn stored(self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.with_method(name, content, CompressionMethod::Stored)
    }

    pub(crate) fn deflated(self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.with_method(name, content, CompressionMethod::Deflated)
    }

    /// 替换同名条目（保持原位置），不存在时追加
    pub(crate) fn replace(mut self, name: &str, content: impl AsRef<[u8]>) -> Self {
        match self.entries.iter_mut().find(|(n, _, _)| n == name) {
            Some(entry) => {
                entry.1 = content.as_ref().to_vec();
                self
            }
            None => self.deflated(name, content),
        }
    }

    pub(crate) fn directory(mut self, name: &str) -> Self {
        self.entries.push((name.to_string(), Vec::new(), None));
        self
    }

    pub(crate) fn without(mut self, name: &str) -> Self {
        self.entries.retain(|(n, _, _)| n != name);
        self
    }

    fn with_method(mut self, name: &str, content: impl AsRef<[u8]>, method: CompressionMethod) -> Self {
        self.entries
            .push((name.to_string(), content.as_ref().to_vec(), Some(method)));
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content, method) in &self.entries {
            match method {
                Some(method) => {
                    let options = SimpleFileOptions::default().compression_method(*method);
                    zip.start_file(name.as_str(), options).unwrap();
                    zip.write_all(content).unwrap();
                }
                None => zip
                    .add_directory(name.as_str(), SimpleFileOptions::default())
                    .unwrap(),
            }
        }
        zip.finish().unwrap().into_inner()
    }
}

pub(crate) const MIMETYPE: &str = "application/epub+zip";

pub(crate) const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#;

pub(crate) const PACKAGE_OPF: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<package version="3.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId" xml:lang="zh-CN">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:title>测试书籍</dc:title>
        <dc:creator id="creator1">测试作者</dc:creator>
        <meta refines="#creator1" property="role" scheme="marc:relators">aut</meta>
        <dc:language>zh-CN</dc:language>
        <dc:identifier id="BookId">urn:uuid:12345678-1234-1234-1234-123456789abc</dc:identifier>
        <meta property="dcterms:modified">2025-06-05T11:24:01Z</meta>
    </metadata>
    <manifest>
        <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
        <item id="chap1" href="chap1.xhtml" media-type="application/xhtml+xml"/>
    </manifest>
    <spine>
        <itemref idref="chap1"/>
    </spine>
</package>"##;

pub(crate) const NAV_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>目录</title></head>
<body>
    <nav epub:type="toc" id="toc">
        <h1>目录</h1>
        <ol>
            <li><a href="chap1.xhtml">第一章</a>
                <ol>
                    <li><a href="chap1.xhtml#s1">第一节</a></li>
                </ol>
            </li>
        </ol>
    </nav>
</body>
</html>"#;

pub(crate) const CHAPTER1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>第一章</title></head>
<body><h1>第一章</h1><p id="s1">这是第一章的内容。</p></body>
</html>"#;

pub(crate) const PACKAGE_OPF2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="2.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
        <dc:title>Legacy Book</dc:title>
        <dc:creator opf:role="aut" opf:file-as="Author, Legacy">Legacy Author</dc:creator>
        <dc:identifier id="BookId" opf:scheme="ISBN">978-1234567890</dc:identifier>
        <meta name="cover" content="cover"/>
    </metadata>
    <manifest>
        <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
        <item id="cover" href="images/cover.jpg" media-type="image/jpeg"/>
        <item id="chap1" href="text/chap1.xhtml" media-type="application/xhtml+xml"/>
        <item id="chap2" href="text/chap2.xhtml" media-type="application/xhtml+xml"/>
    </manifest>
    <spine toc="ncx">
        <itemref idref="chap1"/>
        <itemref idref="chap2" linear="no"/>
    </spine>
    <guide>
        <reference type="cover" title="Cover" href="images/cover.jpg"/>
        <reference type="text" title="Start" href="text/chap1.xhtml#start"/>
    </guide>
</package>"#;

pub(crate) const TOC_NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
    <head>
        <meta name="dtb:uid" content="978-1234567890"/>
    </head>
    <docTitle><text>Legacy Book</text></docTitle>
    <navMap>
        <navPoint id="np1" playOrder="1">
            <navLabel><text>Chapter 1</text></navLabel>
            <content src="text/chap1.xhtml"/>
            <navPoint id="np2" playOrder="2">
                <navLabel><text>Section 1.1</text></navLabel>
                <content src="text/chap1.xhtml#s1"/>
            </navPoint>
        </navPoint>
        <navPoint id="np3" playOrder="3">
            <navLabel><text>Chapter 2</text></navLabel>
            <content src="text/chap2.xhtml"/>
        </navPoint>
    </navMap>
</ncx>"#;

/// 一个最小的EPUB 3归档
pub(crate) fn epub3() -> ZipBuilder {
    ZipBuilder::new()
        .stored("mimetype", MIMETYPE)
        .deflated("META-INF/container.xml", CONTAINER_XML)
        .deflated("OEBPS/content.opf", PACKAGE_OPF)
        .deflated("OEBPS/nav.xhtml", NAV_XHTML)
        .deflated("OEBPS/chap1.xhtml", CHAPTER1)
}

/// 一个使用NCX和guide的EPUB 2归档
pub(crate) fn epub2() -> ZipBuilder {
    ZipBuilder::new()
        .stored("mimetype", MIMETYPE)
        .deflated("META-INF/container.xml", CONTAINER_XML)
        .deflated("OEBPS/content.opf", PACKAGE_OPF2)
        .deflated("OEBPS/toc.ncx", TOC_NCX)
        .stored("OEBPS/images/cover.jpg", [0xFFu8, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46])
        .deflated("OEBPS/text/chap1.xhtml", CHAPTER1)
        .deflated("OEBPS/text/chap2.xhtml", CHAPTER1.replace("第一章", "第二章"))
}
