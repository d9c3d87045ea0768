//! OCF容器解析模块
//!
//! 校验mimetype标记条目，解析 `META-INF/container.xml` 中的rootfile列表。

use crate::epub::archive::EntryReader;
use crate::epub::config::ParseOptions;
use crate::epub::error::{EpubError, ParseWarning, Result, record};
use crate::epub::path::ArchivePath;
use crate::epub::xml::{ElementTree, read_tree};
use encoding_rs::Encoding;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// mimetype条目的路径
pub const MIMETYPE_PATH: &str = "mimetype";
/// mimetype条目必须包含的内容
pub const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";
/// container.xml的路径
pub const CONTAINER_PATH: &str = "META-INF/container.xml";
/// encryption.xml的路径
pub const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";
/// OPF包文档的媒体类型
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Container.xml中的rootfile信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendition {
    pub full_path: ArchivePath,
    pub media_type: String,
}

impl Rendition {
    /// 是否指向OPF包文档
    pub fn is_package(&self) -> bool {
        self.media_type == PACKAGE_MEDIA_TYPE
    }
}

/// OCF容器的解析结果
#[derive(Debug, Clone, Serialize)]
pub struct ContainerDescriptor {
    /// mimetype条目的内容
    pub mimetype: String,
    /// 所有rootfile，按声明顺序
    pub renditions: Vec<Rendition>,
    /// encryption.xml中声明的加密资源
    pub encrypted_resources: BTreeSet<ArchivePath>,
}

impl ContainerDescriptor {
    /// 校验mimetype并解析container.xml
    pub fn parse(
        reader: &dyn EntryReader,
        options: &ParseOptions,
        encoding: &'static Encoding,
        warnings: &mut Vec<ParseWarning>,
    ) -> Result<ContainerDescriptor> {
        let mimetype = check_mimetype(reader, options, warnings)?;

        if !reader.contains(CONTAINER_PATH) {
            return Err(malformed("缺少container.xml"));
        }
        let path = ArchivePath::new(CONTAINER_PATH)?;
        let tree = read_tree(reader, &path, encoding, |reason| malformed(reason))?;
        let renditions = parse_rootfiles(&tree)?;

        for rendition in &renditions {
            if !reader.contains(rendition.full_path.as_str()) {
                return Err(malformed(format!(
                    "rootfile指向的条目不存在: {}",
                    rendition.full_path
                )));
            }
            if !rendition.is_package() {
                record(
                    warnings,
                    ParseWarning::UnsupportedRendition {
                        path: rendition.full_path.to_string(),
                        media_type: rendition.media_type.clone(),
                    },
                );
            }
        }
        if !renditions.iter().any(Rendition::is_package) {
            return Err(malformed("没有找到任何OPF包文档"));
        }

        let encrypted_resources = if reader.contains(ENCRYPTION_PATH) {
            parse_encryption(reader, encoding, warnings)
        } else {
            BTreeSet::new()
        };

        debug!("container.xml声明了 {} 个rootfile", renditions.len());
        Ok(ContainerDescriptor {
            mimetype,
            renditions,
            encrypted_resources,
        })
    }

    /// 解析container.xml内容，返回rootfile列表
    ///
    /// # 参数
    /// * `xml_content` - container.xml的文件内容
    pub fn parse_xml(xml_content: &str) -> Result<Vec<Rendition>> {
        let tree = ElementTree::parse_str(xml_content).map_err(|e| malformed(e.to_string()))?;
        parse_rootfiles(&tree)
    }

    /// 指向OPF包文档的rootfile
    pub fn package_renditions(&self) -> impl Iterator<Item = &Rendition> {
        self.renditions.iter().filter(|r| r.is_package())
    }

    /// 默认rendition：第一个OPF包文档
    pub fn default_rendition(&self) -> Option<&Rendition> {
        self.package_renditions().next()
    }

    /// 资源是否在encryption.xml中声明为加密
    pub fn is_encrypted(&self, path: &ArchivePath) -> bool {
        self.encrypted_resources.contains(path)
    }
}

fn malformed(reason: impl Into<String>) -> EpubError {
    EpubError::MalformedContainer {
        path: CONTAINER_PATH.to_string(),
        reason: reason.into(),
    }
}

/// 校验mimetype条目
///
/// 内容必须与 `application/epub+zip` 完全一致。条目被压缩或不是第一个条目时，
/// 严格模式下报错，否则只记录警告。
fn check_mimetype(
    reader: &dyn EntryReader,
    options: &ParseOptions,
    warnings: &mut Vec<ParseWarning>,
) -> Result<String> {
    let not_epub = |reason: String| EpubError::NotAnArchiveOfThisFormat { reason };

    let info = reader
        .entry(MIMETYPE_PATH)
        .cloned()
        .ok_or_else(|| not_epub("缺少mimetype文件".to_string()))?;
    let content = reader
        .read(MIMETYPE_PATH)
        .map_err(|e| not_epub(format!("无法读取mimetype文件: {}", e)))?;

    if content != EPUB_MIMETYPE {
        return Err(not_epub(format!(
            "无效的mimetype: 期望 {}, 找到 {:?}",
            String::from_utf8_lossy(EPUB_MIMETYPE),
            String::from_utf8_lossy(&content)
        )));
    }

    if !info.stored {
        if options.strict_mimetype {
            return Err(not_epub("mimetype文件不能被压缩".to_string()));
        }
        record(warnings, ParseWarning::CompressedMimetype);
    }

    // 目录条目也占据归档位置
    let position = info.index;
    if position != 0 {
        if options.strict_mimetype {
            return Err(not_epub("mimetype必须是归档中的第一个条目".to_string()));
        }
        record(warnings, ParseWarning::MimetypeNotFirst { index: position });
    }

    debug!("EPUB验证成功: mimetype文件正确");
    Ok(String::from_utf8_lossy(&content).into_owned())
}

fn parse_rootfiles(tree: &ElementTree) -> Result<Vec<Rendition>> {
    let root = tree.root();
    if !root.is("container") {
        return Err(malformed(format!("根元素应为container，找到 {}", root.local_name())));
    }

    let mut renditions = Vec::new();
    for rootfile in root.find_all("rootfiles/rootfile") {
        let full_path = rootfile
            .attr("full-path")
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| malformed("rootfile缺少full-path属性"))?;
        let media_type = rootfile
            .attr("media-type")
            .unwrap_or(PACKAGE_MEDIA_TYPE)
            .trim()
            .to_string();

        renditions.push(Rendition {
            full_path: ArchivePath::new(full_path)?,
            media_type,
        });
    }

    if renditions.is_empty() {
        return Err(malformed("没有找到任何rootfile条目"));
    }
    Ok(renditions)
}

/// 收集encryption.xml中的CipherReference
///
/// encryption.xml只影响资源能否被正常读取，解析失败时记录警告并忽略。
fn parse_encryption(
    reader: &dyn EntryReader,
    encoding: &'static Encoding,
    warnings: &mut Vec<ParseWarning>,
) -> BTreeSet<ArchivePath> {
    let path = match ArchivePath::new(ENCRYPTION_PATH) {
        Ok(path) => path,
        Err(_) => return BTreeSet::new(),
    };
    let tree = match read_tree(reader, &path, encoding, |reason| EpubError::MalformedContainer {
        path: ENCRYPTION_PATH.to_string(),
        reason,
    }) {
        Ok(tree) => tree,
        Err(e) => {
            record(
                warnings,
                ParseWarning::AuxiliaryFileIgnored {
                    path: ENCRYPTION_PATH.to_string(),
                    reason: e.to_string(),
                },
            );
            return BTreeSet::new();
        }
    };

    tree.root()
        .descendants()
        .filter(|e| e.is("CipherReference"))
        .filter_map(|e| e.attr("URI"))
        .filter_map(|uri| ArchivePath::new(uri).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::archive::{MemoryEntries, ZipEntries};
    use crate::epub::error::ErrorKind;
    use crate::epub::testing::{self, CONTAINER_XML, MIMETYPE};
    use encoding_rs::UTF_8;

    fn parse(reader: &dyn EntryReader, options: &ParseOptions) -> (Result<ContainerDescriptor>, Vec<ParseWarning>) {
        let mut warnings = Vec::new();
        let result = ContainerDescriptor::parse(reader, options, UTF_8, &mut warnings);
        (result, warnings)
    }

    fn minimal() -> MemoryEntries {
        MemoryEntries::new("memory")
            .with_entry("mimetype", MIMETYPE)
            .with_entry("META-INF/container.xml", CONTAINER_XML)
            .with_entry("OEBPS/content.opf", testing::PACKAGE_OPF)
    }

    #[test]
    fn test_parse_container_xml() {
        let container_xml = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
        <rootfile full-path="OEBPS/toc.ncx" media-type="application/x-dtbncx+xml"/>
    </rootfiles>
</container>"#;

        let renditions = ContainerDescriptor::parse_xml(container_xml).unwrap();
        assert_eq!(renditions.len(), 2);
        assert_eq!(renditions[0].full_path, "OEBPS/content.opf");
        assert!(renditions[0].is_package());
        assert_eq!(renditions[1].full_path, "OEBPS/toc.ncx");
        assert!(!renditions[1].is_package());
    }

    #[test]
    fn test_parse_container_xml_without_rootfiles() {
        let err = ContainerDescriptor::parse_xml(
            r#"<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles/></container>"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);

        let err = ContainerDescriptor::parse_xml("<container><rootfiles>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    }

    #[test]
    fn test_parse_valid_container() {
        let (result, warnings) = parse(&minimal(), &ParseOptions::default());
        let container = result.unwrap();
        assert_eq!(container.mimetype, "application/epub+zip");
        assert_eq!(container.renditions.len(), 1);
        assert_eq!(
            container.default_rendition().unwrap().full_path,
            "OEBPS/content.opf"
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_missing_mimetype() {
        let entries = MemoryEntries::new("memory").with_entry("META-INF/container.xml", CONTAINER_XML);
        let (result, _) = parse(&entries, &ParseOptions::default());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotAnArchiveOfThisFormat);
    }

    #[test]
    fn test_wrong_mimetype_bytes() {
        for content in ["invalid/mimetype", "application/epub+zip\n"] {
            let mut entries = minimal();
            entries.insert("mimetype", content.as_bytes().to_vec(), true);
            let (result, _) = parse(&entries, &ParseOptions::default());
            assert_eq!(result.unwrap_err().kind(), ErrorKind::NotAnArchiveOfThisFormat);
        }
    }

    #[test]
    fn test_compressed_mimetype_is_a_warning() {
        let bytes = testing::epub3().build();
        let bytes_compressed = testing::ZipBuilder::new()
            .deflated("mimetype", MIMETYPE)
            .deflated("META-INF/container.xml", CONTAINER_XML)
            .deflated("OEBPS/content.opf", testing::PACKAGE_OPF)
            .build();

        let reader = ZipEntries::from_bytes(bytes).unwrap();
        let (result, warnings) = parse(&reader, &ParseOptions::default());
        assert!(result.is_ok());
        assert!(warnings.is_empty());

        let reader = ZipEntries::from_bytes(bytes_compressed).unwrap();
        let (result, warnings) = parse(&reader, &ParseOptions::default());
        assert!(result.is_ok());
        assert_eq!(warnings, vec![ParseWarning::CompressedMimetype]);

        let strict = ParseOptions::default().with_strict_mimetype(true);
        let (result, _) = parse(&reader, &strict);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotAnArchiveOfThisFormat);
    }

    #[test]
    fn test_mimetype_not_first() {
        let entries = MemoryEntries::new("memory")
            .with_entry("META-INF/container.xml", CONTAINER_XML)
            .with_entry("mimetype", MIMETYPE)
            .with_entry("OEBPS/content.opf", testing::PACKAGE_OPF);
        let (result, warnings) = parse(&entries, &ParseOptions::default());
        assert!(result.is_ok());
        assert_eq!(warnings, vec![ParseWarning::MimetypeNotFirst { index: 1 }]);
    }

    #[test]
    fn test_mimetype_after_directory_entry() {
        let bytes = testing::ZipBuilder::new()
            .directory("META-INF/")
            .stored("mimetype", MIMETYPE)
            .deflated("META-INF/container.xml", CONTAINER_XML)
            .deflated("OEBPS/content.opf", testing::PACKAGE_OPF)
            .build();
        let reader = ZipEntries::from_bytes(bytes).unwrap();
        assert_eq!(reader.entries()[0].name, "mimetype");

        let (result, warnings) = parse(&reader, &ParseOptions::default());
        assert!(result.is_ok());
        assert_eq!(warnings, vec![ParseWarning::MimetypeNotFirst { index: 1 }]);

        let strict = ParseOptions::default().with_strict_mimetype(true);
        let (result, _) = parse(&reader, &strict);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotAnArchiveOfThisFormat);
    }

    #[test]
    fn test_missing_container() {
        let entries = MemoryEntries::new("memory").with_entry("mimetype", MIMETYPE);
        let (result, _) = parse(&entries, &ParseOptions::default());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::MalformedContainer);
    }

    #[test]
    fn test_rootfile_must_exist() {
        let entries = MemoryEntries::new("memory")
            .with_entry("mimetype", MIMETYPE)
            .with_entry("META-INF/container.xml", CONTAINER_XML);
        let (result, _) = parse(&entries, &ParseOptions::default());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);
        assert!(err.to_string().contains("OEBPS/content.opf"));
    }

    #[test]
    fn test_encryption_xml() {
        let encryption = r#"<?xml version="1.0"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
            xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
    <enc:EncryptedData>
        <enc:CipherData>
            <enc:CipherReference URI="OEBPS/fonts/font.otf"/>
        </enc:CipherData>
    </enc:EncryptedData>
</encryption>"#;
        let entries = minimal().with_entry("META-INF/encryption.xml", encryption);
        let (result, warnings) = parse(&entries, &ParseOptions::default());
        let container = result.unwrap();
        assert!(warnings.is_empty());
        assert!(container.is_encrypted(&ArchivePath::new("OEBPS/fonts/font.otf").unwrap()));
        assert!(!container.is_encrypted(&ArchivePath::new("OEBPS/content.opf").unwrap()));
    }

    #[test]
    fn test_broken_encryption_xml_is_ignored() {
        let entries = minimal().with_entry("META-INF/encryption.xml", "<encryption>");
        let (result, warnings) = parse(&entries, &ParseOptions::default());
        assert!(result.unwrap().encrypted_resources.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
