pub mod epub;

// === 核心API重新导出 ===

/// 解析完成的EPUB文档（主要接口）
pub use epub::Document;

/// 错误处理
pub use epub::{EpubError, ErrorKind, ParseWarning, Result};

/// 解析选项
pub use epub::{ParseOptions, ResourceCheck};

// === 数据结构 ===

/// 容器与路径
pub use epub::{ArchivePath, ContainerDescriptor, Rendition};

/// OPF组件
pub use epub::{
    Creator,
    Generation,
    GuideReference,
    Identifier,
    Manifest,
    ManifestItem,
    Metadata,
    MetadataEntry,
    NavigationSource,
    Package,
    Spine,
    SpineItem,
};

/// 导航组件
pub use epub::{NavPoint, NavTarget, Navigation};

/// 资源内容
pub use epub::Content;

// === 库信息 ===

/// 库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库的描述
pub const DESCRIPTION: &str = "EPUB容器、包文档与导航的解析库";

// === 便捷函数 ===

/// 快速解析EPUB文件
///
/// 这是 `Document::open` 的便捷包装函数。
///
/// # 示例
///
/// ```no_run
/// let document = bookparse::parse("book.epub")?;
/// println!("书名: {:?}", document.package().metadata.title());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn parse<P: AsRef<std::path::Path>>(path: P) -> Result<Document> {
    Document::open(path)
}

/// 使用指定选项解析EPUB文件
pub fn parse_with_options<P: AsRef<std::path::Path>>(path: P, options: ParseOptions) -> Result<Document> {
    Document::open_with_options(path, options)
}

/// 解析内存中的EPUB数据
///
/// `encoding` 用于没有BOM的XML文档，一般传入 `encoding_rs::UTF_8`。
pub fn parse_bytes(bytes: Vec<u8>, encoding: &'static encoding_rs::Encoding, options: ParseOptions) -> Result<Document> {
    Document::from_bytes(bytes, encoding, options)
}
