//! EPUB文档模块
//!
//! `Document` 是一次解析的结果：容器描述、每个rendition的包、默认rendition的导航，
//! 以及仍然打开的归档。资源内容在访问时才读取。

use crate::epub::archive::{EntryReader, ZipEntries};
use crate::epub::config::{ParseOptions, ResourceCheck};
use crate::epub::container::ContainerDescriptor;
use crate::epub::content::{self, Content};
use crate::epub::error::{EpubError, ErrorKind, ParseWarning, Result, record};
use crate::epub::nav::{Navigation, resolve_navigation};
use crate::epub::opf::{ManifestItem, Package};
use crate::epub::path::ArchivePath;
use crate::epub::xml::{TreeError, decode};
use encoding_rs::{Encoding, UTF_8};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// 表示一个解析完成的EPUB文件
pub struct Document {
    archive: Option<Box<dyn EntryReader>>,
    origin: String,
    encoding: &'static Encoding,
    options: ParseOptions,
    container: ContainerDescriptor,
    packages: Vec<Package>,
    navigation: Navigation,
    warnings: Vec<ParseWarning>,
}

impl Document {
    /// 从文件路径打开并解析EPUB
    ///
    /// # 参数
    /// * `path` - epub文件的路径
    ///
    /// # 返回值
    /// * `Result<Document, EpubError>` - 成功返回Document实例，失败返回错误
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Document> {
        Self::open_with_options(path, ParseOptions::default())
    }

    /// 使用指定选项打开并解析EPUB
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Document> {
        let archive = ZipEntries::open(path)?;
        Self::from_reader(Box::new(archive), UTF_8, options)
    }

    /// 解析内存中的EPUB数据
    ///
    /// # 参数
    /// * `bytes` - zip归档数据
    /// * `encoding` - XML文档没有BOM时使用的编码，通常为UTF-8
    /// * `options` - 解析选项
    pub fn from_bytes(bytes: Vec<u8>, encoding: &'static Encoding, options: ParseOptions) -> Result<Document> {
        let archive = ZipEntries::from_bytes(bytes)?;
        Self::from_reader(Box::new(archive), encoding, options)
    }

    /// 从任意条目读取器解析
    pub fn from_reader(
        archive: Box<dyn EntryReader>,
        encoding: &'static Encoding,
        options: ParseOptions,
    ) -> Result<Document> {
        let origin = archive.origin().to_string();
        info!("开始解析 {}", origin);

        let mut warnings = Vec::new();
        let container = ContainerDescriptor::parse(archive.as_ref(), &options, encoding, &mut warnings)?;

        let mut packages = Vec::new();
        for (index, rendition) in container.renditions.iter().enumerate() {
            if !rendition.is_package() {
                continue;
            }
            let package = Package::parse(archive.as_ref(), &rendition.full_path, index, encoding, &mut warnings)?;
            package.check_resources(archive.as_ref(), options.resource_check, &mut warnings)?;
            packages.push(package);
        }

        let navigation = match packages.first() {
            Some(package) => load_navigation(archive.as_ref(), package, encoding, &options, &mut warnings)?,
            None => Navigation::empty(),
        };

        info!(
            "解析完成: {} 个包, {} 个目录节点, {} 条警告",
            packages.len(),
            navigation.len(),
            warnings.len()
        );
        Ok(Document {
            archive: Some(archive),
            origin,
            encoding,
            options,
            container,
            packages,
            navigation,
            warnings,
        })
    }

    /// 数据源描述（文件路径或 `<memory>`）
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn container(&self) -> &ContainerDescriptor {
        &self.container
    }

    /// 所有包，顺序与container.xml中的rootfile一致
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// 默认rendition的包
    pub fn package(&self) -> &Package {
        // 容器解析保证至少有一个包
        &self.packages[0]
    }

    /// 默认rendition的导航
    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    /// 解析过程中记录的警告
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// 默认包的阅读顺序
    pub fn reading_order(&self) -> Vec<&ManifestItem> {
        self.package().reading_order()
    }

    /// 读取资源：XML类型返回元素树，其他类型返回原始字节
    ///
    /// 每次调用都重新读取，不做缓存。
    pub fn open_resource(&self, item: &ManifestItem) -> Result<Content> {
        content::open(self.archive(&item.href)?, item, self.encoding)
    }

    /// 读取资源的原始字节
    pub fn read_bytes(&self, item: &ManifestItem) -> Result<Vec<u8>> {
        self.read_path(&item.href)
    }

    /// 读取归档中任意路径的条目
    pub fn read_path(&self, path: &ArchivePath) -> Result<Vec<u8>> {
        self.archive(path)?.read(path.as_str())
    }

    /// 提取XHTML章节的纯文本
    pub fn chapter_text(&self, item: &ManifestItem) -> Result<String> {
        let bytes = self.read_bytes(item)?;
        let html = decode(&bytes, self.encoding).map_err(|e| match e {
            TreeError::Encoding(reason) | TreeError::Syntax(reason) => {
                EpubError::unreadable(format!("{}!{}", self.origin, item.href), reason)
            }
        })?;
        Ok(content::extract_text(&html))
    }

    /// 封面图片数据
    pub fn cover(&self) -> Result<Option<Vec<u8>>> {
        match self.package().cover_image() {
            Some(item) => self.read_bytes(item).map(Some),
            None => Ok(None),
        }
    }

    /// 解析任意包的导航
    ///
    /// 与解析阶段不同，这里的导航错误直接返回给调用方。
    pub fn navigation_for(&self, package: &Package) -> Result<Navigation> {
        let mut warnings = Vec::new();
        let navigation = resolve_navigation(self.archive(&package.location)?, package, self.encoding, &mut warnings)?;
        for warning in &warnings {
            debug!("{}", warning);
        }
        Ok(navigation)
    }

    /// 检查所有包的清单资源都存在于归档中
    pub fn validate(&self) -> Result<()> {
        for package in &self.packages {
            package.check_resources(self.archive(&package.location)?, ResourceCheck::Eager, &mut Vec::new())?;
        }
        Ok(())
    }

    /// 关闭归档，之后的资源访问返回 `ArchiveClosed`
    pub fn close(&mut self) {
        if self.archive.take().is_some() {
            debug!("关闭归档 {}", self.origin);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.archive.is_none()
    }

    /// 把文档交给调用方的构造函数，得到调用方自己的书籍类型
    pub fn adapt<T, F>(self, f: F) -> T
    where
        F: FnOnce(Document) -> T,
    {
        f(self)
    }

    fn archive(&self, path: &ArchivePath) -> Result<&dyn EntryReader> {
        self.archive.as_deref().ok_or_else(|| EpubError::ArchiveClosed {
            path: path.to_string(),
        })
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("origin", &self.origin)
            .field("encoding", &self.encoding.name())
            .field("closed", &self.is_closed())
            .field("container", &self.container)
            .field("packages", &self.packages)
            .field("navigation", &self.navigation)
            .field("warnings", &self.warnings)
            .finish()
    }
}

/// 解析默认包的导航；除非要求导航，否则导航错误降级为警告和空导航
fn load_navigation(
    archive: &dyn EntryReader,
    package: &Package,
    encoding: &'static Encoding,
    options: &ParseOptions,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Navigation> {
    match resolve_navigation(archive, package, encoding, warnings) {
        Ok(navigation) => Ok(navigation),
        Err(e) if e.is_navigation_error() && !options.require_navigation => {
            // 没有导航来源的警告在包解析时已经记录
            if e.kind() != ErrorKind::NoNavigationSource {
                record(warnings, ParseWarning::NavigationUnavailable { reason: e.to_string() });
            }
            Ok(Navigation::empty())
        }
        Err(e) => Err(e),
    }
}
