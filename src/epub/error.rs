use thiserror::Error;
use tracing::warn;

pub type Result<T> = std::result::Result<T, EpubError>;

/// EPUB解析相关的错误类型
///
/// 每个变体都携带出错的路径或ID，调用方可以据此区分错误来源。
#[derive(Error, Debug)]
pub enum EpubError {
    #[error("无法读取数据源 {origin}: {reason}")]
    SourceUnreadable { origin: String, reason: String },

    #[error("文件不是有效的EPUB格式: {reason}")]
    NotAnArchiveOfThisFormat { reason: String },

    #[error("container.xml解析错误 ({path}): {reason}")]
    MalformedContainer { path: String, reason: String },

    #[error("OPF文件解析错误 ({path}): {reason}")]
    MalformedPackage { path: String, reason: String },

    #[error("导航文件解析错误 ({path}): {reason}")]
    MalformedNavigation { path: String, reason: String },

    #[error("内容文档解析错误 ({path}): {reason}")]
    MalformedResource { path: String, reason: String },

    #[error("无效的引用 {reference} (基准: {base}): {reason}")]
    InvalidReference {
        base: String,
        reference: String,
        reason: String,
    },

    #[error("清单ID重复: {id} (包: {package})")]
    DuplicateManifestId { package: String, id: String },

    #[error("脊柱引用了不存在的清单项: {idref} (包: {package})")]
    DanglingSpineReference { package: String, idref: String },

    #[error("包中没有可用的导航来源: {package}")]
    NoNavigationSource { package: String },

    #[error("归档中不存在资源: {path}")]
    ResourceNotFound { path: String },

    #[error("归档已关闭，无法访问: {path}")]
    ArchiveClosed { path: String },

    #[error("配置文件错误: {0}")]
    Config(String),
}

/// 错误种类，不携带任何字段，便于比较
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SourceUnreadable,
    NotAnArchiveOfThisFormat,
    MalformedContainer,
    MalformedPackage,
    MalformedNavigation,
    MalformedResource,
    InvalidReference,
    DuplicateManifestId,
    DanglingSpineReference,
    NoNavigationSource,
    ResourceNotFound,
    ArchiveClosed,
    Config,
}

impl EpubError {
    /// 获取错误种类
    pub fn kind(&self) -> ErrorKind {
        match self {
            EpubError::SourceUnreadable { .. } => ErrorKind::SourceUnreadable,
            EpubError::NotAnArchiveOfThisFormat { .. } => ErrorKind::NotAnArchiveOfThisFormat,
            EpubError::MalformedContainer { .. } => ErrorKind::MalformedContainer,
            EpubError::MalformedPackage { .. } => ErrorKind::MalformedPackage,
            EpubError::MalformedNavigation { .. } => ErrorKind::MalformedNavigation,
            EpubError::MalformedResource { .. } => ErrorKind::MalformedResource,
            EpubError::InvalidReference { .. } => ErrorKind::InvalidReference,
            EpubError::DuplicateManifestId { .. } => ErrorKind::DuplicateManifestId,
            EpubError::DanglingSpineReference { .. } => ErrorKind::DanglingSpineReference,
            EpubError::NoNavigationSource { .. } => ErrorKind::NoNavigationSource,
            EpubError::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
            EpubError::ArchiveClosed { .. } => ErrorKind::ArchiveClosed,
            EpubError::Config(_) => ErrorKind::Config,
        }
    }

    /// 是否为导航相关的错误（在文档级别可降级为警告）
    pub fn is_navigation_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedNavigation | ErrorKind::NoNavigationSource
        )
    }

    pub(crate) fn unreadable(origin: impl Into<String>, reason: impl ToString) -> Self {
        EpubError::SourceUnreadable {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed_package(path: impl Into<String>, reason: impl Into<String>) -> Self {
        EpubError::MalformedPackage {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_navigation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        EpubError::MalformedNavigation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// 解析过程中产生的非致命问题
///
/// 这些问题不会中断解析，会记录在 `Document::warnings()` 中，同时通过 `tracing` 输出。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    #[error("mimetype文件被压缩存储")]
    CompressedMimetype,

    #[error("mimetype不是归档中的第一个条目 (实际位置: {index})")]
    MimetypeNotFirst { index: usize },

    #[error("rootfile {path} 的媒体类型 {media_type} 不是OPF包文档，已跳过")]
    UnsupportedRendition { path: String, media_type: String },

    #[error("无法解析 {path}: {reason}")]
    AuxiliaryFileIgnored { path: String, reason: String },

    #[error("清单项 {id} 指向的资源不存在: {path}")]
    MissingResource { id: String, path: String },

    #[error("清单中存在多个导航文档，使用 {chosen}")]
    MultipleNavigationDocuments { chosen: String },

    #[error("包 {package} 没有导航来源，目录为空")]
    NoNavigationSource { package: String },

    #[error("导航不可用，目录为空: {reason}")]
    NavigationUnavailable { reason: String },

    #[error("跳过导航节点 \"{label}\": {reason}")]
    NavPointSkipped { label: String, reason: String },

    #[error("跳过guide引用 {href}: {reason}")]
    GuideReferenceSkipped { href: String, reason: String },
}

/// 记录一条警告并输出日志
pub(crate) fn record(warnings: &mut Vec<ParseWarning>, warning: ParseWarning) {
    warn!("{}", warning);
    warnings.push(warning);
}
