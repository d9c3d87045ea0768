pub mod archive;
pub mod config;
pub mod container;
pub mod content;
pub mod error;
pub mod nav;
pub mod opf;
pub mod path;
pub mod reader;
pub mod xml;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出错误处理
pub use error::{EpubError, ErrorKind, ParseWarning, Result};

// 重新导出配置
pub use config::{ParseOptions, ResourceCheck};

// 重新导出归档与路径
pub use archive::{EntryInfo, EntryReader, MemoryEntries, ZipEntries};
pub use path::{ArchivePath, Href};

// 重新导出容器相关
pub use container::{ContainerDescriptor, Rendition};

// 重新导出文档与内容
pub use content::{Content, extract_text};
pub use reader::Document;

// 重新导出OPF相关
pub use opf::{
    Creator,
    EntryKind,
    Generation,
    GuideReference,
    Identifier,
    Manifest,
    ManifestItem,
    Metadata,
    MetadataEntry,
    MetadataLink,
    NavigationSource,
    Package,
    Refinement,
    Spine,
    SpineItem,
};

// 重新导出导航相关
pub use nav::{NavPoint, NavTarget, Navigation};
