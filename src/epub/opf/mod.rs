//! OPF（Open Packaging Format）文件解析模块
//!
//! 此模块提供EPUB文件中OPF包文件的解析功能，包括元数据、清单、脊柱等信息的提取。

mod guide;
mod manifest;
mod metadata;
mod parser;
mod spine;

pub use guide::GuideReference;
pub use manifest::{Manifest, ManifestItem, NCX_MEDIA_TYPE};
pub use metadata::{Creator, EntryKind, Identifier, Metadata, MetadataEntry, MetadataLink, Refinement};
pub use parser::{Generation, NavigationSource, Package};
pub use spine::{Spine, SpineItem};
