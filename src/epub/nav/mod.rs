//! 导航解析模块
//!
//! 支持EPUB 3导航文档和EPUB 2 NCX两种来源，统一输出 `Navigation`。

mod navigation;
mod ncx;
mod xhtml;

pub use navigation::{NavPoint, NavTarget, Navigation, resolve_navigation};
