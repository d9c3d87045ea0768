//! 解析选项模块
//!
//! 提供解析行为的配置，支持从YAML文件加载。

use crate::epub::error::{EpubError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 清单资源存在性的检查时机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCheck {
    /// 访问资源时才检查，解析阶段只记录警告
    #[default]
    Lazy,
    /// 解析阶段检查，缺失的资源直接报错
    Eager,
}

/// 解析选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// 严格校验mimetype条目（必须是第一个条目且未压缩）
    pub strict_mimetype: bool,
    /// 清单资源的检查时机
    pub resource_check: ResourceCheck,
    /// 缺少或无法解析导航时是否报错
    pub require_navigation: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_mimetype: false,
            resource_check: ResourceCheck::Lazy,
            require_navigation: false,
        }
    }
}

impl ParseOptions {
    /// 创建默认选项
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置mimetype严格模式
    pub fn with_strict_mimetype(mut self, strict: bool) -> Self {
        self.strict_mimetype = strict;
        self
    }

    /// 设置资源检查时机
    pub fn with_resource_check(mut self, check: ResourceCheck) -> Self {
        self.resource_check = check;
        self
    }

    /// 设置是否要求导航
    pub fn with_require_navigation(mut self, require: bool) -> Self {
        self.require_navigation = require;
        self
    }

    /// 从YAML字符串加载选项
    ///
    /// # 示例
    ///
    /// ```rust
    /// use bookparse::{ParseOptions, ResourceCheck};
    /// let options = ParseOptions::from_yaml_str("resource_check: eager\n")?;
    /// assert_eq!(options.resource_check, ResourceCheck::Eager);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yml::from_str(content)
            .map_err(|e| EpubError::Config(format!("配置文件格式错误: {}", e)))
    }

    /// 从YAML文件加载选项
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EpubError::Config(format!("无法读取配置文件 {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// 序列化为YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yml::to_string(self)
            .map_err(|e| EpubError::Config(format!("序列化配置失败: {}", e)))
    }
}
