//! 归档条目读取模块
//!
//! `EntryReader` 是解析器读取归档条目的唯一入口。提供基于zip的实现和
//! 基于内存映射的实现，二者都可以在多个线程间共享。

use crate::epub::error::{EpubError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use zip::result::ZipError;
use zip::{CompressionMethod, ZipArchive};

/// 预分配读取缓冲区的上限，条目头声明的大小不可信
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// 归档条目信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// 条目在归档内的路径
    pub name: String,
    /// 条目在归档中的顺序
    pub index: usize,
    /// 是否未压缩存储
    pub stored: bool,
    /// 解压后的大小
    pub size: u64,
}

/// 归档条目读取能力
///
/// 实现必须允许并发读取不同条目。
pub trait EntryReader: Send + Sync {
    /// 数据源的描述（文件路径或内存缓冲区名），用于错误信息
    fn origin(&self) -> &str;

    /// 按归档顺序列出的所有文件条目（不含目录）
    fn entries(&self) -> &[EntryInfo];

    /// 查找指定路径的条目
    fn entry(&self, path: &str) -> Option<&EntryInfo>;

    /// 读取条目的全部内容
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// 是否存在指定路径的条目
    fn contains(&self, path: &str) -> bool {
        self.entry(path).is_some()
    }
}

/// 条目表：保持归档顺序，同时支持按名称查找
#[derive(Debug, Default)]
struct EntryTable {
    entries: Vec<EntryInfo>,
    by_name: HashMap<String, usize>,
}

impl EntryTable {
    fn push(&mut self, info: EntryInfo) {
        self.by_name.insert(info.name.clone(), self.entries.len());
        self.entries.push(info);
    }

    fn get(&self, path: &str) -> Option<&EntryInfo> {
        self.by_name.get(path).map(|&i| &self.entries[i])
    }
}

/// 基于zip归档的条目读取器
pub struct ZipEntries<R> {
    origin: String,
    table: EntryTable,
    archive: Mutex<ZipArchive<R>>,
}

impl ZipEntries<File> {
    /// 打开磁盘上的zip文件
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let file = File::open(path).map_err(|e| EpubError::unreadable(&origin, e))?;
        Self::new(origin, file)
    }
}

impl ZipEntries<Cursor<Vec<u8>>> {
    /// 从内存中的zip数据创建
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::new("<memory>", Cursor::new(bytes))
    }
}

impl<R: Read + Seek> ZipEntries<R> {
    /// 从任意可读可定位的数据源创建
    pub fn new(origin: impl Into<String>, reader: R) -> Result<Self> {
        let origin = origin.into();
        let mut archive = ZipArchive::new(reader).map_err(|e| match e {
            ZipError::Io(e) => EpubError::unreadable(&origin, e),
            other => EpubError::NotAnArchiveOfThisFormat {
                reason: format!("{} 不是有效的zip归档: {}", origin, other),
            },
        })?;

        let mut table = EntryTable::default();
        for index in 0..archive.len() {
            let file = archive
                .by_index_raw(index)
                .map_err(|e| EpubError::unreadable(&origin, e))?;
            if file.is_dir() {
                continue;
            }
            table.push(EntryInfo {
                name: file.name().to_string(),
                index,
                stored: file.compression() == CompressionMethod::Stored,
                size: file.size(),
            });
        }
        debug!("打开归档 {}，共 {} 个条目", origin, table.entries.len());

        Ok(Self {
            origin,
            table,
            archive: Mutex::new(archive),
        })
    }
}

impl<R: Read + Seek + Send> EntryReader for ZipEntries<R> {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn entries(&self) -> &[EntryInfo] {
        &self.table.entries
    }

    fn entry(&self, path: &str) -> Option<&EntryInfo> {
        self.table.get(path)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let info = self.entry(path).ok_or_else(|| EpubError::ResourceNotFound {
            path: path.to_string(),
        })?;
        let location = format!("{}!{}", self.origin, path);

        let mut archive = self
            .archive
            .lock()
            .map_err(|_| EpubError::unreadable(&location, "归档句柄已损坏"))?;
        let mut file = archive
            .by_index(info.index)
            .map_err(|e| EpubError::unreadable(&location, e))?;

        let mut buffer = Vec::with_capacity(info.size.min(MAX_PREALLOCATION) as usize);
        file.read_to_end(&mut buffer)
            .map_err(|e| EpubError::unreadable(&location, e))?;
        Ok(buffer)
    }
}

/// 基于内存映射的条目读取器
///
/// 条目顺序即插入顺序，适合测试或已经解包的数据。
#[derive(Debug, Default)]
pub struct MemoryEntries {
    origin: String,
    table: EntryTable,
    contents: Vec<Vec<u8>>,
}

impl MemoryEntries {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// 添加一个未压缩的条目
    pub fn with_entry(mut self, name: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(name, content.into(), true);
        self
    }

    /// 添加条目并指定存储方式
    pub fn insert(&mut self, name: &str, content: Vec<u8>, stored: bool) {
        if let Some(&index) = self.table.by_name.get(name) {
            self.table.entries[index].size = content.len() as u64;
            self.table.entries[index].stored = stored;
            self.contents[index] = content;
            return;
        }
        self.table.push(EntryInfo {
            name: name.to_string(),
            index: self.contents.len(),
            stored,
            size: content.len() as u64,
        });
        self.contents.push(content);
    }
}

impl EntryReader for MemoryEntries {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn entries(&self) -> &[EntryInfo] {
        &self.table.entries
    }

    fn entry(&self, path: &str) -> Option<&EntryInfo> {
        self.table.get(path)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.entry(path)
            .map(|info| self.contents[info.index].clone())
            .ok_or_else(|| EpubError::ResourceNotFound {
                path: path.to_string(),
            })
    }
}
