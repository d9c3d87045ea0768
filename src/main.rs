use bookparse::{ContainerDescriptor, Document, Navigation, NavPoint, Package, ParseOptions, ResourceCheck, Result};
use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;

/// 📚 BookParse - EPUB解析工具
#[derive(Parser)]
#[command(name = "bookparse")]
#[command(about = "解析EPUB文件的容器、包文档与导航")]
#[command(version)]
struct Args {
    /// EPUB文件路径
    #[arg(help = "要解析的EPUB文件路径")]
    epub_file: String,

    /// 详细输出模式
    #[arg(short, long, help = "输出调试日志并显示更多细节")]
    verbose: bool,

    /// 显示元数据信息
    #[arg(short, long, help = "显示EPUB元数据信息")]
    metadata: bool,

    /// 显示阅读顺序
    #[arg(short, long, help = "显示脊柱（阅读顺序）")]
    spine: bool,

    /// 显示目录树
    #[arg(short, long, help = "显示EPUB目录树结构")]
    toc: bool,

    /// 显示指定章节内容
    #[arg(short, long, help = "显示阅读顺序中指定章节的纯文本（从1开始）")]
    chapter: Option<usize>,

    /// 以YAML输出解析结果
    #[arg(long, help = "以YAML格式输出容器、包和导航")]
    yaml: bool,

    /// 解析选项配置文件
    #[arg(long, help = "YAML格式的解析选项文件")]
    config: Option<String>,

    /// 严格模式
    #[arg(long, help = "严格校验mimetype，并在解析时检查所有清单资源")]
    strict: bool,
}

/// YAML输出的结构
#[derive(Serialize)]
struct Dump<'a> {
    container: &'a ContainerDescriptor,
    packages: &'a [Package],
    navigation: &'a Navigation,
    warnings: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("BOOKPARSE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ 错误: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut options = match &args.config {
        Some(path) => ParseOptions::from_file(path)?,
        None => ParseOptions::default(),
    };
    if args.strict {
        options = options
            .with_strict_mimetype(true)
            .with_resource_check(ResourceCheck::Eager);
    }

    let document = bookparse::parse_with_options(&args.epub_file, options)?;

    if args.yaml {
        let dump = Dump {
            container: document.container(),
            packages: document.packages(),
            navigation: document.navigation(),
            warnings: document.warnings().iter().map(ToString::to_string).collect(),
        };
        let yaml = serde_yml::to_string(&dump)
            .map_err(|e| bookparse::EpubError::Config(format!("无法序列化解析结果: {}", e)))?;
        print!("{}", yaml);
        return Ok(());
    }

    display_summary(&document, args.verbose);
    if args.metadata {
        display_metadata(document.package());
    }
    if args.spine {
        display_spine(&document);
    }
    if args.toc {
        display_table_of_contents(document.navigation(), args.verbose);
    }
    if let Some(index) = args.chapter {
        display_chapter_content(&document, index)?;
    }
    Ok(())
}

fn display_summary(document: &Document, verbose: bool) {
    println!("📚 {}", document.origin());
    for (i, rendition) in document.container().renditions.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, rendition.full_path, rendition.media_type);
    }

    let package = document.package();
    println!(
        "  📖 EPUB版本: {}，{} 个清单项，{} 个脊柱项，{} 个目录节点",
        package.version,
        package.manifest.len(),
        package.spine.len(),
        document.navigation().len()
    );
    if verbose && !document.container().encrypted_resources.is_empty() {
        println!("  🔒 加密资源: {}", document.container().encrypted_resources.len());
    }

    if !document.warnings().is_empty() {
        println!("\n⚠️  警告:");
        for warning in document.warnings() {
            println!("  - {}", warning);
        }
    }
}

fn display_metadata(package: &Package) {
    let metadata = &package.metadata;
    println!("\n📊 EPUB元数据信息:");

    if let Some(title) = metadata.title() {
        println!("    标题: {}", title);
    }

    let creators = metadata.creators();
    if !creators.is_empty() {
        println!("    作者:");
        for (i, creator) in creators.iter().enumerate() {
            let mut author_info = format!("      {}. {}", i + 1, creator.name);
            if let Some(role) = &creator.role {
                author_info.push_str(&format!(" ({})", role));
            }
            if let Some(file_as) = &creator.file_as {
                author_info.push_str(&format!(" [排序: {}]", file_as));
            }
            println!("{}", author_info);
        }
    }

    if let Some(language) = metadata.language() {
        println!("    语言: {}", language);
    }
    if let Some(publisher) = metadata.publisher() {
        println!("    出版社: {}", publisher);
    }
    if let Some(date) = metadata.date() {
        println!("    出版日期: {}", date);
    }
    if let Some(modified) = metadata.modified() {
        println!("    修改时间: {}", modified);
    }

    let identifiers = metadata.identifiers();
    if !identifiers.is_empty() {
        println!("\n  🔖 标识符:");
        for (i, identifier) in identifiers.iter().enumerate() {
            let mut id_info = format!("    {}. {}", i + 1, identifier.value);
            if let Some(scheme) = &identifier.scheme {
                id_info.push_str(&format!(" ({})", scheme));
            }
            if identifier.id.is_some() && identifier.id == package.unique_identifier {
                id_info.push_str(" [唯一标识]");
            }
            println!("{}", id_info);
        }
    }

    println!("\n  🗂️  全部条目:");
    for entry in metadata.entries() {
        println!("    {} = {}", entry.term, entry.value);
        for refinement in &entry.refinements {
            println!("      ↳ {} = {}", refinement.property, refinement.value);
        }
    }
}

fn display_spine(document: &Document) {
    println!("\n📑 阅读顺序:");
    for (i, (itemref, item)) in document.package().spine_items().enumerate() {
        let linear = if itemref.is_linear() { "" } else { " (非线性)" };
        println!("  {}. {} [{}]{}", i + 1, item.href, item.media_type, linear);
    }
}

fn display_table_of_contents(navigation: &Navigation, verbose: bool) {
    println!("\n🌳 目录树:");
    if navigation.is_empty() {
        println!("  (无目录)");
        return;
    }
    if let Some(title) = &navigation.title {
        println!("  {}", title);
    }
    print_points(&navigation.toc, 1, verbose);

    if verbose && !navigation.landmarks.is_empty() {
        println!("\n🧭 地标:");
        print_points(&navigation.landmarks, 1, verbose);
    }
}

fn print_points(points: &[NavPoint], level: usize, verbose: bool) {
    for point in points {
        let indent = "  ".repeat(level);
        if verbose {
            println!("{}├─ {} → {}", indent, point.label, point.target);
        } else {
            println!("{}├─ {}", indent, point.label);
        }
        print_points(&point.children, level + 1, verbose);
    }
}

/// 显示指定章节的内容
fn display_chapter_content(document: &Document, index: usize) -> Result<()> {
    let order = document.reading_order();
    let Some(item) = index.checked_sub(1).and_then(|i| order.get(i)) else {
        println!("\n❌ 章节索引 {} 超出范围 (1-{})", index, order.len());
        return Ok(());
    };

    println!("\n📖 章节内容: {}", item.href);
    if item.is_xhtml() {
        println!("{}", document.chapter_text(item)?);
    } else {
        let bytes = document.read_bytes(item)?;
        println!("  ({}, {} 字节)", item.media_type, bytes.len());
    }
    Ok(())
}
