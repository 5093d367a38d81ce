use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use portal_code_editor::utils::preview;
use portal_code_editor::{
    EditorConfig, FragmentKind, ItemId, PortalStore, ProviderSet, SearchQuery, SearchView,
    Workspace, SNAPSHOT_EXTENSIONS,
};

#[derive(Parser)]
#[command(name = "portal_code_editor")]
#[command(about = "编辑门户代码记录（网页脚本/样式、表单脚本、模板、文件）并安全提交")]
#[command(version = "0.1.0")]
struct Cli {
    /// 配置文件路径（JSON）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 日志详细程度（可重复：-v info，-vv debug，-vvv trace）
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// 静默模式(仅输出错误)
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 显示 站点 → 类型 → 条目 层级树
    Tree {
        /// 门户快照文件
        #[arg(long)]
        store: PathBuf,

        /// 按名称过滤（大小写不敏感）
        #[arg(long)]
        query: Option<String>,

        /// 同时搜索代码内容
        #[arg(long)]
        content: bool,

        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },

    /// 读取一个片段的远端内容
    Pull {
        #[arg(long)]
        store: PathBuf,

        /// 条目 id
        #[arg(long)]
        item: String,

        /// 片段类型（javascript/style/template/content）
        #[arg(long)]
        fragment: String,

        /// 输出文件（默认打印到标准输出）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 应用修改列表并提交全部待提交条目
    Apply {
        #[arg(long)]
        store: PathBuf,

        /// 修改列表 JSON：[{ "item": ..., "fragment": ..., "content": ... }]
        #[arg(long)]
        changes: PathBuf,

        /// 忽略远端并发修改，强制覆盖
        #[arg(long)]
        force: bool,
    },
}

/// 修改列表中的一项
#[derive(Debug, Deserialize)]
struct ChangeEntry {
    item: String,
    fragment: String,
    content: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => EditorConfig::load(path)
            .with_context(|| format!("无法读取配置文件: {:?}", path))?,
        None => EditorConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("无法创建运行时")?;

    match &cli.command {
        Command::Tree {
            store,
            query,
            content,
            json,
        } => {
            let mut workspace = open_workspace(store, &config)?;
            handle_tree(&cli, &runtime, &mut workspace, query.as_deref(), *content, *json)
        }
        Command::Pull {
            store,
            item,
            fragment,
            output,
        } => {
            let mut workspace = open_workspace(store, &config)?;
            handle_pull(&cli, &runtime, &mut workspace, item, fragment, output.as_deref())
        }
        Command::Apply {
            store,
            changes,
            force,
        } => {
            let mut workspace = open_workspace(store, &config)?;
            handle_apply(&cli, &runtime, &mut workspace, changes, *force)
        }
    }
}

/// 初始化日志：`RUST_LOG` 优先，否则由 `-v` 次数决定级别
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 验证快照文件并加载工作集
fn open_workspace(store: &Path, config: &EditorConfig) -> Result<Workspace> {
    if !store.exists() {
        bail!("快照文件不存在: {:?}", store);
    }

    let extension = store
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());
    if !SNAPSHOT_EXTENSIONS
        .iter()
        .any(|&ext| Some(ext) == extension.as_deref())
    {
        bail!("快照文件必须是 JSON 文件");
    }

    let store = PortalStore::open(store, &config.store)
        .with_context(|| format!("无法打开快照文件: {:?}", store))?;
    let providers = ProviderSet::for_store(Arc::new(store));
    let workspace = Workspace::load(providers, config.clone()).context("加载条目失败")?;
    Ok(workspace)
}

fn handle_tree(
    cli: &Cli,
    runtime: &tokio::runtime::Runtime,
    workspace: &mut Workspace,
    query: Option<&str>,
    content: bool,
    json: bool,
) -> Result<()> {
    let view = match query {
        Some(text) if !text.is_empty() => {
            let search_content = content || workspace.config().search.search_content;
            {
                // 搜索任务派发到本运行时
                let _guard = runtime.enter();
                workspace.search(SearchQuery::new(text, search_content));
            }
            runtime.block_on(workspace.next_search_view()).clone()
        }
        _ => SearchView::Unfiltered(workspace.index(None)),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    match &view {
        SearchView::NoMatches { query } => {
            println!("没有与 \"{}\" 匹配的条目", query.text);
        }
        SearchView::Unfiltered(index) | SearchView::Matches { index, .. } => {
            print!("{}", index);
            if !cli.quiet {
                println!();
                println!("共 {} 个条目，{} 个站点", index.item_count(), index.sites.len());
            }
        }
    }
    Ok(())
}

fn handle_pull(
    cli: &Cli,
    runtime: &tokio::runtime::Runtime,
    workspace: &mut Workspace,
    item: &str,
    fragment: &str,
    output: Option<&Path>,
) -> Result<()> {
    let kind = FragmentKind::parse(fragment)
        .with_context(|| format!("未知的片段类型: {}", fragment))?;
    let id = ItemId::new(item);

    let content = runtime
        .block_on(workspace.refresh_fragment(&id, kind))
        .with_context(|| format!("读取 {} {} 失败", id, kind))?;

    match output {
        Some(path) => {
            std::fs::write(path, &content)
                .with_context(|| format!("无法写入输出文件: {:?}", path))?;
            if !cli.quiet {
                println!("已保存 {} {} 到: {:?}", id, kind, path);
                if let Some(current) = workspace.item(&id) {
                    println!("当前令牌: {}", current.token());
                }
            }
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn handle_apply(
    cli: &Cli,
    runtime: &tokio::runtime::Runtime,
    workspace: &mut Workspace,
    changes: &Path,
    force: bool,
) -> Result<()> {
    let entries = load_changes(changes)?;

    if !cli.quiet {
        println!("准备应用 {} 项修改", entries.len());
    }

    for entry in &entries {
        let kind = FragmentKind::parse(&entry.fragment)
            .with_context(|| format!("未知的片段类型: {}", entry.fragment))?;
        let id = ItemId::new(entry.item.as_str());
        workspace
            .edit(&id, kind, entry.content.as_str())
            .with_context(|| format!("无法修改 {} {}", id, kind))?;

        if !cli.quiet {
            println!("  {} {}: \"{}\"", id, kind, preview(&entry.content, 40));
        }
    }

    if !cli.quiet {
        println!("{}", workspace.pending_summary());
    }

    let outcomes = runtime.block_on(workspace.commit_all(force));
    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => println!(
                "✓ {}: {} ({} 个片段，令牌 {})",
                outcome.item,
                outcome.state(),
                report.written,
                report.token
            ),
            Err(e) => {
                failed += 1;
                println!("✗ {}: {} - {}", outcome.item, outcome.state(), e);
            }
        }
    }

    if !cli.quiet {
        println!("{}", workspace.pending_summary());
    }

    if failed > 0 {
        bail!("{} 个条目提交失败，本地修改未丢弃", failed);
    }
    Ok(())
}

fn load_changes(path: &Path) -> Result<Vec<ChangeEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取修改列表: {:?}", path))?;
    let entries = serde_json::from_str(&content)
        .with_context(|| format!("修改列表格式错误: {:?}", path))?;
    Ok(entries)
}
