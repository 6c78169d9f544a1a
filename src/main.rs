//! Features Core 命令行入口
//!
//! 以内置功能目录驱动运行器，用于演示、检查配置和查看功能目录。
//!
//! # 命令概览
//!
//! - `run` - 运行帧循环
//! - `check` - 验证配置文件并打印注册表顺序
//! - `modules` - 列出功能目录
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! # 运行到 Ctrl+C
//! features-core run
//!
//! # 使用自定义配置运行 120 帧
//! features-core -c features.yaml run --cycles 120
//!
//! # 检查配置文件
//! features-core check -c features.yaml
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use features_core::builtin;
use features_core::module::{FeatureKind, MetadataProvider, ModuleProfile};
use features_core::{CoreConfig, Features, FrameLoop, Logger, LoggerConfig, ModuleRecord};

/// 覆盖日志级别的环境变量
const LOG_LEVEL_ENV: &str = "FEATURES_LOG_LEVEL";

/// Features Core - 功能模块编排内核
#[derive(Parser)]
#[command(name = "features-core")]
#[command(version, about = "运行时功能模块编排内核", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径（YAML 或 JSON）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 设计模式（依赖检查始终生效）
    #[arg(long, global = true)]
    design: bool,

    /// 子命令
    #[command(subcommand)]
    command: Option<Commands>,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 运行帧循环
    ///
    /// 启用运行器并按固定间隔推进，按 Ctrl+C 或达到帧数上限后停用。
    Run {
        /// 最多运行的帧数
        #[arg(long)]
        cycles: Option<u64>,

        /// 帧间隔（毫秒），默认取配置
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// 验证配置文件
    ///
    /// 解析配置，按依赖顺序构建注册表并打印结果。
    Check,

    /// 列出功能目录
    Modules,

    /// 查看版本信息
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run {
        cycles: None,
        interval_ms: None,
    }) {
        Commands::Run {
            cycles,
            interval_ms,
        } => {
            let mut config = load_config(cli.config.as_ref()).await?;
            config.runner.design_mode |= cli.design;
            if let Some(ms) = interval_ms {
                config.runner.tick_interval_ms = ms.max(1);
            }
            let _guard = init_logging(&config, cli.log_level.as_deref())?;
            run(config, cycles).await
        }
        Commands::Check => {
            let config = load_config(cli.config.as_ref()).await?;
            check(&config)
        }
        Commands::Modules => {
            list_modules();
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// 读取配置；未指定时使用默认配置
async fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CoreConfig> {
    let mut config = match path {
        Some(path) => CoreConfig::from_file(path)
            .await
            .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
        None => CoreConfig::default(),
    };

    // 未声明模块时运行目录中的全部内置模块
    if config.profile.modules.is_empty() {
        let catalog = builtin::catalog();
        config.profile.modules = catalog
            .entries_of(FeatureKind::Module)
            .map(|meta| ModuleRecord {
                type_name: meta.key.short_name().to_string(),
                active: true,
                submodules: Vec::new(),
            })
            .collect();
    }
    Ok(config)
}

/// 初始化日志：命令行参数优先，其次环境变量，最后是配置
fn init_logging(
    config: &CoreConfig,
    cli_level: Option<&str>,
) -> anyhow::Result<features_core::LogGuard> {
    let mut logger = LoggerConfig::from_log_config(&config.logging);
    if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
        logger.level = level;
    }
    if let Some(level) = cli_level {
        logger.level = level.to_string();
    }
    Ok(Logger::init(logger)?)
}

async fn run(config: CoreConfig, cycles: Option<u64>) -> anyhow::Result<()> {
    let catalog = builtin::catalog().into_shared();
    let mut features = Features::from_config(catalog, &config)?;

    let mut frame_loop = FrameLoop::from_config(&config.runner);
    if let Some(cycles) = cycles {
        frame_loop = frame_loop.with_max_cycles(cycles);
    }

    info!(
        modules = features.runner().modules().len(),
        interval_ms = frame_loop.interval().as_millis() as u64,
        "功能运行器启动"
    );
    let ran = frame_loop.run(&mut features).await;

    let report = features.runner().metrics().export();
    match report.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "无法导出性能报告"),
    }
    info!(cycles = ran, "功能运行器已停止");
    Ok(())
}

fn check(config: &CoreConfig) -> anyhow::Result<()> {
    if let Some(path) = &config.config_path {
        println!("检查配置文件: {}", path.display());
    }

    let catalog = builtin::catalog().into_shared();
    let profile = match ModuleProfile::from_records(catalog, &config.profile.modules) {
        Ok(profile) => profile,
        Err(e) => {
            println!("❌ 配置无效 [{}]: {}", e.error_code(), e);
            return Err(e.into());
        }
    };

    println!("✅ 配置有效");
    println!();
    println!("注册表顺序:");
    println!("────────────────────────────────────────");
    for (index, module) in profile.modules().iter().enumerate() {
        let path = profile.menu_path_of(module.key()).unwrap_or_default();
        println!(
            "  {:>2}. {:<24} {:<24} {}",
            index + 1,
            module.key().short_name(),
            path,
            if module.is_active() { "激活" } else { "停用" }
        );
    }
    println!("────────────────────────────────────────");
    println!(
        "  跳过依赖检查: {}",
        if config.runner.dependency_checks_skipped() { "是" } else { "否" }
    );
    println!(
        "  帧间隔:       {:?}",
        Duration::from_millis(config.runner.tick_interval_ms)
    );
    Ok(())
}

fn list_modules() {
    let catalog = builtin::catalog();
    println!();
    println!("功能目录");
    println!("═══════════════════════════════════════");
    for meta in catalog.entries() {
        let deps: Vec<&str> = catalog
            .dependencies(meta.key)
            .iter()
            .map(|k| k.short_name())
            .collect();
        println!(
            "  [{}] {:<22} {:<20} 依赖: {}",
            meta.kind,
            meta.key.short_name(),
            meta.menu_path.as_deref().unwrap_or("-"),
            if deps.is_empty() { "-".to_string() } else { deps.join(", ") }
        );
        if let Some(desc) = &meta.description {
            println!("      {desc}");
        }
    }
    println!("═══════════════════════════════════════");
    println!();
}

fn print_version() {
    println!();
    println!("Features Core - 功能模块编排内核");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", features_core::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}
