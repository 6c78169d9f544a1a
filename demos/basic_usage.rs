//! 基本使用示例
//!
//! 本示例展示了功能编排内核的基本使用方法，包括：
//!
//! - 以功能目录构建运行器
//! - 启用与逐帧推进
//! - 以菜单路径增删模块
//! - 通过访问门面调用子模块
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::time::Duration;

use features_core::builtin::{self, FrameStats, SimpleTimer, WARMUP_CYCLES_KEY};
use features_core::{CoreConfig, Features, Logger, LoggerConfig};

/// 主函数
///
/// 演示功能编排内核的基本用法。
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = Logger::init(LoggerConfig::builder().level("warn").build())?;
    println!("=== 功能编排内核基本使用示例 ===\n");

    // -------------------------------------------------------------------------
    // 1. 构建配置
    // -------------------------------------------------------------------------
    println!("1. 构建配置...");
    let config = CoreConfig::builder()
        .module("TimerFeature", true)
        .module("DiagnosticsFeature", true)
        .component("DiagnosticsSettings", serde_json::json!({ "report_every": 0 }))
        .parameter(WARMUP_CYCLES_KEY, serde_json::json!(1))
        .build();
    println!("   - 模块数: {}", config.profile.modules.len());
    println!("   - 帧间隔: {}ms\n", config.runner.tick_interval_ms);

    // -------------------------------------------------------------------------
    // 2. 创建门面并启用
    // -------------------------------------------------------------------------
    println!("2. 创建门面并启用...");
    let mut features = Features::from_config(builtin::catalog().into_shared(), &config)?;
    features.enable();
    println!(
        "   运行中的模块: {:?}",
        features.runner().running_modules()
    );
    println!("   等待中的异步启动: {}\n", features.runner().pending_startups());

    // -------------------------------------------------------------------------
    // 3. 使用计时器子模块
    // -------------------------------------------------------------------------
    println!("3. 注册计时器...");
    features.update_with_delta(Duration::from_millis(16));
    features.call_submodule_method(|timer: &mut SimpleTimer| {
        timer.add_repeating(Duration::from_millis(50), || println!("   ⏰ 计时器触发"));
    })?;

    for _ in 0..10 {
        features.update_with_delta(Duration::from_millis(16));
    }
    let frames = features.call_submodule_method(|stats: &mut FrameStats| stats.frames())?;
    println!("   帧统计: {frames} 帧\n");

    // -------------------------------------------------------------------------
    // 4. 以菜单路径移除与恢复模块
    // -------------------------------------------------------------------------
    println!("4. 移除诊断模块...");
    features.remove_module("Debug/Diagnostics");
    features.update_with_delta(Duration::from_millis(16));
    println!(
        "   Debug/Diagnostics 激活: {}",
        features.get_module_active("Debug/Diagnostics")
    );

    features.add_module("Debug/Diagnostics");
    features.update_with_delta(Duration::from_millis(16));
    println!(
        "   恢复后激活: {}\n",
        features.get_module_active("Debug/Diagnostics")
    );

    // -------------------------------------------------------------------------
    // 5. 停用
    // -------------------------------------------------------------------------
    println!("5. 停用...");
    features.disable();
    let report = features.runner().metrics().export();
    println!("{}", report.to_json()?);

    println!("\n=== 示例结束 ===");
    Ok(())
}
