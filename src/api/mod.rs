//! API 模块
//!
//! 包含对外提供的访问接口和宿主驱动。
//!
//! # 模块概览
//!
//! - `features`: 访问门面，带缓存的子模块 / 组件查询与运行器委托
//! - `host`: 基于 tokio 定时器的宿主帧循环
//!
//! # 示例
//!
//! ```rust,no_run
//! use features_core::api::{Features, FrameLoop};
//! use features_core::builtin;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut features = Features::with_catalog_defaults(builtin::catalog().into_shared())?;
//!     let cycles = FrameLoop::default().with_max_cycles(60).run(&mut features).await;
//!     println!("ran {cycles} cycles");
//!     Ok(())
//! }
//! ```

pub mod features;
pub mod host;

// 重导出主要类型
pub use features::Features;
pub use host::FrameLoop;
