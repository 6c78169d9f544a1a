//! # Features Core - 功能模块编排内核
//!
//! 管理一组可选的功能模块，每个模块包含一个或多个有状态的子模块。内核负责：
//!
//! - **依赖校验**: 注册时检测循环依赖，按依赖顺序排列模块
//! - **有序启动**: 按依赖顺序启动子模块，支持协作式异步启动
//! - **逐帧分发**: 每帧向已启用的子模块分发 tick
//! - **延迟增删**: 以菜单路径寻址的运行期增删，在帧边界统一生效
//! - **访问门面**: 带缓存的子模块 / 组件查询，模块集合变化时自动失效
//!
//! ## 快速开始
//!
//! ```rust
//! use std::time::Duration;
//! use features_core::api::Features;
//! use features_core::builtin::{self, FrameStats};
//!
//! let catalog = builtin::catalog().into_shared();
//! let mut features = Features::with_catalog_defaults(catalog).unwrap();
//!
//! features.enable();
//! for _ in 0..3 {
//!     features.update_with_delta(Duration::from_millis(16));
//! }
//!
//! let frames = features.get_submodule::<FrameStats>().map(|s| s.frames());
//! assert_eq!(frames, Some(3));
//! features.disable();
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 元数据、目录、依赖图、子模块、注册表、运行器
//! - `api` - 访问门面与宿主帧循环
//! - `builtin` - 内置的计时器与诊断功能
//! - `core` - 配置与参数存储
//! - `utils` - 错误类型、日志、性能采样

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod builtin;
pub mod core;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    Component, ComponentProfile, FeatureCatalog, FeatureDescriptor, FeatureModule,
    ModuleEvent, ModuleProfile, Runner, Submodule, TypeKey,
};

pub use utils::logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, generate_id, CoreError, Result, SubscriptionId};

pub use crate::core::config::{
    ComponentRecord, CoreConfig, CoreConfigBuilder, LogConfig, ModuleRecord, ProfileConfig,
    RunnerConfig,
};
pub use crate::core::parameters::ParameterStore;
pub use api::{Features, FrameLoop};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
