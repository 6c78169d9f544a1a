//! 功能模块系统
//!
//! 包含模块编排的核心组件：
//! - 类型标识与元数据、功能目录
//! - 依赖图
//! - 子模块生命周期、组件、模块
//! - 模块注册表
//! - 启动队列、变更通知、运行器

pub mod catalog;
pub mod component;
pub mod context;
pub mod dependency;
pub mod events;
pub mod feature;
pub mod lifecycle;
pub mod metadata;
pub mod registry;
pub mod runner;
pub mod submodule;

// 重导出常用类型
pub use catalog::{ComponentFactory, FeatureCatalog, SubmoduleFactory};
pub use component::{
    downcast_component, downcast_component_arc, Component, ComponentProfile, ComponentSlot,
    SharedComponent,
};
pub use context::{FrameClock, FrameInfo, RunnerCommand, StartupContext, TickContext};
pub use dependency::DependencyGraph;
pub use events::{ModuleCallback, ModuleEvent, ModuleEvents};
pub use feature::FeatureModule;
pub use lifecycle::{StartupQueue, StartupTask, SubmoduleRef};
pub use metadata::{
    short_type_name, FeatureDescriptor, FeatureKind, FeatureMetadata, MetadataProvider,
    SelectionMode, TypeKey,
};
pub use registry::ModuleProfile;
pub use runner::Runner;
pub use submodule::{
    AsAny, Capabilities, ComponentBound, Drawable, Preparable, StartupProgress, Submodule,
    SubmoduleSlot, SubmoduleState, Tickable,
};
