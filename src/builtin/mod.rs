//! 内置功能
//!
//! - `timer`: 计时器功能（可 tick 的回调计时器）
//! - `diagnostics`: 诊断功能（组件绑定、参数预读、异步预热、可绘制）
//!
//! 命令行宿主、示例与测试都使用这里登记的目录。

pub mod diagnostics;
pub mod timer;

pub use diagnostics::{DiagnosticsFeature, DiagnosticsSettings, FrameStats, WARMUP_CYCLES_KEY};
pub use timer::{SimpleTimer, TimerCallback, TimerFeature, TimerId};

use crate::module::FeatureCatalog;

/// 向目录登记全部内置功能
pub fn register(catalog: &mut FeatureCatalog) -> &mut FeatureCatalog {
    catalog
        .register_module::<TimerFeature>()
        .register_submodule::<TimerFeature, SimpleTimer>()
        .register_module::<DiagnosticsFeature>()
        .register_submodule::<DiagnosticsFeature, FrameStats>()
        .register_component::<DiagnosticsSettings>()
}

/// 只包含内置功能的目录
pub fn catalog() -> FeatureCatalog {
    let mut catalog = FeatureCatalog::new();
    register(&mut catalog);
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FeatureKind, MetadataProvider, TypeKey};

    #[test]
    fn test_builtin_catalog() {
        let catalog = catalog();
        assert_eq!(catalog.entries_of(FeatureKind::Module).count(), 2);
        assert_eq!(
            catalog.dependencies(TypeKey::of::<DiagnosticsFeature>()),
            &[TypeKey::of::<TimerFeature>()]
        );
        assert_eq!(
            catalog.resolve("FrameStats"),
            Some(TypeKey::of::<FrameStats>())
        );
    }
}
