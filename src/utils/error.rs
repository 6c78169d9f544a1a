//! 功能编排内核错误类型定义
//!
//! 错误分为三类：
//!
//! - **结构性错误**：注册表插入时检测到循环依赖、移除仍被依赖的模块。
//!   操作立即中止，不产生任何部分修改。
//! - **可恢复错误**：依赖未满足、菜单路径无法解析等，运行器只记录警告并跳过，
//!   不会以错误形式返回。
//! - **调用约定错误**：按类型查询时传入的类型不具备所需能力，立即返回错误。

use thiserror::Error;

/// 功能编排内核核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 注册表错误 ====================

    /// 循环依赖，携带按访问顺序排列的环路径（首尾为同一类型）
    #[error("检测到循环依赖: {}", .cycle.join(" -> "))]
    CircularDependency {
        /// 环路径
        cycle: Vec<String>,
    },

    /// 模块仍被其他模块依赖，无法移除
    #[error("模块 '{module}' 被以下模块依赖，无法移除: {dependents:?}")]
    ModuleHasDependents {
        /// 被移除的模块
        module: String,
        /// 仍依赖它的模块
        dependents: Vec<String>,
    },

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    /// 模块已注册
    #[error("模块已注册: '{0}'")]
    ModuleAlreadyRegistered(String),

    /// 组件已注册
    #[error("组件已注册: '{0}'")]
    ComponentAlreadyRegistered(String),

    // ==================== 类型与调用约定错误 ====================

    /// 目录中没有该类型
    #[error("未知类型: '{0}'")]
    UnknownType(String),

    /// 调用约定错误：类型不具备所需的能力
    #[error("类型 '{type_name}' 不是{expected}")]
    ContractViolation {
        /// 期望的类别（例如 "子模块"、"组件"）
        expected: &'static str,
        /// 实际传入的类型名
        type_name: String,
    },

    /// 没有处于活动状态的匹配子模块
    #[error("子模块 '{0}' 未找到")]
    SubmoduleNotFound(String),

    /// 子模块启动失败
    #[error("子模块启动失败: '{submodule}' - {reason}")]
    StartupFailed {
        /// 子模块类型名
        submodule: String,
        /// 失败原因
        reason: String,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        /// 配置键
        key: String,
        /// 原因
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 其他错误（子模块代码可直接使用 anyhow）
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 内核操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 注册表错误 (REGISTRY-xxx)
    /// 循环依赖
    pub const REGISTRY_CIRCULAR_DEPENDENCY: &str = "REGISTRY-001";
    /// 模块仍被依赖
    pub const REGISTRY_HAS_DEPENDENTS: &str = "REGISTRY-002";
    /// 模块未找到
    pub const REGISTRY_MODULE_NOT_FOUND: &str = "REGISTRY-003";
    /// 重复注册
    pub const REGISTRY_DUPLICATE: &str = "REGISTRY-004";

    // 调用约定错误 (CONTRACT-xxx)
    /// 未知类型
    pub const CONTRACT_UNKNOWN_TYPE: &str = "CONTRACT-001";
    /// 类型能力不符
    pub const CONTRACT_VIOLATION: &str = "CONTRACT-002";
    /// 子模块未找到
    pub const CONTRACT_SUBMODULE_NOT_FOUND: &str = "CONTRACT-003";

    // 生命周期错误 (LIFECYCLE-xxx)
    /// 启动失败
    pub const LIFECYCLE_STARTUP_FAILED: &str = "LIFECYCLE-001";

    // 配置错误 (CONFIG-xxx)
    /// 配置加载失败
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    /// 配置值无效
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 核心错误 (CORE-xxx)
    /// 初始化失败
    pub const CORE_INIT_FAILED: &str = "CORE-001";
    /// 未分类
    pub const CORE_UNKNOWN: &str = "CORE-999";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::CircularDependency { .. } => error_code::REGISTRY_CIRCULAR_DEPENDENCY,
            CoreError::ModuleHasDependents { .. } => error_code::REGISTRY_HAS_DEPENDENTS,
            CoreError::ModuleNotFound(_) => error_code::REGISTRY_MODULE_NOT_FOUND,
            CoreError::ModuleAlreadyRegistered(_) | CoreError::ComponentAlreadyRegistered(_) => {
                error_code::REGISTRY_DUPLICATE
            }
            CoreError::UnknownType(_) => error_code::CONTRACT_UNKNOWN_TYPE,
            CoreError::ContractViolation { .. } => error_code::CONTRACT_VIOLATION,
            CoreError::SubmoduleNotFound(_) => error_code::CONTRACT_SUBMODULE_NOT_FOUND,
            CoreError::StartupFailed { .. } => error_code::LIFECYCLE_STARTUP_FAILED,
            CoreError::ConfigLoadFailed(_) | CoreError::Yaml(_) | CoreError::Json(_) => {
                error_code::CONFIG_LOAD_FAILED
            }
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::InitFailed(_) => error_code::CORE_INIT_FAILED,
            _ => error_code::CORE_UNKNOWN,
        }
    }

    /// 是否为结构性错误（注册表拒绝了修改，状态保持不变）
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CoreError::CircularDependency { .. } | CoreError::ModuleHasDependents { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_lists_path() {
        let err = CoreError::CircularDependency {
            cycle: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "检测到循环依赖: A -> B -> A");
        assert!(err.is_structural());
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::ModuleHasDependents {
            module: "Core".into(),
            dependents: vec!["Audio".into()],
        };
        assert_eq!(err.error_code(), error_code::REGISTRY_HAS_DEPENDENTS);
        assert!(err.to_string().contains("Audio"));

        let err = CoreError::ContractViolation {
            expected: "子模块",
            type_name: "Foo".into(),
        };
        assert_eq!(err.error_code(), error_code::CONTRACT_VIOLATION);
        assert!(!err.is_structural());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }

    #[test]
    fn test_anyhow_passthrough() {
        let err: CoreError = anyhow::anyhow!("资源未就绪").into();
        assert_eq!(err.to_string(), "资源未就绪");
        assert_eq!(err.error_code(), error_code::CORE_UNKNOWN);
    }
}
