//! 内核配置
//!
//! 配置由四段组成：运行器设置、日志设置、持久化的模块/组件记录、
//! 以及供 Preparable 子模块读取的键值参数。支持 YAML 与 JSON。

use crate::utils::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// 运行器配置
// ============================================================================

/// 运行器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// 跳过依赖检查（仅在非设计模式下生效）
    #[serde(default)]
    pub skip_dependency_checks: bool,

    /// 是否处于设计/编辑模式
    #[serde(default)]
    pub design_mode: bool,

    /// 启动时运行的模块（类型名或菜单路径），为空表示全部已注册模块
    #[serde(default)]
    pub startup_modules: Vec<String>,

    /// 宿主帧循环间隔（毫秒）
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    16
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            skip_dependency_checks: false,
            design_mode: false,
            startup_modules: Vec::new(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl RunnerConfig {
    /// 依赖检查是否被短路为"已满足"
    pub fn dependency_checks_skipped(&self) -> bool {
        self.skip_dependency_checks && !self.design_mode
    }
}

// ============================================================================
// 日志配置
// ============================================================================

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志文件目录（不设置则只输出到控制台）
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// 额外的过滤指令
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            log_dir: None,
            rotation: default_rotation(),
            filter: None,
        }
    }
}

// ============================================================================
// 持久化记录
// ============================================================================

/// 模块记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// 模块类型名（目录中的完整类型名或短名）
    #[serde(rename = "type")]
    pub type_name: String,

    /// 是否激活
    #[serde(default = "default_true")]
    pub active: bool,

    /// 子模块类型名列表；为空时使用目录中登记的该模块全部子模块
    #[serde(default)]
    pub submodules: Vec<String>,
}

/// 组件记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// 组件类型名
    #[serde(rename = "type")]
    pub type_name: String,

    /// 组件设置
    #[serde(default)]
    pub settings: serde_json::Value,
}

fn default_true() -> bool {
    true
}

/// 模块与组件列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// 模块记录，按声明顺序
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,

    /// 组件记录
    #[serde(default)]
    pub components: Vec<ComponentRecord>,
}

// ============================================================================
// 内核配置
// ============================================================================

/// 内核配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 运行器配置
    #[serde(default)]
    pub runner: RunnerConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 模块/组件记录
    #[serde(default)]
    pub profile: ProfileConfig,

    /// 键值参数
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl CoreConfig {
    /// 创建配置构建器
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// 从文件加载配置，扩展名为 `.json` 时按 JSON 解析，否则按 YAML
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
        })?;

        let mut config = Self::parse(&content, is_json(&path))?;
        config.config_path = Some(path);
        config.validate()?;
        Ok(config)
    }

    /// 从字符串解析
    pub fn parse(content: &str, json: bool) -> Result<Self> {
        let config = if json {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };
        Ok(config)
    }

    /// 写回文件
    pub async fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.runner.tick_interval_ms == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "runner.tick_interval_ms".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for record in &self.profile.modules {
            if !seen.insert(record.type_name.as_str()) {
                return Err(CoreError::InvalidConfigValue {
                    key: "profile.modules".to_string(),
                    reason: format!("模块 '{}' 重复声明", record.type_name),
                });
            }
        }
        Ok(())
    }

    /// 合并另一个配置，`other` 中的非默认值覆盖当前值
    pub fn merge(&mut self, other: CoreConfig) {
        let defaults = RunnerConfig::default();
        if other.runner.skip_dependency_checks {
            self.runner.skip_dependency_checks = true;
        }
        if other.runner.design_mode {
            self.runner.design_mode = true;
        }
        if !other.runner.startup_modules.is_empty() {
            self.runner.startup_modules = other.runner.startup_modules;
        }
        if other.runner.tick_interval_ms != defaults.tick_interval_ms {
            self.runner.tick_interval_ms = other.runner.tick_interval_ms;
        }
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.log_dir.is_some() {
            self.logging.log_dir = other.logging.log_dir;
        }
        if !other.profile.modules.is_empty() {
            self.profile.modules = other.profile.modules;
        }
        if !other.profile.components.is_empty() {
            self.profile.components = other.profile.components;
        }
        self.parameters.extend(other.parameters);
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 跳过依赖检查
    pub fn skip_dependency_checks(mut self, skip: bool) -> Self {
        self.config.runner.skip_dependency_checks = skip;
        self
    }

    /// 设计模式
    pub fn design_mode(mut self, enable: bool) -> Self {
        self.config.runner.design_mode = enable;
        self
    }

    /// 帧间隔
    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.runner.tick_interval_ms = ms;
        self
    }

    /// 追加启动模块
    pub fn startup_module(mut self, name: impl Into<String>) -> Self {
        self.config.runner.startup_modules.push(name.into());
        self
    }

    /// 追加模块记录
    pub fn module(mut self, type_name: impl Into<String>, active: bool) -> Self {
        self.config.profile.modules.push(ModuleRecord {
            type_name: type_name.into(),
            active,
            submodules: Vec::new(),
        });
        self
    }

    /// 追加组件记录
    pub fn component(mut self, type_name: impl Into<String>, settings: serde_json::Value) -> Self {
        self.config.profile.components.push(ComponentRecord {
            type_name: type_name.into(),
            settings,
        });
        self
    }

    /// 设置参数
    pub fn parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.parameters.insert(key.into(), value);
        self
    }

    /// 构建配置
    pub fn build(self) -> CoreConfig {
        self.config
    }
}
