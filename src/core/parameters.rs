//! 键值参数存储
//!
//! Preparable 子模块在启动前从这里拉取最新的配置值。

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// 键值参数存储
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    values: BTreeMap<String, serde_json::Value>,
}

impl ParameterStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取原始值
    pub fn get_raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// 读取并反序列化；键不存在或类型不符时返回 None
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// 读取，缺失时返回默认值
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// 写入
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> crate::Result<()> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// 删除
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    /// 是否包含键
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// 键数量
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<BTreeMap<String, serde_json::Value>> for ParameterStore {
    fn from(values: BTreeMap<String, serde_json::Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut store = ParameterStore::new();
        store.set("warmup", 3u32).unwrap();
        store.set("name", "diag").unwrap();

        assert_eq!(store.get::<u32>("warmup"), Some(3));
        assert_eq!(store.get_raw("warmup"), Some(&serde_json::json!(3)));
        assert_eq!(store.get::<String>("name").as_deref(), Some("diag"));
        assert_eq!(store.get::<u32>("name"), None);
        assert_eq!(store.get_or("missing", 7u32), 7);
        assert_eq!(store.len(), 2);
    }
}
