//! 模块变更通知
//!
//! 运行器在运行期加入、移除模块以及整体重建时发布通知，访问门面据此
//! 使查询缓存失效。回调在运行器所在线程同步调用。

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::metadata::TypeKey;
use crate::utils::SubscriptionId;

/// 模块变更事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEvent {
    /// 模块已在运行期加入
    Added(TypeKey),
    /// 模块已在运行期移除
    Removed(TypeKey),
    /// 全部模块已重建（启用、重建或停用）
    Reset,
}

impl fmt::Display for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleEvent::Added(key) => write!(f, "added({})", key),
            ModuleEvent::Removed(key) => write!(f, "removed({})", key),
            ModuleEvent::Reset => write!(f, "reset"),
        }
    }
}

/// 事件回调
pub type ModuleCallback = Arc<dyn Fn(&ModuleEvent) + Send + Sync>;

/// 订阅者列表
#[derive(Default)]
pub struct ModuleEvents {
    subscribers: Vec<(SubscriptionId, ModuleCallback)>,
}

impl ModuleEvents {
    /// 创建空列表
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅，返回订阅 ID
    pub fn subscribe(&mut self, callback: ModuleCallback) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscribers.push((id.clone(), callback));
        debug!(subscription_id = %id, "已订阅模块变更");
        id
    }

    /// 取消订阅，返回是否存在
    pub fn unsubscribe(&mut self, id: &SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| sid != id);
        before != self.subscribers.len()
    }

    /// 按订阅顺序通知全部订阅者
    pub fn publish(&self, event: ModuleEvent) {
        trace!(event = %event, subscribers = self.subscribers.len(), "发布模块变更");
        for (_, callback) in &self.subscribers {
            callback(&event);
        }
    }

    /// 订阅者数
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// 是否没有订阅者
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// 清空订阅
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

impl fmt::Debug for ModuleEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEvents")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Probe;

    #[test]
    fn test_publish_reaches_subscribers_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut events = ModuleEvents::new();

        let first = Arc::clone(&log);
        events.subscribe(Arc::new(move |e| first.lock().unwrap().push(format!("1:{e}"))));
        let second = Arc::clone(&log);
        let id = events.subscribe(Arc::new(move |e| second.lock().unwrap().push(format!("2:{e}"))));

        events.publish(ModuleEvent::Added(TypeKey::of::<Probe>()));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["1:added(Probe)".to_string(), "2:added(Probe)".to_string()]
        );

        assert!(events.unsubscribe(&id));
        assert!(!events.unsubscribe(&id));
        events.publish(ModuleEvent::Reset);
        assert_eq!(log.lock().unwrap().len(), 3);
    }
}
