//! 计时器功能
//!
//! [`SimpleTimer`] 按累计时间触发回调。计时器以到期时间有序保存，每帧
//! 弹出全部到期项；重复计时器触发后按原间隔重新排入。时间缩放与暂停
//! 只影响计时器自身的时间轴。

use std::fmt;
use std::time::Duration;

use tracing::{debug, trace};

use crate::module::{FeatureDescriptor, Submodule, TickContext, Tickable};

/// 计时器功能模块
pub struct TimerFeature;

impl FeatureDescriptor for TimerFeature {
    const MENU_PATH: Option<&'static str> = Some("Timer");
    const DESCRIPTION: Option<&'static str> = Some("按帧推进的回调计时器");
}

/// 计时器 ID
pub type TimerId = u64;

/// 计时器回调
pub type TimerCallback = Box<dyn FnMut() + Send>;

struct TimerEntry {
    id: TimerId,
    due: Duration,
    repeat: Option<Duration>,
    callback: TimerCallback,
}

/// 简单计时器子模块
pub struct SimpleTimer {
    timers: Vec<TimerEntry>,
    elapsed: Duration,
    time_scale: f32,
    paused: bool,
    next_id: TimerId,
}

impl Default for SimpleTimer {
    fn default() -> Self {
        Self {
            timers: Vec::new(),
            elapsed: Duration::ZERO,
            time_scale: 1.0,
            paused: false,
            next_id: 1,
        }
    }
}

impl SimpleTimer {
    /// 在 `after` 之后触发一次
    pub fn add_timer<F>(&mut self, after: Duration, callback: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule(after, None, Box::new(callback))
    }

    /// 每隔 `every` 触发一次，直到被移除；间隔为零时按一帧一次处理
    pub fn add_repeating<F>(&mut self, every: Duration, callback: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule(every, Some(every), Box::new(callback))
    }

    fn schedule(
        &mut self,
        after: Duration,
        repeat: Option<Duration>,
        callback: TimerCallback,
    ) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.insert(TimerEntry {
            id,
            due: self.elapsed + after,
            repeat,
            callback,
        });
        debug!(timer_id = id, after_ms = after.as_millis() as u64, "计时器已添加");
        id
    }

    /// 按到期时间插入，同一时间按添加顺序
    fn insert(&mut self, entry: TimerEntry) {
        let index = self.timers.partition_point(|t| t.due <= entry.due);
        self.timers.insert(index, entry);
    }

    /// 移除计时器
    pub fn remove_timer(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        before != self.timers.len()
    }

    /// 移除全部计时器
    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// 计时器数量
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// 是否没有计时器
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// 计时器时间轴上的累计时间
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// 设置时间缩放，负值按零处理
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    /// 时间缩放
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// 暂停
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// 恢复
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// 是否暂停
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// 推进时间并触发到期的计时器，返回触发次数
    pub fn advance(&mut self, delta: Duration) -> usize {
        if self.paused {
            return 0;
        }
        self.elapsed += delta.mul_f32(self.time_scale);

        let mut fired = 0;
        let mut rescheduled = Vec::new();
        while self.timers.first().is_some_and(|t| t.due <= self.elapsed) {
            let mut entry = self.timers.remove(0);
            (entry.callback)();
            fired += 1;
            trace!(timer_id = entry.id, "计时器触发");

            if let Some(every) = entry.repeat {
                // 零间隔的重复计时器推迟到下一帧，避免在同一帧内无限触发
                entry.due = self.elapsed + every.max(Duration::from_nanos(1));
                rescheduled.push(entry);
            }
        }
        for entry in rescheduled {
            self.insert(entry);
        }
        fired
    }
}

impl fmt::Debug for SimpleTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleTimer")
            .field("timers", &self.timers.len())
            .field("elapsed", &self.elapsed)
            .field("time_scale", &self.time_scale)
            .field("paused", &self.paused)
            .finish()
    }
}

impl FeatureDescriptor for SimpleTimer {
    const MENU_PATH: Option<&'static str> = Some("Timer/Simple");
}

impl Submodule for SimpleTimer {
    fn on_shutdown(&mut self) {
        if !self.timers.is_empty() {
            debug!(pending = self.timers.len(), "关闭时丢弃未触发的计时器");
        }
        self.timers.clear();
        self.elapsed = Duration::ZERO;
    }

    fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
        Some(self)
    }
}

impl Tickable for SimpleTimer {
    fn tick(&mut self, ctx: &mut TickContext<'_>) {
        self.advance(ctx.delta());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_timers_fire_in_due_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut timer = SimpleTimer::default();

        let o = Arc::clone(&order);
        timer.add_timer(Duration::from_millis(30), move || o.lock().unwrap().push("late"));
        let o = Arc::clone(&order);
        timer.add_timer(Duration::from_millis(10), move || o.lock().unwrap().push("early"));

        assert_eq!(timer.advance(Duration::from_millis(5)), 0);
        assert_eq!(timer.advance(Duration::from_millis(30)), 2);
        assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
        assert!(timer.is_empty());
    }

    #[test]
    fn test_repeating_timer_and_removal() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut timer = SimpleTimer::default();
        let h = Arc::clone(&hits);
        let id = timer.add_repeating(Duration::from_millis(10), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..5 {
            timer.advance(Duration::from_millis(10));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        assert!(timer.remove_timer(id));
        timer.advance(Duration::from_millis(10));
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_pause_and_time_scale() {
        let mut timer = SimpleTimer::default();
        timer.add_timer(Duration::from_millis(100), || {});

        timer.pause();
        assert!(timer.is_paused());
        assert_eq!(timer.advance(Duration::from_secs(1)), 0);
        assert_eq!(timer.elapsed(), Duration::ZERO);

        timer.resume();
        assert!(!timer.is_paused());
        timer.set_time_scale(0.5);
        assert_eq!(timer.advance(Duration::from_millis(100)), 0);
        assert_eq!(timer.advance(Duration::from_millis(100)), 1);
    }
}
