//! 启动队列
//!
//! 协作式异步启动：子模块的 `on_startup` 可以返回 `Pending`。一旦有子模块
//! 尚未完成启动，其后的所有启动都被推迟进入本队列，由运行器每帧从队首
//! 依次推进。队首未完成时后面的任务不会执行，因此依赖顺序在异步启动下
//! 仍然成立。

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::metadata::TypeKey;
use super::submodule::StartupProgress;

/// 子模块在运行器中的位置：所属模块 + 模块内下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmoduleRef {
    /// 所属模块
    pub module: TypeKey,
    /// 在模块子模块列表中的下标
    pub index: usize,
}

impl SubmoduleRef {
    /// 创建
    pub fn new(module: TypeKey, index: usize) -> Self {
        Self { module, index }
    }
}

/// 启动任务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupTask {
    /// 尚未开始，轮到时执行完整启动（绑定组件 + 启动）
    Begin(SubmoduleRef),
    /// 已开始但未完成，轮到时继续轮询
    Resume(SubmoduleRef),
}

impl StartupTask {
    /// 任务对应的子模块
    pub fn target(&self) -> SubmoduleRef {
        match self {
            StartupTask::Begin(r) | StartupTask::Resume(r) => *r,
        }
    }
}

/// 启动队列
#[derive(Debug, Default)]
pub struct StartupQueue {
    tasks: VecDeque<StartupTask>,
}

impl StartupQueue {
    /// 创建空队列
    pub fn new() -> Self {
        Self::default()
    }

    /// 队列为空，新的启动可以立即执行
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 排队数
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// 推迟一个尚未开始的启动
    pub fn defer_begin(&mut self, target: SubmoduleRef) {
        self.push(StartupTask::Begin(target));
    }

    /// 推迟一个已开始但未完成的启动
    pub fn defer_resume(&mut self, target: SubmoduleRef) {
        self.push(StartupTask::Resume(target));
    }

    fn push(&mut self, task: StartupTask) {
        let target = task.target();
        if self.tasks.iter().any(|t| t.target() == target) {
            return;
        }
        debug!(module = %target.module, index = target.index, "启动已排队");
        self.tasks.push_back(task);
    }

    /// 取消单个子模块的排队任务
    pub fn cancel(&mut self, target: SubmoduleRef) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.target() != target);
        before != self.tasks.len()
    }

    /// 丢弃某模块的全部排队任务，返回丢弃数
    pub fn remove_module(&mut self, module: TypeKey) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.target().module != module);
        before - self.tasks.len()
    }

    /// 放弃所有排队任务，返回放弃数
    pub fn abandon(&mut self) -> usize {
        let count = self.tasks.len();
        if count > 0 {
            warn!(count, "放弃未完成的启动任务");
        }
        self.tasks.clear();
        count
    }

    /// 排队中的任务
    pub fn pending(&self) -> impl Iterator<Item = &StartupTask> {
        self.tasks.iter()
    }

    /// 从队首依次推进
    ///
    /// 队首返回 `Pending` 时将其转为 `Resume` 并停止；其余结果出队并继续下一个。
    /// 返回本次完成启动的任务数。
    pub fn drive<F>(&mut self, mut step: F) -> usize
    where
        F: FnMut(StartupTask) -> StartupProgress,
    {
        let mut completed = 0;
        while let Some(task) = self.tasks.front().copied() {
            match step(task) {
                StartupProgress::Pending => {
                    if let Some(front) = self.tasks.front_mut() {
                        *front = StartupTask::Resume(task.target());
                    }
                    break;
                }
                StartupProgress::Complete => {
                    completed += 1;
                    self.tasks.pop_front();
                }
                StartupProgress::Failed | StartupProgress::Skipped => {
                    self.tasks.pop_front();
                }
            }
        }
        completed
    }
}
