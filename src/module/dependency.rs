//! 模块依赖图
//!
//! [`DependencyGraph`] 记录模块类型之间的依赖边，提供：
//!
//! - 从指定节点出发的环检测（DFS，`visited` + 递归栈），返回有序的环路径
//! - 稳定的拓扑排序：入度为零的节点中总是先取插入顺序最靠前的
//! - 反向依赖查询
//!
//! ```rust
//! use features_core::module::{DependencyGraph, TypeKey};
//!
//! struct App;
//! struct Service;
//! struct Database;
//!
//! let (app, service, db) = (TypeKey::of::<App>(), TypeKey::of::<Service>(), TypeKey::of::<Database>());
//! let mut graph = DependencyGraph::new();
//! graph.add_dependency(app, service);
//! graph.add_dependency(service, db);
//!
//! assert!(graph.find_cycle().is_none());
//! assert_eq!(graph.topological_sort().unwrap(), vec![db, service, app]);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::module::metadata::TypeKey;
use crate::utils::{CoreError, Result};

/// 模块依赖关系图
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点插入顺序
    order: Vec<TypeKey>,
    /// 正向边：模块 -> 它依赖的模块
    edges: HashMap<TypeKey, Vec<TypeKey>>,
    /// 反向边：模块 -> 依赖它的模块
    reverse_edges: HashMap<TypeKey, Vec<TypeKey>>,
}

impl DependencyGraph {
    /// 创建空图
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加节点，已存在时忽略
    pub fn add_node(&mut self, key: TypeKey) {
        if !self.edges.contains_key(&key) {
            self.order.push(key);
            self.edges.insert(key, Vec::new());
            self.reverse_edges.insert(key, Vec::new());
        }
    }

    /// 添加依赖边：`dependent` 依赖 `dependency`
    pub fn add_dependency(&mut self, dependent: TypeKey, dependency: TypeKey) {
        self.add_node(dependent);
        self.add_node(dependency);

        if let Some(deps) = self.edges.get_mut(&dependent) {
            if !deps.contains(&dependency) {
                deps.push(dependency);
            }
        }
        if let Some(rev) = self.reverse_edges.get_mut(&dependency) {
            if !rev.contains(&dependent) {
                rev.push(dependent);
            }
        }
    }

    /// 是否包含节点
    pub fn contains(&self, key: TypeKey) -> bool {
        self.edges.contains_key(&key)
    }

    /// 节点数
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 直接依赖
    pub fn get_dependencies(&self, key: TypeKey) -> &[TypeKey] {
        self.edges.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 直接依赖方
    pub fn get_dependents(&self, key: TypeKey) -> &[TypeKey] {
        self.reverse_edges.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 查找图中任意一个环
    pub fn find_cycle(&self) -> Option<Vec<TypeKey>> {
        let mut visited = HashSet::new();
        for &node in &self.order {
            let mut on_stack = HashSet::new();
            let mut path = Vec::new();
            if let Some(cycle) = self.find_cycle_util(node, &mut visited, &mut on_stack, &mut path)
            {
                return Some(cycle);
            }
        }
        None
    }

    /// 查找从 `start` 可达的环
    ///
    /// 返回的路径首尾是同一个节点，例如 `[A, B, C, A]`。
    pub fn find_cycle_from(&self, start: TypeKey) -> Option<Vec<TypeKey>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();
        self.find_cycle_util(start, &mut visited, &mut on_stack, &mut path)
    }

    fn find_cycle_util(
        &self,
        node: TypeKey,
        visited: &mut HashSet<TypeKey>,
        on_stack: &mut HashSet<TypeKey>,
        path: &mut Vec<TypeKey>,
    ) -> Option<Vec<TypeKey>> {
        if on_stack.contains(&node) {
            let start = path.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        if !visited.insert(node) {
            return None;
        }

        on_stack.insert(node);
        path.push(node);

        for &next in self.get_dependencies(node) {
            if let Some(cycle) = self.find_cycle_util(next, visited, on_stack, path) {
                return Some(cycle);
            }
        }

        path.pop();
        on_stack.remove(&node);
        None
    }

    /// 稳定拓扑排序（Kahn 算法）
    ///
    /// 依赖排在依赖方之前；没有先后约束的节点保持插入顺序。
    pub fn topological_sort(&self) -> Result<Vec<TypeKey>> {
        let position: HashMap<TypeKey, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, k)| (*k, i))
            .collect();

        let mut in_degree: Vec<usize> = self
            .order
            .iter()
            .map(|k| self.get_dependencies(*k).len())
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut result = Vec::with_capacity(self.order.len());
        while let Some(index) = ready.pop_first() {
            let node = self.order[index];
            result.push(node);
            for dependent in self.get_dependents(node) {
                if let Some(&pos) = position.get(dependent) {
                    in_degree[pos] -= 1;
                    if in_degree[pos] == 0 {
                        ready.insert(pos);
                    }
                }
            }
        }

        if result.len() != self.order.len() {
            let cycle = self
                .find_cycle()
                .unwrap_or_default()
                .iter()
                .map(|k| k.short_name().to_string())
                .collect();
            return Err(CoreError::CircularDependency { cycle });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;
    struct C;
    struct D;

    fn keys() -> (TypeKey, TypeKey, TypeKey, TypeKey) {
        (
            TypeKey::of::<A>(),
            TypeKey::of::<B>(),
            TypeKey::of::<C>(),
            TypeKey::of::<D>(),
        )
    }

    #[test]
    fn test_edges_both_directions() {
        let (a, b, c, _) = keys();
        let mut graph = DependencyGraph::new();
        graph.add_dependency(a, b);
        graph.add_dependency(c, b);
        graph.add_dependency(a, b);

        assert_eq!(graph.get_dependencies(a), &[b]);
        assert_eq!(graph.get_dependents(b), &[a, c]);
        assert!(graph.contains(b));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_find_cycle_from_returns_ordered_path() {
        let (a, b, c, d) = keys();
        let mut graph = DependencyGraph::new();
        graph.add_dependency(d, a);
        graph.add_dependency(a, b);
        graph.add_dependency(b, c);
        graph.add_dependency(c, a);

        let cycle = graph.find_cycle_from(d).unwrap();
        assert_eq!(cycle, vec![a, b, c, a]);
        assert!(graph.topological_sort().is_err());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let (a, b, c, d) = keys();
        let mut graph = DependencyGraph::new();
        graph.add_dependency(a, b);
        graph.add_dependency(a, c);
        graph.add_dependency(b, d);
        graph.add_dependency(c, d);

        assert!(graph.find_cycle().is_none());
        assert!(graph.find_cycle_from(a).is_none());
        assert_eq!(graph.topological_sort().unwrap(), vec![d, b, c, a]);
    }

    #[test]
    fn test_topological_sort_is_stable() {
        let (a, b, c, d) = keys();
        let mut graph = DependencyGraph::new();
        // 插入顺序 C, A, D, B；只有 A -> B 一条约束
        graph.add_node(c);
        graph.add_node(a);
        graph.add_node(d);
        graph.add_node(b);
        graph.add_dependency(a, b);

        assert_eq!(graph.topological_sort().unwrap(), vec![c, d, b, a]);
    }
}
