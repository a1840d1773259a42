// ==========================================
// 排课引擎 - 约束注册表
// ==========================================
// 职责: 约束种类的唯一来源; 按 (department, period) 枚举在用实例
// 注册: 进程启动时显式注册描述符, 不做运行期类型遍历
// 红线: 纯读操作; 仓储错误 (含畸形实例) 一律向上传播
// ==========================================

use crate::constraints::avoid_time_window::AvoidTimeWindowKind;
use crate::constraints::course_order::CourseOrderKind;
use crate::constraints::limit_courses_per_day::LimitCoursesPerDayKind;
use crate::constraints::lunch_break::LunchBreakKind;
use crate::constraints::tutor_availability::TutorAvailabilityKind;
use crate::constraints::ConstraintKind;
use crate::domain::constraint::{ConstraintInstance, InstanceFilter};
use crate::domain::scope::SchedulingScope;
use crate::engine::error::EngineResult;
use crate::repository::constraint_repo::ConstraintRepository;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// 在用约束: 种类描述符 + 实例
#[derive(Clone)]
pub struct ActiveConstraint {
    pub kind: Arc<dyn ConstraintKind>,
    pub instance: ConstraintInstance,
}

impl fmt::Debug for ActiveConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveConstraint")
            .field("kind", &self.kind.name())
            .field("instance", &self.instance.constraint_id)
            .finish()
    }
}

/// 种类目录项 (对外展示)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindInfo {
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub description: &'static str,
}

// ==========================================
// ConstraintRegistry - 约束注册表
// ==========================================
#[derive(Default)]
pub struct ConstraintRegistry {
    kinds: BTreeMap<&'static str, Arc<dyn ConstraintKind>>,
}

impl ConstraintRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置种类
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TutorAvailabilityKind));
        registry.register(Arc::new(LimitCoursesPerDayKind));
        registry.register(Arc::new(AvoidTimeWindowKind));
        registry.register(Arc::new(LunchBreakKind));
        registry.register(Arc::new(CourseOrderKind));
        registry
    }

    /// 注册种类; 同名种类已存在时保留先注册者并返回 false
    pub fn register(&mut self, kind: Arc<dyn ConstraintKind>) -> bool {
        let name = kind.name();
        if self.kinds.contains_key(name) {
            tracing::warn!(kind = name, "约束种类重复注册，忽略");
            return false;
        }
        if let Some(parent) = kind.parent() {
            if !self.kinds.contains_key(parent) {
                tracing::debug!(kind = name, parent = parent, "父种类尚未注册");
            }
        }
        self.kinds.insert(name, kind);
        true
    }

    /// 全部已注册种类 (含各级特化种类)
    pub fn all_kinds(&self) -> BTreeSet<&'static str> {
        self.kinds.keys().copied().collect()
    }

    /// 按名称排序的种类目录
    pub fn catalogue(&self) -> Vec<KindInfo> {
        self.kinds
            .values()
            .map(|kind| KindInfo {
                name: kind.name(),
                parent: kind.parent(),
                description: kind.description(),
            })
            .collect()
    }

    pub fn kind(&self, name: &str) -> Option<Arc<dyn ConstraintKind>> {
        self.kinds.get(name).cloned()
    }

    /// 直接或间接特化 name 的全部种类
    pub fn specializations_of(&self, name: &str) -> BTreeSet<&'static str> {
        let mut found = BTreeSet::new();
        let mut frontier = vec![name.to_string()];
        while let Some(current) = frontier.pop() {
            for (child, kind) in &self.kinds {
                if kind.parent() == Some(current.as_str()) && found.insert(*child) {
                    frontier.push(child.to_string());
                }
            }
        }
        found
    }

    /// 枚举范围内的在用实例 (按 constraint_id 排序)
    ///
    /// # 过滤
    /// - department 匹配
    /// - periods 为空或包含 period
    /// - filter.hard_only 时只取无权重实例
    /// - filter.active_only 时只取启用实例
    pub fn active_instances(
        &self,
        repo: &ConstraintRepository,
        scope: &SchedulingScope,
        filter: InstanceFilter,
    ) -> EngineResult<Vec<ActiveConstraint>> {
        let mut active = Vec::new();
        for (name, kind) in &self.kinds {
            let instances = repo.find_by_kind(name, &scope.department)?;
            let before = active.len();
            active.extend(
                instances
                    .into_iter()
                    .filter(|i| filter.accepts(i, &scope.period))
                    .map(|instance| ActiveConstraint {
                        kind: Arc::clone(kind),
                        instance,
                    }),
            );
            tracing::trace!(kind = name, count = active.len() - before, scope = %scope, "种类实例枚举");
        }

        active.sort_by(|a, b| a.instance.constraint_id.cmp(&b.instance.constraint_id));
        Ok(active)
    }

    /// 种类未注册、但满足过滤条件的实例
    pub fn unregistered_instances(
        &self,
        repo: &ConstraintRepository,
        scope: &SchedulingScope,
        filter: InstanceFilter,
    ) -> EngineResult<Vec<ConstraintInstance>> {
        let mut orphans = Vec::new();
        for kind in repo.distinct_kinds(&scope.department)? {
            if self.kinds.contains_key(kind.as_str()) {
                continue;
            }
            orphans.extend(
                repo.find_by_kind(&kind, &scope.department)?
                    .into_iter()
                    .filter(|i| filter.accepts(i, &scope.period)),
            );
        }
        orphans.sort_by(|a, b| a.constraint_id.cmp(&b.constraint_id));
        Ok(orphans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{avoid_time_window, lunch_break, tutor_availability};
    use crate::db::open_in_memory_shared;
    use serde_json::json;

    fn instance(id: &str, kind: &str, periods: &[&str], weight: Option<f64>, is_active: bool) -> ConstraintInstance {
        ConstraintInstance {
            constraint_id: id.to_string(),
            kind: kind.to_string(),
            department: "INFO".to_string(),
            periods: periods.iter().map(|p| p.to_string()).collect(),
            weight,
            is_active,
            params: json!({"tutor": "ALB"}),
            comment: None,
        }
    }

    #[test]
    fn test_builtin_kinds_and_hierarchy() {
        let mut registry = ConstraintRegistry::with_builtin_kinds();
        assert_eq!(registry.all_kinds().len(), 5);
        assert!(registry.all_kinds().contains(lunch_break::KIND));
        assert_eq!(
            registry.specializations_of(avoid_time_window::KIND),
            BTreeSet::from([lunch_break::KIND])
        );
        // 重复注册不会产生重复种类
        assert!(!registry.register(Arc::new(LunchBreakKind)));
        assert_eq!(registry.all_kinds().len(), 5);
    }

    #[test]
    fn test_catalogue_carries_descriptions() {
        let catalogue = ConstraintRegistry::with_builtin_kinds().catalogue();
        assert_eq!(catalogue.len(), 5);
        assert!(catalogue.iter().all(|info| !info.description.is_empty()));

        let lunch = catalogue.iter().find(|info| info.name == lunch_break::KIND).unwrap();
        assert_eq!(lunch.parent, Some(avoid_time_window::KIND));
        let tutor = catalogue.iter().find(|info| info.name == tutor_availability::KIND).unwrap();
        assert_eq!(tutor.description, "教师只能在声明的可用时段授课");
    }

    #[test]
    fn test_active_instances_filtering() {
        let repo = ConstraintRepository::new(open_in_memory_shared().unwrap());
        let kind = tutor_availability::KIND;
        repo.upsert(&instance("k3", kind, &[], None, true)).unwrap();
        repo.upsert(&instance("k1", kind, &["W10", "W11"], None, true)).unwrap();
        repo.upsert(&instance("k2", kind, &["W12"], None, true)).unwrap();
        repo.upsert(&instance("k4", kind, &[], Some(1.0), true)).unwrap();
        repo.upsert(&instance("k5", kind, &[], None, false)).unwrap();

        let registry = ConstraintRegistry::with_builtin_kinds();
        let scope = SchedulingScope::new("INFO", "W11");

        let ids = |filter| -> Vec<String> {
            registry
                .active_instances(&repo, &scope, filter)
                .unwrap()
                .into_iter()
                .map(|a| a.instance.constraint_id)
                .collect()
        };
        assert_eq!(ids(InstanceFilter::hard_active()), vec!["k1", "k3"]);
        assert_eq!(ids(InstanceFilter::default()), vec!["k1", "k3", "k4"]);
        assert_eq!(
            ids(InstanceFilter {
                hard_only: false,
                active_only: false
            }),
            vec!["k1", "k3", "k4", "k5"]
        );
    }

    #[test]
    fn test_unregistered_instances() {
        let repo = ConstraintRepository::new(open_in_memory_shared().unwrap());
        repo.upsert(&instance("x1", "room_capacity", &[], None, true)).unwrap();
        repo.upsert(&instance("k1", tutor_availability::KIND, &[], None, true)).unwrap();

        let registry = ConstraintRegistry::with_builtin_kinds();
        let orphans = registry
            .unregistered_instances(&repo, &SchedulingScope::new("INFO", "W10"), InstanceFilter::hard_active())
            .unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].constraint_id, "x1");
    }
}
