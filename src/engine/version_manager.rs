// ==========================================
// 排课引擎 - 版本/工作副本管理
// ==========================================
// 状态: 每个 (department, period) 有若干 major, 每个 major 有一个或多个 minor
// 不变量: 存在 major 时恰好一个 major 被发布
// 发布指针只经由本管理器 (仓储事务) 改写
// 红线: 版本操作从不调用求解器; 每次写操作记录 action_log
// ==========================================

use crate::domain::action_log::ActionLog;
use crate::domain::course::Course;
use crate::domain::scope::SchedulingScope;
use crate::domain::timetable::{ScheduledCourse, TimetableVersion};
use crate::domain::types::VersionActionType;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::record_action;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::course_repo::CourseRepository;
use crate::repository::error::RepositoryError;
use crate::repository::timetable_repo::{MajorDeletion, SwapOutcome, TimetableRepository, VersionMeta};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

pub struct VersionManager {
    timetable_repo: Arc<TimetableRepository>,
    course_repo: Arc<CourseRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl VersionManager {
    pub fn new(
        timetable_repo: Arc<TimetableRepository>,
        course_repo: Arc<CourseRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            timetable_repo,
            course_repo,
            action_log_repo,
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 范围内全部版本 (major, minor 升序)
    pub fn list_versions(&self, scope: &SchedulingScope) -> EngineResult<Vec<TimetableVersion>> {
        Ok(self.timetable_repo.find_versions(scope)?)
    }

    /// 当前发布 major
    pub fn published_major(&self, scope: &SchedulingScope) -> EngineResult<i32> {
        self.timetable_repo
            .published_major(scope)?
            .ok_or_else(|| EngineError::NothingPublished {
                scope: scope.clone(),
            })
    }

    /// major 的最新 minor
    pub fn latest_minor(&self, scope: &SchedulingScope, major: i32) -> EngineResult<i32> {
        self.timetable_repo
            .latest_minor(scope, major)?
            .ok_or_else(|| version_not_found(scope, major))
    }

    /// major 最新 minor 的落位
    pub fn placements(&self, scope: &SchedulingScope, major: i32) -> EngineResult<Vec<ScheduledCourse>> {
        let minor = self.latest_minor(scope, major)?;
        Ok(self.timetable_repo.find_placements(scope, major, minor)?)
    }

    // ==========================================
    // 写操作
    // ==========================================

    /// 复制 major 的最新 minor 为新 major (minor = 0)
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn duplicate(&self, scope: &SchedulingScope, major: i32) -> EngineResult<TimetableVersion> {
        let version = self
            .timetable_repo
            .duplicate_major(scope, major)?
            .ok_or_else(|| version_not_found(scope, major))?;

        tracing::info!(scope = %scope, source = major, major = version.major, "版本已复制");
        self.log(
            scope,
            VersionActionType::Duplicate,
            json!({"source_major": major, "new_major": version.major}),
            format!("复制 v{} → {}", major, version.label()),
        );
        Ok(version)
    }

    /// 发布 major, 返回此前的发布 major
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn promote(&self, scope: &SchedulingScope, major: i32) -> EngineResult<Option<i32>> {
        let previous = match self.timetable_repo.promote(scope, major) {
            Ok(previous) => previous,
            Err(RepositoryError::NotFound { .. }) => return Err(version_not_found(scope, major)),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(scope = %scope, major, previous = ?previous, "版本已发布");
        self.log(
            scope,
            VersionActionType::Promote,
            json!({"major": major, "previous": previous}),
            format!("发布 v{}", major),
        );
        Ok(previous)
    }

    /// 在 a 与 b 之间交换发布标记, 返回新的发布 major
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn swap(&self, scope: &SchedulingScope, a: i32, b: i32) -> EngineResult<i32> {
        let published = match self.timetable_repo.swap_published(scope, a, b)? {
            SwapOutcome::Swapped { published } => published,
            SwapOutcome::MissingMajor(major) => return Err(version_not_found(scope, major)),
            SwapOutcome::NeitherPublished => {
                return Err(EngineError::SwapWithoutPublished {
                    scope: scope.clone(),
                    a,
                    b,
                })
            }
        };

        tracing::info!(scope = %scope, a, b, published, "发布标记已交换");
        self.log(
            scope,
            VersionActionType::Swap,
            json!({"a": a, "b": b, "published": published}),
            format!("交换 v{} ↔ v{}", a, b),
        );
        Ok(published)
    }

    /// 删除 major 及其全部落位 (发布版本拒绝删除)
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn delete(&self, scope: &SchedulingScope, major: i32) -> EngineResult<()> {
        match self.timetable_repo.delete_major(scope, major)? {
            MajorDeletion::Deleted { versions, placements } => {
                tracing::info!(scope = %scope, major, versions, placements, "版本已删除");
                self.log(
                    scope,
                    VersionActionType::Delete,
                    json!({"major": major, "versions": versions, "placements": placements}),
                    format!("删除 v{}", major),
                );
                Ok(())
            }
            MajorDeletion::NotFound => Err(version_not_found(scope, major)),
            MajorDeletion::Published => Err(EngineError::PublishedVersionDeletionDenied {
                scope: scope.clone(),
                major,
            }),
        }
    }

    /// 删除除发布版本外的全部 major, 返回被删除的 major
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn delete_all_unused(&self, scope: &SchedulingScope) -> EngineResult<Vec<i32>> {
        let deleted = match self.timetable_repo.delete_all_unused(scope) {
            Ok(deleted) => deleted,
            Err(RepositoryError::BusinessRuleViolation(_)) => {
                return Err(EngineError::NothingPublished {
                    scope: scope.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if !deleted.is_empty() {
            tracing::info!(scope = %scope, deleted = ?deleted, "未使用版本已清理");
            self.log(
                scope,
                VersionActionType::DeleteUnused,
                json!({"deleted": deleted}),
                format!("清理 {} 个未使用版本", deleted.len()),
            );
        }
        Ok(deleted)
    }

    /// 按相同的周模式将 major 复制到其他周期
    ///
    /// # 匹配规则
    /// - 源课程与目标周期课程按 (module, course_type, groups, duration) 一一对应
    /// - 任一源落位找不到对应课程 ⇒ IncompatiblePeriod, 不写入任何周期
    /// - 目标周期多出的课程保持未排
    #[instrument(skip(self, target_periods), fields(scope = %scope, targets = target_periods.len()))]
    pub fn duplicate_into_other_periods(
        &self,
        scope: &SchedulingScope,
        major: i32,
        target_periods: &[String],
    ) -> EngineResult<Vec<TimetableVersion>> {
        let source = self.placements(scope, major)?;
        let source_courses: HashMap<String, Course> = self
            .course_repo
            .find_by_scope(scope)?
            .into_iter()
            .map(|c| (c.course_id.clone(), c))
            .collect();

        // 先校验全部目标周期, 再一次性写入
        let mut batches = Vec::with_capacity(target_periods.len());
        for period in target_periods {
            if period == &scope.period {
                return Err(EngineError::IncompatiblePeriod {
                    period: period.clone(),
                    reason: "目标周期与源周期相同".to_string(),
                });
            }
            let target = scope.with_period(period.clone());
            let placements = self.map_onto(&source, &source_courses, &target)?;
            batches.push((target, VersionMeta::default(), placements));
        }

        let versions = self.timetable_repo.create_next_majors(batches)?;
        for version in &versions {
            tracing::info!(source = major, target = %version.label(), "版本已复制到其他周期");
            self.log(
                &version.scope(),
                VersionActionType::DuplicateIntoPeriod,
                json!({
                    "source_period": scope.period,
                    "source_major": major,
                    "major": version.major,
                }),
                format!("由 {} v{} 复制", scope, major),
            );
        }
        Ok(versions)
    }

    /// 将源落位映射到目标周期的等价课程
    fn map_onto(
        &self,
        source: &[ScheduledCourse],
        source_courses: &HashMap<String, Course>,
        target: &SchedulingScope,
    ) -> EngineResult<Vec<ScheduledCourse>> {
        let mut pool: HashMap<_, Vec<Course>> = HashMap::new();
        for course in self.course_repo.find_by_scope(target)? {
            pool.entry(course.equivalence_key()).or_default().push(course);
        }
        // 同键课程按 course_id 顺序消费
        for courses in pool.values_mut() {
            courses.sort_by(|a, b| b.course_id.cmp(&a.course_id));
        }

        let mut mapped: Vec<ScheduledCourse> = Vec::with_capacity(source.len());
        for placement in source {
            let course = source_courses.get(&placement.course_id).ok_or_else(|| {
                EngineError::IncompatiblePeriod {
                    period: target.period.clone(),
                    reason: format!("源课程 {} 已不存在", placement.course_id),
                }
            })?;
            let target_course = pool
                .get_mut(&course.equivalence_key())
                .and_then(|courses| courses.pop())
                .ok_or_else(|| EngineError::IncompatiblePeriod {
                    period: target.period.clone(),
                    reason: format!(
                        "没有与 {} ({} {}) 对应的课程",
                        course.course_id, course.module, course.course_type
                    ),
                })?;

            let mut copy = placement.clone_into(&target.period, 0, 0);
            copy.tutor = pick_resource(placement.tutor.as_deref(), &target_course.tutors, |tutor| {
                mapped.iter().any(|m| m.tutor.as_deref() == Some(tutor) && overlaps(m, placement))
            });
            copy.room = pick_resource(placement.room.as_deref(), &target_course.rooms, |room| {
                mapped.iter().any(|m| m.room.as_deref() == Some(room) && overlaps(m, placement))
            });
            if copy.tutor != placement.tutor || copy.room != placement.room {
                tracing::debug!(
                    course_id = %target_course.course_id,
                    tutor = ?copy.tutor,
                    room = ?copy.room,
                    "目标课程不接受源教师/教室，已改选"
                );
            }
            copy.course_id = target_course.course_id;
            mapped.push(copy);
        }
        Ok(mapped)
    }

    fn log(&self, scope: &SchedulingScope, action: VersionActionType, payload: serde_json::Value, detail: String) {
        record_action(&self.action_log_repo, ActionLog::now(scope, action, Some(payload), detail));
    }
}

/// 目标课程的候选列表为空时不需要该资源; 源资源仍在候选中则沿用,
/// 否则取第一个同一时段未被占用的候选, 都被占用时取第一个
fn pick_resource(current: Option<&str>, allowed: &[String], busy: impl Fn(&str) -> bool) -> Option<String> {
    if allowed.is_empty() {
        return None;
    }
    if let Some(current) = current.filter(|c| allowed.iter().any(|a| a == c)) {
        return Some(current.to_string());
    }
    allowed
        .iter()
        .find(|candidate| !busy(candidate.as_str()))
        .or_else(|| allowed.first())
        .cloned()
}

fn overlaps(a: &ScheduledCourse, b: &ScheduledCourse) -> bool {
    a.day.eq_ignore_ascii_case(&b.day) && a.start_min < b.end_min() && b.start_min < a.end_min()
}

fn version_not_found(scope: &SchedulingScope, major: i32) -> EngineError {
    EngineError::VersionNotFound {
        scope: scope.clone(),
        major,
        minor: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;

    fn scope() -> SchedulingScope {
        SchedulingScope::new("INFO", "W10")
    }

    fn course(id: &str, period: &str) -> Course {
        Course {
            course_id: id.to_string(),
            department: "INFO".to_string(),
            period: period.to_string(),
            module: "ALGO".to_string(),
            course_type: "TD".to_string(),
            duration_min: 90,
            groups: vec!["G1".to_string()],
            tutors: vec!["ALB".to_string()],
            rooms: vec![],
        }
    }

    fn placement(course_id: &str, start_min: i32) -> ScheduledCourse {
        ScheduledCourse {
            scheduled_id: String::new(),
            course_id: course_id.to_string(),
            department: "INFO".to_string(),
            period: "W10".to_string(),
            major: 0,
            minor: 0,
            day: "mon".to_string(),
            start_min,
            duration_min: 90,
            room: None,
            tutor: Some("ALB".to_string()),
        }
    }

    fn manager() -> (VersionManager, Arc<TimetableRepository>, Arc<CourseRepository>, Arc<ActionLogRepository>) {
        let conn = open_in_memory_shared().unwrap();
        let timetable_repo = Arc::new(TimetableRepository::new(conn.clone()));
        let course_repo = Arc::new(CourseRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn));
        (
            VersionManager::new(timetable_repo.clone(), course_repo.clone(), action_log_repo.clone()),
            timetable_repo,
            course_repo,
            action_log_repo,
        )
    }

    #[test]
    fn test_nothing_published_on_empty_scope() {
        let (vm, _, _, _) = manager();
        assert!(matches!(
            vm.published_major(&scope()),
            Err(EngineError::NothingPublished { .. })
        ));
        assert!(vm.delete_all_unused(&scope()).unwrap().is_empty());
    }

    #[test]
    fn test_promote_swap_delete_are_logged() {
        let (vm, repo, _, log_repo) = manager();
        repo.create_next_major(&scope(), &VersionMeta::default(), vec![placement("c1", 480)])
            .unwrap();
        repo.create_next_major(&scope(), &VersionMeta::default(), vec![placement("c1", 570)])
            .unwrap();

        assert_eq!(vm.promote(&scope(), 1).unwrap(), Some(0));
        assert_eq!(vm.swap(&scope(), 0, 1).unwrap(), 0);
        assert!(matches!(
            vm.delete(&scope(), 0),
            Err(EngineError::PublishedVersionDeletionDenied { major: 0, .. })
        ));
        vm.delete(&scope(), 1).unwrap();
        assert!(matches!(vm.delete(&scope(), 1), Err(EngineError::VersionNotFound { .. })));
        assert!(matches!(vm.promote(&scope(), 7), Err(EngineError::VersionNotFound { .. })));

        let logs = log_repo.find_by_scope(&scope()).unwrap();
        assert_eq!(logs.len(), 3);
    }

    #[test]
    fn test_swap_without_published() {
        let (vm, repo, _, _) = manager();
        for start in [480, 570, 660] {
            repo.create_next_major(&scope(), &VersionMeta::default(), vec![placement("c1", start)])
                .unwrap();
        }
        assert!(matches!(
            vm.swap(&scope(), 1, 2),
            Err(EngineError::SwapWithoutPublished { .. })
        ));
    }

    #[test]
    fn test_duplicate_into_other_periods() {
        let (vm, repo, course_repo, _) = manager();
        course_repo
            .batch_upsert(&[course("w10-c1", "W10"), course("w11-c1", "W11"), course("w11-extra", "W11")])
            .unwrap();
        repo.create_next_major(&scope(), &VersionMeta::default(), vec![placement("w10-c1", 480)])
            .unwrap();

        let versions = vm
            .duplicate_into_other_periods(&scope(), 0, &["W11".to_string()])
            .unwrap();
        assert_eq!(versions.len(), 1);
        let copied = vm.placements(&scope().with_period("W11"), 0).unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].start_min, 480);
        assert!(copied[0].course_id.starts_with("w11-"));

        // 没有对应课程的周期整体拒绝
        assert!(matches!(
            vm.duplicate_into_other_periods(&scope(), 0, &["W11".to_string(), "W12".to_string()]),
            Err(EngineError::IncompatiblePeriod { .. })
        ));
        assert_eq!(vm.list_versions(&scope().with_period("W11")).unwrap().len(), 1);
        assert!(matches!(
            vm.duplicate_into_other_periods(&scope(), 0, &["W10".to_string()]),
            Err(EngineError::IncompatiblePeriod { .. })
        ));
    }

    #[test]
    fn test_pick_resource_prefers_allowed_and_free() {
        let allowed = vec!["BOB".to_string(), "CAT".to_string()];
        assert_eq!(pick_resource(Some("ALB"), &[], |_| false), None);
        assert_eq!(pick_resource(Some("CAT"), &allowed, |_| true), Some("CAT".to_string()));
        assert_eq!(pick_resource(Some("ALB"), &allowed, |t| t == "BOB"), Some("CAT".to_string()));
        assert_eq!(pick_resource(None, &allowed, |_| true), Some("BOB".to_string()));
    }
}
