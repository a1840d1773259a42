// ==========================================
// 排课引擎 - 求解后校验
// ==========================================
// 职责: 针对已物化版本逐实例复查约束满足情况
// 用途: 求解后的自动闸门; 对已发布版本的按需审计
// 红线: 纯诊断, 不修改版本; 缺少校验能力的实例记为"无意见"
// ==========================================

use crate::constraints::{Capability, ConstraintRegistry};
use crate::domain::constraint::InstanceFilter;
use crate::domain::report::ViolationReport;
use crate::domain::scope::SchedulingScope;
use crate::domain::timetable::ScheduledCourse;
use crate::engine::context::{ScopeData, ScopeLoader};
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::constraint_repo::ConstraintRepository;
use crate::repository::timetable_repo::TimetableRepository;
use std::sync::Arc;
use tracing::instrument;

pub struct Validator {
    registry: Arc<ConstraintRegistry>,
    constraint_repo: Arc<ConstraintRepository>,
    timetable_repo: Arc<TimetableRepository>,
    loader: Arc<ScopeLoader>,
}

impl Validator {
    pub fn new(
        registry: Arc<ConstraintRegistry>,
        constraint_repo: Arc<ConstraintRepository>,
        timetable_repo: Arc<TimetableRepository>,
        loader: Arc<ScopeLoader>,
    ) -> Self {
        Self {
            registry,
            constraint_repo,
            timetable_repo,
            loader,
        }
    }

    /// 校验一个版本
    ///
    /// # 参数
    /// - minor: None 表示该 major 的最新 minor
    /// - filter: hard_only / active_only 过滤
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn validate(
        &self,
        scope: &SchedulingScope,
        major: i32,
        minor: Option<i32>,
        filter: InstanceFilter,
    ) -> EngineResult<ViolationReport> {
        let minor = match minor {
            Some(m) => m,
            None => self
                .timetable_repo
                .latest_minor(scope, major)?
                .ok_or_else(|| EngineError::VersionNotFound {
                    scope: scope.clone(),
                    major,
                    minor: None,
                })?,
        };
        if self.timetable_repo.find_version(scope, major, minor)?.is_none() {
            return Err(EngineError::VersionNotFound {
                scope: scope.clone(),
                major,
                minor: Some(minor),
            });
        }

        let placements = self.timetable_repo.find_placements(scope, major, minor)?;
        let data = self.loader.load(scope)?;
        self.validate_placements(&data, major, minor, &placements, filter)
    }

    /// 对给定落位集合执行校验
    pub fn validate_placements(
        &self,
        data: &ScopeData,
        major: i32,
        minor: i32,
        placements: &[ScheduledCourse],
        filter: InstanceFilter,
    ) -> EngineResult<ViolationReport> {
        let active = self
            .registry
            .active_instances(&self.constraint_repo, &data.scope, filter)?;

        for orphan in self
            .registry
            .unregistered_instances(&self.constraint_repo, &data.scope, filter)?
        {
            tracing::warn!(
                constraint_id = %orphan.constraint_id,
                kind = %orphan.kind,
                "约束种类未注册, 校验跳过"
            );
        }

        let mut report = ViolationReport {
            scope: data.scope.clone(),
            major,
            minor,
            checked_instances: 0,
            skipped_instances: 0,
            violations: Vec::new(),
        };

        for item in &active {
            match item.kind.is_satisfied_for(&item.instance, data, placements) {
                Capability::Unsupported => report.skipped_instances += 1,
                Capability::Supported(result) => {
                    report.checked_instances += 1;
                    if let Some(violation) = result? {
                        tracing::debug!(
                            constraint_id = %violation.constraint_id,
                            is_hard = violation.is_hard,
                            "约束违规: {}",
                            violation.message
                        );
                        report.violations.push(violation);
                    }
                }
            }
        }

        tracing::info!(
            scope = %data.scope,
            major,
            minor,
            checked = report.checked_instances,
            skipped = report.skipped_instances,
            violations = report.violations.len(),
            "版本校验完成"
        );
        Ok(report)
    }
}
