// ==========================================
// 排课引擎 - 求解编排
// ==========================================
// 流程:
// 1. 范围锁 (排队或拒绝, 由 solver.queue_concurrent_solves 决定)
// 2. 加载范围快照 (无课程 ⇒ ScopeNotFound)
// 3. 预分析 (任一 KO ⇒ Infeasible, 附诊断)
// 4. 建模 (硬约束缺少建模能力 ⇒ ConstraintNotModelable)
// 5. 后端求解 (截止时刻协作式停止)
// 6. 物化为新 major (范围首个 major 自动发布)
// 7. 硬约束复查 (违规写入报告并告警)
// 8. 可选教室重排 (新 minor)
// 红线: 求解从不修改已物化的版本
// ==========================================

use crate::constraints::{Capability, ConstraintRegistry};
use crate::domain::action_log::ActionLog;
use crate::domain::constraint::InstanceFilter;
use crate::domain::report::Violation;
use crate::domain::scope::SchedulingScope;
use crate::domain::timetable::{ScheduledCourse, TimetableVersion};
use crate::domain::types::{SolveStatus, VersionActionType};
use crate::engine::context::{ScopeData, ScopeLoader};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::model::{Model, ModelBuilder, VarId};
use crate::engine::pre_analyzer::PreAnalyzer;
use crate::engine::record_action;
use crate::engine::room_reassign::RoomReassigner;
use crate::engine::scope_lock::ScopeLocks;
use crate::engine::solver::backend_by_name;
use crate::engine::validator::Validator;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::constraint_repo::ConstraintRepository;
use crate::repository::timetable_repo::{TimetableRepository, VersionMeta};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// 求解选项; 未指定的字段取部门配置
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    pub time_limit: Option<Duration>,
    pub backend: Option<String>,
    pub reassign_rooms: Option<bool>,
}

/// 求解结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReport {
    pub version: TimetableVersion,
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub backend: String,
    pub explored_nodes: u64,
    pub elapsed_ms: u64,
    pub hard_violations: Vec<Violation>,
    pub room_revision: Option<TimetableVersion>,
}

// ==========================================
// TimetableSolver - 求解编排器
// ==========================================
pub struct TimetableSolver {
    registry: Arc<ConstraintRegistry>,
    constraint_repo: Arc<ConstraintRepository>,
    timetable_repo: Arc<TimetableRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    loader: Arc<ScopeLoader>,
    pre_analyzer: Arc<PreAnalyzer>,
    validator: Arc<Validator>,
    locks: ScopeLocks,
}

impl TimetableSolver {
    pub fn new(
        registry: Arc<ConstraintRegistry>,
        constraint_repo: Arc<ConstraintRepository>,
        timetable_repo: Arc<TimetableRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        loader: Arc<ScopeLoader>,
        pre_analyzer: Arc<PreAnalyzer>,
        validator: Arc<Validator>,
    ) -> Self {
        Self {
            registry,
            constraint_repo,
            timetable_repo,
            action_log_repo,
            loader,
            pre_analyzer,
            validator,
            locks: ScopeLocks::new(),
        }
    }

    /// 求解排课范围并物化为新 major
    #[instrument(skip(self, options), fields(scope = %scope))]
    pub fn solve(&self, scope: &SchedulingScope, options: SolveOptions) -> EngineResult<SolveReport> {
        let config = Arc::clone(self.loader.config());
        let _lock = self
            .locks
            .acquire(scope, config.queue_concurrent_solves().map_err(EngineError::config)?)?;
        let started = Instant::now();

        let data = self.loader.load_required(scope)?;

        // ===== 预分析 =====
        let ko = self.pre_analyzer.pre_analyze_data(&data)?;
        if !ko.is_empty() {
            let diagnostics = ko
                .iter()
                .flat_map(|r| {
                    let origin = r.constraint_id.clone().unwrap_or_default();
                    r.messages.iter().map(move |m| format!("[{}] {}", origin, m))
                })
                .collect::<Vec<_>>();
            tracing::warn!(scope = %scope, ko = ko.len(), "预分析不可行, 跳过求解");
            return Err(EngineError::Infeasible {
                scope: scope.clone(),
                diagnostics,
            });
        }

        // ===== 建模 =====
        let model = self.build_model(&data)?;

        // ===== 求解 =====
        let backend_name = match &options.backend {
            Some(name) => name.clone(),
            None => config.default_backend(&scope.department).map_err(EngineError::config)?,
        };
        let backend = backend_by_name(
            &backend_name,
            config.random_seed().map_err(EngineError::config)?,
            config.local_search_max_restarts().map_err(EngineError::config)?,
        )?;
        let time_limit = match options.time_limit {
            Some(limit) => limit,
            None => config
                .default_time_limit(&scope.department)
                .map_err(EngineError::config)?,
        };

        tracing::info!(
            scope = %scope,
            backend = backend.name(),
            time_limit_ms = time_limit.as_millis() as u64,
            vars = model.vars.len(),
            hard = model.hard.len(),
            soft = model.soft.len(),
            "开始求解"
        );
        let solution = backend.solve(&model, Instant::now() + time_limit);

        let assignment = match (solution.status, solution.assignment) {
            (status, Some(assignment)) if status.has_solution() => assignment,
            (SolveStatus::TimedOutNoSolution, _) => {
                tracing::warn!(scope = %scope, nodes = solution.explored_nodes, "求解超时且无可行解");
                return Err(EngineError::TimedOutNoSolution {
                    scope: scope.clone(),
                    time_limit_ms: time_limit.as_millis() as u64,
                });
            }
            (status, _) => {
                tracing::warn!(scope = %scope, status = %status, nodes = solution.explored_nodes, "求解器证明无可行解");
                return Err(EngineError::Infeasible {
                    scope: scope.clone(),
                    diagnostics: infeasibility_hints(&data, &model),
                });
            }
        };

        if !model.is_complete_assignment(&assignment) || !model.violated_hard(&assignment).is_empty() {
            return Err(EngineError::Internal(format!(
                "后端 {} 返回的赋值不满足模型硬约束",
                backend.name()
            )));
        }

        // ===== 物化 =====
        let meta = VersionMeta {
            solve_status: Some(solution.status),
            objective: solution.objective,
            backend: Some(backend.name().to_string()),
        };
        let placements = materialize(&data, &model, &assignment)?;
        let version = self.timetable_repo.create_next_major(scope, &meta, placements)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                scope,
                VersionActionType::Solve,
                Some(json!({
                    "major": version.major,
                    "status": solution.status.to_db_str(),
                    "objective": solution.objective,
                    "backend": backend.name(),
                    "elapsed_ms": elapsed_ms,
                })),
                format!("求解生成 {}", version.label()),
            ),
        );

        // ===== 硬约束复查 =====
        let stored = self.timetable_repo.find_placements(scope, version.major, version.minor)?;
        let validation = self.validator.validate_placements(
            &data,
            version.major,
            version.minor,
            &stored,
            InstanceFilter::hard_active(),
        )?;
        let hard_violations: Vec<Violation> = validation.hard_violations().cloned().collect();
        for v in &hard_violations {
            tracing::warn!(
                version = %version.label(),
                constraint_id = %v.constraint_id,
                kind = %v.kind,
                "求解结果违反硬约束: {}",
                v.message
            );
        }

        // ===== 教室重排 =====
        let reassign = match options.reassign_rooms {
            Some(flag) => flag,
            None => config.reassign_rooms(&scope.department).map_err(EngineError::config)?,
        };
        let room_revision = if reassign {
            self.revise_rooms(&data, &version, &stored)?
        } else {
            None
        };

        tracing::info!(
            version = %version.label(),
            status = %solution.status,
            objective = ?solution.objective,
            nodes = solution.explored_nodes,
            elapsed_ms,
            "求解完成"
        );

        Ok(SolveReport {
            status: solution.status,
            objective: solution.objective,
            backend: backend.name().to_string(),
            explored_nodes: solution.explored_nodes,
            elapsed_ms,
            hard_violations,
            room_revision,
            version,
        })
    }

    /// 对已有 major 的最新 minor 单独执行教室重排
    ///
    /// # 返回
    /// - `Ok(Some(version))`: 新 minor
    /// - `Ok(None)`: 没有教室需要变化
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn reassign_rooms(&self, scope: &SchedulingScope, major: i32) -> EngineResult<Option<TimetableVersion>> {
        let not_found = || EngineError::VersionNotFound {
            scope: scope.clone(),
            major,
            minor: None,
        };
        let minor = self.timetable_repo.latest_minor(scope, major)?.ok_or_else(not_found)?;
        let version = self
            .timetable_repo
            .find_version(scope, major, minor)?
            .ok_or_else(not_found)?;

        let data = self.loader.load(scope)?;
        let placements = self.timetable_repo.find_placements(scope, major, minor)?;
        self.revise_rooms(&data, &version, &placements)
    }

    /// 构建优化模型
    ///
    /// 在用实例 (硬 + 软) 逐个贡献; 缺少建模能力的软约束跳过,
    /// 缺少建模能力或种类未注册的硬约束直接失败
    pub fn build_model(&self, data: &ScopeData) -> EngineResult<Model> {
        let filter = InstanceFilter::default();

        let orphans = self
            .registry
            .unregistered_instances(&self.constraint_repo, &data.scope, filter)?;
        for orphan in orphans {
            if orphan.is_hard() {
                return Err(EngineError::ConstraintNotModelable {
                    constraint_id: orphan.constraint_id,
                    kind: orphan.kind,
                });
            }
            tracing::warn!(constraint_id = %orphan.constraint_id, kind = %orphan.kind, "软约束种类未注册, 建模跳过");
        }

        let active = self.registry.active_instances(&self.constraint_repo, &data.scope, filter)?;
        let mut builder = ModelBuilder::new(data);
        for item in &active {
            match item.kind.contribute_to_model(&item.instance, &mut builder) {
                Capability::Supported(result) => result?,
                Capability::Unsupported if item.instance.is_hard() => {
                    return Err(EngineError::ConstraintNotModelable {
                        constraint_id: item.instance.constraint_id.clone(),
                        kind: item.kind.name().to_string(),
                    });
                }
                Capability::Unsupported => {
                    tracing::debug!(constraint_id = %item.instance.constraint_id, kind = item.kind.name(), "软约束无建模能力, 跳过");
                }
            }
        }

        Ok(builder.build())
    }

    fn revise_rooms(
        &self,
        data: &ScopeData,
        version: &TimetableVersion,
        placements: &[ScheduledCourse],
    ) -> EngineResult<Option<TimetableVersion>> {
        let scope = version.scope();
        let Some(revision) = RoomReassigner::new(data).reassign(placements) else {
            tracing::info!(version = %version.label(), "教室无需调整");
            return Ok(None);
        };

        let meta = VersionMeta {
            solve_status: version.solve_status,
            objective: version.objective,
            backend: version.backend.clone(),
        };
        let revised = self
            .timetable_repo
            .create_next_minor(&scope, version.major, &meta, revision.placements)?;

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                &scope,
                VersionActionType::ReassignRooms,
                Some(json!({
                    "major": revised.major,
                    "from_minor": version.minor,
                    "to_minor": revised.minor,
                    "changed": revision.changed,
                })),
                format!("教室重排生成 {}", revised.label()),
            ),
        );

        tracing::info!(
            version = %revised.label(),
            changed = revision.changed,
            passes = revision.passes,
            "教室重排完成"
        );
        Ok(Some(revised))
    }
}

/// 将赋值转换为落位行 (period/major/minor 由仓储写入时覆盖)
fn materialize(data: &ScopeData, model: &Model, assignment: &[VarId]) -> EngineResult<Vec<ScheduledCourse>> {
    assignment
        .iter()
        .map(|&v| {
            let var = model
                .vars
                .get(v)
                .ok_or_else(|| EngineError::Internal(format!("变量下标越界: {}", v)))?;
            let course = &data.courses[var.course_idx];
            let day = data
                .grid
                .days
                .get(var.day)
                .ok_or_else(|| EngineError::Internal(format!("教学日下标越界: {}", var.day)))?;
            Ok(ScheduledCourse {
                scheduled_id: uuid::Uuid::new_v4().to_string(),
                course_id: course.course_id.clone(),
                department: data.scope.department.clone(),
                period: data.scope.period.clone(),
                major: 0,
                minor: 0,
                day: day.clone(),
                start_min: var.start_min,
                duration_min: course.duration_min,
                room: var.room.clone(),
                tutor: var.tutor.clone(),
            })
        })
        .collect()
}

/// 求解器证明不可行时的诊断提示
fn infeasibility_hints(data: &ScopeData, model: &Model) -> Vec<String> {
    let mut hints: Vec<String> = model
        .options
        .iter()
        .enumerate()
        .filter(|(_, opts)| opts.is_empty())
        .map(|(i, _)| {
            format!(
                "课程 {} 在时间网格中没有候选落位 (时长 {} 分钟)",
                model.course_ids[i], data.courses[i].duration_min
            )
        })
        .collect();
    if hints.is_empty() {
        hints.push(format!(
            "{} 门课程在 {} 条硬约束下不存在可行落位",
            model.course_count(),
            model.hard.len()
        ));
    }
    hints
}
