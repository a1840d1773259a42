// ==========================================
// 排课引擎 - 课表 API
// ==========================================
// 职责: 向宿主应用暴露预分析、求解、校验与版本管理
// 前提: 调用方已完成鉴权, 本层不做权限判断
// 线程: 所有方法为同步阻塞; solve_async 将求解放到 tokio 阻塞线程池
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ConfigScope, SchedulingConfigReader};
use crate::constraints::{ConstraintRegistry, KindInfo};
use crate::db::{self, SharedConnection};
use crate::domain::action_log::ActionLog;
use crate::domain::constraint::{ConstraintInstance, InstanceFilter};
use crate::domain::course::{Course, TutorAvailability};
use crate::domain::report::{FeasibilityReport, ViolationReport};
use crate::domain::scope::SchedulingScope;
use crate::domain::timetable::{ScheduledCourse, TimetableVersion};
use crate::engine::context::ScopeLoader;
use crate::engine::pre_analyzer::PreAnalyzer;
use crate::engine::timetable_solver::{SolveOptions, SolveReport, TimetableSolver};
use crate::engine::validator::Validator;
use crate::engine::version_manager::VersionManager;
use crate::repository::{
    ActionLogRepository, AvailabilityRepository, ConstraintRepository, CourseRepository, TimetableRepository,
};
use std::sync::Arc;

// ==========================================
// TimetableApi - 课表 API
// ==========================================
pub struct TimetableApi {
    config_manager: Arc<ConfigManager>,
    registry: Arc<ConstraintRegistry>,
    course_repo: Arc<CourseRepository>,
    availability_repo: Arc<AvailabilityRepository>,
    constraint_repo: Arc<ConstraintRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    pre_analyzer: Arc<PreAnalyzer>,
    validator: Arc<Validator>,
    solver: Arc<TimetableSolver>,
    versions: Arc<VersionManager>,
}

impl TimetableApi {
    /// 打开数据库文件并装配全部组件
    pub fn open(db_path: &str) -> ApiResult<Self> {
        tracing::info!("初始化 TimetableApi，数据库路径: {}", db_path);
        let conn = db::open_shared(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("无法打开数据库: {}", e)))?;
        Self::from_connection(conn)
    }

    /// 基于已有共享连接装配 (使用内置约束种类)
    pub fn from_connection(conn: SharedConnection) -> ApiResult<Self> {
        Self::with_registry(conn, ConstraintRegistry::with_builtin_kinds())
    }

    /// 基于已有共享连接与自定义注册表装配
    pub fn with_registry(conn: SharedConnection, registry: ConstraintRegistry) -> ApiResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", e)))?;
            db::ensure_schema(&guard).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }

        // ==========================================
        // Repository 层
        // ==========================================
        let course_repo = Arc::new(CourseRepository::new(conn.clone()));
        let availability_repo = Arc::new(AvailabilityRepository::new(conn.clone()));
        let constraint_repo = Arc::new(ConstraintRepository::new(conn.clone()));
        let timetable_repo = Arc::new(TimetableRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn).map_err(|e| ApiError::ConfigError(e.to_string()))?,
        );
        let config_reader: Arc<dyn SchedulingConfigReader> = config_manager.clone();

        // ==========================================
        // Engine 层
        // ==========================================
        let registry = Arc::new(registry);
        let loader = Arc::new(ScopeLoader::new(
            course_repo.clone(),
            availability_repo.clone(),
            config_reader,
        ));
        let pre_analyzer = Arc::new(PreAnalyzer::new(
            registry.clone(),
            constraint_repo.clone(),
            loader.clone(),
        ));
        let validator = Arc::new(Validator::new(
            registry.clone(),
            constraint_repo.clone(),
            timetable_repo.clone(),
            loader.clone(),
        ));
        let solver = Arc::new(TimetableSolver::new(
            registry.clone(),
            constraint_repo.clone(),
            timetable_repo.clone(),
            action_log_repo.clone(),
            loader,
            pre_analyzer.clone(),
            validator.clone(),
        ));
        let versions = Arc::new(VersionManager::new(
            timetable_repo,
            course_repo.clone(),
            action_log_repo.clone(),
        ));

        tracing::info!(kinds = ?registry.all_kinds(), "TimetableApi 初始化完成");

        Ok(Self {
            config_manager,
            registry,
            course_repo,
            availability_repo,
            constraint_repo,
            action_log_repo,
            pre_analyzer,
            validator,
            solver,
            versions,
        })
    }

    // ==========================================
    // 预分析 / 求解 / 校验
    // ==========================================

    /// 可行性预分析, 返回全部 KO 报告
    pub fn pre_analyze(&self, department: &str, period: &str) -> ApiResult<Vec<FeasibilityReport>> {
        let scope = scope_of(department, period)?;
        Ok(self.pre_analyzer.pre_analyze(&scope)?)
    }

    /// 求解并物化为新 major (阻塞直到求解完成或到达时限)
    pub fn solve(&self, department: &str, period: &str, options: SolveOptions) -> ApiResult<SolveReport> {
        let scope = scope_of(department, period)?;
        if let Some(limit) = options.time_limit {
            if limit.is_zero() {
                return Err(ApiError::InvalidInput("求解时限必须大于0".to_string()));
            }
        }
        Ok(self.solver.solve(&scope, options)?)
    }

    /// 在 tokio 阻塞线程池中求解
    pub async fn solve_async(
        self: Arc<Self>,
        department: String,
        period: String,
        options: SolveOptions,
    ) -> ApiResult<SolveReport> {
        tokio::task::spawn_blocking(move || self.solve(&department, &period, options))
            .await
            .map_err(|e| ApiError::InternalError(format!("任务执行失败: {}", e)))?
    }

    /// 校验版本; minor 为 None 时取最新 minor
    pub fn validate(
        &self,
        department: &str,
        period: &str,
        major: i32,
        minor: Option<i32>,
        filter: InstanceFilter,
    ) -> ApiResult<ViolationReport> {
        let scope = scope_of(department, period)?;
        Ok(self.validator.validate(&scope, major, minor, filter)?)
    }

    /// 对 major 的最新 minor 重排教室
    pub fn reassign_rooms(&self, department: &str, period: &str, major: i32) -> ApiResult<Option<TimetableVersion>> {
        let scope = scope_of(department, period)?;
        Ok(self.solver.reassign_rooms(&scope, major)?)
    }

    // ==========================================
    // 版本管理
    // ==========================================

    pub fn list_versions(&self, department: &str, period: &str) -> ApiResult<Vec<TimetableVersion>> {
        Ok(self.versions.list_versions(&scope_of(department, period)?)?)
    }

    pub fn published_major(&self, department: &str, period: &str) -> ApiResult<i32> {
        Ok(self.versions.published_major(&scope_of(department, period)?)?)
    }

    pub fn placements(&self, department: &str, period: &str, major: i32) -> ApiResult<Vec<ScheduledCourse>> {
        Ok(self.versions.placements(&scope_of(department, period)?, major)?)
    }

    pub fn duplicate(&self, department: &str, period: &str, major: i32) -> ApiResult<TimetableVersion> {
        Ok(self.versions.duplicate(&scope_of(department, period)?, major)?)
    }

    pub fn promote(&self, department: &str, period: &str, major: i32) -> ApiResult<Option<i32>> {
        Ok(self.versions.promote(&scope_of(department, period)?, major)?)
    }

    pub fn swap(&self, department: &str, period: &str, a: i32, b: i32) -> ApiResult<i32> {
        if a == b {
            return Err(ApiError::InvalidInput(format!("交换的两个 major 相同: {}", a)));
        }
        Ok(self.versions.swap(&scope_of(department, period)?, a, b)?)
    }

    pub fn delete(&self, department: &str, period: &str, major: i32) -> ApiResult<()> {
        Ok(self.versions.delete(&scope_of(department, period)?, major)?)
    }

    pub fn delete_all_unused(&self, department: &str, period: &str) -> ApiResult<Vec<i32>> {
        Ok(self.versions.delete_all_unused(&scope_of(department, period)?)?)
    }

    pub fn duplicate_into_other_periods(
        &self,
        department: &str,
        period: &str,
        major: i32,
        target_periods: &[String],
    ) -> ApiResult<Vec<TimetableVersion>> {
        if target_periods.is_empty() {
            return Err(ApiError::InvalidInput("目标周期列表不能为空".to_string()));
        }
        let scope = scope_of(department, period)?;
        Ok(self
            .versions
            .duplicate_into_other_periods(&scope, major, target_periods)?)
    }

    // ==========================================
    // 数据维护 (供外部协作方写入课程/约束/配置)
    // ==========================================

    pub fn upsert_courses(&self, courses: &[Course]) -> ApiResult<usize> {
        if let Some(bad) = courses.iter().find(|c| c.duration_min <= 0) {
            return Err(ApiError::InvalidInput(format!(
                "课程{}时长必须大于0: {}",
                bad.course_id, bad.duration_min
            )));
        }
        Ok(self.course_repo.batch_upsert(courses)?)
    }

    pub fn delete_course(&self, course_id: &str) -> ApiResult<()> {
        Ok(self.course_repo.delete(course_id)?)
    }

    pub fn set_tutor_availability(
        &self,
        department: &str,
        period: &str,
        tutor: &str,
        slots: &[TutorAvailability],
    ) -> ApiResult<usize> {
        let scope = scope_of(department, period)?;
        Ok(self.availability_repo.replace_for_tutor(&scope, tutor, slots)?)
    }

    pub fn upsert_constraint(&self, instance: &ConstraintInstance) -> ApiResult<String> {
        if self.registry.kind(&instance.kind).is_none() {
            tracing::warn!(kind = %instance.kind, constraint_id = %instance.constraint_id, "写入未注册种类的约束");
        }
        Ok(self.constraint_repo.upsert(instance)?)
    }

    pub fn set_constraint_active(&self, constraint_id: &str, is_active: bool) -> ApiResult<()> {
        Ok(self.constraint_repo.set_active(constraint_id, is_active)?)
    }

    pub fn delete_constraint(&self, constraint_id: &str) -> ApiResult<()> {
        Ok(self.constraint_repo.delete(constraint_id)?)
    }

    /// 已注册的约束种类目录 (名称、父种类、说明)
    pub fn constraint_kinds(&self) -> Vec<KindInfo> {
        self.registry.catalogue()
    }

    pub fn set_config(&self, scope: &ConfigScope, key: &str, value: &str) -> ApiResult<()> {
        self.config_manager
            .set_config_value(scope, key, value)
            .map_err(|e| ApiError::ConfigError(e.to_string()))
    }

    /// 范围内的操作日志
    pub fn action_history(&self, department: &str, period: &str) -> ApiResult<Vec<ActionLog>> {
        Ok(self.action_log_repo.find_by_scope(&scope_of(department, period)?)?)
    }
}

fn scope_of(department: &str, period: &str) -> ApiResult<SchedulingScope> {
    if department.trim().is_empty() {
        return Err(ApiError::InvalidInput("部门不能为空".to_string()));
    }
    if period.trim().is_empty() {
        return Err(ApiError::InvalidInput("周期不能为空".to_string()));
    }
    Ok(SchedulingScope::new(department.trim(), period.trim()))
}
