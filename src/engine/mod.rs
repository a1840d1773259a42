// ==========================================
// 排课引擎 - 引擎层
// ==========================================
// 职责: 预分析、建模、求解、校验、教室重排与版本管理
// 红线: Engine 不拼 SQL, 数据访问一律经由 repository
// ==========================================

pub mod context;
pub mod error;
pub mod model;
pub mod pre_analyzer;
pub mod room_reassign;
pub mod scope_lock;
pub mod solver;
pub mod timetable_solver;
pub mod validator;
pub mod version_manager;

// 重导出核心引擎
pub use context::{ScopeData, ScopeLoader};
pub use error::{EngineError, EngineResult};
pub use model::{Model, ModelBuilder};
pub use pre_analyzer::PreAnalyzer;
pub use room_reassign::{RoomReassigner, RoomRevision};
pub use scope_lock::ScopeLocks;
pub use solver::{backend_by_name, backend_names, BackendSolution, SolverBackend};
pub use timetable_solver::{SolveOptions, SolveReport, TimetableSolver};
pub use validator::Validator;
pub use version_manager::VersionManager;

use crate::domain::action_log::ActionLog;
use crate::repository::action_log_repo::ActionLogRepository;

/// 记录操作日志; 写入失败只告警, 不影响已提交的版本操作
pub(crate) fn record_action(repo: &ActionLogRepository, log: ActionLog) {
    if let Err(e) = repo.insert(&log) {
        tracing::warn!(action_type = %log.action_type, "记录操作日志失败: {}", e);
    }
}
