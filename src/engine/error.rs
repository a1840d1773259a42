// ==========================================
// 排课引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 约束缺少某项能力不是错误 (Capability::Unsupported),
//       只有硬约束缺少建模能力时才报 ConstraintNotModelable
// ==========================================

use crate::domain::scope::SchedulingScope;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 范围/版本 =====
    #[error("排课范围不存在: {scope}")]
    ScopeNotFound { scope: SchedulingScope },

    #[error("版本不存在: {scope} major={major} minor={minor:?}")]
    VersionNotFound {
        scope: SchedulingScope,
        major: i32,
        minor: Option<i32>,
    },

    // ===== 求解失败 =====
    #[error("无可行解: {scope} ({} 条诊断)", .diagnostics.len())]
    Infeasible {
        scope: SchedulingScope,
        diagnostics: Vec<String>,
    },

    #[error("求解超时且无可行解: {scope}, time_limit={time_limit_ms}ms")]
    TimedOutNoSolution {
        scope: SchedulingScope,
        time_limit_ms: u64,
    },

    #[error("排课范围正在求解中: {scope}")]
    ConcurrentSolveConflict { scope: SchedulingScope },

    // ===== 约束配置 =====
    #[error("硬约束无法建模: constraint_id={constraint_id}, kind={kind}")]
    ConstraintNotModelable { constraint_id: String, kind: String },

    #[error("约束实例畸形: constraint_id={constraint_id}, reason={reason}")]
    MalformedConstraint { constraint_id: String, reason: String },

    // ===== 版本管理 =====
    #[error("不能删除发布版本: {scope} major={major}，请先发布其他版本")]
    PublishedVersionDeletionDenied { scope: SchedulingScope, major: i32 },

    #[error("交换失败: {scope} 的 major {a} 与 {b} 均不是发布版本")]
    SwapWithoutPublished { scope: SchedulingScope, a: i32, b: i32 },

    #[error("排课范围没有发布版本: {scope}")]
    NothingPublished { scope: SchedulingScope },

    #[error("目标周期课程不匹配: period={period}, reason={reason}")]
    IncompatiblePeriod { period: String, reason: String },

    // ===== 基础设施 =====
    #[error("未知求解后端: {0}")]
    UnknownBackend(String),

    #[error("配置读取失败: {0}")]
    Config(String),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    pub(crate) fn config(e: impl std::fmt::Display) -> Self {
        EngineError::Config(e.to_string())
    }

    pub(crate) fn malformed(constraint_id: &str, reason: impl Into<String>) -> Self {
        EngineError::MalformedConstraint {
            constraint_id: constraint_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
