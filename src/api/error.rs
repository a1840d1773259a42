// ==========================================
// 排课引擎 - API层错误类型
// ==========================================
// 职责: 将 Repository/Engine 错误转换为宿主应用可直接展示的错误
// 约束: 每条错误信息必须包含显式原因
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 求解失败
    // ==========================================
    #[error("无可行解: {scope}")]
    Infeasible { scope: String, diagnostics: Vec<String> },

    #[error("求解超时且无可行解: {scope} (time_limit={time_limit_ms}ms)，可加大时限后重试")]
    TimedOutNoSolution { scope: String, time_limit_ms: u64 },

    #[error("求解冲突: {0}")]
    ConcurrentSolveConflict(String),

    // ==========================================
    // 约束配置错误
    // ==========================================
    #[error("约束配置错误: {0}")]
    ConstraintConfigError(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("不能删除发布版本: {0}")]
    PublishedVersionDeletionDenied(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => ApiError::DatabaseTransactionError(msg),
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Repository(e) => e.into(),
            EngineError::Infeasible { scope, diagnostics } => ApiError::Infeasible {
                scope: scope.to_string(),
                diagnostics,
            },
            EngineError::TimedOutNoSolution { scope, time_limit_ms } => ApiError::TimedOutNoSolution {
                scope: scope.to_string(),
                time_limit_ms,
            },
            e @ EngineError::ConcurrentSolveConflict { .. } => ApiError::ConcurrentSolveConflict(e.to_string()),
            e @ (EngineError::ConstraintNotModelable { .. } | EngineError::MalformedConstraint { .. }) => {
                ApiError::ConstraintConfigError(e.to_string())
            }
            e @ (EngineError::ScopeNotFound { .. }
            | EngineError::VersionNotFound { .. }
            | EngineError::NothingPublished { .. }) => ApiError::NotFound(e.to_string()),
            EngineError::PublishedVersionDeletionDenied { scope, major } => {
                ApiError::PublishedVersionDeletionDenied(format!("{} v{}", scope, major))
            }
            e @ EngineError::SwapWithoutPublished { .. } => ApiError::BusinessRuleViolation(e.to_string()),
            e @ (EngineError::IncompatiblePeriod { .. } | EngineError::UnknownBackend(_)) => {
                ApiError::InvalidInput(e.to_string())
            }
            EngineError::Config(msg) => ApiError::ConfigError(msg),
            EngineError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
