// ==========================================
// 排课引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod constraint_repo;
pub mod course_repo;
pub mod error;
pub mod timetable_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use constraint_repo::ConstraintRepository;
pub use course_repo::{AvailabilityRepository, CourseRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use timetable_repo::{MajorDeletion, SwapOutcome, TimetableRepository, VersionMeta};
