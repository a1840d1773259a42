// ==========================================
// 排课引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑, 不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod constraint;
pub mod course;
pub mod report;
pub mod scope;
pub mod timetable;
pub mod types;

// 重导出核心类型
pub use action_log::ActionLog;
pub use constraint::{ConstraintInstance, InstanceFilter};
pub use course::{Course, TutorAvailability};
pub use report::{FeasibilityReport, Violation, ViolationReport};
pub use scope::{SchedulingScope, TimeGrid};
pub use timetable::{ScheduledCourse, TimetableVersion};
pub use types::{FeasibilityStatus, SolveStatus, VersionActionType};
