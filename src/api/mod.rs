// ==========================================
// 排课引擎 - API 层
// ==========================================
// 职责: 供宿主应用调用的业务接口
// ==========================================

pub mod error;
pub mod timetable_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use timetable_api::TimetableApi;
