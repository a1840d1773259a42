// ==========================================
// 排课引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 约束驱动的课表生成与版本管理
// 流程: 预分析 → 求解 → 校验 → 版本管理
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 约束层 - 种类注册与内置种类
pub mod constraints;

// 引擎层 - 预分析/求解/校验/版本管理
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{FeasibilityStatus, SolveStatus, VersionActionType};

// 领域实体
pub use domain::{
    ActionLog, ConstraintInstance, Course, FeasibilityReport, InstanceFilter, ScheduledCourse,
    SchedulingScope, TimeGrid, TimetableVersion, TutorAvailability, Violation, ViolationReport,
};

// 约束
pub use constraints::{Capability, ConstraintKind, ConstraintRegistry};

// 引擎
pub use engine::{
    EngineError, PreAnalyzer, SolveOptions, SolveReport, TimetableSolver, Validator, VersionManager,
};

// API
pub use api::{ApiError, ApiResult, TimetableApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "排课引擎";
