// ==========================================
// 排课引擎 - 操作日志数据仓储
// ==========================================
// 红线: 所有版本写操作必须记录
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use core::ActionLogRepository;
