// ==========================================
// 排课引擎 - 排课配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::scope::TimeGrid;
use std::error::Error;
use std::time::Duration;

// ==========================================
// SchedulingConfigReader Trait
// ==========================================
// 用途: 求解编排所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取, 部门作用域覆盖 global）
pub trait SchedulingConfigReader: Send + Sync {
    // ===== 时间网格 =====

    /// 获取部门的时间网格
    ///
    /// # 默认值
    /// - days: mon,tue,wed,thu,fri
    /// - slot_starts: 480,570,660,840,930,1020
    /// - day_end_min: 1110
    fn time_grid(&self, department: &str) -> Result<TimeGrid, Box<dyn Error>>;

    // ===== 求解器 =====

    /// 默认求解时限
    ///
    /// # 默认值
    /// - 30 秒
    fn default_time_limit(&self, department: &str) -> Result<Duration, Box<dyn Error>>;

    /// 默认求解后端名称
    ///
    /// # 默认值
    /// - milp
    fn default_backend(&self, department: &str) -> Result<String, Box<dyn Error>>;

    /// 同一范围并发求解时是否排队（false = 直接报 ConcurrentSolveConflict）
    fn queue_concurrent_solves(&self) -> Result<bool, Box<dyn Error>>;

    /// 求解成功后是否默认执行教室重分配
    fn reassign_rooms(&self, department: &str) -> Result<bool, Box<dyn Error>>;

    /// 局部搜索随机种子
    fn random_seed(&self) -> Result<u64, Box<dyn Error>>;

    /// 局部搜索最大重启次数
    fn local_search_max_restarts(&self) -> Result<u32, Box<dyn Error>>;
}
