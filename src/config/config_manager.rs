// ==========================================
// 排课引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 作用域: scope_id = 部门代码 优先, 其次 'global'
// ==========================================

use crate::config::scheduling_config_trait::SchedulingConfigReader;
use crate::domain::scope::TimeGrid;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取指定作用域的配置值
    fn get_scoped_value(&self, scope_id: &str, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope_id, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取配置值：部门作用域优先，缺省回落到 global
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 两个作用域均未配置
    pub fn get_config_value(&self, department: &str, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        if !department.is_empty() {
            if let Some(value) = self.get_scoped_value(department, key)? {
                return Ok(Some(value));
            }
        }
        self.get_scoped_value(GLOBAL_SCOPE, key)
    }

    /// 写入配置值 (UPSERT)
    pub fn set_config_value(&self, scope: &ConfigScope, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, department: &str, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(department, key)?
            .unwrap_or_else(|| default.to_string()))
    }

}

/// 逗号分隔列表解析
fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// 解析 slot_starts, 返回 (合法开始时刻, 被拒绝的原始项)
fn parse_slot_starts(raw: &str) -> (Vec<i32>, Vec<String>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for item in split_list(raw) {
        match item.parse::<i32>() {
            Ok(start) if (0..24 * 60).contains(&start) => accepted.push(start),
            _ => rejected.push(item.to_string()),
        }
    }
    accepted.sort_unstable();
    accepted.dedup();
    (accepted, rejected)
}

/// 解析 day_end_min, 须落在 (0, 1440]
fn parse_day_end(raw: &str) -> Option<i32> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|end| *end > 0 && *end <= 24 * 60)
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

// ==========================================
// SchedulingConfigReader Trait 实现
// ==========================================
impl SchedulingConfigReader for ConfigManager {
    // ===== 时间网格 =====

    fn time_grid(&self, department: &str) -> Result<TimeGrid, Box<dyn Error>> {
        let defaults = TimeGrid::default();

        let days: Vec<String> = match self.get_config_value(department, config_keys::GRID_DAYS)? {
            Some(raw) => split_list(&raw).map(|d| d.to_lowercase()).collect(),
            None => Vec::new(),
        };

        let slot_starts: Vec<i32> = match self.get_config_value(department, config_keys::GRID_SLOT_STARTS)? {
            Some(raw) => {
                let (accepted, rejected) = parse_slot_starts(&raw);
                if !rejected.is_empty() {
                    tracing::warn!(
                        department = %department,
                        key = config_keys::GRID_SLOT_STARTS,
                        raw = %raw,
                        rejected = ?rejected,
                        "忽略非法的开始时刻"
                    );
                }
                accepted
            }
            None => Vec::new(),
        };

        let day_end_min = match self.get_config_value(department, config_keys::GRID_DAY_END_MIN)? {
            Some(raw) => parse_day_end(&raw).unwrap_or_else(|| {
                tracing::warn!(
                    department = %department,
                    key = config_keys::GRID_DAY_END_MIN,
                    raw = %raw,
                    fallback = defaults.day_end_min,
                    "day_end_min 非法，使用默认值"
                );
                defaults.day_end_min
            }),
            None => defaults.day_end_min,
        };

        if days.is_empty() || slot_starts.is_empty() {
            tracing::warn!(
                department = %department,
                "时间网格配置为空或无合法项，使用默认网格"
            );
        }

        Ok(TimeGrid {
            days: if days.is_empty() { defaults.days } else { days },
            slot_starts: if slot_starts.is_empty() { defaults.slot_starts } else { slot_starts },
            day_end_min,
        })
    }

    // ===== 求解器 =====

    fn default_time_limit(&self, department: &str) -> Result<Duration, Box<dyn Error>> {
        let value = self.get_config_or_default(department, config_keys::SOLVER_TIME_LIMIT_SECS, "30")?;
        let secs = value.parse::<u64>().unwrap_or(30).max(1);
        Ok(Duration::from_secs(secs))
    }

    fn default_backend(&self, department: &str) -> Result<String, Box<dyn Error>> {
        let value = self.get_config_or_default(department, config_keys::SOLVER_BACKEND, "milp")?;
        Ok(value.trim().to_lowercase())
    }

    fn queue_concurrent_solves(&self) -> Result<bool, Box<dyn Error>> {
        let value = self.get_config_or_default("", config_keys::SOLVER_QUEUE_CONCURRENT_SOLVES, "true")?;
        Ok(parse_bool(&value, true))
    }

    fn reassign_rooms(&self, department: &str) -> Result<bool, Box<dyn Error>> {
        let value = self.get_config_or_default(department, config_keys::SOLVER_REASSIGN_ROOMS, "false")?;
        Ok(parse_bool(&value, false))
    }

    fn random_seed(&self) -> Result<u64, Box<dyn Error>> {
        let value = self.get_config_or_default("", config_keys::SOLVER_RANDOM_SEED, "42")?;
        Ok(value.parse::<u64>().unwrap_or(42))
    }

    fn local_search_max_restarts(&self) -> Result<u32, Box<dyn Error>> {
        let value = self.get_config_or_default("", config_keys::SOLVER_LOCAL_SEARCH_MAX_RESTARTS, "64")?;
        Ok(value.parse::<u32>().unwrap_or(64))
    }
}

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone)]
pub enum ConfigScope {
    Global,                             // 全局
    Department { department: String },  // 部门
}

impl ConfigScope {
    pub fn scope_id(&self) -> &str {
        match self {
            ConfigScope::Global => GLOBAL_SCOPE,
            ConfigScope::Department { department } => department,
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 时间网格
    pub const GRID_DAYS: &str = "grid.days";
    pub const GRID_SLOT_STARTS: &str = "grid.slot_starts";
    pub const GRID_DAY_END_MIN: &str = "grid.day_end_min";

    // 求解器
    pub const SOLVER_TIME_LIMIT_SECS: &str = "solver.time_limit_secs";
    pub const SOLVER_BACKEND: &str = "solver.backend";
    pub const SOLVER_QUEUE_CONCURRENT_SOLVES: &str = "solver.queue_concurrent_solves";
    pub const SOLVER_REASSIGN_ROOMS: &str = "solver.reassign_rooms";
    pub const SOLVER_RANDOM_SEED: &str = "solver.random_seed";
    pub const SOLVER_LOCAL_SEARCH_MAX_RESTARTS: &str = "solver.local_search_max_restarts";
}
