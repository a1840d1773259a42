// ==========================================
// 排课引擎 - 领域类型定义
// ==========================================
// 职责: 求解状态、可行性状态、版本操作类型等枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 求解状态 (Solve Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    Optimal,            // 时限内证明最优
    Feasible,           // 到达时限, 有可行解但未证明最优
    Infeasible,         // 证明不存在满足硬约束的解
    TimedOutNoSolution, // 到达时限, 未找到可行解
}

impl SolveStatus {
    /// 是否产出了可物化的解
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }

    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "OPTIMAL" => SolveStatus::Optimal,
            "FEASIBLE" => SolveStatus::Feasible,
            "INFEASIBLE" => SolveStatus::Infeasible,
            _ => SolveStatus::TimedOutNoSolution,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::TimedOutNoSolution => "TIMED_OUT_NO_SOLUTION",
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 可行性状态 (Feasibility Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeasibilityStatus {
    Ok,
    Ko,
}

impl fmt::Display for FeasibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeasibilityStatus::Ok => write!(f, "OK"),
            FeasibilityStatus::Ko => write!(f, "KO"),
        }
    }
}

// ==========================================
// 版本操作类型 (写入 action_log)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionActionType {
    Solve,
    ReassignRooms,
    Duplicate,
    DuplicateIntoPeriod,
    Promote,
    Swap,
    Delete,
    DeleteUnused,
}

impl VersionActionType {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            VersionActionType::Solve => "SOLVE",
            VersionActionType::ReassignRooms => "REASSIGN_ROOMS",
            VersionActionType::Duplicate => "DUPLICATE",
            VersionActionType::DuplicateIntoPeriod => "DUPLICATE_INTO_PERIOD",
            VersionActionType::Promote => "PROMOTE",
            VersionActionType::Swap => "SWAP",
            VersionActionType::Delete => "DELETE",
            VersionActionType::DeleteUnused => "DELETE_UNUSED",
        }
    }
}

impl fmt::Display for VersionActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}
