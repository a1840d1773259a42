// ==========================================
// 排课引擎 - 求解后端抽象
// ==========================================
// 职责: 给定模型与截止时刻, 返回赋值与求解状态
// 红线: 后端特有行为不得泄漏到编排层
// 取消: 只通过截止时刻停止, 返回已知最好解
// ==========================================

pub mod local_search;
pub mod milp;
pub(crate) mod search;

use crate::domain::types::SolveStatus;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::model::{Model, VarId};
use std::time::Instant;

pub use local_search::LocalSearchBackend;
pub use milp::MilpBackend;

/// 后端求解结果
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSolution {
    pub status: SolveStatus,
    /// 每门课选中的变量 (按 Model.options 下标); 无解时为 None
    pub assignment: Option<Vec<VarId>>,
    pub objective: Option<f64>,
    pub explored_nodes: u64,
}

impl BackendSolution {
    pub fn no_solution(status: SolveStatus, explored_nodes: u64) -> Self {
        Self {
            status,
            assignment: None,
            objective: None,
            explored_nodes,
        }
    }
}

/// 求解后端
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// 在 deadline 前求解; 到期时返回已知最好解
    fn solve(&self, model: &Model, deadline: Instant) -> BackendSolution;
}

pub const MILP: &str = "milp";
pub const LOCAL_SEARCH: &str = "local_search";

/// 按名称构造后端
pub fn backend_by_name(name: &str, seed: u64, max_restarts: u32) -> EngineResult<Box<dyn SolverBackend>> {
    match name.trim().to_lowercase().as_str() {
        MILP | "ilp" => Ok(Box::new(MilpBackend::new())),
        LOCAL_SEARCH | "ls" => Ok(Box::new(LocalSearchBackend::new(seed, max_restarts))),
        other => Err(EngineError::UnknownBackend(other.to_string())),
    }
}

/// 全部内置后端名称
pub fn backend_names() -> &'static [&'static str] {
    &[MILP, LOCAL_SEARCH]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_by_name() {
        assert_eq!(backend_by_name("milp", 1, 1).unwrap().name(), MILP);
        assert_eq!(backend_by_name("ILP", 1, 1).unwrap().name(), MILP);
        assert_eq!(backend_by_name(" Local_Search ", 1, 1).unwrap().name(), LOCAL_SEARCH);
        assert!(matches!(
            backend_by_name("branch_and_bound", 1, 1),
            Err(EngineError::UnknownBackend(_))
        ));
        assert!(matches!(
            backend_by_name("cplex", 1, 1),
            Err(EngineError::UnknownBackend(_))
        ));
    }
}
