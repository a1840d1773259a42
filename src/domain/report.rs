// ==========================================
// 排课引擎 - 预分析报告与违规报告
// ==========================================
// 两者都是瞬时值, 不落库
// ==========================================

use crate::domain::constraint::ConstraintInstance;
use crate::domain::scope::SchedulingScope;
use crate::domain::types::FeasibilityStatus;
use serde::{Deserialize, Serialize};

// ==========================================
// FeasibilityReport - 可行性预分析报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub status: FeasibilityStatus,
    pub messages: Vec<String>,
    pub scope: SchedulingScope,
    pub constraint_id: Option<String>, // 产生报告的约束实例
}

impl FeasibilityReport {
    pub fn ok(scope: &SchedulingScope) -> Self {
        Self {
            status: FeasibilityStatus::Ok,
            messages: Vec::new(),
            scope: scope.clone(),
            constraint_id: None,
        }
    }

    pub fn ko(scope: &SchedulingScope, messages: Vec<String>) -> Self {
        Self {
            status: FeasibilityStatus::Ko,
            messages,
            scope: scope.clone(),
            constraint_id: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FeasibilityStatus::Ok
    }

    /// 标记来源约束
    pub fn from_constraint(mut self, constraint_id: &str) -> Self {
        self.constraint_id = Some(constraint_id.to_string());
        self
    }
}

// ==========================================
// Violation - 单条约束违规
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub constraint_id: String,
    pub kind: String,
    pub department: String,
    pub periods: Vec<String>,
    pub is_hard: bool,
    pub message: String,
}

impl Violation {
    pub fn of(instance: &ConstraintInstance, message: impl Into<String>) -> Self {
        Self {
            constraint_id: instance.constraint_id.clone(),
            kind: instance.kind.clone(),
            department: instance.department.clone(),
            periods: instance.periods.clone(),
            is_hard: instance.is_hard(),
            message: message.into(),
        }
    }
}

// ==========================================
// ViolationReport - 校验结果汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub scope: SchedulingScope,
    pub major: i32,
    pub minor: i32,
    pub checked_instances: usize, // 实际给出意见的实例数
    pub skipped_instances: usize, // 缺少校验能力而跳过的实例数
    pub violations: Vec<Violation>,
}

impl ViolationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn hard_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_hard)
    }
}
