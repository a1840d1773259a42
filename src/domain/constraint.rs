// ==========================================
// 排课引擎 - 约束实例领域模型
// ==========================================
// weight 为空 = 硬约束; 有值 = 软约束代价权重
// periods 为空 = 适用于所有周期
// ==========================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ==========================================
// ConstraintInstance - 约束实例
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintInstance {
    pub constraint_id: String,    // 约束ID
    pub kind: String,             // 约束种类 (注册表键)
    pub department: String,       // 所属部门
    pub periods: Vec<String>,     // 适用周期 (空 = 全部)
    pub weight: Option<f64>,      // 软约束权重 (None = 硬约束)
    pub is_active: bool,          // 启用标志
    pub params: serde_json::Value, // 种类相关参数
    pub comment: Option<String>,  // 备注
}

impl ConstraintInstance {
    /// 是否为硬约束
    pub fn is_hard(&self) -> bool {
        self.weight.is_none()
    }

    /// 是否适用于指定周期 (空集合表示全部周期)
    pub fn applies_to_period(&self, period: &str) -> bool {
        self.periods.is_empty() || self.periods.iter().any(|p| p == period)
    }

    /// 是否在该周期内生效
    pub fn in_force_for(&self, period: &str) -> bool {
        self.is_active && self.applies_to_period(period)
    }

    /// 解析种类参数
    ///
    /// 失败时返回人类可读原因, 由调用方包装为 MalformedConstraint
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_value(self.params.clone()).map_err(|e| e.to_string())
    }
}

// ==========================================
// InstanceFilter - 注册表查询过滤
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFilter {
    pub hard_only: bool,   // 只取硬约束
    pub active_only: bool, // 只取启用约束
}

impl Default for InstanceFilter {
    fn default() -> Self {
        Self {
            hard_only: false,
            active_only: true,
        }
    }
}

impl InstanceFilter {
    pub fn hard_active() -> Self {
        Self {
            hard_only: true,
            active_only: true,
        }
    }

    pub fn accepts(&self, instance: &ConstraintInstance, period: &str) -> bool {
        instance.applies_to_period(period)
            && (!self.hard_only || instance.is_hard())
            && (!self.active_only || instance.is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance(periods: &[&str], weight: Option<f64>, is_active: bool) -> ConstraintInstance {
        ConstraintInstance {
            constraint_id: "k1".to_string(),
            kind: "tutor_availability".to_string(),
            department: "INFO".to_string(),
            periods: periods.iter().map(|p| p.to_string()).collect(),
            weight,
            is_active,
            params: json!({"tutor": "ALB"}),
            comment: None,
        }
    }

    #[test]
    fn test_empty_periods_is_universal() {
        let c = instance(&[], None, true);
        assert!(c.in_force_for("2026-W10"));
        assert!(c.in_force_for("anything"));
    }

    #[test]
    fn test_period_membership() {
        let c = instance(&["2026-W10", "2026-W11"], None, true);
        assert!(c.in_force_for("2026-W11"));
        assert!(!c.in_force_for("2026-W12"));
        assert!(!instance(&["2026-W10"], None, false).in_force_for("2026-W10"));
    }

    #[test]
    fn test_filter() {
        let soft = instance(&[], Some(2.0), true);
        let inactive = instance(&[], None, false);
        assert!(!InstanceFilter::hard_active().accepts(&soft, "w"));
        assert!(InstanceFilter::default().accepts(&soft, "w"));
        assert!(!InstanceFilter::default().accepts(&inactive, "w"));
        let all = InstanceFilter {
            hard_only: false,
            active_only: false,
        };
        assert!(all.accepts(&inactive, "w"));
    }
}
