// ==========================================
// 排课引擎 - 搜索公共结构
// ==========================================
// ModelIndex: 变量 → 约束 的倒排索引 + 一元域过滤
// SearchState: 增量维护约束左值、违反量与目标值
// 剪枝只作用于系数全非负的 <= / == 约束
// ==========================================

use crate::engine::model::{Comparison, Model, VarId, EPSILON};

/// 变量到约束的倒排索引
pub(crate) struct ModelIndex<'m> {
    pub model: &'m Model,
    pub var_hard: Vec<Vec<(usize, f64)>>,
    pub var_soft: Vec<Vec<(usize, f64)>>,
    /// 硬约束系数是否全部非负 (左值随赋值单调增长)
    pub monotone: Vec<bool>,
    /// 每门课经一元过滤后的候选变量
    pub domains: Vec<Vec<VarId>>,
}

impl<'m> ModelIndex<'m> {
    pub fn new(model: &'m Model) -> Self {
        let mut var_hard = vec![Vec::new(); model.vars.len()];
        let mut var_soft = vec![Vec::new(); model.vars.len()];

        for (ci, c) in model.hard.iter().enumerate() {
            for &(v, coef) in &c.expr.terms {
                if let Some(list) = var_hard.get_mut(v) {
                    list.push((ci, coef));
                }
            }
        }
        for (si, t) in model.soft.iter().enumerate() {
            for &(v, coef) in &t.constraint.expr.terms {
                if let Some(list) = var_soft.get_mut(v) {
                    list.push((si, coef));
                }
            }
        }

        let monotone: Vec<bool> = model
            .hard
            .iter()
            .map(|c| c.expr.terms.iter().all(|&(_, coef)| coef >= 0.0))
            .collect();

        // 单个变量即超出 <= / == 右值的, 任何赋值中都不可选
        let domains = model
            .options
            .iter()
            .map(|opts| {
                opts.iter()
                    .copied()
                    .filter(|&v| {
                        var_hard[v].iter().all(|&(ci, coef)| {
                            let c = &model.hard[ci];
                            if !monotone[ci] {
                                return true;
                            }
                            match c.cmp {
                                Comparison::Le | Comparison::Eq => coef <= c.rhs + EPSILON,
                                Comparison::Ge => true,
                            }
                        })
                    })
                    .collect()
            })
            .collect();

        Self {
            model,
            var_hard,
            var_soft,
            monotone,
            domains,
        }
    }

    /// 第一门候选域为空的课程 (平凡不可行)
    pub fn empty_domain(&self) -> Option<usize> {
        self.domains.iter().position(|d| d.is_empty())
    }
}

/// 增量搜索状态
pub(crate) struct SearchState<'a, 'm> {
    index: &'a ModelIndex<'m>,
    hard_lhs: Vec<f64>,
    soft_lhs: Vec<f64>,
    chosen: Vec<Option<VarId>>,
    assigned: usize,
    var_cost_total: f64,
    soft_penalty_total: f64,
    hard_excess_total: f64,
}

impl<'a, 'm> SearchState<'a, 'm> {
    pub fn new(index: &'a ModelIndex<'m>) -> Self {
        let model = index.model;
        let hard_lhs = vec![0.0; model.hard.len()];
        let soft_lhs = vec![0.0; model.soft.len()];
        let hard_excess_total = model.hard.iter().map(|c| c.cmp.excess(0.0, c.rhs)).sum();
        let soft_penalty_total = model
            .soft
            .iter()
            .map(|t| t.weight * t.constraint.cmp.excess(0.0, t.constraint.rhs))
            .sum();

        Self {
            index,
            hard_lhs,
            soft_lhs,
            chosen: vec![None; model.course_count()],
            assigned: 0,
            var_cost_total: 0.0,
            soft_penalty_total,
            hard_excess_total,
        }
    }

    pub fn chosen(&self, course: usize) -> Option<VarId> {
        self.chosen[course]
    }

    pub fn is_complete(&self) -> bool {
        self.assigned == self.chosen.len()
    }

    /// 选择 var 后 <= / == 约束是否仍可能满足
    pub fn can_assign(&self, var: VarId) -> bool {
        let model = self.index.model;
        self.index.var_hard[var].iter().all(|&(ci, coef)| {
            let c = &model.hard[ci];
            if !self.index.monotone[ci] {
                return true;
            }
            match c.cmp {
                Comparison::Le | Comparison::Eq => self.hard_lhs[ci] + coef <= c.rhs + EPSILON,
                Comparison::Ge => true,
            }
        })
    }

    /// 选择 var 带来的目标增量
    pub fn cost_delta(&self, var: VarId) -> f64 {
        let model = self.index.model;
        let mut delta = model.var_cost.get(var).copied().unwrap_or(0.0);
        for &(si, coef) in &self.index.var_soft[var] {
            let term = &model.soft[si];
            let lhs = self.soft_lhs[si];
            delta += term.weight
                * (term.constraint.cmp.excess(lhs + coef, term.constraint.rhs)
                    - term.constraint.cmp.excess(lhs, term.constraint.rhs));
        }
        delta
    }

    pub fn assign(&mut self, course: usize, var: VarId) {
        if let Some(previous) = self.chosen[course] {
            self.apply(previous, -1.0);
        } else {
            self.assigned += 1;
        }
        self.chosen[course] = Some(var);
        self.apply(var, 1.0);
    }

    pub fn unassign(&mut self, course: usize) {
        if let Some(previous) = self.chosen[course].take() {
            self.apply(previous, -1.0);
            self.assigned -= 1;
        }
    }

    fn apply(&mut self, var: VarId, sign: f64) {
        let model = self.index.model;
        self.var_cost_total += sign * model.var_cost.get(var).copied().unwrap_or(0.0);

        for &(ci, coef) in &self.index.var_hard[var] {
            let c = &model.hard[ci];
            let before = c.cmp.excess(self.hard_lhs[ci], c.rhs);
            self.hard_lhs[ci] += sign * coef;
            self.hard_excess_total += c.cmp.excess(self.hard_lhs[ci], c.rhs) - before;
        }
        for &(si, coef) in &self.index.var_soft[var] {
            let t = &model.soft[si];
            let rhs = t.constraint.rhs;
            let before = t.constraint.cmp.excess(self.soft_lhs[si], rhs);
            self.soft_lhs[si] += sign * coef;
            self.soft_penalty_total += t.weight * (t.constraint.cmp.excess(self.soft_lhs[si], rhs) - before);
        }
    }

    /// 当前目标值 (完整赋值时即为真实目标)
    pub fn cost(&self) -> f64 {
        self.var_cost_total + self.soft_penalty_total
    }

    /// 硬约束违反总量
    pub fn hard_excess(&self) -> f64 {
        self.hard_excess_total.max(0.0)
    }

    pub fn is_feasible(&self) -> bool {
        self.is_complete() && self.hard_excess() <= EPSILON
    }

    pub fn solution(&self) -> Option<Vec<VarId>> {
        self.chosen.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{LinearConstraint, LinearExpr, PlacementVar, SoftTerm};

    fn var(course_idx: usize, start_min: i32) -> PlacementVar {
        PlacementVar {
            course_idx,
            day: 0,
            start_min,
            end_min: start_min + 60,
            room: None,
            tutor: None,
        }
    }

    fn two_course_model() -> Model {
        Model {
            vars: vec![var(0, 480), var(0, 600), var(1, 480), var(1, 600)],
            course_ids: vec!["c1".to_string(), "c2".to_string()],
            options: vec![vec![0, 1], vec![2, 3]],
            hard: vec![
                LinearConstraint {
                    expr: LinearExpr::sum_of([0, 2]),
                    cmp: Comparison::Le,
                    rhs: 1.0,
                    origin: "clash".to_string(),
                },
                LinearConstraint {
                    expr: LinearExpr::sum_of([3]),
                    cmp: Comparison::Le,
                    rhs: 0.0,
                    origin: "forbid".to_string(),
                },
            ],
            soft: vec![SoftTerm {
                constraint: LinearConstraint {
                    expr: LinearExpr::sum_of([0]),
                    cmp: Comparison::Le,
                    rhs: 0.0,
                    origin: "soft".to_string(),
                },
                weight: 2.0,
            }],
            var_cost: vec![0.0; 4],
        }
    }

    #[test]
    fn test_unary_domain_filtering() {
        let model = two_course_model();
        let index = ModelIndex::new(&model);
        assert_eq!(index.domains[1], vec![2]);
        assert_eq!(index.empty_domain(), None);
    }

    #[test]
    fn test_incremental_state() {
        let model = two_course_model();
        let index = ModelIndex::new(&model);
        let mut state = SearchState::new(&index);

        assert_eq!(state.cost_delta(0), 2.0);
        state.assign(0, 0);
        assert!(!state.can_assign(2));
        assert_eq!(state.cost(), 2.0);

        state.assign(0, 1);
        assert!(state.can_assign(2));
        state.assign(1, 2);
        assert!(state.is_feasible());
        assert_eq!(state.cost(), 0.0);
        assert_eq!(state.solution(), Some(vec![1, 2]));

        state.unassign(1);
        assert!(!state.is_complete());
    }

    #[test]
    fn test_negative_coefficients_skip_pruning() {
        let mut model = two_course_model();
        // c1@480 - c2@600 <= 0: 选 0 需要同时选 3
        let mut expr = LinearExpr::new();
        expr.add(0, 1.0).add(3, -1.0);
        model.hard[1] = LinearConstraint {
            expr,
            cmp: Comparison::Le,
            rhs: 0.0,
            origin: "tie".to_string(),
        };
        let index = ModelIndex::new(&model);
        assert_eq!(index.domains[0], vec![0, 1]);
        assert_eq!(index.domains[1], vec![2, 3]);

        let mut state = SearchState::new(&index);
        assert!(state.can_assign(0));
        state.assign(0, 0);
        state.assign(1, 3);
        assert!(state.is_feasible());
        state.assign(1, 2);
        assert!(!state.is_feasible());
    }
}
