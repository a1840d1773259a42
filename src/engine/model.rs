// ==========================================
// 排课引擎 - 优化模型与模型构建器
// ==========================================
// 决策变量: 课程 × 教学日 × 开始时刻 × 教室 × 教师 的 0/1 落位变量
// 每门课恰好选择一个落位 (由 options 隐式保证, 不额外建约束)
// 约束: 线性 (<=, >=, ==), 系数必须非负
// 目标: 变量代价之和 + Σ 权重 × 软约束超出量
// ==========================================

use crate::domain::constraint::ConstraintInstance;
use crate::domain::course::Course;
use crate::engine::context::ScopeData;
use crate::engine::error::{EngineError, EngineResult};
use std::collections::BTreeMap;

/// 变量下标
pub type VarId = usize;

/// 浮点比较容差
pub const EPSILON: f64 = 1e-9;

/// 一个候选落位
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementVar {
    pub course_idx: usize,
    pub day: usize, // TimeGrid.days 下标
    pub start_min: i32,
    pub end_min: i32,
    pub room: Option<String>,
    pub tutor: Option<String>,
}

impl PlacementVar {
    /// 与 [start, end) 时间窗是否相交
    pub fn overlaps_window(&self, start_min: i32, end_min: i32) -> bool {
        self.start_min < end_min && start_min < self.end_min
    }

    /// 周内绝对开始时刻 (用于先后顺序比较)
    pub fn week_start(&self) -> i64 {
        self.day as i64 * 24 * 60 + self.start_min as i64
    }

    pub fn week_end(&self) -> i64 {
        self.day as i64 * 24 * 60 + self.end_min as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Le,
    Ge,
    Eq,
}

impl Comparison {
    /// 左值相对右值的违反量 (满足时为 0)
    pub fn excess(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Comparison::Le => (lhs - rhs).max(0.0),
            Comparison::Ge => (rhs - lhs).max(0.0),
            Comparison::Eq => (lhs - rhs).abs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, f64)>,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// 系数全为 1 的求和式
    pub fn sum_of(vars: impl IntoIterator<Item = VarId>) -> Self {
        Self {
            terms: vars.into_iter().map(|v| (v, 1.0)).collect(),
        }
    }

    pub fn add(&mut self, var: VarId, coef: f64) -> &mut Self {
        self.terms.push((var, coef));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn eval(&self, selected: &[bool]) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| selected.get(*v).copied().unwrap_or(false))
            .map(|(_, c)| c)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub expr: LinearExpr,
    pub cmp: Comparison,
    pub rhs: f64,
    pub origin: String, // 来源 (约束实例ID 或 core:*)
}

impl LinearConstraint {
    pub fn excess(&self, selected: &[bool]) -> f64 {
        self.cmp.excess(self.expr.eval(selected), self.rhs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoftTerm {
    pub constraint: LinearConstraint,
    pub weight: f64,
}

// ==========================================
// Model - 求解后端的输入
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub vars: Vec<PlacementVar>,
    pub course_ids: Vec<String>,
    pub options: Vec<Vec<VarId>>, // 每门课的候选变量
    pub hard: Vec<LinearConstraint>,
    pub soft: Vec<SoftTerm>,
    pub var_cost: Vec<f64>,
}

impl Model {
    pub fn course_count(&self) -> usize {
        self.options.len()
    }

    fn selection(&self, assignment: &[VarId]) -> Vec<bool> {
        let mut selected = vec![false; self.vars.len()];
        for &v in assignment {
            if let Some(slot) = selected.get_mut(v) {
                *slot = true;
            }
        }
        selected
    }

    /// 完整赋值的目标值
    pub fn objective(&self, assignment: &[VarId]) -> f64 {
        let selected = self.selection(assignment);
        let var_cost: f64 = assignment
            .iter()
            .map(|&v| self.var_cost.get(v).copied().unwrap_or(0.0))
            .sum();
        let soft: f64 = self
            .soft
            .iter()
            .map(|t| t.weight * t.constraint.excess(&selected))
            .sum();
        var_cost + soft
    }

    /// 被完整赋值违反的硬约束
    pub fn violated_hard(&self, assignment: &[VarId]) -> Vec<&LinearConstraint> {
        let selected = self.selection(assignment);
        self.hard
            .iter()
            .filter(|c| c.excess(&selected) > EPSILON)
            .collect()
    }

    /// 赋值是否为每门课恰好选择一个自身的候选变量
    pub fn is_complete_assignment(&self, assignment: &[VarId]) -> bool {
        assignment.len() == self.course_count()
            && assignment
                .iter()
                .enumerate()
                .all(|(course_idx, v)| self.options[course_idx].contains(v))
    }
}

// ==========================================
// ModelBuilder - 模型构建器
// ==========================================
pub struct ModelBuilder<'d> {
    data: &'d ScopeData,
    vars: Vec<PlacementVar>,
    options: Vec<Vec<VarId>>,
    hard: Vec<LinearConstraint>,
    soft: Vec<SoftTerm>,
    var_cost: Vec<f64>,
}

impl<'d> ModelBuilder<'d> {
    /// 枚举全部候选落位
    pub fn new(data: &'d ScopeData) -> Self {
        let mut vars = Vec::new();
        let mut options = Vec::with_capacity(data.courses.len());

        for (course_idx, course) in data.courses.iter().enumerate() {
            let rooms: Vec<Option<String>> = if course.rooms.is_empty() {
                vec![None]
            } else {
                course.rooms.iter().cloned().map(Some).collect()
            };
            let tutors: Vec<Option<String>> = if course.tutors.is_empty() {
                vec![None]
            } else {
                course.tutors.iter().cloned().map(Some).collect()
            };

            let mut course_options = Vec::new();
            if course.duration_min > 0 {
                for day in 0..data.grid.day_count() {
                    for start_min in data.grid.starts_for(course.duration_min) {
                        for room in &rooms {
                            for tutor in &tutors {
                                course_options.push(vars.len());
                                vars.push(PlacementVar {
                                    course_idx,
                                    day,
                                    start_min,
                                    end_min: start_min + course.duration_min,
                                    room: room.clone(),
                                    tutor: tutor.clone(),
                                });
                            }
                        }
                    }
                }
            }
            options.push(course_options);
        }

        let var_cost = vec![0.0; vars.len()];
        Self {
            data,
            vars,
            options,
            hard: Vec::new(),
            soft: Vec::new(),
            var_cost,
        }
    }

    pub fn data(&self) -> &'d ScopeData {
        self.data
    }

    pub fn vars(&self) -> &[PlacementVar] {
        &self.vars
    }

    /// 按谓词筛选变量
    pub fn vars_where(&self, pred: impl Fn(&PlacementVar, &Course) -> bool) -> Vec<VarId> {
        self.vars
            .iter()
            .enumerate()
            .filter(|(_, var)| pred(var, &self.data.courses[var.course_idx]))
            .map(|(v, _)| v)
            .collect()
    }

    pub fn add_hard(&mut self, expr: LinearExpr, cmp: Comparison, rhs: f64, origin: impl Into<String>) {
        self.hard.push(LinearConstraint {
            expr,
            cmp,
            rhs,
            origin: origin.into(),
        });
    }

    pub fn add_soft(
        &mut self,
        expr: LinearExpr,
        cmp: Comparison,
        rhs: f64,
        weight: f64,
        origin: impl Into<String>,
    ) {
        if weight <= 0.0 {
            return;
        }
        self.soft.push(SoftTerm {
            constraint: LinearConstraint {
                expr,
                cmp,
                rhs,
                origin: origin.into(),
            },
            weight,
        });
    }

    pub fn add_cost(&mut self, var: VarId, cost: f64) {
        if let Some(slot) = self.var_cost.get_mut(var) {
            *slot += cost.max(0.0);
        }
    }

    /// 按实例的权重添加一条策略: 无权重为硬约束, 否则为按权重缩放的软约束
    pub fn add_policy(
        &mut self,
        instance: &ConstraintInstance,
        expr: LinearExpr,
        cmp: Comparison,
        rhs: f64,
    ) -> EngineResult<()> {
        match instance.weight {
            None => {
                self.add_hard(expr, cmp, rhs, instance.constraint_id.clone());
                Ok(())
            }
            Some(weight) => {
                let weight = checked_weight(instance, weight)?;
                self.add_soft(expr, cmp, rhs, weight, instance.constraint_id.clone());
                Ok(())
            }
        }
    }

    /// 禁止 (硬) 或惩罚 (软) 一组落位
    pub fn forbid(&mut self, instance: &ConstraintInstance, vars: Vec<VarId>) -> EngineResult<()> {
        if vars.is_empty() {
            return Ok(());
        }
        match instance.weight {
            None => {
                self.add_hard(LinearExpr::sum_of(vars), Comparison::Le, 0.0, instance.constraint_id.clone());
            }
            Some(weight) => {
                let weight = checked_weight(instance, weight)?;
                for v in vars {
                    self.add_cost(v, weight);
                }
            }
        }
        Ok(())
    }

    /// 添加结构性约束并产出模型
    pub fn build(mut self) -> Model {
        self.add_no_overlap();

        let course_ids = self.data.courses.iter().map(|c| c.course_id.clone()).collect();
        Model {
            vars: self.vars,
            course_ids,
            options: self.options,
            hard: self.hard,
            soft: self.soft,
            var_cost: self.var_cost,
        }
    }

    // ==========================================
    // 结构性约束: 学生组/教师/教室不可重叠
    // ==========================================
    // 区间两两相交当且仅当其中一个包含另一个的起点,
    // 因此在每个起点上限制覆盖该点的变量之和 <= 1 即可
    fn add_no_overlap(&mut self) {
        let mut usage: BTreeMap<(&'static str, String, usize), Vec<VarId>> = BTreeMap::new();
        for (v, var) in self.vars.iter().enumerate() {
            let course = &self.data.courses[var.course_idx];
            for group in &course.groups {
                usage.entry(("group", group.clone(), var.day)).or_default().push(v);
            }
            if let Some(tutor) = &var.tutor {
                usage.entry(("tutor", tutor.clone(), var.day)).or_default().push(v);
            }
            if let Some(room) = &var.room {
                usage.entry(("room", room.clone(), var.day)).or_default().push(v);
            }
        }

        let mut added = 0usize;
        for ((resource, name, day), vs) in usage {
            let mut points: Vec<i32> = vs.iter().map(|&v| self.vars[v].start_min).collect();
            points.sort_unstable();
            points.dedup();

            for point in points {
                let covering: Vec<VarId> = vs
                    .iter()
                    .copied()
                    .filter(|&v| self.vars[v].start_min <= point && point < self.vars[v].end_min)
                    .collect();
                let mut courses: Vec<usize> = covering.iter().map(|&v| self.vars[v].course_idx).collect();
                courses.sort_unstable();
                courses.dedup();
                if courses.len() < 2 {
                    continue;
                }
                self.hard.push(LinearConstraint {
                    expr: LinearExpr::sum_of(covering),
                    cmp: Comparison::Le,
                    rhs: 1.0,
                    origin: format!("core:no_overlap:{}:{}:{}@{}", resource, name, day, point),
                });
                added += 1;
            }
        }

        tracing::debug!(constraints = added, "结构性不重叠约束已添加");
    }
}

fn checked_weight(instance: &ConstraintInstance, weight: f64) -> EngineResult<f64> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(EngineError::malformed(
            &instance.constraint_id,
            format!("权重必须为非负有限数: {}", weight),
        ));
    }
    Ok(weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::{SchedulingScope, TimeGrid};
    use serde_json::json;

    fn course(id: &str, groups: &[&str], tutors: &[&str], rooms: &[&str]) -> Course {
        Course {
            course_id: id.to_string(),
            department: "INFO".to_string(),
            period: "W10".to_string(),
            module: "ALGO".to_string(),
            course_type: "TD".to_string(),
            duration_min: 90,
            groups: groups.iter().map(|s| s.to_string()).collect(),
            tutors: tutors.iter().map(|s| s.to_string()).collect(),
            rooms: rooms.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn small_grid() -> TimeGrid {
        TimeGrid {
            days: vec!["mon".to_string()],
            slot_starts: vec![480, 570],
            day_end_min: 660,
        }
    }

    #[test]
    fn test_variables_enumerate_rooms_and_tutors() {
        let data = ScopeData::new(
            SchedulingScope::new("INFO", "W10"),
            small_grid(),
            vec![course("c1", &["G1"], &["ALB", "BOB"], &["R1"])],
            vec![],
        );
        let model = ModelBuilder::new(&data).build();
        // 1 天 × 2 时刻 × 1 教室 × 2 教师
        assert_eq!(model.options[0].len(), 4);
        assert_eq!(model.vars.len(), 4);
    }

    #[test]
    fn test_no_overlap_for_shared_group() {
        let data = ScopeData::new(
            SchedulingScope::new("INFO", "W10"),
            small_grid(),
            vec![course("c1", &["G1"], &[], &[]), course("c2", &["G1"], &[], &[])],
            vec![],
        );
        let model = ModelBuilder::new(&data).build();
        // c1@480 与 c2@480 同组重叠
        let clash = vec![model.options[0][0], model.options[1][0]];
        assert!(!model.violated_hard(&clash).is_empty());
        let ok = vec![model.options[0][0], model.options[1][1]];
        assert!(model.violated_hard(&ok).is_empty());
    }

    #[test]
    fn test_policy_hard_vs_soft() {
        let data = ScopeData::new(
            SchedulingScope::new("INFO", "W10"),
            small_grid(),
            vec![course("c1", &["G1"], &[], &[])],
            vec![],
        );
        let mut instance = ConstraintInstance {
            constraint_id: "k1".to_string(),
            kind: "avoid_time_window".to_string(),
            department: "INFO".to_string(),
            periods: vec![],
            weight: None,
            is_active: true,
            params: json!({}),
            comment: None,
        };

        let mut builder = ModelBuilder::new(&data);
        let first = vec![builder.vars_where(|v, _| v.start_min == 480)[0]];
        builder.forbid(&instance, first.clone()).unwrap();
        let model = builder.build();
        assert_eq!(model.violated_hard(&first).len(), 1);

        instance.weight = Some(3.0);
        let mut builder = ModelBuilder::new(&data);
        builder.forbid(&instance, first.clone()).unwrap();
        let model = builder.build();
        assert!(model.violated_hard(&first).is_empty());
        assert_eq!(model.objective(&first), 3.0);

        instance.weight = Some(-1.0);
        let mut builder = ModelBuilder::new(&data);
        assert!(matches!(
            builder.forbid(&instance, first),
            Err(EngineError::MalformedConstraint { .. })
        ));
    }
}
