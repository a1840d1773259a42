// ==========================================
// 排课引擎 - 整数规划后端 (good_lp + microlp)
// ==========================================
// 变量: 每个候选落位一个 0/1 变量, 每门课恰好选中一个
// 软约束: 每项一个非负超出量变量, 按权重计入最小化目标
// 时限: microlp 无法中途停止, 求解放在工作线程, 到期即放弃等待
// 结论: 求解完成即为最优解或不可行证明
// ==========================================

use crate::domain::types::SolveStatus;
use crate::engine::model::{Comparison, LinearExpr, Model, VarId, EPSILON};
use crate::engine::solver::{BackendSolution, SolverBackend, MILP};
use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct MilpBackend;

impl MilpBackend {
    pub fn new() -> Self {
        Self
    }
}

fn linear(expr: &LinearExpr, x: &[Variable]) -> Expression {
    expr.terms
        .iter()
        .filter_map(|&(v, coef)| x.get(v).map(|&var| (var, coef)))
        .fold(Expression::from(0.0), |acc, (var, coef)| acc + coef * var)
}

/// 构建并求解整数规划, 返回每门课选中的变量
fn solve_model(model: &Model) -> Result<Vec<VarId>, ResolutionError> {
    let mut problem = ProblemVariables::new();
    let x: Vec<Variable> = problem.add_vector(variable().binary(), model.vars.len());

    let mut objective = model
        .var_cost
        .iter()
        .zip(&x)
        .filter(|(cost, _)| cost.abs() > EPSILON)
        .fold(Expression::from(0.0), |acc, (&cost, &var)| acc + cost * var);

    let mut excess = Vec::with_capacity(model.soft.len());
    for term in &model.soft {
        let e = problem.add(variable().min(0.0));
        objective += term.weight * e;
        excess.push(e);
    }

    let mut lp = problem.minimise(objective).using(default_solver);

    for opts in &model.options {
        let chosen = opts
            .iter()
            .filter_map(|&v| x.get(v).copied())
            .fold(Expression::from(0.0), |acc, var| acc + var);
        lp.add_constraint(constraint!(chosen == 1.0));
    }

    for c in &model.hard {
        let lhs = linear(&c.expr, &x);
        let rhs = c.rhs;
        match c.cmp {
            Comparison::Le => lp.add_constraint(constraint!(lhs <= rhs)),
            Comparison::Ge => lp.add_constraint(constraint!(lhs >= rhs)),
            Comparison::Eq => lp.add_constraint(constraint!(lhs == rhs)),
        };
    }

    for (term, &e) in model.soft.iter().zip(&excess) {
        let lhs = linear(&term.constraint.expr, &x);
        let rhs = term.constraint.rhs;
        match term.constraint.cmp {
            Comparison::Le => {
                lp.add_constraint(constraint!(lhs - e <= rhs));
            }
            Comparison::Ge => {
                lp.add_constraint(constraint!(lhs + e >= rhs));
            }
            Comparison::Eq => {
                lp.add_constraint(constraint!(lhs.clone() - e <= rhs));
                lp.add_constraint(constraint!(lhs + e >= rhs));
            }
        }
    }

    let solution = lp.solve()?;

    model
        .options
        .iter()
        .map(|opts| {
            opts.iter()
                .copied()
                .find(|&v| x.get(v).map(|&var| solution.value(var) > 0.5).unwrap_or(false))
                .ok_or(ResolutionError::Other("整数解中存在未选中落位的课程"))
        })
        .collect()
}

impl SolverBackend for MilpBackend {
    fn name(&self) -> &'static str {
        MILP
    }

    fn solve(&self, model: &Model, deadline: Instant) -> BackendSolution {
        if let Some(course) = model.options.iter().position(Vec::is_empty) {
            tracing::debug!(
                course_id = %model.course_ids.get(course).map(String::as_str).unwrap_or(""),
                "课程无可选落位，模型平凡不可行"
            );
            return BackendSolution::no_solution(SolveStatus::Infeasible, 0);
        }

        let (tx, rx) = mpsc::channel();
        let owned = model.clone();
        let spawned = thread::Builder::new()
            .name("milp-solve".to_string())
            .spawn(move || {
                // 接收端可能已因超时退出
                let _ = tx.send(solve_model(&owned));
            });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "无法创建求解线程");
            return BackendSolution::no_solution(SolveStatus::TimedOutNoSolution, 0);
        }

        let wait = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(Ok(assignment)) => {
                let objective = model.objective(&assignment);
                tracing::debug!(objective = objective, "整数规划求得最优解");
                BackendSolution {
                    status: SolveStatus::Optimal,
                    assignment: Some(assignment),
                    objective: Some(objective),
                    explored_nodes: 0,
                }
            }
            Ok(Err(ResolutionError::Infeasible)) => BackendSolution::no_solution(SolveStatus::Infeasible, 0),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "整数规划求解失败");
                BackendSolution::no_solution(SolveStatus::Infeasible, 0)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!("整数规划到达截止时刻，工作线程在后台结束");
                BackendSolution::no_solution(SolveStatus::TimedOutNoSolution, 0)
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("求解线程异常退出");
                BackendSolution::no_solution(SolveStatus::TimedOutNoSolution, 0)
            }
        }
    }
}
