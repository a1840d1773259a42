// ==========================================
// 排课引擎 - 局部搜索后端
// ==========================================
// 策略: 随机贪心构造 + 单课程换位爬山, 多次重启
// 评价: 硬约束违反量 × HARD_PENALTY + 目标值
// 结论: 不证明最优 (目标值为 0 除外), 不证明不可行
// 随机性: 固定种子, 同一模型同一种子结果可复现
// ==========================================

use crate::domain::types::SolveStatus;
use crate::engine::model::{Model, VarId, EPSILON};
use crate::engine::solver::search::{ModelIndex, SearchState};
use crate::engine::solver::{BackendSolution, SolverBackend, LOCAL_SEARCH};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Instant;

const HARD_PENALTY: f64 = 1_000_000.0;

#[derive(Debug, Clone)]
pub struct LocalSearchBackend {
    seed: u64,
    /// 找到可行解后的最大重启次数; 未找到可行解时一直搜索到截止时刻
    max_restarts: u32,
}

impl LocalSearchBackend {
    pub fn new(seed: u64, max_restarts: u32) -> Self {
        Self {
            seed,
            max_restarts: max_restarts.max(1),
        }
    }
}

fn score(state: &SearchState) -> f64 {
    state.hard_excess() * HARD_PENALTY + state.cost()
}

/// 随机顺序贪心构造: 优先不破坏硬约束的落位, 其次目标增量最小
fn construct(index: &ModelIndex, state: &mut SearchState, rng: &mut StdRng) {
    let mut order: Vec<usize> = (0..index.domains.len()).collect();
    order.shuffle(rng);

    for course in order {
        let domain = &index.domains[course];
        let feasible: Vec<VarId> = domain.iter().copied().filter(|&v| state.can_assign(v)).collect();

        let pool: Vec<(f64, VarId)> = if feasible.is_empty() {
            domain
                .iter()
                .map(|&v| {
                    state.assign(course, v);
                    let s = score(state);
                    state.unassign(course);
                    (s, v)
                })
                .collect()
        } else {
            feasible.iter().map(|&v| (state.cost_delta(v), v)).collect()
        };

        let best = pool.iter().map(|(s, _)| *s).fold(f64::INFINITY, f64::min);
        let ties: Vec<VarId> = pool
            .iter()
            .filter(|(s, _)| *s <= best + EPSILON)
            .map(|(_, v)| *v)
            .collect();
        if ties.is_empty() {
            continue;
        }
        let pick = ties[rng.random_range(0..ties.len())];
        state.assign(course, pick);
    }
}

/// 单课程换位爬山, 直到一整轮无改进或到达截止时刻
fn climb(index: &ModelIndex, state: &mut SearchState, rng: &mut StdRng, deadline: Instant) -> bool {
    let mut order: Vec<usize> = (0..index.domains.len()).collect();
    loop {
        let mut improved = false;
        order.shuffle(rng);

        for &course in &order {
            if Instant::now() >= deadline {
                return false;
            }
            let Some(current) = state.chosen(course) else {
                continue;
            };
            let mut best_score = score(state);
            let mut best_var = current;

            for &v in &index.domains[course] {
                if v == current {
                    continue;
                }
                state.assign(course, v);
                let s = score(state);
                if s < best_score - EPSILON {
                    best_score = s;
                    best_var = v;
                }
            }
            state.assign(course, best_var);
            if best_var != current {
                improved = true;
            }
        }

        if !improved {
            return true;
        }
    }
}

impl SolverBackend for LocalSearchBackend {
    fn name(&self) -> &'static str {
        LOCAL_SEARCH
    }

    fn solve(&self, model: &Model, deadline: Instant) -> BackendSolution {
        let index = ModelIndex::new(model);
        if let Some(course) = index.empty_domain() {
            tracing::debug!(
                course_id = %model.course_ids.get(course).map(String::as_str).unwrap_or(""),
                "课程无可选落位，模型平凡不可行"
            );
            return BackendSolution::no_solution(SolveStatus::Infeasible, 0);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(f64, Vec<VarId>)> = None;
        let mut restarts: u32 = 0;
        let mut moves: u64 = 0;

        while Instant::now() < deadline {
            let mut state = SearchState::new(&index);
            construct(&index, &mut state, &mut rng);
            let converged = climb(&index, &mut state, &mut rng, deadline);
            moves += index.domains.len() as u64;

            if state.is_feasible() {
                let cost = state.cost();
                let better = best.as_ref().map(|(c, _)| cost < *c - EPSILON).unwrap_or(true);
                if better {
                    if let Some(solution) = state.solution() {
                        tracing::trace!(restart = restarts, cost = cost, "局部搜索找到更优解");
                        best = Some((cost, solution));
                    }
                }
            }

            restarts += 1;
            let reached_zero = best.as_ref().map(|(c, _)| *c <= EPSILON).unwrap_or(false);
            if reached_zero || !converged || (best.is_some() && restarts >= self.max_restarts) {
                break;
            }
        }

        tracing::debug!(restarts = restarts, found = best.is_some(), "局部搜索结束");

        match best {
            Some((cost, assignment)) => BackendSolution {
                status: if cost <= EPSILON {
                    SolveStatus::Optimal
                } else {
                    SolveStatus::Feasible
                },
                assignment: Some(assignment),
                objective: Some(cost),
                explored_nodes: moves,
            },
            None => BackendSolution::no_solution(SolveStatus::TimedOutNoSolution, moves),
        }
    }
}
