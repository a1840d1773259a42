// ==========================================
// 约束种类: course_order
// ==========================================
// 参数: {"module": "ALGO", "before_type": "CM", "after_type": "TD"}
// 语义: 模块内每门 after_type 课程必须在全部 before_type 课程结束之后开始
//       (周内顺序: 教学日优先, 其次开始时刻)
// 能力: 满足性 / 建模
// ==========================================

use crate::constraints::{describe_placement, parse_params, Capability, ConstraintKind};
use crate::domain::constraint::ConstraintInstance;
use crate::domain::report::Violation;
use crate::domain::timetable::ScheduledCourse;
use crate::engine::context::ScopeData;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::model::{Comparison, LinearExpr, ModelBuilder, VarId};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const KIND: &str = "course_order";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    module: String,
    before_type: String,
    after_type: String,
}

fn params(instance: &ConstraintInstance) -> EngineResult<Params> {
    let p: Params = parse_params(instance)?;
    if p.before_type == p.after_type {
        return Err(EngineError::malformed(
            &instance.constraint_id,
            format!("before_type 与 after_type 相同: {}", p.before_type),
        ));
    }
    Ok(p)
}

fn week_minute(data: &ScopeData, day: &str, minute: i32) -> Option<i64> {
    data.grid
        .day_index(day)
        .map(|d| d as i64 * 24 * 60 + minute as i64)
}

fn placements_of<'p>(
    data: &ScopeData,
    placements: &'p [ScheduledCourse],
    module: &str,
    course_type: &str,
) -> Vec<&'p ScheduledCourse> {
    placements
        .iter()
        .filter(|pl| {
            data.course(&pl.course_id)
                .map(|c| c.module == module && c.course_type == course_type)
                .unwrap_or(false)
        })
        .collect()
}

pub struct CourseOrderKind;

impl CourseOrderKind {
    fn check(
        &self,
        instance: &ConstraintInstance,
        data: &ScopeData,
        placements: &[ScheduledCourse],
    ) -> EngineResult<Option<Violation>> {
        let p = params(instance)?;
        let befores = placements_of(data, placements, &p.module, &p.before_type);
        let afters = placements_of(data, placements, &p.module, &p.after_type);

        let Some(last_end) = befores
            .iter()
            .filter_map(|b| week_minute(data, &b.day, b.end_min()))
            .max()
        else {
            return Ok(None);
        };

        let early: Vec<String> = afters
            .iter()
            .filter(|a| week_minute(data, &a.day, a.start_min).map(|s| s < last_end).unwrap_or(false))
            .map(|a| describe_placement(a))
            .collect();

        if early.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Violation::of(
                instance,
                format!(
                    "模块 {} 的 {} 课程早于 {} 课程结束: {}",
                    p.module,
                    p.after_type,
                    p.before_type,
                    early.join(", ")
                ),
            )))
        }
    }

    /// 对每个 before 落位 vb 与每门 after 课程 A: vb + Σ(A 中早于 vb 结束的落位) <= 1
    fn encode(&self, instance: &ConstraintInstance, builder: &mut ModelBuilder) -> EngineResult<()> {
        let p = params(instance)?;
        let data = builder.data();

        let course_set = |course_type: &str| -> BTreeSet<usize> {
            data.courses
                .iter()
                .enumerate()
                .filter(|(_, c)| c.module == p.module && c.course_type == course_type)
                .map(|(i, _)| i)
                .collect()
        };
        let befores = course_set(&p.before_type);
        let afters = course_set(&p.after_type);
        if befores.is_empty() || afters.is_empty() {
            return Ok(());
        }

        let mut rows: Vec<LinearExpr> = Vec::new();
        {
            let vars = builder.vars();
            for (vb, before_var) in vars.iter().enumerate() {
                if !befores.contains(&before_var.course_idx) {
                    continue;
                }
                for &after_course in &afters {
                    let early: Vec<VarId> = vars
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.course_idx == after_course && v.week_start() < before_var.week_end())
                        .map(|(i, _)| i)
                        .collect();
                    if early.is_empty() {
                        continue;
                    }
                    let mut expr = LinearExpr::sum_of(early);
                    expr.add(vb, 1.0);
                    rows.push(expr);
                }
            }
        }

        tracing::trace!(constraint_id = %instance.constraint_id, rows = rows.len(), "先后顺序建模");
        for expr in rows {
            builder.add_policy(instance, expr, Comparison::Le, 1.0)?;
        }
        Ok(())
    }
}

impl ConstraintKind for CourseOrderKind {
    fn name(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "同一模块内课程类型的先后顺序"
    }

    fn is_satisfied_for(
        &self,
        instance: &ConstraintInstance,
        data: &ScopeData,
        placements: &[ScheduledCourse],
    ) -> Capability<EngineResult<Option<Violation>>> {
        Capability::Supported(self.check(instance, data, placements))
    }

    fn contribute_to_model(
        &self,
        instance: &ConstraintInstance,
        builder: &mut ModelBuilder,
    ) -> Capability<EngineResult<()>> {
        Capability::Supported(self.encode(instance, builder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::test_support::*;
    use serde_json::json;

    fn order_instance() -> ConstraintInstance {
        instance(KIND, json!({"module": "ALGO", "before_type": "CM", "after_type": "TD"}), None)
    }

    #[test]
    fn test_is_satisfied_for() {
        let d = data(vec![
            course("cm", "ALGO", "CM", 90, &["G1"], &[]),
            course("td", "ALGO", "TD", 90, &["G1"], &[]),
        ]);
        let inst = order_instance();

        let good = vec![placement("cm", "mon", 480, 90, None), placement("td", "mon", 570, 90, None)];
        assert!(matches!(
            CourseOrderKind.is_satisfied_for(&inst, &d, &good),
            Capability::Supported(Ok(None))
        ));

        let bad = vec![placement("cm", "tue", 480, 90, None), placement("td", "mon", 570, 90, None)];
        assert!(matches!(
            CourseOrderKind.is_satisfied_for(&inst, &d, &bad),
            Capability::Supported(Ok(Some(_)))
        ));
    }

    #[test]
    fn test_empty_sets_check_nothing() {
        let d = data(vec![course("td", "ALGO", "TD", 90, &["G1"], &[])]);
        let placements = vec![placement("td", "mon", 480, 90, None)];
        assert!(matches!(
            CourseOrderKind.is_satisfied_for(&order_instance(), &d, &placements),
            Capability::Supported(Ok(None))
        ));
    }

    #[test]
    fn test_model_encoding_matches_check() {
        let d = data(vec![
            course("cm", "ALGO", "CM", 90, &["G1"], &[]),
            course("td", "ALGO", "TD", 90, &["G2"], &[]),
        ]);
        let inst = order_instance();
        let mut builder = ModelBuilder::new(&d);
        assert!(CourseOrderKind.contribute_to_model(&inst, &mut builder).is_supported());
        let model = builder.build();

        for &b in &model.options[0] {
            for &a in &model.options[1] {
                let feasible = model.violated_hard(&[b, a]).is_empty();
                let ordered = model.vars[a].week_start() >= model.vars[b].week_end();
                assert_eq!(feasible, ordered);
            }
        }
    }
}
