// ==========================================
// 约束种类: tutor_availability
// ==========================================
// 参数: {"tutor": "ALB"}
// 语义: 教师只能在其声明的可用时段授课; 未声明任何时段的教师不受限
// 能力: 预分析 / 满足性 / 建模
// ==========================================

use crate::constraints::{describe_placement, parse_params, Capability, ConstraintKind};
use crate::domain::constraint::ConstraintInstance;
use crate::domain::report::{FeasibilityReport, Violation};
use crate::domain::timetable::ScheduledCourse;
use crate::engine::context::ScopeData;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::model::ModelBuilder;
use serde::Deserialize;

pub const KIND: &str = "tutor_availability";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    tutor: String,
}

fn params(instance: &ConstraintInstance) -> EngineResult<Params> {
    let p: Params = parse_params(instance)?;
    if p.tutor.trim().is_empty() {
        return Err(EngineError::malformed(&instance.constraint_id, "tutor 不能为空"));
    }
    Ok(p)
}

pub struct TutorAvailabilityKind;

impl TutorAvailabilityKind {
    fn analyse(&self, instance: &ConstraintInstance, data: &ScopeData) -> EngineResult<FeasibilityReport> {
        let p = params(instance)?;
        let Some(windows) = data.tutor_slots(&p.tutor) else {
            return Ok(FeasibilityReport::ok(&data.scope));
        };

        // 只有唯一可选教师为该教师的课程才必然占用其时间
        let bound: Vec<_> = data
            .courses
            .iter()
            .filter(|c| c.sole_tutor() == Some(p.tutor.as_str()))
            .collect();

        let mut messages = Vec::new();
        let required: i32 = bound.iter().map(|c| c.duration_min).sum();
        let available = data.available_minutes(&p.tutor).unwrap_or(0);
        if required > available {
            messages.push(format!(
                "教师 {} 在周期 {} 需授课 {} 分钟，仅声明可用 {} 分钟",
                p.tutor, data.scope.period, required, available
            ));
        }

        // 相接的时段已合并, 课程可以跨越原始记录的边界
        let longest_slot = windows.iter().map(|w| w.duration_min()).max().unwrap_or(0);
        for course in bound.iter().filter(|c| c.duration_min > longest_slot) {
            messages.push(format!(
                "课程 {} 时长 {} 分钟，超过教师 {} 最长可用时段 {} 分钟",
                course.course_id, course.duration_min, p.tutor, longest_slot
            ));
        }

        if messages.is_empty() {
            Ok(FeasibilityReport::ok(&data.scope))
        } else {
            Ok(FeasibilityReport::ko(&data.scope, messages))
        }
    }

    fn check(
        &self,
        instance: &ConstraintInstance,
        data: &ScopeData,
        placements: &[ScheduledCourse],
    ) -> EngineResult<Option<Violation>> {
        let p = params(instance)?;
        if data.tutor_slots(&p.tutor).is_none() {
            return Ok(None);
        }

        let outside: Vec<String> = placements
            .iter()
            .filter(|pl| pl.tutor.as_deref() == Some(p.tutor.as_str()))
            .filter(|pl| !data.is_tutor_available(&p.tutor, &pl.day, pl.start_min, pl.end_min()))
            .map(describe_placement)
            .collect();

        if outside.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Violation::of(
                instance,
                format!("教师 {} 在不可用时段授课: {}", p.tutor, outside.join(", ")),
            )))
        }
    }

    fn encode(&self, instance: &ConstraintInstance, builder: &mut ModelBuilder) -> EngineResult<()> {
        let p = params(instance)?;
        if builder.data().tutor_slots(&p.tutor).is_none() {
            return Ok(());
        }

        let data = builder.data();
        let days = &data.grid.days;
        let forbidden = builder.vars_where(|var, _| {
            var.tutor.as_deref() == Some(p.tutor.as_str())
                && !data.is_tutor_available(
                    &p.tutor,
                    days.get(var.day).map(String::as_str).unwrap_or(""),
                    var.start_min,
                    var.end_min,
                )
        });

        tracing::trace!(
            constraint_id = %instance.constraint_id,
            tutor = %p.tutor,
            forbidden = forbidden.len(),
            "教师可用时段建模"
        );
        builder.forbid(instance, forbidden)
    }
}

impl ConstraintKind for TutorAvailabilityKind {
    fn name(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "教师只能在声明的可用时段授课"
    }

    fn pre_analyse(
        &self,
        instance: &ConstraintInstance,
        data: &ScopeData,
    ) -> Capability<EngineResult<FeasibilityReport>> {
        Capability::Supported(self.analyse(instance, data))
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
    use crate::domain::course::TutorAvailability;
    use crate::domain::scope::{SchedulingScope, TimeGrid};
    use serde_json::json;

    fn slot(day: &str, start_min: i32, duration_min: i32) -> TutorAvailability {
        TutorAvailability {
            department: "INFO".to_string(),
            period: "W10".to_string(),
            tutor: "ALB".to_string(),
            day: day.to_string(),
            start_min,
            duration_min,
        }
    }

    fn scope_data(duration_min: i32, slots: Vec<TutorAvailability>) -> ScopeData {
        ScopeData::new(
            SchedulingScope::new("INFO", "W10"),
            TimeGrid::default(),
            vec![course("c1", "ALGO", "CM", duration_min, &["G1"], &["ALB"])],
            slots,
        )
    }

    fn supported<T>(cap: Capability<T>) -> T {
        match cap {
            Capability::Supported(v) => v,
            Capability::Unsupported => panic!("能力应已实现"),
        }
    }

    #[test]
    fn test_pre_analyse_two_hours_vs_one_hour() {
        let data = scope_data(120, vec![slot("mon", 480, 60)]);
        let inst = instance(KIND, json!({"tutor": "ALB"}), None);
        let report = supported(TutorAvailabilityKind.pre_analyse(&inst, &data)).unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.messages.len(), 2);
    }

    #[test]
    fn test_adjacent_slots_hold_a_longer_course() {
        let data = scope_data(180, vec![slot("mon", 480, 90), slot("mon", 570, 90)]);
        let inst = instance(KIND, json!({"tutor": "ALB"}), None);
        let report = supported(TutorAvailabilityKind.pre_analyse(&inst, &data)).unwrap();
        assert!(report.is_ok(), "{:?}", report.messages);

        let spanning = vec![placement("c1", "mon", 480, 180, Some("ALB"))];
        assert!(supported(TutorAvailabilityKind.is_satisfied_for(&inst, &data, &spanning))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_overlapping_slots_do_not_inflate_capacity() {
        // 两条记录合计 240 分钟, 实际只覆盖 480-660
        let data = scope_data(200, vec![slot("mon", 480, 120), slot("mon", 540, 120)]);
        let inst = instance(KIND, json!({"tutor": "ALB"}), None);
        let report = supported(TutorAvailabilityKind.pre_analyse(&inst, &data)).unwrap();
        assert!(!report.is_ok());
        assert!(report.messages[0].contains("仅声明可用 180 分钟"), "{:?}", report.messages);
    }

    #[test]
    fn test_pre_analyse_ok_without_declared_slots() {
        let data = scope_data(120, vec![]);
        let inst = instance(KIND, json!({"tutor": "ALB"}), None);
        assert!(supported(TutorAvailabilityKind.pre_analyse(&inst, &data)).unwrap().is_ok());
    }

    #[test]
    fn test_malformed_params() {
        let data = scope_data(60, vec![]);
        let inst = instance(KIND, json!({"teacher": "ALB"}), None);
        assert!(matches!(
            supported(TutorAvailabilityKind.pre_analyse(&inst, &data)),
            Err(EngineError::MalformedConstraint { .. })
        ));
    }

    #[test]
    fn test_is_satisfied_for() {
        let data = scope_data(60, vec![slot("mon", 480, 120)]);
        let inst = instance(KIND, json!({"tutor": "ALB"}), None);

        let inside = vec![placement("c1", "mon", 540, 60, Some("ALB"))];
        assert!(supported(TutorAvailabilityKind.is_satisfied_for(&inst, &data, &inside))
            .unwrap()
            .is_none());

        let outside = vec![placement("c1", "tue", 480, 60, Some("ALB"))];
        let violation = supported(TutorAvailabilityKind.is_satisfied_for(&inst, &data, &outside))
            .unwrap()
            .unwrap();
        assert!(violation.is_hard);
        assert!(violation.message.contains("c1@tue"));
    }

    #[test]
    fn test_model_forbids_unavailable_placements() {
        let data = scope_data(60, vec![slot("mon", 480, 60)]);
        let inst = instance(KIND, json!({"tutor": "ALB"}), None);
        let mut builder = ModelBuilder::new(&data);
        supported(TutorAvailabilityKind.contribute_to_model(&inst, &mut builder)).unwrap();
        let model = builder.build();

        let allowed: Vec<usize> = model.options[0]
            .iter()
            .copied()
            .filter(|&v| model.violated_hard(&[v]).is_empty())
            .collect();
        assert_eq!(allowed.len(), 1);
        assert_eq!(model.vars[allowed[0]].start_min, 480);
        assert_eq!(model.vars[allowed[0]].day, 0);
    }
}
