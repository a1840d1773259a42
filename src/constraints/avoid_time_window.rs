// ==========================================
// 约束种类: avoid_time_window
// ==========================================
// 参数: {"groups": [], "tutors": [], "days": ["mon"], "start_min": 720, "end_min": 810}
// 语义: 被选中的课程不得与指定日的 [start_min, end_min) 时间窗相交
//       groups/tutors 均空 = 全部课程; days 为空 = 全部教学日
// 能力: 满足性 / 建模 (无预分析)
// ==========================================

use crate::constraints::{describe_placement, format_minute, parse_params, Capability, ConstraintKind, ResourceSelector};
use crate::domain::constraint::ConstraintInstance;
use crate::domain::report::Violation;
use crate::domain::scope::TimeGrid;
use crate::domain::timetable::ScheduledCourse;
use crate::engine::context::ScopeData;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::model::ModelBuilder;
use serde::Deserialize;

pub const KIND: &str = "avoid_time_window";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    tutors: Vec<String>,
    #[serde(default)]
    days: Vec<String>,
    start_min: i32,
    end_min: i32,
}

/// 时间窗规则 (avoid_time_window 与其特化种类共用)
#[derive(Debug, Clone)]
pub(crate) struct WindowRule {
    pub selector: ResourceSelector,
    pub days: Vec<String>,
    pub start_min: i32,
    pub end_min: i32,
}

impl WindowRule {
    /// 校验时间窗并解析星期引用; 返回生效的星期下标
    pub fn resolve_days(&self, instance: &ConstraintInstance, grid: &TimeGrid) -> EngineResult<Vec<usize>> {
        if self.start_min >= self.end_min {
            return Err(EngineError::malformed(
                &instance.constraint_id,
                format!("时间窗起止无效: {} >= {}", self.start_min, self.end_min),
            ));
        }
        if self.days.is_empty() {
            return Ok((0..grid.day_count()).collect());
        }
        self.days
            .iter()
            .map(|d| {
                grid.day_index(d).ok_or_else(|| {
                    EngineError::malformed(&instance.constraint_id, format!("未知教学日: {}", d))
                })
            })
            .collect()
    }

    pub fn check(
        &self,
        instance: &ConstraintInstance,
        data: &ScopeData,
        placements: &[ScheduledCourse],
    ) -> EngineResult<Option<Violation>> {
        let days = self.resolve_days(instance, &data.grid)?;

        let inside: Vec<String> = placements
            .iter()
            .filter(|p| {
                data.grid
                    .day_index(&p.day)
                    .map(|d| days.contains(&d))
                    .unwrap_or(false)
            })
            .filter(|p| p.start_min < self.end_min && self.start_min < p.end_min())
            .filter(|p| self.selector.selects(data.course(&p.course_id), p.tutor.as_deref()))
            .map(describe_placement)
            .collect();

        if inside.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Violation::of(
                instance,
                format!(
                    "课程落在禁排时间窗 {}-{}: {}",
                    format_minute(self.start_min),
                    format_minute(self.end_min),
                    inside.join(", ")
                ),
            )))
        }
    }

    pub fn encode(&self, instance: &ConstraintInstance, builder: &mut ModelBuilder) -> EngineResult<()> {
        let days = self.resolve_days(instance, &builder.data().grid)?;
        let forbidden = builder.vars_where(|var, course| {
            days.contains(&var.day)
                && var.overlaps_window(self.start_min, self.end_min)
                && self.selector.selects(Some(course), var.tutor.as_deref())
        });
        builder.forbid(instance, forbidden)
    }
}

pub struct AvoidTimeWindowKind;

impl AvoidTimeWindowKind {
    fn rule(instance: &ConstraintInstance) -> EngineResult<WindowRule> {
        let p: Params = parse_params(instance)?;
        Ok(WindowRule {
            selector: ResourceSelector {
                groups: p.groups,
                tutors: p.tutors,
            },
            days: p.days,
            start_min: p.start_min,
            end_min: p.end_min,
        })
    }
}

impl ConstraintKind for AvoidTimeWindowKind {
    fn name(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "指定时间窗内不排课"
    }

    fn is_satisfied_for(
        &self,
        instance: &ConstraintInstance,
        data: &ScopeData,
        placements: &[ScheduledCourse],
    ) -> Capability<EngineResult<Option<Violation>>> {
        Capability::Supported(Self::rule(instance).and_then(|r| r.check(instance, data, placements)))
    }

    fn contribute_to_model(
        &self,
        instance: &ConstraintInstance,
        builder: &mut ModelBuilder,
    ) -> Capability<EngineResult<()>> {
        Capability::Supported(Self::rule(instance).and_then(|r| r.encode(instance, builder)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::test_support::*;
    use serde_json::json;

    #[test]
    fn test_no_pre_analysis_capability() {
        let inst = instance(KIND, json!({"start_min": 720, "end_min": 810}), None);
        assert!(!AvoidTimeWindowKind.pre_analyse(&inst, &data(vec![])).is_supported());
    }

    #[test]
    fn test_is_satisfied_for_with_selector() {
        let d = data(vec![
            course("c1", "ALGO", "TD", 90, &["G1"], &[]),
            course("c2", "ALGO", "TD", 90, &["G2"], &[]),
        ]);
        let inst = instance(
            KIND,
            json!({"groups": ["G1"], "days": ["wed"], "start_min": 840, "end_min": 1110}),
            None,
        );
        let placements = vec![
            placement("c1", "wed", 840, 90, None),
            placement("c2", "wed", 840, 90, None),
        ];
        let v = match AvoidTimeWindowKind.is_satisfied_for(&inst, &d, &placements) {
            Capability::Supported(r) => r.unwrap().unwrap(),
            Capability::Unsupported => unreachable!(),
        };
        assert!(v.message.contains("c1@wed"));
        assert!(!v.message.contains("c2"));

        let elsewhere = vec![placement("c1", "thu", 840, 90, None)];
        assert!(matches!(
            AvoidTimeWindowKind.is_satisfied_for(&inst, &d, &elsewhere),
            Capability::Supported(Ok(None))
        ));
    }

    #[test]
    fn test_unknown_day_is_malformed() {
        let inst = instance(KIND, json!({"days": ["sun"], "start_min": 720, "end_min": 810}), None);
        let d = data(vec![course("c1", "ALGO", "TD", 90, &["G1"], &[])]);
        assert!(matches!(
            AvoidTimeWindowKind.is_satisfied_for(&inst, &d, &[]),
            Capability::Supported(Err(EngineError::MalformedConstraint { .. }))
        ));
    }

    #[test]
    fn test_model_forbids_window() {
        let d = data(vec![course("c1", "ALGO", "TD", 90, &["G1"], &[])]);
        let inst = instance(KIND, json!({"start_min": 0, "end_min": 600}), None);
        let mut builder = ModelBuilder::new(&d);
        assert!(matches!(
            AvoidTimeWindowKind.contribute_to_model(&inst, &mut builder),
            Capability::Supported(Ok(()))
        ));
        let model = builder.build();
        for &v in &model.options[0] {
            let blocked = !model.violated_hard(&[v]).is_empty();
            assert_eq!(blocked, model.vars[v].start_min < 600);
        }
    }
}
