// ==========================================
// 约束种类: lunch_break (特化 avoid_time_window)
// ==========================================
// 参数: {"groups": [], "tutors": [], "days": []}
// 语义: 午休时间窗 12:00-13:30 不排课
// ==========================================

use crate::constraints::avoid_time_window::{self, WindowRule};
use crate::constraints::{parse_params, Capability, ConstraintKind, ResourceSelector};
use crate::domain::constraint::ConstraintInstance;
use crate::domain::report::Violation;
use crate::domain::timetable::ScheduledCourse;
use crate::engine::context::ScopeData;
use crate::engine::error::EngineResult;
use crate::engine::model::ModelBuilder;
use serde::Deserialize;

pub const KIND: &str = "lunch_break";

pub const LUNCH_START_MIN: i32 = 720;
pub const LUNCH_END_MIN: i32 = 810;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    tutors: Vec<String>,
    #[serde(default)]
    days: Vec<String>,
}

pub struct LunchBreakKind;

impl LunchBreakKind {
    fn rule(instance: &ConstraintInstance) -> EngineResult<WindowRule> {
        // 空参数 {} 与 null 均视为"全部课程、全部教学日"
        let p: Params = if instance.params.is_null() {
            Params::default()
        } else {
            parse_params(instance)?
        };
        Ok(WindowRule {
            selector: ResourceSelector {
                groups: p.groups,
                tutors: p.tutors,
            },
            days: p.days,
            start_min: LUNCH_START_MIN,
            end_min: LUNCH_END_MIN,
        })
    }
}

impl ConstraintKind for LunchBreakKind {
    fn name(&self) -> &'static str {
        KIND
    }

    fn parent(&self) -> Option<&'static str> {
        Some(avoid_time_window::KIND)
    }

    fn description(&self) -> &'static str {
        "午休时段不排课"
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
