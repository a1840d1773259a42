// ==========================================
// 约束种类: limit_courses_per_day
// ==========================================
// 参数: {"groups": ["G1"], "tutors": ["ALB"], "max_per_day": 3}
// 语义: 每个被列出的学生组/教师, 每个教学日的课程数不超过 max_per_day
// 能力: 预分析 / 满足性 / 建模
// ==========================================

use crate::constraints::{parse_params, Capability, ConstraintKind};
use crate::domain::constraint::ConstraintInstance;
use crate::domain::report::{FeasibilityReport, Violation};
use crate::domain::timetable::ScheduledCourse;
use crate::engine::context::ScopeData;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::model::{Comparison, LinearExpr, ModelBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const KIND: &str = "limit_courses_per_day";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    tutors: Vec<String>,
    max_per_day: i32,
}

/// 受限对象
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Target {
    Group(String),
    Tutor(String),
}

impl Target {
    fn label(&self) -> String {
        match self {
            Target::Group(g) => format!("学生组 {}", g),
            Target::Tutor(t) => format!("教师 {}", t),
        }
    }
}

fn params(instance: &ConstraintInstance) -> EngineResult<(Vec<Target>, i32)> {
    let p: Params = parse_params(instance)?;
    if p.max_per_day < 0 {
        return Err(EngineError::malformed(
            &instance.constraint_id,
            format!("max_per_day 不能为负: {}", p.max_per_day),
        ));
    }
    if p.groups.is_empty() && p.tutors.is_empty() {
        return Err(EngineError::malformed(&instance.constraint_id, "groups 与 tutors 不能同时为空"));
    }
    let targets = p
        .groups
        .into_iter()
        .map(Target::Group)
        .chain(p.tutors.into_iter().map(Target::Tutor))
        .collect();
    Ok((targets, p.max_per_day))
}

pub struct LimitCoursesPerDayKind;

impl LimitCoursesPerDayKind {
    fn analyse(&self, instance: &ConstraintInstance, data: &ScopeData) -> EngineResult<FeasibilityReport> {
        let (targets, max_per_day) = params(instance)?;
        let capacity = max_per_day as usize * data.grid.day_count();

        let mut messages = Vec::new();
        for target in &targets {
            // 教师只统计唯一可选教师为其的课程
            let required = data
                .courses
                .iter()
                .filter(|c| match target {
                    Target::Group(g) => c.groups.contains(g),
                    Target::Tutor(t) => c.sole_tutor() == Some(t.as_str()),
                })
                .count();
            if required > capacity {
                messages.push(format!(
                    "{} 共 {} 门课，每天至多 {} 门 × {} 天 = {}",
                    target.label(),
                    required,
                    max_per_day,
                    data.grid.day_count(),
                    capacity
                ));
            }
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
        let (targets, max_per_day) = params(instance)?;

        let mut counts: BTreeMap<(Target, String), usize> = BTreeMap::new();
        for p in placements {
            let groups = data.course(&p.course_id).map(|c| c.groups.as_slice()).unwrap_or(&[]);
            for target in &targets {
                let hit = match target {
                    Target::Group(g) => groups.contains(g),
                    Target::Tutor(t) => p.tutor.as_deref() == Some(t.as_str()),
                };
                if hit {
                    *counts.entry((target.clone(), p.day.to_lowercase())).or_default() += 1;
                }
            }
        }

        let over: Vec<String> = counts
            .into_iter()
            .filter(|(_, n)| *n > max_per_day as usize)
            .map(|((target, day), n)| format!("{} 在 {} 有 {} 门课", target.label(), day, n))
            .collect();

        if over.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Violation::of(
                instance,
                format!("超过每日上限 {}: {}", max_per_day, over.join("; ")),
            )))
        }
    }

    fn encode(&self, instance: &ConstraintInstance, builder: &mut ModelBuilder) -> EngineResult<()> {
        let (targets, max_per_day) = params(instance)?;
        let day_count = builder.data().grid.day_count();

        for target in &targets {
            for day in 0..day_count {
                let vars = builder.vars_where(|var, course| {
                    var.day == day
                        && match target {
                            Target::Group(g) => course.groups.contains(g),
                            Target::Tutor(t) => var.tutor.as_deref() == Some(t.as_str()),
                        }
                });
                if vars.len() <= max_per_day as usize {
                    continue;
                }
                builder.add_policy(instance, LinearExpr::sum_of(vars), Comparison::Le, max_per_day as f64)?;
            }
        }
        Ok(())
    }
}

impl ConstraintKind for LimitCoursesPerDayKind {
    fn name(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "学生组/教师每日课程数上限"
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
