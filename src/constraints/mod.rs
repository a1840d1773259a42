// ==========================================
// 排课引擎 - 约束种类与能力契约
// ==========================================
// 每个约束种类可选实现三项能力:
// - pre_analyse: 不经求解器的必要条件检查
// - is_satisfied_for: 对已物化版本的满足性检查
// - contribute_to_model: 向优化模型添加硬约束/软约束项
// 未实现的能力返回 Capability::Unsupported ("无意见"), 调用方据此分支, 不视为错误
// ==========================================

pub mod avoid_time_window;
pub mod course_order;
pub mod limit_courses_per_day;
pub mod lunch_break;
pub mod registry;
pub mod tutor_availability;

use crate::domain::constraint::ConstraintInstance;
use crate::domain::course::Course;
use crate::domain::report::{FeasibilityReport, Violation};
use crate::domain::timetable::ScheduledCourse;
use crate::engine::context::ScopeData;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::model::ModelBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use registry::{ActiveConstraint, ConstraintRegistry, KindInfo};

/// 能力标记: 种类是否实现某项能力
#[derive(Debug, Clone, PartialEq)]
pub enum Capability<T> {
    Unsupported,
    Supported(T),
}

impl<T> Capability<T> {
    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported(_))
    }
}

/// 约束种类描述符
pub trait ConstraintKind: Send + Sync {
    /// 注册表键, 与 constraint_instance.kind 对应
    fn name(&self) -> &'static str;

    /// 被特化的父种类
    fn parent(&self) -> Option<&'static str> {
        None
    }

    /// 面向维护人员的一句话说明
    fn description(&self) -> &'static str {
        ""
    }

    fn pre_analyse(
        &self,
        _instance: &ConstraintInstance,
        _data: &ScopeData,
    ) -> Capability<EngineResult<FeasibilityReport>> {
        Capability::Unsupported
    }

    /// Ok(None) 表示满足
    fn is_satisfied_for(
        &self,
        _instance: &ConstraintInstance,
        _data: &ScopeData,
        _placements: &[ScheduledCourse],
    ) -> Capability<EngineResult<Option<Violation>>> {
        Capability::Unsupported
    }

    fn contribute_to_model(
        &self,
        _instance: &ConstraintInstance,
        _builder: &mut ModelBuilder,
    ) -> Capability<EngineResult<()>> {
        Capability::Unsupported
    }
}

/// 解析实例参数, 失败即为畸形实例
pub(crate) fn parse_params<T: DeserializeOwned>(instance: &ConstraintInstance) -> EngineResult<T> {
    instance
        .parse_params::<T>()
        .map_err(|reason| EngineError::malformed(&instance.constraint_id, format!("参数解析失败: {}", reason)))
}

/// 学生组/教师选择器 (两者均空 = 范围内全部课程)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSelector {
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub tutors: Vec<String>,
}

impl ResourceSelector {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.tutors.is_empty()
    }

    /// 课程 (及其选定教师) 是否被选中
    pub fn selects(&self, course: Option<&Course>, tutor: Option<&str>) -> bool {
        if self.is_empty() {
            return true;
        }
        let by_group = course
            .map(|c| c.groups.iter().any(|g| self.groups.contains(g)))
            .unwrap_or(false);
        let by_tutor = tutor.map(|t| self.tutors.iter().any(|x| x == t)).unwrap_or(false);
        by_group || by_tutor
    }
}

/// 用于消息输出的落位描述
pub(crate) fn describe_placement(p: &ScheduledCourse) -> String {
    format!("{}@{} {}-{}", p.course_id, p.day, format_minute(p.start_min), format_minute(p.end_min()))
}

pub(crate) fn format_minute(minute: i32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::scope::{SchedulingScope, TimeGrid};
    use serde_json::Value;

    pub fn instance(kind: &str, params: Value, weight: Option<f64>) -> ConstraintInstance {
        ConstraintInstance {
            constraint_id: format!("{}-1", kind),
            kind: kind.to_string(),
            department: "INFO".to_string(),
            periods: vec![],
            weight,
            is_active: true,
            params,
            comment: None,
        }
    }

    pub fn course(id: &str, module: &str, course_type: &str, duration_min: i32, groups: &[&str], tutors: &[&str]) -> Course {
        Course {
            course_id: id.to_string(),
            department: "INFO".to_string(),
            period: "W10".to_string(),
            module: module.to_string(),
            course_type: course_type.to_string(),
            duration_min,
            groups: groups.iter().map(|s| s.to_string()).collect(),
            tutors: tutors.iter().map(|s| s.to_string()).collect(),
            rooms: vec![],
        }
    }

    pub fn placement(course_id: &str, day: &str, start_min: i32, duration_min: i32, tutor: Option<&str>) -> ScheduledCourse {
        ScheduledCourse {
            scheduled_id: format!("s-{}", course_id),
            course_id: course_id.to_string(),
            department: "INFO".to_string(),
            period: "W10".to_string(),
            major: 0,
            minor: 0,
            day: day.to_string(),
            start_min,
            duration_min,
            room: None,
            tutor: tutor.map(|t| t.to_string()),
        }
    }

    pub fn data(courses: Vec<Course>) -> ScopeData {
        ScopeData::new(SchedulingScope::new("INFO", "W10"), TimeGrid::default(), courses, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_selector() {
        let c = course("c1", "ALGO", "TD", 90, &["G1"], &["ALB"]);
        assert!(ResourceSelector::default().selects(Some(&c), None));

        let by_group = ResourceSelector {
            groups: vec!["G1".to_string()],
            tutors: vec![],
        };
        assert!(by_group.selects(Some(&c), None));

        let by_tutor = ResourceSelector {
            groups: vec![],
            tutors: vec!["BOB".to_string()],
        };
        assert!(!by_tutor.selects(Some(&c), Some("ALB")));
        assert!(by_tutor.selects(None, Some("BOB")));
    }
}
