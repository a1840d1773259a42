// ==========================================
// 排课引擎 - 课表版本领域模型
// ==========================================
// major = 独立候选课表 (工作副本), minor = 同一 major 内的修订
// 发布指针不是版本行的属性, 由 published_version 表单独持有
// ==========================================

use crate::domain::scope::SchedulingScope;
use crate::domain::types::SolveStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// TimetableVersion - 课表版本
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimetableVersion {
    pub department: String,
    pub period: String,
    pub major: i32,                         // 工作副本号
    pub minor: i32,                         // 修订号
    pub solve_status: Option<SolveStatus>,  // 来自求解时记录状态, 复制产生的版本为 None
    pub objective: Option<f64>,             // 软约束代价
    pub backend: Option<String>,            // 求解后端名称
    pub created_at: NaiveDateTime,
}

impl TimetableVersion {
    pub fn scope(&self) -> SchedulingScope {
        SchedulingScope::new(self.department.clone(), self.period.clone())
    }

    pub fn label(&self) -> String {
        format!("{}/{} v{}.{}", self.department, self.period, self.major, self.minor)
    }
}

// ==========================================
// ScheduledCourse - 课程落位
// ==========================================
// 同一课程在不同版本中各有独立的落位行, 不共享身份
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCourse {
    pub scheduled_id: String,
    pub course_id: String,
    pub department: String,
    pub period: String,
    pub major: i32,
    pub minor: i32,
    pub day: String,
    pub start_min: i32,
    pub duration_min: i32,
    pub room: Option<String>,
    pub tutor: Option<String>,
}

impl ScheduledCourse {
    pub fn end_min(&self) -> i32 {
        self.start_min + self.duration_min
    }

    /// 两个落位在时间上是否重叠
    pub fn overlaps(&self, other: &ScheduledCourse) -> bool {
        self.day.eq_ignore_ascii_case(&other.day)
            && self.start_min < other.end_min()
            && other.start_min < self.end_min()
    }

    /// 复制为另一个版本下的新行
    pub fn clone_into(&self, period: &str, major: i32, minor: i32) -> ScheduledCourse {
        ScheduledCourse {
            scheduled_id: uuid::Uuid::new_v4().to_string(),
            period: period.to_string(),
            major,
            minor,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(day: &str, start_min: i32, duration_min: i32) -> ScheduledCourse {
        ScheduledCourse {
            scheduled_id: "s".to_string(),
            course_id: "c".to_string(),
            department: "INFO".to_string(),
            period: "2026-W10".to_string(),
            major: 0,
            minor: 0,
            day: day.to_string(),
            start_min,
            duration_min,
            room: None,
            tutor: None,
        }
    }

    #[test]
    fn test_overlaps() {
        let a = placement("mon", 480, 90);
        assert!(a.overlaps(&placement("mon", 540, 90)));
        assert!(!a.overlaps(&placement("mon", 570, 90)));
        assert!(!a.overlaps(&placement("tue", 480, 90)));
    }

    #[test]
    fn test_clone_into_new_identity() {
        let a = placement("mon", 480, 90);
        let b = a.clone_into("2026-W11", 3, 0);
        assert_ne!(a.scheduled_id, b.scheduled_id);
        assert_eq!(b.period, "2026-W11");
        assert_eq!((b.major, b.minor), (3, 0));
        assert_eq!(b.course_id, a.course_id);
    }
}
