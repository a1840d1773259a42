// ==========================================
// 排课引擎 - 课程与教师可用时间
// ==========================================
// 红线: 课程由外部协作方维护, 引擎只读
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Course - 待排课程
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: String,   // 课程ID
    pub department: String,  // 所属部门
    pub period: String,      // 所属周期
    pub module: String,      // 教学模块
    pub course_type: String, // 课程类型 (CM/TD/TP ...)
    pub duration_min: i32,   // 时长 (分钟)
    pub groups: Vec<String>, // 上课学生组
    pub tutors: Vec<String>, // 可选教师 (空 = 无需教师)
    pub rooms: Vec<String>,  // 可选教室 (空 = 无需教室)
}

impl Course {
    /// 唯一可选教师 (仅当候选教师只有一位时)
    pub fn sole_tutor(&self) -> Option<&str> {
        match self.tutors.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// 跨周期匹配用的等价键: 模块/类型/学生组/时长相同即视为同一门课
    pub fn equivalence_key(&self) -> (String, String, Vec<String>, i32) {
        let mut groups = self.groups.clone();
        groups.sort();
        (
            self.module.clone(),
            self.course_type.clone(),
            groups,
            self.duration_min,
        )
    }
}

// ==========================================
// TutorAvailability - 教师可用时段
// ==========================================
// 某周期内没有任何记录的教师视为不受限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorAvailability {
    pub department: String,
    pub period: String,
    pub tutor: String,
    pub day: String,
    pub start_min: i32,
    pub duration_min: i32,
}

impl TutorAvailability {
    pub fn end_min(&self) -> i32 {
        self.start_min + self.duration_min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(tutors: &[&str]) -> Course {
        Course {
            course_id: "c1".to_string(),
            department: "INFO".to_string(),
            period: "2026-W10".to_string(),
            module: "ALGO".to_string(),
            course_type: "TD".to_string(),
            duration_min: 90,
            groups: vec!["G2".to_string(), "G1".to_string()],
            tutors: tutors.iter().map(|t| t.to_string()).collect(),
            rooms: vec![],
        }
    }

    #[test]
    fn test_sole_tutor() {
        assert_eq!(course(&["ALB"]).sole_tutor(), Some("ALB"));
        assert_eq!(course(&["ALB", "BOB"]).sole_tutor(), None);
        assert_eq!(course(&[]).sole_tutor(), None);
    }

    #[test]
    fn test_equivalence_key_ignores_group_order() {
        let a = course(&["ALB"]);
        let mut b = course(&["BOB"]);
        b.groups.reverse();
        assert_eq!(a.equivalence_key(), b.equivalence_key());
    }
}
