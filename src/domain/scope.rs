// ==========================================
// 排课引擎 - 排课范围与时间网格
// ==========================================
// 排课范围 = (department, period), 所有查询和求解都以此为界
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// SchedulingScope - 排课范围
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchedulingScope {
    pub department: String, // 部门 (租户边界)
    pub period: String,     // 周期标识 (不透明, 如 "2026-W10")
}

impl SchedulingScope {
    pub fn new(department: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            department: department.into(),
            period: period.into(),
        }
    }

    /// 同部门的另一周期
    pub fn with_period(&self, period: impl Into<String>) -> Self {
        Self {
            department: self.department.clone(),
            period: period.into(),
        }
    }
}

impl fmt::Display for SchedulingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.department, self.period)
    }
}

// ==========================================
// TimeGrid - 部门时间网格
// ==========================================
// 课程只能在 slot_starts 上开始, 且不能越过 day_end_min
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeGrid {
    pub days: Vec<String>,    // 教学日 (如 mon..fri)
    pub slot_starts: Vec<i32>, // 可开始时刻 (距零点分钟数, 升序)
    pub day_end_min: i32,     // 每日结束时刻
}

impl Default for TimeGrid {
    fn default() -> Self {
        Self {
            days: ["mon", "tue", "wed", "thu", "fri"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            slot_starts: vec![480, 570, 660, 840, 930, 1020],
            day_end_min: 1110,
        }
    }
}

impl TimeGrid {
    /// 某时长课程在一天内的合法开始时刻
    pub fn starts_for(&self, duration_min: i32) -> impl Iterator<Item = i32> + '_ {
        self.slot_starts
            .iter()
            .copied()
            .filter(move |s| s + duration_min <= self.day_end_min)
    }

    /// 按名称查找教学日下标
    pub fn day_index(&self, day: &str) -> Option<usize> {
        self.days.iter().position(|d| d.eq_ignore_ascii_case(day))
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_for_respects_day_end() {
        let grid = TimeGrid::default();
        let starts: Vec<i32> = grid.starts_for(120).collect();
        // 1020 + 120 = 1140 > 1110
        assert_eq!(starts, vec![480, 570, 660, 840, 930]);
        assert_eq!(grid.day_index("WED"), Some(2));
        assert_eq!(grid.day_index("sun"), None);
    }
}
