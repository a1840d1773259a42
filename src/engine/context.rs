// ==========================================
// 排课引擎 - 排课范围数据快照
// ==========================================
// 职责: 一次加载 (department, period) 的课程、教师可用时段与时间网格
// 预分析、建模、校验共享同一份只读快照
// ==========================================

use crate::config::SchedulingConfigReader;
use crate::domain::course::{Course, TutorAvailability};
use crate::domain::scope::{SchedulingScope, TimeGrid};
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::course_repo::{AvailabilityRepository, CourseRepository};
use std::collections::HashMap;
use std::sync::Arc;

/// 合并后的教师可用区间 [start_min, end_min)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityWindow {
    pub day: String, // 小写星期
    pub start_min: i32,
    pub end_min: i32,
}

impl AvailabilityWindow {
    pub fn duration_min(&self) -> i32 {
        self.end_min - self.start_min
    }

    /// 判断 [start, end) 是否完全落在本区间内
    pub fn covers(&self, day: &str, start_min: i32, end_min: i32) -> bool {
        self.day.eq_ignore_ascii_case(day) && self.start_min <= start_min && end_min <= self.end_min
    }
}

/// 同一天内重叠或首尾相接的时段合并为一个区间
fn merge_windows(mut slots: Vec<TutorAvailability>) -> Vec<AvailabilityWindow> {
    slots.retain(|s| s.duration_min > 0);
    slots.sort_by(|a, b| {
        a.day
            .to_ascii_lowercase()
            .cmp(&b.day.to_ascii_lowercase())
            .then(a.start_min.cmp(&b.start_min))
    });

    let mut windows: Vec<AvailabilityWindow> = Vec::new();
    for slot in slots {
        let day = slot.day.to_ascii_lowercase();
        match windows.last_mut() {
            Some(last) if last.day == day && slot.start_min <= last.end_min => {
                last.end_min = last.end_min.max(slot.end_min());
            }
            _ => windows.push(AvailabilityWindow {
                day,
                start_min: slot.start_min,
                end_min: slot.end_min(),
            }),
        }
    }
    windows
}

/// 排课范围只读快照
#[derive(Debug, Clone)]
pub struct ScopeData {
    pub scope: SchedulingScope,
    pub grid: TimeGrid,
    pub courses: Vec<Course>,
    /// 教师 → 合并后的可用区间 (无记录的教师不受限)
    pub availability: HashMap<String, Vec<AvailabilityWindow>>,
}

impl ScopeData {
    pub fn new(
        scope: SchedulingScope,
        grid: TimeGrid,
        courses: Vec<Course>,
        availability: Vec<TutorAvailability>,
    ) -> Self {
        let mut by_tutor: HashMap<String, Vec<TutorAvailability>> = HashMap::new();
        for slot in availability {
            by_tutor.entry(slot.tutor.clone()).or_default().push(slot);
        }
        let availability = by_tutor
            .into_iter()
            .map(|(tutor, slots)| (tutor, merge_windows(slots)))
            .collect();
        Self {
            scope,
            grid,
            courses,
            availability,
        }
    }

    pub fn course(&self, course_id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.course_id == course_id)
    }

    /// 教师的可用区间; None 表示未声明 (不受限)
    pub fn tutor_slots(&self, tutor: &str) -> Option<&[AvailabilityWindow]> {
        self.availability
            .get(tutor)
            .map(|v| v.as_slice())
            .filter(|v| !v.is_empty())
    }

    /// 教师可用总分钟数 (重叠部分只计一次); None 表示不受限
    pub fn available_minutes(&self, tutor: &str) -> Option<i32> {
        self.tutor_slots(tutor)
            .map(|windows| windows.iter().map(AvailabilityWindow::duration_min).sum())
    }

    /// 教师在 [start, end) 是否可用
    pub fn is_tutor_available(&self, tutor: &str, day: &str, start_min: i32, end_min: i32) -> bool {
        match self.tutor_slots(tutor) {
            None => true,
            Some(windows) => windows.iter().any(|w| w.covers(day, start_min, end_min)),
        }
    }
}

// ==========================================
// ScopeLoader - 范围数据加载器
// ==========================================
pub struct ScopeLoader {
    course_repo: Arc<CourseRepository>,
    availability_repo: Arc<AvailabilityRepository>,
    config: Arc<dyn SchedulingConfigReader>,
}

impl ScopeLoader {
    pub fn new(
        course_repo: Arc<CourseRepository>,
        availability_repo: Arc<AvailabilityRepository>,
        config: Arc<dyn SchedulingConfigReader>,
    ) -> Self {
        Self {
            course_repo,
            availability_repo,
            config,
        }
    }

    /// 加载范围快照 (允许范围内无课程)
    pub fn load(&self, scope: &SchedulingScope) -> EngineResult<ScopeData> {
        let grid = self
            .config
            .time_grid(&scope.department)
            .map_err(EngineError::config)?;
        let courses = self.course_repo.find_by_scope(scope)?;
        let availability = self.availability_repo.find_by_scope(scope)?;

        tracing::debug!(
            scope = %scope,
            courses = courses.len(),
            availability_slots = availability.len(),
            days = grid.day_count(),
            "范围数据加载完成"
        );

        Ok(ScopeData::new(scope.clone(), grid, courses, availability))
    }

    /// 加载范围快照, 范围内无课程时报 ScopeNotFound
    pub fn load_required(&self, scope: &SchedulingScope) -> EngineResult<ScopeData> {
        let data = self.load(scope)?;
        if data.courses.is_empty() {
            return Err(EngineError::ScopeNotFound {
                scope: scope.clone(),
            });
        }
        Ok(data)
    }

    pub fn config(&self) -> &Arc<dyn SchedulingConfigReader> {
        &self.config
    }
}
