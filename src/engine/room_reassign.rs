// ==========================================
// 排课引擎 - 教室重排
// ==========================================
// 职责: 求解后在时间/教师固定的前提下重新挑选教室
// 目标: 同一学生组同日相邻课程尽量不换教室, 其次优先课程靠前的教室
// 规则:
// - 候选教室必须属于课程的可选教室, 且不被其他重叠落位占用
// - 当前教室始终有效, 只有严格更优时才切换
// - 多轮贪心, 无改进即停止
// 结果产生新的 minor, 从不产生新的 major
// ==========================================

use crate::domain::timetable::ScheduledCourse;
use crate::engine::context::ScopeData;

const MAX_PASSES: usize = 16;
const CHANGE_PENALTY: i64 = 100;

/// 教室重排结果
#[derive(Debug, Clone)]
pub struct RoomRevision {
    pub placements: Vec<ScheduledCourse>,
    pub changed: usize,
    pub passes: usize,
}

pub struct RoomReassigner<'d> {
    data: &'d ScopeData,
}

impl<'d> RoomReassigner<'d> {
    pub fn new(data: &'d ScopeData) -> Self {
        Self { data }
    }

    /// 重排教室; 没有任何教室变化时返回 None
    pub fn reassign(&self, placements: &[ScheduledCourse]) -> Option<RoomRevision> {
        let mut current: Vec<ScheduledCourse> = placements.to_vec();
        let mut passes = 0;

        while passes < MAX_PASSES {
            passes += 1;
            let mut improved = false;

            for i in 0..current.len() {
                let Some(course) = self.data.course(&current[i].course_id) else {
                    continue;
                };
                if course.rooms.len() < 2 {
                    continue;
                }

                let here = self.score(&current, i, current[i].room.as_deref());
                let mut best: Option<(i64, &String)> = None;
                for room in &course.rooms {
                    if current[i].room.as_deref() == Some(room.as_str()) {
                        continue;
                    }
                    if self.room_taken(&current, i, room) {
                        continue;
                    }
                    let s = self.score(&current, i, Some(room));
                    if s < here && best.map(|(b, _)| s < b).unwrap_or(true) {
                        best = Some((s, room));
                    }
                }

                if let Some((_, room)) = best {
                    current[i].room = Some(room.clone());
                    improved = true;
                }
            }

            if !improved {
                break;
            }
        }

        let changed = current
            .iter()
            .zip(placements)
            .filter(|(a, b)| a.room != b.room)
            .count();
        tracing::debug!(changed, passes, "教室重排完成");

        if changed == 0 {
            None
        } else {
            Some(RoomRevision {
                placements: current,
                changed,
                passes,
            })
        }
    }

    fn room_taken(&self, placements: &[ScheduledCourse], idx: usize, room: &str) -> bool {
        let target = &placements[idx];
        placements
            .iter()
            .enumerate()
            .any(|(j, p)| j != idx && p.room.as_deref() == Some(room) && p.overlaps(target))
    }

    /// 教室 room 用于 placements[idx] 时的局部代价
    fn score(&self, placements: &[ScheduledCourse], idx: usize, room: Option<&str>) -> i64 {
        let target = &placements[idx];
        let Some(course) = self.data.course(&target.course_id) else {
            return 0;
        };

        let pref = room
            .and_then(|r| course.rooms.iter().position(|c| c == r))
            .unwrap_or(course.rooms.len()) as i64;

        let mut changes = 0i64;
        for group in &course.groups {
            let (before, after) = self.neighbours(placements, idx, group);
            for neighbour in [before, after].into_iter().flatten() {
                if let (Some(mine), Some(theirs)) = (room, placements[neighbour].room.as_deref()) {
                    if mine != theirs {
                        changes += 1;
                    }
                }
            }
        }

        changes * CHANGE_PENALTY + pref
    }

    /// 同一学生组同日的前一个与后一个落位
    fn neighbours(&self, placements: &[ScheduledCourse], idx: usize, group: &str) -> (Option<usize>, Option<usize>) {
        let target = &placements[idx];
        let mut before: Option<usize> = None;
        let mut after: Option<usize> = None;

        for (j, p) in placements.iter().enumerate() {
            if j == idx || !p.day.eq_ignore_ascii_case(&target.day) {
                continue;
            }
            let attends = self
                .data
                .course(&p.course_id)
                .map(|c| c.groups.iter().any(|g| g == group))
                .unwrap_or(false);
            if !attends {
                continue;
            }
            if p.end_min() <= target.start_min {
                if before.map(|b| placements[b].end_min() < p.end_min()).unwrap_or(true) {
                    before = Some(j);
                }
            } else if p.start_min >= target.end_min() {
                if after.map(|a| placements[a].start_min > p.start_min).unwrap_or(true) {
                    after = Some(j);
                }
            }
        }
        (before, after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::test_support::{course, data, placement};
    use std::collections::HashMap;

    fn rooms_by_course(placements: &[ScheduledCourse]) -> HashMap<&str, Option<&str>> {
        placements
            .iter()
            .map(|p| (p.course_id.as_str(), p.room.as_deref()))
            .collect()
    }

    fn with_room(mut p: ScheduledCourse, room: &str) -> ScheduledCourse {
        p.room = Some(room.to_string());
        p
    }

    #[test]
    fn test_consecutive_group_courses_share_room() {
        let mut c1 = course("c1", "ALGO", "TD", 90, &["G1"], &[]);
        c1.rooms = vec!["R1".to_string(), "R2".to_string()];
        let mut c2 = course("c2", "ALGO", "TD", 90, &["G1"], &[]);
        c2.rooms = vec!["R2".to_string(), "R1".to_string()];
        let d = data(vec![c1, c2]);

        let placements = vec![
            with_room(placement("c1", "mon", 480, 90, None), "R1"),
            with_room(placement("c2", "mon", 570, 90, None), "R2"),
        ];
        let revision = RoomReassigner::new(&d).reassign(&placements).unwrap();
        let rooms = rooms_by_course(&revision.placements);
        assert_eq!(rooms["c1"], rooms["c2"]);
        assert_eq!(revision.changed, 1);
    }

    #[test]
    fn test_no_change_returns_none() {
        let mut c1 = course("c1", "ALGO", "TD", 90, &["G1"], &[]);
        c1.rooms = vec!["R1".to_string(), "R2".to_string()];
        let d = data(vec![c1]);
        let placements = vec![with_room(placement("c1", "mon", 480, 90, None), "R1")];
        assert!(RoomReassigner::new(&d).reassign(&placements).is_none());
    }

    #[test]
    fn test_occupied_room_is_not_chosen() {
        let mut c1 = course("c1", "ALGO", "TD", 90, &["G1"], &[]);
        c1.rooms = vec!["R1".to_string(), "R2".to_string()];
        let mut c2 = course("c2", "ALGO", "TD", 90, &["G2"], &[]);
        c2.rooms = vec!["R1".to_string()];
        let d = data(vec![c1, c2]);

        // c1 偏好 R1, 但 R1 同时被 c2 占用
        let placements = vec![
            with_room(placement("c1", "mon", 480, 90, None), "R2"),
            with_room(placement("c2", "mon", 480, 90, None), "R1"),
        ];
        assert!(RoomReassigner::new(&d).reassign(&placements).is_none());
    }
}
