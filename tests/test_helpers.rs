// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供集成测试所需的临时数据库、课程与约束样例数据
// ==========================================

#![allow(dead_code)]

use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use tempfile::NamedTempFile;
use timetable_engine::domain::{ConstraintInstance, Course, TutorAvailability};
use timetable_engine::TimetableApi;

pub const DEPT: &str = "INFO";
pub const PERIOD: &str = "2026-W10";

/// 创建临时测试数据库
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是合法 UTF-8")?
        .to_string();
    Ok((temp_file, db_path))
}

/// 在临时数据库上装配 TimetableApi
pub fn create_test_api() -> (NamedTempFile, Arc<TimetableApi>) {
    timetable_engine::logging::init_test();
    let (temp_file, db_path) = create_test_db().expect("创建临时数据库失败");
    let api = TimetableApi::open(&db_path).expect("初始化 TimetableApi 失败");
    (temp_file, Arc::new(api))
}

// ==========================================
// 样例数据
// ==========================================

pub fn course(
    course_id: &str,
    period: &str,
    module: &str,
    course_type: &str,
    duration_min: i32,
    groups: &[&str],
    tutors: &[&str],
    rooms: &[&str],
) -> Course {
    Course {
        course_id: course_id.to_string(),
        department: DEPT.to_string(),
        period: period.to_string(),
        module: module.to_string(),
        course_type: course_type.to_string(),
        duration_min,
        groups: groups.iter().map(|s| s.to_string()).collect(),
        tutors: tutors.iter().map(|s| s.to_string()).collect(),
        rooms: rooms.iter().map(|s| s.to_string()).collect(),
    }
}

/// 课程ID在全库唯一, 按周期加前缀
pub fn course_id(period: &str, base: &str) -> String {
    format!("{}:{}", period, base)
}

/// 小型一周课表: 两个学生组, 两位教师, 三间教室
pub fn small_week(period: &str) -> Vec<Course> {
    let id = |base: &str| course_id(period, base);
    vec![
        course(&id("ALGO-CM"), period, "ALGO", "CM", 90, &["G1", "G2"], &["ALB"], &["AMPHI"]),
        course(&id("ALGO-TD1"), period, "ALGO", "TD", 90, &["G1"], &["ALB", "BOB"], &["R101", "R102"]),
        course(&id("ALGO-TD2"), period, "ALGO", "TD", 90, &["G2"], &["ALB", "BOB"], &["R101", "R102"]),
        course(&id("WEB-CM"), period, "WEB", "CM", 90, &["G1", "G2"], &["BOB"], &["AMPHI"]),
        course(&id("WEB-TP1"), period, "WEB", "TP", 120, &["G1"], &["BOB"], &["R101"]),
    ]
}

pub fn availability(tutor: &str, period: &str, day: &str, start_min: i32, duration_min: i32) -> TutorAvailability {
    TutorAvailability {
        department: DEPT.to_string(),
        period: period.to_string(),
        tutor: tutor.to_string(),
        day: day.to_string(),
        start_min,
        duration_min,
    }
}

pub fn hard_constraint(constraint_id: &str, kind: &str, params: Value) -> ConstraintInstance {
    ConstraintInstance {
        constraint_id: constraint_id.to_string(),
        kind: kind.to_string(),
        department: DEPT.to_string(),
        periods: vec![],
        weight: None,
        is_active: true,
        params,
        comment: None,
    }
}

pub fn soft_constraint(constraint_id: &str, kind: &str, weight: f64, params: Value) -> ConstraintInstance {
    ConstraintInstance {
        weight: Some(weight),
        ..hard_constraint(constraint_id, kind, params)
    }
}

/// 写入小型一周课表并求解 n 次, 返回生成的 major
pub fn seed_and_solve(api: &TimetableApi, n: usize) -> Vec<i32> {
    api.upsert_courses(&small_week(PERIOD)).expect("写入课程失败");
    (0..n)
        .map(|_| {
            api.solve(DEPT, PERIOD, Default::default())
                .expect("求解失败")
                .version
                .major
        })
        .collect()
}
