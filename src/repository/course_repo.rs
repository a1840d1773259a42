// ==========================================
// 排课引擎 - 课程与教师可用时间仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 课程/可用时间由外部协作方写入, 引擎只读; 写入方法供宿主应用与测试使用
// ==========================================

use crate::db::SharedConnection;
use crate::domain::course::{Course, TutorAvailability};
use crate::domain::scope::SchedulingScope;
use crate::repository::error::{encode_json_column, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};

/// JSON 列解析为 rusqlite 错误（在 map_row 内使用）
fn json_list(idx: usize, raw: String) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ==========================================
// CourseRepository - 课程仓储
// ==========================================
pub struct CourseRepository {
    conn: SharedConnection,
}

impl CourseRepository {
    /// 创建新的CourseRepository实例
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入课程 (UPSERT)
    pub fn batch_upsert(&self, courses: &[Course]) -> RepositoryResult<usize> {
        if courses.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"INSERT OR REPLACE INTO course (
                        course_id, department, period, module, course_type,
                        duration_min, groups_json, tutors_json, rooms_json
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )?;

            for course in courses {
                stmt.execute(params![
                    &course.course_id,
                    &course.department,
                    &course.period,
                    &course.module,
                    &course.course_type,
                    &course.duration_min,
                    encode_json_column("groups_json", &course.groups)?,
                    encode_json_column("tutors_json", &course.tutors)?,
                    encode_json_column("rooms_json", &course.rooms)?,
                ])?;
            }
        }

        tx.commit()?;
        Ok(courses.len())
    }

    /// 查询排课范围内的所有课程 (按 course_id 排序, 保证求解输入稳定)
    pub fn find_by_scope(&self, scope: &SchedulingScope) -> RepositoryResult<Vec<Course>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT course_id, department, period, module, course_type,
                      duration_min, groups_json, tutors_json, rooms_json
               FROM course
               WHERE department = ? AND period = ?
               ORDER BY course_id"#,
        )?;

        let courses = stmt
            .query_map(params![&scope.department, &scope.period], |row| Self::map_row(row))?
            .collect::<Result<Vec<Course>, _>>()?;

        Ok(courses)
    }

    /// 判断部门是否存在任何课程 (用于区分"部门不存在"与"周期无课")
    pub fn department_exists(&self, department: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM course WHERE department = ?",
            params![department],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 删除课程
    pub fn delete(&self, course_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM course WHERE course_id = ?", params![course_id])?;
        Ok(())
    }

    /// 映射数据库行到Course对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Course> {
        Ok(Course {
            course_id: row.get(0)?,
            department: row.get(1)?,
            period: row.get(2)?,
            module: row.get(3)?,
            course_type: row.get(4)?,
            duration_min: row.get(5)?,
            groups: json_list(6, row.get(6)?)?,
            tutors: json_list(7, row.get(7)?)?,
            rooms: json_list(8, row.get(8)?)?,
        })
    }
}

// ==========================================
// AvailabilityRepository - 教师可用时段仓储
// ==========================================
pub struct AvailabilityRepository {
    conn: SharedConnection,
}

impl AvailabilityRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 覆盖写入某教师在某周期的可用时段
    pub fn replace_for_tutor(
        &self,
        scope: &SchedulingScope,
        tutor: &str,
        slots: &[TutorAvailability],
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM tutor_availability WHERE department = ? AND period = ? AND tutor = ?",
            params![&scope.department, &scope.period, tutor],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO tutor_availability (
                        department, period, tutor, day, start_min, duration_min
                    ) VALUES (?, ?, ?, ?, ?, ?)"#,
            )?;
            for slot in slots {
                stmt.execute(params![
                    &scope.department,
                    &scope.period,
                    tutor,
                    &slot.day,
                    &slot.start_min,
                    &slot.duration_min,
                ])?;
            }
        }

        tx.commit()?;
        Ok(slots.len())
    }

    /// 查询排课范围内所有教师可用时段
    pub fn find_by_scope(&self, scope: &SchedulingScope) -> RepositoryResult<Vec<TutorAvailability>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT department, period, tutor, day, start_min, duration_min
               FROM tutor_availability
               WHERE department = ? AND period = ?
               ORDER BY tutor, day, start_min"#,
        )?;

        let slots = stmt
            .query_map(params![&scope.department, &scope.period], |row| {
                Ok(TutorAvailability {
                    department: row.get(0)?,
                    period: row.get(1)?,
                    tutor: row.get(2)?,
                    day: row.get(3)?,
                    start_min: row.get(4)?,
                    duration_min: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<TutorAvailability>, _>>()?;

        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;

    fn make_course(course_id: &str, period: &str) -> Course {
        Course {
            course_id: course_id.to_string(),
            department: "INFO".to_string(),
            period: period.to_string(),
            module: "ALGO".to_string(),
            course_type: "TD".to_string(),
            duration_min: 90,
            groups: vec!["G1".to_string()],
            tutors: vec!["ALB".to_string()],
            rooms: vec!["R101".to_string(), "R102".to_string()],
        }
    }

    #[test]
    fn test_batch_upsert_and_find_by_scope() {
        let repo = CourseRepository::new(open_in_memory_shared().unwrap());
        repo.batch_upsert(&[
            make_course("c2", "W10"),
            make_course("c1", "W10"),
            make_course("c3", "W11"),
        ])
        .unwrap();

        let found = repo.find_by_scope(&SchedulingScope::new("INFO", "W10")).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].course_id, "c1");
        assert_eq!(found[0].rooms, vec!["R101".to_string(), "R102".to_string()]);
        assert!(repo.department_exists("INFO").unwrap());
        assert!(!repo.department_exists("MATH").unwrap());
    }

    #[test]
    fn test_replace_availability() {
        let repo = AvailabilityRepository::new(open_in_memory_shared().unwrap());
        let scope = SchedulingScope::new("INFO", "W10");
        let slot = TutorAvailability {
            department: "INFO".to_string(),
            period: "W10".to_string(),
            tutor: "ALB".to_string(),
            day: "mon".to_string(),
            start_min: 480,
            duration_min: 60,
        };
        repo.replace_for_tutor(&scope, "ALB", &[slot.clone(), slot.clone()]).unwrap();
        repo.replace_for_tutor(&scope, "ALB", &[slot]).unwrap();
        assert_eq!(repo.find_by_scope(&scope).unwrap().len(), 1);
    }
}
