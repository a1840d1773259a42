// ==========================================
// 排课引擎 - 课表版本仓储
// ==========================================
// 职责: timetable_version / scheduled_course / published_version 三表访问
// 红线:
// - 所有多行写操作必须在单个事务内完成
// - 每个 (department, period) 至多一个发布指针, 指针只在本仓储内改写
// - 已物化版本的落位行不被改写, 只会被整体删除
// ==========================================

use crate::db::SharedConnection;
use crate::domain::scope::SchedulingScope;
use crate::domain::timetable::{ScheduledCourse, TimetableVersion};
use crate::domain::types::SolveStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 新版本的求解元信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionMeta {
    pub solve_status: Option<SolveStatus>,
    pub objective: Option<f64>,
    pub backend: Option<String>,
}

/// 删除 major 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorDeletion {
    Deleted { versions: usize, placements: usize },
    NotFound,
    Published,
}

/// 交换发布指针的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Swapped { published: i32 },
    MissingMajor(i32),
    NeitherPublished,
}

// ==========================================
// TimetableRepository - 课表版本仓储
// ==========================================
pub struct TimetableRepository {
    conn: SharedConnection,
}

impl TimetableRepository {
    /// 创建新的TimetableRepository实例
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写操作
    // ==========================================

    /// 创建新的 major (minor = 0) 并写入落位
    ///
    /// 说明：
    /// - 在同一事务内查询 MAX(major) 并写入，保证 major 分配原子性
    /// - 范围内尚无发布版本时，新 major 自动成为发布版本
    /// - 传入落位的 period/major/minor 会被覆盖
    pub fn create_next_major(
        &self,
        scope: &SchedulingScope,
        meta: &VersionMeta,
        placements: Vec<ScheduledCourse>,
    ) -> RepositoryResult<TimetableVersion> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let version = Self::create_next_major_tx(&tx, scope, meta, placements)?;

        tx.commit()?;
        Ok(version)
    }

    /// 在多个范围下各创建一个新 major (单个事务, 全部成功或全部回滚)
    pub fn create_next_majors(
        &self,
        batches: Vec<(SchedulingScope, VersionMeta, Vec<ScheduledCourse>)>,
    ) -> RepositoryResult<Vec<TimetableVersion>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut versions = Vec::with_capacity(batches.len());
        for (scope, meta, placements) in batches {
            versions.push(Self::create_next_major_tx(&tx, &scope, &meta, placements)?);
        }

        tx.commit()?;
        Ok(versions)
    }

    /// 在已有 major 下创建下一个 minor 修订
    pub fn create_next_minor(
        &self,
        scope: &SchedulingScope,
        major: i32,
        meta: &VersionMeta,
        placements: Vec<ScheduledCourse>,
    ) -> RepositoryResult<TimetableVersion> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let minor = Self::latest_minor_tx(&tx, scope, major)?
            .map(|m| m + 1)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "TimetableVersion".to_string(),
                id: format!("{} v{}", scope, major),
            })?;

        let version = Self::insert_version(&tx, scope, major, minor, meta)?;
        Self::insert_placements(&tx, scope, major, minor, placements)?;

        tx.commit()?;
        Ok(version)
    }

    /// 将 major 的最新 minor 复制为新 major
    ///
    /// # 返回
    /// - `Ok(None)`: 源 major 不存在
    pub fn duplicate_major(
        &self,
        scope: &SchedulingScope,
        major: i32,
    ) -> RepositoryResult<Option<TimetableVersion>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let Some(minor) = Self::latest_minor_tx(&tx, scope, major)? else {
            return Ok(None);
        };
        let source = Self::find_version_tx(&tx, scope, major, minor)?.ok_or_else(|| {
            RepositoryError::InternalError(format!("版本行缺失: {} v{}.{}", scope, major, minor))
        })?;
        let placements = Self::find_placements_tx(&tx, scope, major, minor)?;

        let new_major = Self::next_major_tx(&tx, scope)?;

        let meta = VersionMeta {
            solve_status: None,
            objective: source.objective,
            backend: source.backend.clone(),
        };
        let version = Self::insert_version(&tx, scope, new_major, 0, &meta)?;
        Self::insert_placements(&tx, scope, new_major, 0, placements)?;

        tx.commit()?;
        Ok(Some(version))
    }

    /// 将 major 设为发布版本
    ///
    /// # 返回
    /// - `Ok(previous)`: 此前的发布 major
    /// - `Err(NotFound)`: major 不存在
    pub fn promote(&self, scope: &SchedulingScope, major: i32) -> RepositoryResult<Option<i32>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        if !Self::major_exists_tx(&tx, scope, major)? {
            return Err(RepositoryError::NotFound {
                entity: "TimetableVersion".to_string(),
                id: format!("{} v{}", scope, major),
            });
        }

        let previous = Self::published_major_tx(&tx, scope)?;
        Self::set_published_tx(&tx, scope, major)?;

        tx.commit()?;
        Ok(previous)
    }

    /// 在两个 major 之间交换发布标记
    pub fn swap_published(&self, scope: &SchedulingScope, a: i32, b: i32) -> RepositoryResult<SwapOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        for major in [a, b] {
            if !Self::major_exists_tx(&tx, scope, major)? {
                return Ok(SwapOutcome::MissingMajor(major));
            }
        }

        let target = match Self::published_major_tx(&tx, scope)? {
            Some(p) if p == a => b,
            Some(p) if p == b => a,
            _ => return Ok(SwapOutcome::NeitherPublished),
        };
        Self::set_published_tx(&tx, scope, target)?;

        tx.commit()?;
        Ok(SwapOutcome::Swapped { published: target })
    }

    /// 删除 major 及其全部 minor 与落位（发布版本不可删除）
    pub fn delete_major(&self, scope: &SchedulingScope, major: i32) -> RepositoryResult<MajorDeletion> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        if !Self::major_exists_tx(&tx, scope, major)? {
            return Ok(MajorDeletion::NotFound);
        }
        if Self::published_major_tx(&tx, scope)? == Some(major) {
            return Ok(MajorDeletion::Published);
        }

        let (versions, placements) = Self::delete_major_tx(&tx, scope, major)?;

        tx.commit()?;
        Ok(MajorDeletion::Deleted { versions, placements })
    }

    /// 删除范围内除发布版本外的全部 major
    ///
    /// # 返回
    /// - `Ok(deleted_majors)`
    /// - `Err(BusinessRuleViolation)`: 存在版本但没有发布指针
    pub fn delete_all_unused(&self, scope: &SchedulingScope) -> RepositoryResult<Vec<i32>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let majors = Self::majors_tx(&tx, scope)?;
        if majors.is_empty() {
            return Ok(Vec::new());
        }
        let published = Self::published_major_tx(&tx, scope)?.ok_or_else(|| {
            RepositoryError::BusinessRuleViolation(format!("{} 存在版本但没有发布版本", scope))
        })?;

        let mut deleted = Vec::new();
        for major in majors.into_iter().filter(|m| *m != published) {
            Self::delete_major_tx(&tx, scope, major)?;
            deleted.push(major);
        }

        tx.commit()?;
        Ok(deleted)
    }

    // ==========================================
    // 读操作
    // ==========================================

    /// 查询发布 major
    pub fn published_major(&self, scope: &SchedulingScope) -> RepositoryResult<Option<i32>> {
        let conn = self.get_conn()?;
        Self::published_major_tx(&conn, scope)
    }

    /// 查询版本
    pub fn find_version(
        &self,
        scope: &SchedulingScope,
        major: i32,
        minor: i32,
    ) -> RepositoryResult<Option<TimetableVersion>> {
        let conn = self.get_conn()?;
        Self::find_version_tx(&conn, scope, major, minor)
    }

    /// 查询范围内所有版本 (major, minor 升序)
    pub fn find_versions(&self, scope: &SchedulingScope) -> RepositoryResult<Vec<TimetableVersion>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT department, period, major, minor, solve_status,
                      objective, backend, created_at
               FROM timetable_version
               WHERE department = ? AND period = ?
               ORDER BY major, minor"#,
        )?;

        let versions = stmt
            .query_map(params![&scope.department, &scope.period], |row| Self::map_version(row))?
            .collect::<Result<Vec<TimetableVersion>, _>>()?;

        Ok(versions)
    }

    /// 查询 major 的最新 minor
    pub fn latest_minor(&self, scope: &SchedulingScope, major: i32) -> RepositoryResult<Option<i32>> {
        let conn = self.get_conn()?;
        Self::latest_minor_tx(&conn, scope, major)
    }

    /// 查询版本的全部落位
    pub fn find_placements(
        &self,
        scope: &SchedulingScope,
        major: i32,
        minor: i32,
    ) -> RepositoryResult<Vec<ScheduledCourse>> {
        let conn = self.get_conn()?;
        Self::find_placements_tx(&conn, scope, major, minor)
    }

    // ==========================================
    // 事务内辅助函数
    // ==========================================
    // Transaction 解引用为 Connection, 读辅助函数统一接受 &Connection

    fn create_next_major_tx(
        tx: &Transaction,
        scope: &SchedulingScope,
        meta: &VersionMeta,
        placements: Vec<ScheduledCourse>,
    ) -> RepositoryResult<TimetableVersion> {
        let major = Self::next_major_tx(tx, scope)?;
        let version = Self::insert_version(tx, scope, major, 0, meta)?;
        Self::insert_placements(tx, scope, major, 0, placements)?;

        if Self::published_major_tx(tx, scope)?.is_none() {
            Self::set_published_tx(tx, scope, major)?;
        }
        Ok(version)
    }

    /// 发放下一个 major 编号 (已删除的编号不会再次发放)
    fn next_major_tx(tx: &Transaction, scope: &SchedulingScope) -> RepositoryResult<i32> {
        let issued: Option<i32> = tx
            .query_row(
                "SELECT last_major FROM major_sequence WHERE department = ? AND period = ?",
                params![&scope.department, &scope.period],
                |row| row.get(0),
            )
            .optional()?;
        // 序列表出现之前写入的版本只能从现存行推断
        let max_major: Option<i32> = tx.query_row(
            "SELECT MAX(major) FROM timetable_version WHERE department = ? AND period = ?",
            params![&scope.department, &scope.period],
            |row| row.get(0),
        )?;

        let next = issued.max(max_major).map(|m| m + 1).unwrap_or(0);
        tx.execute(
            "INSERT INTO major_sequence (department, period, last_major) VALUES (?1, ?2, ?3)
             ON CONFLICT(department, period) DO UPDATE SET last_major = ?3",
            params![&scope.department, &scope.period, next],
        )?;
        Ok(next)
    }

    fn insert_version(
        tx: &Transaction,
        scope: &SchedulingScope,
        major: i32,
        minor: i32,
        meta: &VersionMeta,
    ) -> RepositoryResult<TimetableVersion> {
        let created_at = chrono::Local::now().naive_local();
        tx.execute(
            r#"INSERT INTO timetable_version (
                department, period, major, minor, solve_status,
                objective, backend, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &scope.department,
                &scope.period,
                major,
                minor,
                meta.solve_status.map(|s| s.to_db_str()),
                meta.objective,
                &meta.backend,
                created_at.format(TS_FORMAT).to_string(),
            ],
        )?;

        Ok(TimetableVersion {
            department: scope.department.clone(),
            period: scope.period.clone(),
            major,
            minor,
            solve_status: meta.solve_status,
            objective: meta.objective,
            backend: meta.backend.clone(),
            created_at,
        })
    }

    fn insert_placements(
        tx: &Transaction,
        scope: &SchedulingScope,
        major: i32,
        minor: i32,
        placements: Vec<ScheduledCourse>,
    ) -> RepositoryResult<usize> {
        let mut stmt = tx.prepare(
            r#"INSERT INTO scheduled_course (
                    scheduled_id, course_id, department, period, major, minor,
                    day, start_min, duration_min, room, tutor
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )?;

        // 落位不跨版本共享身份, 每次写入都分配新 scheduled_id
        let count = placements.len();
        for p in placements {
            stmt.execute(params![
                uuid::Uuid::new_v4().to_string(),
                &p.course_id,
                &scope.department,
                &scope.period,
                major,
                minor,
                &p.day,
                p.start_min,
                p.duration_min,
                &p.room,
                &p.tutor,
            ])?;
        }
        Ok(count)
    }

    fn delete_major_tx(tx: &Transaction, scope: &SchedulingScope, major: i32) -> RepositoryResult<(usize, usize)> {
        // 显式删除落位（避免依赖 foreign_keys 配置）
        let placements = tx.execute(
            "DELETE FROM scheduled_course WHERE department = ? AND period = ? AND major = ?",
            params![&scope.department, &scope.period, major],
        )?;
        let versions = tx.execute(
            "DELETE FROM timetable_version WHERE department = ? AND period = ? AND major = ?",
            params![&scope.department, &scope.period, major],
        )?;
        Ok((versions, placements))
    }

    fn set_published_tx(tx: &Transaction, scope: &SchedulingScope, major: i32) -> RepositoryResult<()> {
        tx.execute(
            r#"INSERT INTO published_version (department, period, major, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(department, period)
               DO UPDATE SET major = excluded.major, updated_at = excluded.updated_at"#,
            params![
                &scope.department,
                &scope.period,
                major,
                chrono::Local::now().naive_local().format(TS_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    fn published_major_tx(conn: &Connection, scope: &SchedulingScope) -> RepositoryResult<Option<i32>> {
        let major = conn
            .query_row(
                "SELECT major FROM published_version WHERE department = ? AND period = ?",
                params![&scope.department, &scope.period],
                |row| row.get(0),
            )
            .optional()?;
        Ok(major)
    }

    fn major_exists_tx(conn: &Connection, scope: &SchedulingScope, major: i32) -> RepositoryResult<bool> {
        Ok(Self::latest_minor_tx(conn, scope, major)?.is_some())
    }

    fn majors_tx(conn: &Connection, scope: &SchedulingScope) -> RepositoryResult<Vec<i32>> {
        let mut stmt = conn.prepare(
            r#"SELECT DISTINCT major FROM timetable_version
               WHERE department = ? AND period = ?
               ORDER BY major"#,
        )?;
        let majors = stmt
            .query_map(params![&scope.department, &scope.period], |row| row.get(0))?
            .collect::<Result<Vec<i32>, _>>()?;
        Ok(majors)
    }

    fn latest_minor_tx(conn: &Connection, scope: &SchedulingScope, major: i32) -> RepositoryResult<Option<i32>> {
        let minor: Option<i32> = conn.query_row(
            r#"SELECT MAX(minor) FROM timetable_version
               WHERE department = ? AND period = ? AND major = ?"#,
            params![&scope.department, &scope.period, major],
            |row| row.get(0),
        )?;
        Ok(minor)
    }

    fn find_version_tx(
        conn: &Connection,
        scope: &SchedulingScope,
        major: i32,
        minor: i32,
    ) -> RepositoryResult<Option<TimetableVersion>> {
        let version = conn
            .query_row(
                r#"SELECT department, period, major, minor, solve_status,
                          objective, backend, created_at
                   FROM timetable_version
                   WHERE department = ? AND period = ? AND major = ? AND minor = ?"#,
                params![&scope.department, &scope.period, major, minor],
                |row| Self::map_version(row),
            )
            .optional()?;
        Ok(version)
    }

    fn find_placements_tx(
        conn: &Connection,
        scope: &SchedulingScope,
        major: i32,
        minor: i32,
    ) -> RepositoryResult<Vec<ScheduledCourse>> {
        let mut stmt = conn.prepare(
            r#"SELECT scheduled_id, course_id, department, period, major, minor,
                      day, start_min, duration_min, room, tutor
               FROM scheduled_course
               WHERE department = ? AND period = ? AND major = ? AND minor = ?
               ORDER BY course_id"#,
        )?;

        let placements = stmt
            .query_map(params![&scope.department, &scope.period, major, minor], |row| {
                Ok(ScheduledCourse {
                    scheduled_id: row.get(0)?,
                    course_id: row.get(1)?,
                    department: row.get(2)?,
                    period: row.get(3)?,
                    major: row.get(4)?,
                    minor: row.get(5)?,
                    day: row.get(6)?,
                    start_min: row.get(7)?,
                    duration_min: row.get(8)?,
                    room: row.get(9)?,
                    tutor: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<ScheduledCourse>, _>>()?;

        Ok(placements)
    }

    /// 映射数据库行到TimetableVersion对象
    fn map_version(row: &rusqlite::Row) -> rusqlite::Result<TimetableVersion> {
        Ok(TimetableVersion {
            department: row.get(0)?,
            period: row.get(1)?,
            major: row.get(2)?,
            minor: row.get(3)?,
            solve_status: row
                .get::<_, Option<String>>(4)?
                .map(|s| SolveStatus::from_str(&s)),
            objective: row.get(5)?,
            backend: row.get(6)?,
            created_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(7)?, TS_FORMAT)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e)))?,
        })
    }
}
