// ==========================================
// 排课引擎 - SQLite 连接初始化与 schema
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 幂等建表，宿主应用与测试共用同一份 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// 共享连接类型
pub type SharedConnection = Arc<Mutex<Connection>>;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、建表并包装为共享连接
pub fn open_shared(db_path: &str) -> rusqlite::Result<SharedConnection> {
    let conn = open_sqlite_connection(db_path)?;
    ensure_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 内存库（测试用）
pub fn open_in_memory_shared() -> rusqlite::Result<SharedConnection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    ensure_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 幂等建表
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS course (
            course_id TEXT PRIMARY KEY,
            department TEXT NOT NULL,
            period TEXT NOT NULL,
            module TEXT NOT NULL,
            course_type TEXT NOT NULL,
            duration_min INTEGER NOT NULL,
            groups_json TEXT NOT NULL DEFAULT '[]',
            tutors_json TEXT NOT NULL DEFAULT '[]',
            rooms_json TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_course_scope ON course(department, period);

        CREATE TABLE IF NOT EXISTS tutor_availability (
            department TEXT NOT NULL,
            period TEXT NOT NULL,
            tutor TEXT NOT NULL,
            day TEXT NOT NULL,
            start_min INTEGER NOT NULL,
            duration_min INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_availability_scope
            ON tutor_availability(department, period, tutor);

        CREATE TABLE IF NOT EXISTS constraint_instance (
            constraint_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            department TEXT NOT NULL,
            periods_json TEXT,
            weight REAL,
            is_active INTEGER NOT NULL DEFAULT 1,
            params_json TEXT NOT NULL DEFAULT '{}',
            comment TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_constraint_kind
            ON constraint_instance(kind, department);

        CREATE TABLE IF NOT EXISTS timetable_version (
            department TEXT NOT NULL,
            period TEXT NOT NULL,
            major INTEGER NOT NULL,
            minor INTEGER NOT NULL,
            solve_status TEXT,
            objective REAL,
            backend TEXT,
            created_at TEXT NOT NULL,
            PRIMARY KEY (department, period, major, minor)
        );

        CREATE TABLE IF NOT EXISTS scheduled_course (
            scheduled_id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            department TEXT NOT NULL,
            period TEXT NOT NULL,
            major INTEGER NOT NULL,
            minor INTEGER NOT NULL,
            day TEXT NOT NULL,
            start_min INTEGER NOT NULL,
            duration_min INTEGER NOT NULL,
            room TEXT,
            tutor TEXT,
            FOREIGN KEY (department, period, major, minor)
                REFERENCES timetable_version(department, period, major, minor)
                ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_scheduled_version
            ON scheduled_course(department, period, major, minor);

        -- 每个范围已发出的最大 major, 删除版本后编号不回收
        CREATE TABLE IF NOT EXISTS major_sequence (
            department TEXT NOT NULL,
            period TEXT NOT NULL,
            last_major INTEGER NOT NULL,
            PRIMARY KEY (department, period)
        );

        CREATE TABLE IF NOT EXISTS published_version (
            department TEXT NOT NULL,
            period TEXT NOT NULL,
            major INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (department, period)
        );

        CREATE TABLE IF NOT EXISTS action_log (
            action_id TEXT PRIMARY KEY,
            department TEXT NOT NULL,
            period TEXT NOT NULL,
            action_type TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            payload_json TEXT,
            detail TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_action_log_scope
            ON action_log(department, period, action_ts);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 获取默认数据库路径
///
/// 优先读取环境变量 TIMETABLE_ENGINE_DB_PATH, 否则使用 用户数据目录/timetable-engine/timetable.db
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("TIMETABLE_ENGINE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./timetable.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("timetable-engine");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("timetable.db");
        }
    }

    path.to_string_lossy().to_string()
}
