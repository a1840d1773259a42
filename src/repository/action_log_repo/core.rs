use crate::db::SharedConnection;
use crate::domain::action_log::ActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};

// ==========================================
// ActionLogRepository - 操作日志仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct ActionLogRepository {
    conn: SharedConnection,
}

impl ActionLogRepository {
    /// 创建新的操作日志仓储
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入操作日志
    ///
    /// # 返回
    /// - `Ok(action_id)`: 成功插入,返回action_id
    /// - `Err(...)`: 数据库错误
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO action_log (
                action_id, department, period, action_type,
                action_ts, payload_json, detail
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                log.action_id,
                log.department,
                log.period,
                log.action_type,
                log.action_ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                log.payload_json.as_ref().map(|v| v.to_string()),
                log.detail,
            ],
        )?;

        Ok(log.action_id.clone())
    }

    /// 映射数据库行到ActionLog对象
    pub(super) fn map_row(&self, row: &Row) -> rusqlite::Result<ActionLog> {
        let ts: String = row.get(4)?;
        let payload: Option<String> = row.get(5)?;

        Ok(ActionLog {
            action_id: row.get(0)?,
            department: row.get(1)?,
            period: row.get(2)?,
            action_type: row.get(3)?,
            action_ts: NaiveDateTime::parse_from_str(&ts, "%Y-%m-%d %H:%M:%S").map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?,
            // payload 解析失败时保留为字符串, 审计信息不丢弃
            payload_json: payload.map(|raw| {
                serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
            }),
            detail: row.get(6)?,
        })
    }
}
