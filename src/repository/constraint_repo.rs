// ==========================================
// 排课引擎 - 约束实例仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// periods_json 为 NULL 或 [] 均表示"全部周期"
// ==========================================

use crate::db::SharedConnection;
use crate::domain::constraint::ConstraintInstance;
use crate::repository::error::{
    decode_json_column, encode_json_column, RepositoryError, RepositoryResult,
};
use rusqlite::{params, Connection};

/// 原始行 (JSON 列延后解析, 以便区分"畸形实例"与数据库错误)
struct RawConstraintRow {
    constraint_id: String,
    kind: String,
    department: String,
    periods_json: Option<String>,
    weight: Option<f64>,
    is_active: bool,
    params_json: String,
    comment: Option<String>,
}

// ==========================================
// ConstraintRepository - 约束实例仓储
// ==========================================
pub struct ConstraintRepository {
    conn: SharedConnection,
}

impl ConstraintRepository {
    /// 创建新的ConstraintRepository实例
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入约束实例 (UPSERT)
    pub fn upsert(&self, instance: &ConstraintInstance) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let periods_json = if instance.periods.is_empty() {
            None
        } else {
            Some(encode_json_column("periods_json", &instance.periods)?)
        };

        conn.execute(
            r#"INSERT OR REPLACE INTO constraint_instance (
                constraint_id, kind, department, periods_json,
                weight, is_active, params_json, comment
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &instance.constraint_id,
                &instance.kind,
                &instance.department,
                &periods_json,
                &instance.weight,
                if instance.is_active { 1 } else { 0 },
                encode_json_column("params_json", &instance.params)?,
                &instance.comment,
            ],
        )?;

        Ok(instance.constraint_id.clone())
    }

    /// 启用/停用约束 (软删除)
    pub fn set_active(&self, constraint_id: &str, is_active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            "UPDATE constraint_instance SET is_active = ? WHERE constraint_id = ?",
            params![if is_active { 1 } else { 0 }, constraint_id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ConstraintInstance".to_string(),
                id: constraint_id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除约束
    pub fn delete(&self, constraint_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM constraint_instance WHERE constraint_id = ?",
            params![constraint_id],
        )?;
        Ok(())
    }

    /// 按种类与部门查询全部实例 (周期/权重/启用过滤由注册表负责)
    ///
    /// # 错误
    /// - `FieldValueError`: periods_json / params_json 不是合法 JSON
    pub fn find_by_kind(&self, kind: &str, department: &str) -> RepositoryResult<Vec<ConstraintInstance>> {
        let raw_rows = {
            let conn = self.get_conn()?;
            let mut stmt = conn.prepare(
                r#"SELECT constraint_id, kind, department, periods_json,
                          weight, is_active, params_json, comment
                   FROM constraint_instance
                   WHERE kind = ? AND department = ?
                   ORDER BY constraint_id"#,
            )?;

            let rows = stmt
                .query_map(params![kind, department], |row| {
                    Ok(RawConstraintRow {
                        constraint_id: row.get(0)?,
                        kind: row.get(1)?,
                        department: row.get(2)?,
                        periods_json: row.get(3)?,
                        weight: row.get(4)?,
                        is_active: row.get::<_, i32>(5)? != 0,
                        params_json: row.get(6)?,
                        comment: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<RawConstraintRow>, _>>()?;
            rows
        };

        raw_rows.into_iter().map(Self::decode).collect()
    }

    /// 按ID查询
    pub fn find_by_id(&self, constraint_id: &str) -> RepositoryResult<Option<ConstraintInstance>> {
        let raw = {
            let conn = self.get_conn()?;
            match conn.query_row(
                r#"SELECT constraint_id, kind, department, periods_json,
                          weight, is_active, params_json, comment
                   FROM constraint_instance
                   WHERE constraint_id = ?"#,
                params![constraint_id],
                |row| {
                    Ok(RawConstraintRow {
                        constraint_id: row.get(0)?,
                        kind: row.get(1)?,
                        department: row.get(2)?,
                        periods_json: row.get(3)?,
                        weight: row.get(4)?,
                        is_active: row.get::<_, i32>(5)? != 0,
                        params_json: row.get(6)?,
                        comment: row.get(7)?,
                    })
                },
            ) {
                Ok(raw) => raw,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };

        Self::decode(raw).map(Some)
    }

    /// 查询部门下出现过的全部种类 (含未注册种类)
    pub fn distinct_kinds(&self, department: &str) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT kind FROM constraint_instance WHERE department = ? ORDER BY kind",
        )?;
        let kinds = stmt
            .query_map(params![department], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(kinds)
    }

    fn decode(raw: RawConstraintRow) -> RepositoryResult<ConstraintInstance> {
        let periods: Vec<String> = match raw.periods_json.as_deref() {
            None => Vec::new(),
            Some(text) if text.trim().is_empty() => Vec::new(),
            Some(text) => decode_json_column("periods_json", text)?,
        };

        Ok(ConstraintInstance {
            params: decode_json_column("params_json", &raw.params_json)?,
            constraint_id: raw.constraint_id,
            kind: raw.kind,
            department: raw.department,
            periods,
            weight: raw.weight,
            is_active: raw.is_active,
            comment: raw.comment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;
    use serde_json::json;

    fn make_instance(id: &str, periods: &[&str], weight: Option<f64>) -> ConstraintInstance {
        ConstraintInstance {
            constraint_id: id.to_string(),
            kind: "tutor_availability".to_string(),
            department: "INFO".to_string(),
            periods: periods.iter().map(|p| p.to_string()).collect(),
            weight,
            is_active: true,
            params: json!({"tutor": "ALB"}),
            comment: Some("测试".to_string()),
        }
    }

    #[test]
    fn test_upsert_and_find_by_kind() {
        let repo = ConstraintRepository::new(open_in_memory_shared().unwrap());
        repo.upsert(&make_instance("k2", &["W10"], Some(3.0))).unwrap();
        repo.upsert(&make_instance("k1", &[], None)).unwrap();

        let found = repo.find_by_kind("tutor_availability", "INFO").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].constraint_id, "k1");
        assert!(found[0].periods.is_empty());
        assert_eq!(found[1].periods, vec!["W10".to_string()]);
        assert_eq!(found[1].weight, Some(3.0));
        assert!(repo.find_by_kind("tutor_availability", "MATH").unwrap().is_empty());
        assert_eq!(repo.distinct_kinds("INFO").unwrap(), vec!["tutor_availability".to_string()]);
    }

    #[test]
    fn test_set_active() {
        let repo = ConstraintRepository::new(open_in_memory_shared().unwrap());
        repo.upsert(&make_instance("k1", &[], None)).unwrap();
        repo.set_active("k1", false).unwrap();
        assert!(!repo.find_by_id("k1").unwrap().unwrap().is_active);
        assert!(matches!(
            repo.set_active("missing", true),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_periods_json_is_reported() {
        let conn = open_in_memory_shared().unwrap();
        conn.lock()
            .unwrap()
            .execute(
                r#"INSERT INTO constraint_instance
                   (constraint_id, kind, department, periods_json, params_json)
                   VALUES ('bad', 'tutor_availability', 'INFO', 'not-json', '{}')"#,
                [],
            )
            .unwrap();
        let repo = ConstraintRepository::new(conn);
        assert!(matches!(
            repo.find_by_kind("tutor_availability", "INFO"),
            Err(RepositoryError::FieldValueError { .. })
        ));
    }
}
