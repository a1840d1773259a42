// ==========================================
// 排课引擎 - 操作日志领域模型
// ==========================================
// 红线: 所有版本写操作必须记录
// 用途: 审计追踪
// ==========================================

use crate::domain::scope::SchedulingScope;
use crate::domain::types::VersionActionType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,               // 日志ID
    pub department: String,              // 部门
    pub period: String,                  // 周期
    pub action_type: String,             // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime,        // 操作时间戳
    pub payload_json: Option<JsonValue>, // 操作参数 (JSON)
    pub detail: Option<String>,          // 详细描述
}

impl ActionLog {
    /// 以当前时间构造一条日志
    pub fn now(
        scope: &SchedulingScope,
        action_type: VersionActionType,
        payload_json: Option<JsonValue>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            department: scope.department.clone(),
            period: scope.period.clone(),
            action_type: action_type.to_db_str().to_string(),
            action_ts: chrono::Local::now().naive_local(),
            payload_json,
            detail: Some(detail.into()),
        }
    }
}
