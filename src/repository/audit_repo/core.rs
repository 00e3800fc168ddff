use crate::db::format_datetime;
use crate::domain::audit::AuditEntry;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// AuditLogRepository - 审计日志仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct AuditLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AuditLogRepository {
    /// 创建新的审计日志仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
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

    /// 插入审计记录（独立事务）
    ///
    /// # 返回
    /// - `Ok(audit_id)`: 成功插入
    /// - `Err(...)`: 数据库错误
    pub fn insert(&self, entry: &AuditEntry) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_with(&conn, entry)?;
        Ok(entry.audit_id.clone())
    }

    /// 在调用方的事务中插入审计记录
    ///
    /// 说明: 工单/工序的状态写入与审计写入必须在同一事务提交，
    /// 由 JobSheetRepository 在其事务内调用。
    pub fn insert_with(conn: &Connection, entry: &AuditEntry) -> RepositoryResult<()> {
        let payload_json = serde_json::to_string(&entry.payload)?;

        conn.execute(
            r#"
            INSERT INTO audit_log (
                audit_id, job_id, action, payload_json, actor, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry.audit_id,
                entry.job_id,
                entry.action().as_str(),
                payload_json,
                entry.actor,
                format_datetime(&entry.recorded_at),
            ],
        )?;

        Ok(())
    }
}
