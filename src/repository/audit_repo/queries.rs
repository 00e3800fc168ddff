use super::core::AuditLogRepository;
use crate::db::parse_datetime_column;
use crate::domain::audit::{AuditAction, AuditEntry, AuditPayload};
use crate::repository::error::RepositoryResult;
use rusqlite::{params, Result as SqliteResult, Row};

impl AuditLogRepository {
    // ==========================================
    // 查询操作（供报表协作方读取；引擎不回读审计）
    // ==========================================

    /// 按 audit_id 查询单条记录
    pub fn find_by_id(&self, audit_id: &str) -> RepositoryResult<Option<AuditEntry>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT audit_id, job_id, action, payload_json, actor, recorded_at
            FROM audit_log
            WHERE audit_id = ?
            "#,
        )?;

        match stmt.query_row(params![audit_id], |row| self.map_row(row)) {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询工单的全部审计记录（按写入顺序）
    pub fn find_by_job_id(&self, job_id: i64) -> RepositoryResult<Vec<AuditEntry>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT audit_id, job_id, action, payload_json, actor, recorded_at
            FROM audit_log
            WHERE job_id = ?
            ORDER BY rowid ASC
            "#,
        )?;

        let entries = stmt
            .query_map(params![job_id], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(entries)
    }

    /// 查询工单指定动作的审计记录
    pub fn find_by_job_and_action(
        &self,
        job_id: i64,
        action: AuditAction,
    ) -> RepositoryResult<Vec<AuditEntry>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT audit_id, job_id, action, payload_json, actor, recorded_at
            FROM audit_log
            WHERE job_id = ? AND action = ?
            ORDER BY rowid ASC
            "#,
        )?;

        let entries = stmt
            .query_map(params![job_id, action.as_str()], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(entries)
    }

    /// 统计工单的审计记录数
    pub fn count_by_job_id(&self, job_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE job_id = ?",
            params![job_id],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// 将数据库行映射为 AuditEntry 实体
    fn map_row(&self, row: &Row) -> SqliteResult<AuditEntry> {
        let audit_id: String = row.get(0)?;
        let job_id: i64 = row.get(1)?;
        let payload_json: String = row.get(3)?;
        let actor: Option<i64> = row.get(4)?;
        let recorded_at = parse_datetime_column(row, 5)?;

        // action 列与负载中的 tag 冗余，以负载为准
        let payload: AuditPayload = serde_json::from_str(&payload_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(AuditEntry {
            audit_id,
            job_id,
            payload,
            actor,
            recorded_at,
        })
    }
}
