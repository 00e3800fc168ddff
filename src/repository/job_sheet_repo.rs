// ==========================================
// 贵金属工单流转系统 - 工单数据仓储
// ==========================================
// 依据: 工单流转核心 - 3. 数据模型 / 5. 并发模型
// 红线: Repository 不含业务逻辑
// 红线: 工单 + 工序 + 审计 必须在同一事务中写入
// ==========================================

mod write;


use crate::db::{parse_datetime_column, parse_optional_datetime_column};
use crate::domain::job_sheet::{JobSheet, JobSheetDetail, JobStep};
use crate::domain::types::{JobStatus, MetalType, Purity, StageName, StepStatus};
use crate::engine::collaborators::JobNoSource;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

/// job_sheet 查询列（顺序与 map_job_row 对齐）
pub(crate) const JOB_COLUMNS: &str = r#"
    job_id, job_no, metal_type, purity, size, worker_id,
    issue_weight, issue_date, status, current_step,
    total_loss, scrap_weight, dust_weight,
    return_weight, return_pieces, completed_date,
    last_return_weight, revision, created_at, updated_at
"#;

/// job_sheet_step 查询列（顺序与 map_step_row 对齐）
pub(crate) const STEP_COLUMNS: &str = r#"
    step_id, job_id, stage_name, stage_order, status,
    issue_weight, return_weight, scrap_weight, dust_weight,
    pieces, return_pieces, start_date, completed_date, notes, worker_id
"#;

// ==========================================
// JobSheetFilter - 工单列表过滤条件
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct JobSheetFilter {
    pub issued_from: Option<NaiveDateTime>, // 发料时间下限（含）
    pub worker_id: Option<i64>,
    pub status: Option<JobStatus>,
}

// ==========================================
// JobSheetRepository - 工单仓储
// ==========================================
pub struct JobSheetRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JobSheetRepository {
    /// 创建新的JobSheetRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按job_id查询工单
    pub fn find_by_id(&self, job_id: i64) -> RepositoryResult<Option<JobSheet>> {
        let conn = self.get_conn()?;
        Self::query_job(&conn, job_id)
    }

    /// 按工单号查询
    pub fn find_by_job_no(&self, job_no: &str) -> RepositoryResult<Option<JobSheet>> {
        let conn = self.get_conn()?;

        let sql = format!("SELECT {} FROM job_sheet WHERE job_no = ?", JOB_COLUMNS);
        match conn.query_row(&sql, params![job_no], Self::map_job_row) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询工单的全部工序（按工序序号升序）
    pub fn find_steps(&self, job_id: i64) -> RepositoryResult<Vec<JobStep>> {
        let conn = self.get_conn()?;
        Self::query_steps(&conn, job_id)
    }

    /// 查询工单及其工序（同一把锁内读取，保证快照一致）
    pub fn find_detail(&self, job_id: i64) -> RepositoryResult<Option<JobSheetDetail>> {
        let conn = self.get_conn()?;

        let job = match Self::query_job(&conn, job_id)? {
            Some(job) => job,
            None => return Ok(None),
        };
        let steps = Self::query_steps(&conn, job_id)?;

        Ok(Some(JobSheetDetail { job, steps }))
    }

    /// 按条件查询工单列表（按创建时间倒序）
    pub fn list(&self, filter: &JobSheetFilter) -> RepositoryResult<Vec<JobSheet>> {
        let conn = self.get_conn()?;

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(from) = filter.issued_from {
            clauses.push("issue_date >= ?");
            values.push(Value::Text(crate::db::format_datetime(&from)));
        }
        if let Some(worker_id) = filter.worker_id {
            clauses.push("worker_id = ?");
            values.push(Value::Integer(worker_id));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.to_db_str().to_string()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM job_sheet {} ORDER BY job_id DESC",
            JOB_COLUMNS, where_sql
        );

        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params_from_iter(values), Self::map_job_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(jobs)
    }

    /// 工单号是否已存在
    pub fn exists_job_no(&self, job_no: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_sheet WHERE job_no = ?",
            params![job_no],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    // ==========================================
    // 内部查询（复用同一连接/事务）
    // ==========================================

    pub(crate) fn query_job(conn: &Connection, job_id: i64) -> RepositoryResult<Option<JobSheet>> {
        let sql = format!("SELECT {} FROM job_sheet WHERE job_id = ?", JOB_COLUMNS);
        match conn.query_row(&sql, params![job_id], Self::map_job_row) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn query_steps(conn: &Connection, job_id: i64) -> RepositoryResult<Vec<JobStep>> {
        let sql = format!(
            "SELECT {} FROM job_sheet_step WHERE job_id = ? ORDER BY stage_order ASC",
            STEP_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let steps = stmt
            .query_map(params![job_id], Self::map_step_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(steps)
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_job_row(row: &Row) -> SqliteResult<JobSheet> {
        let metal_raw: String = row.get(2)?;
        let purity_raw: String = row.get(3)?;
        let status_raw: String = row.get(8)?;
        let step_raw: String = row.get(9)?;

        Ok(JobSheet {
            job_id: row.get(0)?,
            job_no: row.get(1)?,
            metal_type: MetalType::from_str(&metal_raw)
                .ok_or_else(|| invalid_text(2, "metal_type", &metal_raw))?,
            purity: Purity::from_str(&purity_raw)
                .ok_or_else(|| invalid_text(3, "purity", &purity_raw))?,
            size: row.get(4)?,
            worker_id: row.get(5)?,
            issue_weight: row.get(6)?,
            issue_date: parse_datetime_column(row, 7)?,
            status: JobStatus::from_str(&status_raw)
                .ok_or_else(|| invalid_text(8, "status", &status_raw))?,
            current_step: StageName::from_str(&step_raw)
                .ok_or_else(|| invalid_text(9, "current_step", &step_raw))?,
            total_loss: row.get(10)?,
            scrap_weight: row.get(11)?,
            dust_weight: row.get(12)?,
            return_weight: row.get(13)?,
            return_pieces: row.get(14)?,
            completed_date: parse_optional_datetime_column(row, 15)?,
            last_return_weight: row.get(16)?,
            revision: row.get(17)?,
            created_at: parse_datetime_column(row, 18)?,
            updated_at: parse_datetime_column(row, 19)?,
        })
    }

    fn map_step_row(row: &Row) -> SqliteResult<JobStep> {
        let stage_raw: String = row.get(2)?;
        let stage_order: i32 = row.get(3)?;
        let status_raw: String = row.get(4)?;

        // 工序顺序以 stage_order 为准，名称仅做一致性校验
        let stage = StageName::from_order(stage_order)
            .ok_or_else(|| invalid_text(3, "stage_order", &stage_order.to_string()))?;
        if StageName::from_str(&stage_raw) != Some(stage) {
            return Err(invalid_text(2, "stage_name", &stage_raw));
        }

        Ok(JobStep {
            step_id: row.get(0)?,
            job_id: row.get(1)?,
            stage,
            status: StepStatus::from_str(&status_raw)
                .ok_or_else(|| invalid_text(4, "status", &status_raw))?,
            issue_weight: row.get(5)?,
            return_weight: row.get(6)?,
            scrap_weight: row.get(7)?,
            dust_weight: row.get(8)?,
            pieces: row.get(9)?,
            return_pieces: row.get(10)?,
            start_date: parse_optional_datetime_column(row, 11)?,
            completed_date: parse_optional_datetime_column(row, 12)?,
            notes: row.get(13)?,
            worker_id: row.get(14)?,
        })
    }
}

/// 非法枚举值 -> 行映射错误
fn invalid_text(idx: usize, field: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("字段{}取值非法: {}", field, raw).into(),
    )
}

// ==========================================
// JobNoSource 实现 - 工单号序列来源
// ==========================================
impl JobNoSource for JobSheetRepository {
    /// 最近一次签发的工单号（按 job_id 倒序）
    fn last_issued_job_no(&self) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            "SELECT job_no FROM job_sheet ORDER BY job_id DESC LIMIT 1",
            [],
            |row| row.get::<_, String>(0),
        ) {
            Ok(job_no) => Ok(Some(job_no)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
