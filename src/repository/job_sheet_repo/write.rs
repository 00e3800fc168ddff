use super::JobSheetRepository;
use crate::db::format_datetime;
use crate::domain::audit::AuditEntry;
use crate::domain::job_sheet::{JobSheet, JobStep};
use crate::repository::audit_repo::AuditLogRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, TransactionBehavior};

impl JobSheetRepository {
    // ==========================================
    // 写入操作（均为单事务，失败整体回滚）
    // ==========================================
    // 事务以 IMMEDIATE 开启，开始即持有写锁，多连接并发时由 busy_timeout 排队

    /// 创建工单 + 5道工序 + created 审计记录
    ///
    /// # 参数
    /// - `job`: 工单（job_id 由数据库分配，传入值忽略）
    /// - `steps`: 工序列表（job_id 以新分配的为准）
    /// - `audit`: 创建审计记录（job_id 以新分配的为准）
    ///
    /// # 返回
    /// - `Ok(job_id)`: 新工单ID
    /// - `Err(UniqueConstraintViolation)`: 工单号重复
    pub fn create_with_steps(
        &self,
        job: &JobSheet,
        steps: &[JobStep],
        audit: &AuditEntry,
    ) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r#"INSERT INTO job_sheet (
                job_no, metal_type, purity, size, worker_id,
                issue_weight, issue_date, status, current_step,
                total_loss, scrap_weight, dust_weight,
                return_weight, return_pieces, completed_date,
                last_return_weight, revision, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &job.job_no,
                job.metal_type.to_db_str(),
                job.purity.to_db_str(),
                &job.size,
                &job.worker_id,
                job.issue_weight,
                format_datetime(&job.issue_date),
                job.status.to_db_str(),
                job.current_step.to_db_str(),
                job.total_loss,
                job.scrap_weight,
                job.dust_weight,
                &job.return_weight,
                &job.return_pieces,
                job.completed_date.as_ref().map(format_datetime),
                &job.last_return_weight,
                job.revision,
                format_datetime(&job.created_at),
                format_datetime(&job.updated_at),
            ],
        )?;
        let job_id = tx.last_insert_rowid();

        for step in steps {
            Self::insert_step(&tx, job_id, step)?;
        }

        let mut audit = audit.clone();
        audit.job_id = job_id;
        AuditLogRepository::insert_with(&tx, &audit)?;

        tx.commit()?;
        Ok(job_id)
    }

    /// 提交一次状态迁移：工单 + 变更的工序 + 一条审计记录
    ///
    /// 使用乐观锁 (revision字段) 防止并发迁移重复生效
    ///
    /// # 参数
    /// - `job`: 迁移后的工单，`job.revision` 为读取时的修订号
    /// - `changed_steps`: 本次变更的工序
    /// - `audit`: 本次迁移的审计记录
    ///
    /// # 返回
    /// - `Ok(new_revision)`: 提交成功后的修订号
    /// - `Err(OptimisticLockFailure)`: revision不匹配 (其他请求已提交)
    /// - `Err(NotFound)`: 工单或工序不存在
    pub fn apply_transition(
        &self,
        job: &JobSheet,
        changed_steps: &[JobStep],
        audit: &AuditEntry,
    ) -> RepositoryResult<i32> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated_at = chrono::Utc::now().naive_utc();
        let rows_affected = tx.execute(
            r#"UPDATE job_sheet
               SET status = ?, current_step = ?,
                   total_loss = ?, scrap_weight = ?, dust_weight = ?,
                   return_weight = ?, return_pieces = ?, completed_date = ?,
                   last_return_weight = ?, updated_at = ?,
                   revision = revision + 1
               WHERE job_id = ? AND revision = ?"#,
            params![
                job.status.to_db_str(),
                job.current_step.to_db_str(),
                job.total_loss,
                job.scrap_weight,
                job.dust_weight,
                &job.return_weight,
                &job.return_pieces,
                job.completed_date.as_ref().map(format_datetime),
                &job.last_return_weight,
                format_datetime(&updated_at),
                job.job_id,
                job.revision,
            ],
        )?;

        if rows_affected == 0 {
            // 判断是记录不存在还是revision冲突
            return match tx.query_row(
                "SELECT revision FROM job_sheet WHERE job_id = ?",
                params![job.job_id],
                |row| row.get::<_, i32>(0),
            ) {
                Ok(actual_revision) => Err(RepositoryError::OptimisticLockFailure {
                    job_id: job.job_id,
                    expected: job.revision,
                    actual: actual_revision,
                }),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(RepositoryError::NotFound {
                    entity: "JobSheet".to_string(),
                    id: job.job_id.to_string(),
                }),
                Err(e) => Err(e.into()),
            };
        }

        for step in changed_steps {
            Self::update_step(&tx, job.job_id, step)?;
        }

        AuditLogRepository::insert_with(&tx, audit)?;

        tx.commit()?;
        Ok(job.revision + 1)
    }

    fn insert_step(conn: &Connection, job_id: i64, step: &JobStep) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO job_sheet_step (
                job_id, stage_name, stage_order, status,
                issue_weight, return_weight, scrap_weight, dust_weight, loss,
                pieces, return_pieces, start_date, completed_date, notes, worker_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                job_id,
                step.stage.to_db_str(),
                step.stage_order(),
                step.status.to_db_str(),
                step.issue_weight,
                &step.return_weight,
                step.scrap_weight,
                step.dust_weight,
                step.loss(),
                step.pieces,
                step.return_pieces,
                step.start_date.as_ref().map(format_datetime),
                step.completed_date.as_ref().map(format_datetime),
                &step.notes,
                &step.worker_id,
            ],
        )?;
        Ok(())
    }

    fn update_step(conn: &Connection, job_id: i64, step: &JobStep) -> RepositoryResult<()> {
        // loss 列只作为报表冗余，写入值始终由工序重量推导
        let rows_affected = conn.execute(
            r#"UPDATE job_sheet_step
               SET status = ?, issue_weight = ?, return_weight = ?,
                   scrap_weight = ?, dust_weight = ?, loss = ?,
                   pieces = ?, return_pieces = ?,
                   start_date = ?, completed_date = ?, notes = ?, worker_id = ?
               WHERE step_id = ? AND job_id = ?"#,
            params![
                step.status.to_db_str(),
                step.issue_weight,
                &step.return_weight,
                step.scrap_weight,
                step.dust_weight,
                step.loss(),
                step.pieces,
                step.return_pieces,
                step.start_date.as_ref().map(format_datetime),
                step.completed_date.as_ref().map(format_datetime),
                &step.notes,
                &step.worker_id,
                step.step_id,
                job_id,
            ],
        )?;

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "JobStep".to_string(),
                id: step.step_id.to_string(),
            });
        }
        Ok(())
    }
}
