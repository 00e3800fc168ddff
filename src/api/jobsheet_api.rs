// ==========================================
// 贵金属工单流转系统 - 工单 API
// ==========================================
// 职责: 工单流转操作 + 工单/审计查询
// 说明: 供外部 Web/表单层调用，错误统一转换为 ApiError
// ==========================================

use std::sync::Arc;
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, WorkflowConfigReader};
use crate::domain::audit::AuditEntry;
use crate::domain::job_sheet::{JobSheet, JobSheetDetail, NewJobSheet, StageCompletionInput};
use crate::engine::workflow::{WorkflowEngine, WorkflowOutcome};
use crate::repository::audit_repo::AuditLogRepository;
use crate::repository::job_sheet_repo::{JobSheetFilter, JobSheetRepository};

// ==========================================
// JobSheetApi - 工单 API
// ==========================================

/// 工单API
///
/// 职责：
/// 1. 工单创建、工序完工、下一道工序开工（委托 WorkflowEngine）
/// 2. 工单详情/列表查询
/// 3. 审计记录查询（供报表层重建工单历史）
pub struct JobSheetApi<C = ConfigManager>
where
    C: WorkflowConfigReader,
{
    job_repo: Arc<JobSheetRepository>,
    audit_repo: Arc<AuditLogRepository>,
    workflow_engine: Arc<WorkflowEngine<C>>,
}

impl<C> JobSheetApi<C>
where
    C: WorkflowConfigReader,
{
    /// 创建新的JobSheetApi实例
    ///
    /// # 参数
    /// - job_repo: 工单仓储
    /// - audit_repo: 审计日志仓储
    /// - workflow_engine: 工单流转引擎
    pub fn new(
        job_repo: Arc<JobSheetRepository>,
        audit_repo: Arc<AuditLogRepository>,
        workflow_engine: Arc<WorkflowEngine<C>>,
    ) -> Self {
        Self {
            job_repo,
            audit_repo,
            workflow_engine,
        }
    }

    // ==========================================
    // 流转接口
    // ==========================================

    /// 创建工单
    pub fn create_job(&self, input: NewJobSheet) -> ApiResult<JobSheetDetail> {
        Ok(self.workflow_engine.create_job(input)?)
    }

    /// 完成当前工序
    ///
    /// # 返回
    /// - Ok(Applied): 已完工（最后一道工序时工单同时完成）
    /// - Ok(AlreadyCompleted): 工单已完成，未做修改
    /// - Err(ApiError): VALIDATION_ERROR / NOT_FOUND / WORKFLOW_ERROR / CONFLICT
    pub fn complete_current_stage(
        &self,
        job_id: i64,
        input: StageCompletionInput,
    ) -> ApiResult<WorkflowOutcome> {
        Ok(self.workflow_engine.complete_current_stage(job_id, input)?)
    }

    /// 开工下一道工序
    pub fn start_next_stage(&self, job_id: i64) -> ApiResult<WorkflowOutcome> {
        Ok(self.workflow_engine.start_next_stage(job_id)?)
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 查询工单详情（含5道工序，按序号升序）
    pub fn get_job_detail(&self, job_id: i64) -> ApiResult<JobSheetDetail> {
        self.job_repo
            .find_detail(job_id)?
            .ok_or_else(|| ApiError::NotFound(format!("JobSheet(id={})不存在", job_id)))
    }

    /// 按工单号查询工单详情
    pub fn find_by_job_no(&self, job_no: &str) -> ApiResult<JobSheetDetail> {
        let job_no = job_no.trim();
        if job_no.is_empty() {
            return Err(ApiError::ValidationError("工单号不能为空".to_string()));
        }

        let job = self
            .job_repo
            .find_by_job_no(job_no)?
            .ok_or_else(|| ApiError::NotFound(format!("JobSheet(job_no={})不存在", job_no)))?;

        self.get_job_detail(job.job_id)
    }

    /// 按条件查询工单列表（新工单在前）
    pub fn list_jobs(&self, filter: &JobSheetFilter) -> ApiResult<Vec<JobSheet>> {
        let jobs = self.job_repo.list(filter)?;
        debug!(count = jobs.len(), ?filter, "查询工单列表");
        Ok(jobs)
    }

    /// 下一个工单号预览（创建表单默认值）
    pub fn next_job_no(&self) -> ApiResult<String> {
        Ok(self.workflow_engine.next_job_no()?)
    }

    /// 查询工单的审计记录（按写入顺序）
    pub fn list_audit_entries(&self, job_id: i64) -> ApiResult<Vec<AuditEntry>> {
        if self.job_repo.find_by_id(job_id)?.is_none() {
            return Err(ApiError::NotFound(format!("JobSheet(id={})不存在", job_id)));
        }
        Ok(self.audit_repo.find_by_job_id(job_id)?)
    }
}
