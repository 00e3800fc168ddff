// ==========================================
// 贵金属工单流转系统 - 工单流转引擎
// ==========================================
// 职责: 工单创建 / 当前工序完工 / 下一道工序开工
// 红线: 读取 -> 校验 -> 写入 -> 审计 为同一工单的原子单元
// 红线: 任何错误均不提交（单事务）
// 红线: 引擎不拼 SQL，只通过 Repository 读写
// ==========================================
// 前置条件（完工）按顺序检查:
//   1. 工单存在            -> NotFound
//   2. 工单未完成          -> AlreadyCompleted（非错误）
//   3. 唯一进行中工序      -> Workflow
//   4. 前序工序全部完工    -> Workflow
//   5. 总产出 <= 投入重量  -> Validation（仅允许固定的浮点舍入误差）
// ==========================================

use crate::config::WorkflowConfigReader;
use crate::domain::audit::{
    AuditEntry, AuditPayload, HandoffSource, JobSnapshot, StageCompletionDelta,
    StepStartedPayload,
};
use crate::domain::job_sheet::{
    JobSheet, JobSheetDetail, JobStep, NewJobSheet, StageCompletionInput,
};
use crate::domain::types::{JobStatus, StageName, StepStatus};
use crate::engine::collaborators::WorkerDirectory;
use crate::engine::error::{WorkflowError, WorkflowResult};
use crate::engine::job_locks::JobLockRegistry;
use crate::engine::job_no::JobNoSequence;
use crate::engine::ledger::{StepLedger, INVARIANT_EPSILON, WEIGHT_EPSILON_G};
use crate::repository::error::RepositoryError;
use crate::repository::job_sheet_repo::JobSheetRepository;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, MutexGuard};
use tracing::{debug, info, instrument, warn};

// ==========================================
// WorkflowOutcome - 流转结果
// ==========================================
// AlreadyCompleted: 对已完成工单的重复请求，未做任何修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Applied(JobSheetDetail),
    AlreadyCompleted(JobSheetDetail),
}

impl WorkflowOutcome {
    pub fn detail(&self) -> &JobSheetDetail {
        match self {
            WorkflowOutcome::Applied(d) | WorkflowOutcome::AlreadyCompleted(d) => d,
        }
    }

    pub fn into_detail(self) -> JobSheetDetail {
        match self {
            WorkflowOutcome::Applied(d) | WorkflowOutcome::AlreadyCompleted(d) => d,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, WorkflowOutcome::Applied(_))
    }

    pub fn is_already_completed(&self) -> bool {
        matches!(self, WorkflowOutcome::AlreadyCompleted(_))
    }
}

// ==========================================
// WorkflowEngine - 工单流转引擎
// ==========================================
pub struct WorkflowEngine<C>
where
    C: WorkflowConfigReader,
{
    job_repo: Arc<JobSheetRepository>,
    workers: Arc<dyn WorkerDirectory>,
    config: Arc<C>,
    job_no: JobNoSequence<C>,
    locks: JobLockRegistry,
}

impl<C> WorkflowEngine<C>
where
    C: WorkflowConfigReader,
{
    /// 创建新的 WorkflowEngine 实例
    ///
    /// # 参数
    /// - job_repo: 工单仓储（同时作为工单号序列来源）
    /// - workers: 工人名录
    /// - config: 配置读取器
    pub fn new(
        job_repo: Arc<JobSheetRepository>,
        workers: Arc<dyn WorkerDirectory>,
        config: Arc<C>,
    ) -> Self {
        let job_no = JobNoSequence::new(job_repo.clone(), config.clone());
        Self {
            job_repo,
            workers,
            config,
            job_no,
            locks: JobLockRegistry::new(),
        }
    }

    /// 下一个工单号预览
    pub fn next_job_no(&self) -> WorkflowResult<String> {
        self.job_no.next_job_no()
    }

    // ==========================================
    // 工单创建
    // ==========================================

    /// 创建工单 + 5道工序（首道工序直接开工）+ created 审计
    ///
    /// # 返回
    /// - `Err(Validation)`: 发料重量非法 / 工单号为空或重复
    /// - `Err(NotFound)`: 指定工人不存在
    /// - `Err(Conflict)`: 自动生成的工单号与并发创建冲突
    #[instrument(skip(self, input), fields(job_no = ?input.job_no, issue_weight = input.issue_weight))]
    pub fn create_job(&self, input: NewJobSheet) -> WorkflowResult<JobSheetDetail> {
        validate_weight("issue_weight", input.issue_weight)?;
        if input.issue_weight <= 0.0 {
            return Err(WorkflowError::Validation(format!(
                "发料重量必须大于0: {}",
                input.issue_weight
            )));
        }

        if let Some(worker_id) = input.worker_id {
            self.ensure_worker_exists(worker_id)?;
        }

        let caller_supplied = input.job_no.is_some();
        let job_no = match input.job_no.as_deref().map(str::trim) {
            Some("") => {
                return Err(WorkflowError::Validation("工单号不能为空".to_string()));
            }
            Some(job_no) => {
                if self.job_repo.exists_job_no(job_no)? {
                    return Err(WorkflowError::Validation(format!("工单号已存在: {}", job_no)));
                }
                job_no.to_string()
            }
            None => self.job_no.next_job_no()?,
        };

        let purity = match input.purity {
            Some(p) => p,
            None => self.config.get_default_purity()?,
        };

        let now = Utc::now().naive_utc();
        let job = JobSheet {
            job_id: 0,
            job_no: job_no.clone(),
            metal_type: input.metal_type,
            purity,
            size: input.size,
            worker_id: input.worker_id,
            issue_weight: input.issue_weight,
            issue_date: now,
            status: JobStatus::InProgress,
            current_step: StageName::FIRST,
            total_loss: 0.0,
            scrap_weight: 0.0,
            dust_weight: 0.0,
            return_weight: None,
            return_pieces: None,
            completed_date: None,
            last_return_weight: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        let steps: Vec<JobStep> = StageName::ALL
            .iter()
            .map(|stage| {
                let mut step = JobStep::pending(0, *stage, input.worker_id);
                if *stage == StageName::FIRST {
                    step.status = StepStatus::InProgress;
                    step.issue_weight = input.issue_weight;
                    step.start_date = Some(now);
                }
                step
            })
            .collect();

        let audit = AuditEntry::new(
            0,
            AuditPayload::Created(JobSnapshot::of(&job, &steps)),
            input.worker_id,
        );

        let job_id = match self.job_repo.create_with_steps(&job, &steps, &audit) {
            Ok(id) => id,
            Err(RepositoryError::UniqueConstraintViolation(msg)) if caller_supplied => {
                return Err(WorkflowError::Validation(format!(
                    "工单号已存在: {} ({})",
                    job_no, msg
                )));
            }
            Err(e) => return Err(e.into()),
        };

        info!(job_id, job_no = %job_no, purity = %purity, "工单已创建");
        self.load_detail(job_id)
    }

    // ==========================================
    // 当前工序完工
    // ==========================================

    /// 完成当前进行中的工序
    ///
    /// 最后一道工序完工时工单同时完成；否则只记录交接重量，不自动开工下一道
    #[instrument(skip(self, input), fields(job_id = job_id))]
    pub fn complete_current_stage(
        &self,
        job_id: i64,
        input: StageCompletionInput,
    ) -> WorkflowResult<WorkflowOutcome> {
        let lock = self.locks.lock_for(job_id)?;
        let _guard = acquire(&lock)?;

        // 1. 工单存在
        let detail = self.load_detail(job_id)?;

        // 2. 已完成工单: 报告而非报错
        if detail.job.is_completed() {
            info!(job_no = %detail.job.job_no, "工单已完成，忽略完工请求");
            return Ok(WorkflowOutcome::AlreadyCompleted(detail));
        }

        validate_completion_input(&input)?;
        if let Some(worker_id) = input.worker_id {
            self.ensure_worker_exists(worker_id)?;
        }

        // 3. 唯一进行中工序
        let ledger = StepLedger::new(&detail.steps);
        let current = ledger.active_step()?;

        // 4. 前序工序全部完工
        if let Some(pred) = ledger.first_incomplete_predecessor(current.stage) {
            return Err(WorkflowError::Workflow(format!(
                "前序工序{}未完工，不能完成工序{}",
                pred.stage, current.stage
            )));
        }

        // 5. 质量守恒
        let total_output = input.total_output();
        if total_output > current.issue_weight + WEIGHT_EPSILON_G {
            return Err(WorkflowError::Validation(format!(
                "总产出 ({:.3}g) 超过投入重量 ({:.3}g)",
                total_output, current.issue_weight
            )));
        }
        let return_weight = conserved_return_weight(&input, current.issue_weight);

        let now = Utc::now().naive_utc();

        let mut step = current.clone();
        step.status = StepStatus::Completed;
        step.return_weight = Some(return_weight);
        step.scrap_weight = input.scrap_weight;
        step.dust_weight = input.dust_weight;
        step.pieces = input.pieces;
        step.return_pieces = input.return_pieces;
        step.completed_date = Some(now);
        if input.worker_id.is_some() {
            step.worker_id = input.worker_id;
        }
        if input.notes.is_some() {
            step.notes = input.notes;
        }

        let step_loss = step.loss();
        let mut job = detail.job.clone();
        job.total_loss += step_loss;
        job.scrap_weight += step.scrap_weight;
        job.dust_weight += step.dust_weight;

        let payload = if step.stage.is_last() {
            job.status = JobStatus::Completed;
            job.completed_date = Some(now);
            job.return_weight = step.return_weight;
            job.return_pieces = Some(step.return_pieces);
            AuditPayload::JobCompleted(StageCompletionDelta::of(&step, &job))
        } else {
            job.last_return_weight = step.return_weight;
            AuditPayload::StepCompleted(StageCompletionDelta::of(&step, &job))
        };

        let audit = AuditEntry::new(job_id, payload, step.worker_id);
        let revision = self
            .job_repo
            .apply_transition(&job, std::slice::from_ref(&step), &audit)?;

        info!(
            job_no = %job.job_no,
            stage = %step.stage,
            loss = step_loss,
            total_loss = job.total_loss,
            status = %job.status,
            revision,
            "工序完工"
        );

        Ok(WorkflowOutcome::Applied(self.load_detail(job_id)?))
    }

    // ==========================================
    // 下一道工序开工
    // ==========================================

    /// 开工最近完工工序的下一道工序，投入重量取上一道的回料重量
    #[instrument(skip(self), fields(job_id = job_id))]
    pub fn start_next_stage(&self, job_id: i64) -> WorkflowResult<WorkflowOutcome> {
        let lock = self.locks.lock_for(job_id)?;
        let _guard = acquire(&lock)?;

        let detail = self.load_detail(job_id)?;

        if detail.job.is_completed() {
            info!(job_no = %detail.job.job_no, "工单已完成，忽略开工请求");
            return Ok(WorkflowOutcome::AlreadyCompleted(detail));
        }

        let ledger = StepLedger::new(&detail.steps);
        if ledger.in_progress_count() > 0 {
            let active = ledger.active_step()?;
            return Err(WorkflowError::Workflow(format!(
                "工序{}仍在进行中，不能开工下一道工序",
                active.stage
            )));
        }

        let no_next = || WorkflowError::Workflow("没有可开工的下一道工序".to_string());
        let last = ledger.last_completed().ok_or_else(no_next)?;
        let next = ledger.next_pending_after(last).ok_or_else(no_next)?;

        if let Some(pred) = ledger.first_incomplete_predecessor(next.stage) {
            return Err(WorkflowError::Workflow(format!(
                "前序工序{}未完工，不能开工工序{}",
                pred.stage, next.stage
            )));
        }

        let (issue_weight, handoff_source) = resolve_handoff(last, detail.job.last_return_weight)?;

        let now = Utc::now().naive_utc();
        let mut step = next.clone();
        step.status = StepStatus::InProgress;
        step.issue_weight = issue_weight;
        step.start_date = Some(now);

        let mut job = detail.job.clone();
        job.current_step = step.stage;

        let audit = AuditEntry::new(
            job_id,
            AuditPayload::StepStarted(StepStartedPayload {
                stage: step.stage,
                stage_order: step.stage_order(),
                issue_weight,
                handoff_source,
                worker_id: step.worker_id,
            }),
            step.worker_id,
        );

        let revision = self
            .job_repo
            .apply_transition(&job, std::slice::from_ref(&step), &audit)?;

        info!(
            job_no = %job.job_no,
            stage = %step.stage,
            issue_weight,
            revision,
            "工序开工"
        );

        Ok(WorkflowOutcome::Applied(self.load_detail(job_id)?))
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn load_detail(&self, job_id: i64) -> WorkflowResult<JobSheetDetail> {
        self.job_repo
            .find_detail(job_id)?
            .ok_or_else(|| WorkflowError::not_found("JobSheet", job_id))
    }

    fn ensure_worker_exists(&self, worker_id: i64) -> WorkflowResult<()> {
        if self.workers.worker_exists(worker_id)? {
            Ok(())
        } else {
            Err(WorkflowError::not_found("Worker", worker_id))
        }
    }
}

fn acquire(lock: &std::sync::Mutex<()>) -> WorkflowResult<MutexGuard<'_, ()>> {
    lock.lock().map_err(|e| {
        WorkflowError::Repository(RepositoryError::LockError(format!("工单锁获取失败: {}", e)))
    })
}

fn validate_weight(field: &str, value: f64) -> WorkflowResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(WorkflowError::Validation(format!(
            "{}必须为非负数: {}",
            field, value
        )));
    }
    Ok(())
}

fn validate_completion_input(input: &StageCompletionInput) -> WorkflowResult<()> {
    validate_weight("return_weight", input.return_weight)?;
    validate_weight("scrap_weight", input.scrap_weight)?;
    validate_weight("dust_weight", input.dust_weight)?;

    if input.pieces < 0 {
        return Err(WorkflowError::Validation(format!(
            "pieces必须为非负数: {}",
            input.pieces
        )));
    }
    if input.return_pieces < 0 {
        return Err(WorkflowError::Validation(format!(
            "return_pieces必须为非负数: {}",
            input.return_pieces
        )));
    }
    Ok(())
}

/// 回料重量截断到 投入 - 废料 - 粉尘，吸收浮点舍入，保证落库产出不超过投入
fn conserved_return_weight(input: &StageCompletionInput, issue_weight: f64) -> f64 {
    let ceiling = (issue_weight - input.scrap_weight - input.dust_weight).max(0.0);
    input.return_weight.min(ceiling)
}

/// 交接重量: 上一道工序的回料重量优先，工单交接字段仅作兜底
fn resolve_handoff(
    last_completed: &JobStep,
    last_return_weight: Option<f64>,
) -> WorkflowResult<(f64, HandoffSource)> {
    match (last_completed.return_weight, last_return_weight) {
        (Some(step_weight), Some(carried)) => {
            if (step_weight - carried).abs() > INVARIANT_EPSILON {
                warn!(
                    stage = %last_completed.stage,
                    step_weight,
                    carried,
                    "工序回料重量与工单交接重量不一致，以工序为准"
                );
            }
            Ok((step_weight, HandoffSource::PreviousStep))
        }
        (Some(step_weight), None) => Ok((step_weight, HandoffSource::PreviousStep)),
        (None, Some(carried)) => {
            debug!(stage = %last_completed.stage, carried, "工序缺少回料重量，使用工单交接重量");
            Ok((carried, HandoffSource::LastReturnWeight))
        }
        (None, None) => Err(WorkflowError::Workflow(format!(
            "工序{}缺少回料重量，无法确定交接重量",
            last_completed.stage
        ))),
    }
}
