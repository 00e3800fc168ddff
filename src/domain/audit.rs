// ==========================================
// 贵金属工单流转系统 - 审计日志领域模型
// ==========================================
// 依据: 工单流转核心 - 3. 数据模型 Audit Entry
// 红线: 只追加，写入后不可修改
// 红线: 每次工单/工序状态变更对应且仅对应一条审计记录
// ==========================================

use crate::domain::job_sheet::{JobSheet, JobStep};
use crate::domain::types::{JobStatus, MetalType, Purity, StageName, StepStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// AuditAction - 审计动作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,       // 工单创建
    StepStarted,   // 工序开工
    StepCompleted, // 工序完工（非最后一道）
    JobCompleted,  // 最后一道工序完工，工单完成
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AuditAction {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::StepStarted => "step_started",
            AuditAction::StepCompleted => "step_completed",
            AuditAction::JobCompleted => "job_completed",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(AuditAction::Created),
            "step_started" => Some(AuditAction::StepStarted),
            "step_completed" => Some(AuditAction::StepCompleted),
            "job_completed" => Some(AuditAction::JobCompleted),
            _ => None,
        }
    }
}

// ==========================================
// AuditPayload - 审计负载（按动作类型区分的固定字段集）
// ==========================================
// 序列化格式: {"action": "step_completed", "stage": "melting", ...}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditPayload {
    Created(JobSnapshot),
    StepStarted(StepStartedPayload),
    StepCompleted(StageCompletionDelta),
    JobCompleted(StageCompletionDelta),
}

impl AuditPayload {
    /// 负载对应的动作类型
    pub fn action(&self) -> AuditAction {
        match self {
            AuditPayload::Created(_) => AuditAction::Created,
            AuditPayload::StepStarted(_) => AuditAction::StepStarted,
            AuditPayload::StepCompleted(_) => AuditAction::StepCompleted,
            AuditPayload::JobCompleted(_) => AuditAction::JobCompleted,
        }
    }
}

// ==========================================
// JobSnapshot - 工单创建时的完整快照（工单头 + 5道初始工序）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_no: String,
    pub metal_type: MetalType,
    pub purity: Purity,
    pub size: Option<String>,
    pub worker_id: Option<i64>,
    pub issue_weight: f64,
    pub issue_date: NaiveDateTime,
    pub status: JobStatus,
    pub current_step: StageName,
    pub steps: Vec<StepSnapshot>, // 按工序序号升序
}

impl JobSnapshot {
    pub fn of(job: &JobSheet, steps: &[JobStep]) -> Self {
        let mut steps: Vec<StepSnapshot> = steps.iter().map(StepSnapshot::of).collect();
        steps.sort_by_key(|s| s.stage_order);

        Self {
            job_no: job.job_no.clone(),
            metal_type: job.metal_type,
            purity: job.purity,
            size: job.size.clone(),
            worker_id: job.worker_id,
            issue_weight: job.issue_weight,
            issue_date: job.issue_date,
            status: job.status,
            current_step: job.current_step,
            steps,
        }
    }
}

// ==========================================
// StepSnapshot - 工序初始状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub stage: StageName,
    pub stage_order: i32,
    pub status: StepStatus,
    pub issue_weight: f64,
    pub start_date: Option<NaiveDateTime>,
    pub worker_id: Option<i64>,
}

impl StepSnapshot {
    pub fn of(step: &JobStep) -> Self {
        Self {
            stage: step.stage,
            stage_order: step.stage_order(),
            status: step.status,
            issue_weight: step.issue_weight,
            start_date: step.start_date,
            worker_id: step.worker_id,
        }
    }
}

// ==========================================
// HandoffSource - 交接重量来源
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffSource {
    PreviousStep,     // 上一道工序的回料重量
    LastReturnWeight, // 工单上的交接字段（工序值缺失时的兜底）
}

// ==========================================
// StepStartedPayload - 工序开工
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStartedPayload {
    pub stage: StageName,
    pub stage_order: i32,
    pub issue_weight: f64,
    pub handoff_source: HandoffSource,
    pub worker_id: Option<i64>,
}

// ==========================================
// StageCompletionDelta - 工序完工增量
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCompletionDelta {
    // ===== 本工序 =====
    pub stage: StageName,
    pub stage_order: i32,
    pub issue_weight: f64,
    pub return_weight: f64,
    pub scrap_weight: f64,
    pub dust_weight: f64,
    pub loss: f64,
    pub pieces: i64,
    pub return_pieces: i64,
    pub worker_id: Option<i64>,
    pub notes: Option<String>,

    // ===== 工单累计（变更后） =====
    pub total_loss: f64,
    pub total_scrap_weight: f64,
    pub total_dust_weight: f64,
    pub final_status: JobStatus,
}

impl StageCompletionDelta {
    /// 由完工后的工序与工单构造
    pub fn of(step: &JobStep, job: &JobSheet) -> Self {
        Self {
            stage: step.stage,
            stage_order: step.stage_order(),
            issue_weight: step.issue_weight,
            return_weight: step.return_weight.unwrap_or(0.0),
            scrap_weight: step.scrap_weight,
            dust_weight: step.dust_weight,
            loss: step.loss(),
            pieces: step.pieces,
            return_pieces: step.return_pieces,
            worker_id: step.worker_id,
            notes: step.notes.clone(),
            total_loss: job.total_loss,
            total_scrap_weight: job.scrap_weight,
            total_dust_weight: job.dust_weight,
            final_status: job.status,
        }
    }
}

// ==========================================
// AuditEntry - 审计记录
// ==========================================
// 对齐: audit_log 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: String,           // UUID
    pub job_id: i64,                // 关联工单
    pub payload: AuditPayload,      // 结构化负载
    pub actor: Option<i64>,         // 操作工人（若已知）
    pub recorded_at: NaiveDateTime, // 记录时间
}

impl AuditEntry {
    /// 创建新的审计记录
    pub fn new(job_id: i64, payload: AuditPayload, actor: Option<i64>) -> Self {
        Self {
            audit_id: uuid::Uuid::new_v4().to_string(),
            job_id,
            payload,
            actor,
            recorded_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn action(&self) -> AuditAction {
        self.payload.action()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serialized_with_action_tag() {
        let payload = AuditPayload::StepStarted(StepStartedPayload {
            stage: StageName::Rolling,
            stage_order: 2,
            issue_weight: 90.0,
            handoff_source: HandoffSource::PreviousStep,
            worker_id: Some(7),
        });

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["action"], "step_started");
        assert_eq!(json["stage"], "rolling");
        assert_eq!(json["stage_order"], 2);
        assert_eq!(json["handoff_source"], "previous_step");

        let back: AuditPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.action(), AuditAction::StepStarted);
    }

    #[test]
    fn test_created_payload_carries_initial_steps() {
        let now = chrono::Utc::now().naive_utc();
        let job = JobSheet {
            job_id: 1,
            job_no: "JOB-1001".to_string(),
            metal_type: MetalType::Gold,
            purity: Purity::K22,
            size: None,
            worker_id: Some(3),
            issue_weight: 100.0,
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
        // 倒序传入，快照内按工序序号排列
        let steps: Vec<JobStep> = StageName::ALL
            .iter()
            .rev()
            .map(|stage| {
                let mut step = JobStep::pending(1, *stage, Some(3));
                if *stage == StageName::FIRST {
                    step.status = StepStatus::InProgress;
                    step.issue_weight = 100.0;
                    step.start_date = Some(now);
                }
                step
            })
            .collect();

        let payload = AuditPayload::Created(JobSnapshot::of(&job, &steps));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["action"], "created");

        let snapshot_steps = json["steps"].as_array().unwrap();
        assert_eq!(snapshot_steps.len(), 5);
        assert_eq!(snapshot_steps[0]["stage"], "melting");
        assert_eq!(snapshot_steps[0]["status"], "in-progress");
        assert_eq!(snapshot_steps[0]["issue_weight"], 100.0);
        for (i, step) in snapshot_steps.iter().enumerate().skip(1) {
            assert_eq!(step["stage_order"], (i + 1) as i64);
            assert_eq!(step["status"], "pending");
            assert_eq!(step["issue_weight"], 0.0);
        }

        match serde_json::from_value::<AuditPayload>(json).unwrap() {
            AuditPayload::Created(snapshot) => {
                assert_eq!(snapshot.steps.len(), 5);
                assert_eq!(snapshot.steps[4].stage, StageName::Packing);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_action_str_mapping() {
        for action in [
            AuditAction::Created,
            AuditAction::StepStarted,
            AuditAction::StepCompleted,
            AuditAction::JobCompleted,
        ] {
            assert_eq!(AuditAction::from_str(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::from_str("updated"), None);
    }
}
