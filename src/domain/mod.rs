// ==========================================
// 贵金属工单流转系统 - 领域模型层
// ==========================================
// 依据: 工单流转核心 - 3. 数据模型
// ==========================================
// 职责: 定义工单、工序、审计记录等实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod audit;
pub mod job_sheet;
pub mod types;
pub mod worker;

// 重导出核心类型
pub use audit::{
    AuditAction, AuditEntry, AuditPayload, HandoffSource, JobSnapshot, StageCompletionDelta,
    StepSnapshot, StepStartedPayload,
};
pub use job_sheet::{JobSheet, JobSheetDetail, JobStep, NewJobSheet, StageCompletionInput};
pub use types::{JobStatus, MetalType, Purity, StageName, StepStatus};
pub use worker::Worker;
