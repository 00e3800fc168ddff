// ==========================================
// 贵金属工单流转系统 - 引擎层
// ==========================================
// 职责: 工序顺序与质量守恒规则，不拼 SQL
// 红线: 所有拒绝必须输出可读原因
// ==========================================

pub mod collaborators;
pub mod error;
pub mod job_locks;
pub mod job_no;
pub mod ledger;
pub mod workflow;

// 重导出核心引擎
pub use collaborators::{JobNoSource, WorkerDirectory};
pub use error::{WorkflowError, WorkflowErrorKind, WorkflowResult};
pub use job_locks::JobLockRegistry;
pub use job_no::JobNoSequence;
pub use ledger::{verify_invariants, StepLedger, StepTotals, WEIGHT_EPSILON_G};
pub use workflow::{WorkflowEngine, WorkflowOutcome};
