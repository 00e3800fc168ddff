// ==========================================
// 贵金属工单流转系统 - 引擎层错误类型
// ==========================================
// 分类: 校验错误 / 未找到 / 流程错误 / 并发冲突
// 红线: 任何错误均不得部分提交
// ==========================================

use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 引擎层错误
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// 输入非法或超出范围（如负重量、产出超过投入）
    #[error("校验失败: {0}")]
    Validation(String),

    /// 工单或工序不存在
    #[error("{entity}(id={id})不存在")]
    NotFound { entity: String, id: String },

    /// 顺序/状态前置条件不满足
    #[error("流程错误: {0}")]
    Workflow(String),

    /// 并发修改冲突（调用方可重试）
    #[error("并发冲突: {0}")]
    Conflict(String),

    /// 基础设施错误
    #[error(transparent)]
    Repository(RepositoryError),
}

/// 错误分类（供调用方分支处理）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowErrorKind {
    Validation,
    NotFound,
    Workflow,
    Conflict,
    Infrastructure,
}

impl WorkflowError {
    pub fn kind(&self) -> WorkflowErrorKind {
        match self {
            WorkflowError::Validation(_) => WorkflowErrorKind::Validation,
            WorkflowError::NotFound { .. } => WorkflowErrorKind::NotFound,
            WorkflowError::Workflow(_) => WorkflowErrorKind::Workflow,
            WorkflowError::Conflict(_) => WorkflowErrorKind::Conflict,
            WorkflowError::Repository(_) => WorkflowErrorKind::Infrastructure,
        }
    }

    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

// 乐观锁失败 / 唯一约束冲突 -> Conflict，其余保持为基础设施错误
impl From<RepositoryError> for WorkflowError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                job_id,
                expected,
                actual,
            } => WorkflowError::Conflict(format!(
                "工单{}已被其他请求修改（期望revision={}，实际revision={}）",
                job_id, expected, actual
            )),
            RepositoryError::UniqueConstraintViolation(msg) => {
                WorkflowError::Conflict(format!("唯一约束冲突: {}", msg))
            }
            RepositoryError::NotFound { entity, id } => WorkflowError::NotFound { entity, id },
            other => WorkflowError::Repository(other),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
