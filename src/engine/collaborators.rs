// ==========================================
// 贵金属工单流转系统 - 外部协作方接口
// ==========================================
// 职责: 定义引擎依赖的协作方 Trait
// 说明: 引擎只依赖接口，具体实现由 Repository 层提供
// ==========================================

use crate::repository::error::RepositoryResult;

/// 工人名录（仅需存在性校验）
pub trait WorkerDirectory: Send + Sync {
    fn worker_exists(&self, worker_id: i64) -> RepositoryResult<bool>;
}

/// 工单号序列来源
pub trait JobNoSource: Send + Sync {
    /// 最近一次签发的工单号（无工单时返回 None）
    fn last_issued_job_no(&self) -> RepositoryResult<Option<String>>;
}
