// ==========================================
// 贵金属工单流转系统 - 流转配置读取 Trait
// ==========================================
// 职责: 定义工单引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::Purity;
use crate::repository::error::RepositoryResult;

// ==========================================
// WorkflowConfigReader Trait
// ==========================================
// 用途: 工单引擎所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait WorkflowConfigReader: Send + Sync {
    // ===== 工单号 =====

    /// 获取工单号前缀
    ///
    /// # 默认值
    /// - "JOB-"
    fn get_job_no_prefix(&self) -> RepositoryResult<String>;

    /// 获取首个工单号的数字部分（无历史工单时使用）
    ///
    /// # 默认值
    /// - 1001
    fn get_job_no_start(&self) -> RepositoryResult<i64>;

    // ===== 发料默认值 =====

    /// 获取默认成色（创建工单未指定成色时使用）
    ///
    /// # 默认值
    /// - 22K
    fn get_default_purity(&self) -> RepositoryResult<Purity>;
}
