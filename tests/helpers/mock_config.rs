// ==========================================
// Mock 配置实现 - 用于集成测试
// ==========================================

use metal_jobsheet::config::WorkflowConfigReader;
use metal_jobsheet::domain::Purity;
use metal_jobsheet::repository::RepositoryResult;

/// Mock 配置结构
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub job_no_prefix: String,
    pub job_no_start: i64,
    pub default_purity: Purity,
}

impl MockConfig {
    /// 创建默认配置
    pub fn default() -> Self {
        Self {
            job_no_prefix: "JOB-".to_string(),
            job_no_start: 1001,
            default_purity: Purity::K22,
        }
    }

    /// 自定义工单号前缀与起始号
    pub fn with_job_no(prefix: &str, start: i64) -> Self {
        let mut config = Self::default();
        config.job_no_prefix = prefix.to_string();
        config.job_no_start = start;
        config
    }

    /// 默认成色 24K
    pub fn fine_gold() -> Self {
        let mut config = Self::default();
        config.default_purity = Purity::K24;
        config
    }
}

impl WorkflowConfigReader for MockConfig {
    fn get_job_no_prefix(&self) -> RepositoryResult<String> {
        Ok(self.job_no_prefix.clone())
    }

    fn get_job_no_start(&self) -> RepositoryResult<i64> {
        Ok(self.job_no_start)
    }

    fn get_default_purity(&self) -> RepositoryResult<Purity> {
        Ok(self.default_purity)
    }
}
