// ==========================================
// 贵金属工单流转系统 - 工单号序列
// ==========================================
// 规则: 前缀 + (上一个工单号的数字后缀 + 1)
//       无工单或后缀无法解析时使用 前缀 + 起始号
// ==========================================

use crate::config::WorkflowConfigReader;
use crate::engine::collaborators::JobNoSource;
use crate::engine::error::WorkflowResult;
use std::sync::Arc;

pub struct JobNoSequence<C>
where
    C: WorkflowConfigReader,
{
    source: Arc<dyn JobNoSource>,
    config: Arc<C>,
}

impl<C> JobNoSequence<C>
where
    C: WorkflowConfigReader,
{
    pub fn new(source: Arc<dyn JobNoSource>, config: Arc<C>) -> Self {
        Self { source, config }
    }

    /// 下一个工单号（仅预览，不占号）
    pub fn next_job_no(&self) -> WorkflowResult<String> {
        let prefix = self.config.get_job_no_prefix()?;
        let start = self.config.get_job_no_start()?;
        let last = self.source.last_issued_job_no()?;

        Ok(derive_next_job_no(last.as_deref(), &prefix, start))
    }
}

/// 由上一个工单号推导下一个工单号
pub fn derive_next_job_no(last: Option<&str>, prefix: &str, start: i64) -> String {
    let next = last
        .and_then(numeric_suffix)
        .and_then(|n| n.checked_add(1))
        .unwrap_or(start);

    format!("{}{}", prefix, next)
}

/// 末尾连续数字
fn numeric_suffix(job_no: &str) -> Option<i64> {
    let trimmed = job_no.trim();
    let digits_start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;

    trimmed[digits_start..].parse::<i64>().ok()
}
