// ==========================================
// 贵金属工单流转系统 - 工人领域模型
// ==========================================
// 说明: 工人名录属于外部协作方，核心只需要存在性校验
// 对齐: worker 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Worker - 工人
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: i64,
    pub name: String,
    pub rate: f64, // 工价
    pub created_at: NaiveDateTime,
}

impl Worker {
    /// 创建新工人（worker_id 由数据库分配）
    pub fn new(name: impl Into<String>, rate: f64) -> Self {
        Self {
            worker_id: 0,
            name: name.into(),
            rate,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}
