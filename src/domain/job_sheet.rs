// ==========================================
// 贵金属工单流转系统 - 工单与工序领域模型
// ==========================================
// 依据: 工单流转核心 - 3. 数据模型
// 对齐: job_sheet / job_sheet_step 表
// ==========================================

use crate::domain::types::{JobStatus, MetalType, Purity, StageName, StepStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// JobSheet - 工单（聚合根）
// ==========================================
// 红线: 累计字段只在工序完工时增加
// 红线: 终态字段只在第5道工序完工时写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSheet {
    // ===== 主键 =====
    pub job_id: i64,    // 工单ID (rowid)
    pub job_no: String, // 工单号 (唯一, JOB-1001 格式)

    // ===== 发料信息 =====
    pub metal_type: MetalType,
    pub purity: Purity,
    pub size: Option<String>,         // 规格（自由文本）
    pub worker_id: Option<i64>,       // 负责工人 (弱引用)
    pub issue_weight: f64,            // 发料重量 (g)，创建后不变
    pub issue_date: NaiveDateTime,    // 发料时间

    // ===== 状态 =====
    pub status: JobStatus,
    pub current_step: StageName, // 最近一次处于活动状态的工序

    // ===== 累计字段 (In-Progress 期间单调不减) =====
    pub total_loss: f64,   // 累计损耗 (g)
    pub scrap_weight: f64, // 累计废料 (g)
    pub dust_weight: f64,  // 累计粉尘 (g)

    // ===== 终态字段 (仅完工时写入) =====
    pub return_weight: Option<f64>,
    pub return_pieces: Option<i64>,
    pub completed_date: Option<NaiveDateTime>,

    // ===== 交接 =====
    pub last_return_weight: Option<f64>, // 上一道完工工序的回料重量

    // ===== 审计/并发 =====
    pub revision: i32, // 乐观锁：修订号
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl JobSheet {
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }
}

// ==========================================
// JobStep - 工序记录
// ==========================================
// 每张工单固定5条，与工单同一事务创建
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStep {
    pub step_id: i64,
    pub job_id: i64,
    pub stage: StageName,
    pub status: StepStatus,

    // ===== 重量 (g) =====
    pub issue_weight: f64,          // 本工序投入
    pub return_weight: Option<f64>, // 本工序回料 (完工前为 None)
    pub scrap_weight: f64,          // 废料
    pub dust_weight: f64,           // 粉尘

    // ===== 件数 =====
    pub pieces: i64,
    pub return_pieces: i64,

    pub start_date: Option<NaiveDateTime>,
    pub completed_date: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub worker_id: Option<i64>,
}

impl JobStep {
    /// 创建待开工的工序
    pub fn pending(job_id: i64, stage: StageName, worker_id: Option<i64>) -> Self {
        Self {
            step_id: 0,
            job_id,
            stage,
            status: StepStatus::Pending,
            issue_weight: 0.0,
            return_weight: None,
            scrap_weight: 0.0,
            dust_weight: 0.0,
            pieces: 0,
            return_pieces: 0,
            start_date: None,
            completed_date: None,
            notes: None,
            worker_id,
        }
    }

    /// 工序序号
    pub fn stage_order(&self) -> i32 {
        self.stage.order()
    }

    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == StepStatus::InProgress
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// 总产出 = 回料 + 废料 + 粉尘
    pub fn total_output(&self) -> f64 {
        self.return_weight.unwrap_or(0.0) + self.scrap_weight + self.dust_weight
    }

    /// 工序损耗 = 投入 - 总产出（只读，完工前为 0）
    pub fn loss(&self) -> f64 {
        if !self.is_completed() {
            return 0.0;
        }
        (self.issue_weight - self.total_output()).max(0.0)
    }
}

// ==========================================
// JobSheetDetail - 工单 + 全部工序
// ==========================================
// 用途: 引擎与API的返回值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSheetDetail {
    pub job: JobSheet,
    pub steps: Vec<JobStep>, // 按工序序号升序
}

impl JobSheetDetail {
    /// 按工序查找
    pub fn step(&self, stage: StageName) -> Option<&JobStep> {
        self.steps.iter().find(|s| s.stage == stage)
    }

    /// 当前进行中的工序
    pub fn active_step(&self) -> Option<&JobStep> {
        self.steps.iter().find(|s| s.is_in_progress())
    }
}

// ==========================================
// NewJobSheet - 创建工单输入
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJobSheet {
    pub job_no: Option<String>, // None 时按上一个工单号递增
    pub metal_type: MetalType,
    pub purity: Option<Purity>, // None 时取配置默认成色
    pub issue_weight: f64,
    pub size: Option<String>,
    pub worker_id: Option<i64>,
}

// ==========================================
// StageCompletionInput - 工序完工输入
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageCompletionInput {
    pub return_weight: f64,
    pub scrap_weight: f64,
    pub dust_weight: f64,
    pub pieces: i64,
    pub return_pieces: i64,
    pub worker_id: Option<i64>, // 覆盖工序工人（可选）
    pub notes: Option<String>,
}

impl StageCompletionInput {
    /// 仅包含重量的完工输入（件数为0）
    pub fn weights(return_weight: f64, scrap_weight: f64, dust_weight: f64) -> Self {
        Self {
            return_weight,
            scrap_weight,
            dust_weight,
            ..Default::default()
        }
    }

    /// 总产出
    pub fn total_output(&self) -> f64 {
        self.return_weight + self.scrap_weight + self.dust_weight
    }
}
