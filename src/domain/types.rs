// ==========================================
// 贵金属工单流转系统 - 领域类型定义
// ==========================================
// 依据: 工单流转核心 - 3. 数据模型
// 依据: 9. 设计说明 - 工序建模为有序枚举
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 金属类型 (Metal Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetalType {
    Gold,   // 金
    Silver, // 银
}

impl fmt::Display for MetalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl MetalType {
    /// 从字符串解析（大小写不敏感）
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GOLD" => Some(MetalType::Gold),
            "SILVER" => Some(MetalType::Silver),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            MetalType::Gold => "GOLD",
            MetalType::Silver => "SILVER",
        }
    }
}

// ==========================================
// 成色 (Purity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purity {
    #[serde(rename = "22K")]
    K22,
    #[serde(rename = "24K")]
    K24,
}

impl fmt::Display for Purity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl Purity {
    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "22K" => Some(Purity::K22),
            "24K" => Some(Purity::K24),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Purity::K22 => "22K",
            Purity::K24 => "24K",
        }
    }
}

// ==========================================
// 工单状态 (Job Status)
// ==========================================
// 状态机: InProgress --(第5道工序完成)--> Completed（终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "In-Progress")]
    InProgress,
    #[serde(rename = "Completed")]
    Completed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl JobStatus {
    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "In-Progress" => Some(JobStatus::InProgress),
            "Completed" => Some(JobStatus::Completed),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            JobStatus::InProgress => "In-Progress",
            JobStatus::Completed => "Completed",
        }
    }

    pub fn is_completed(&self) -> bool {
        *self == JobStatus::Completed
    }
}

// ==========================================
// 工序状态 (Step Status)
// ==========================================
// 状态机: Pending --(开工)--> InProgress --(完工)--> Completed（单道工序终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl StepStatus {
    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "pending" => Some(StepStatus::Pending),
            "in-progress" => Some(StepStatus::InProgress),
            "completed" => Some(StepStatus::Completed),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::Completed => "completed",
        }
    }
}

// ==========================================
// 工序 (Stage)
// ==========================================
// 红线: 工序顺序只由 order() 决定，禁止按名称字符串比较
// 顺序: Melting(1) < Rolling(2) < Press(3) < Finishing(4) < Packing(5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Melting = 1,   // 熔炼
    Rolling = 2,   // 压延
    Press = 3,     // 冲压
    Finishing = 4, // 精整（T+P+P）
    Packing = 5,   // 包装
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl StageName {
    /// 全部工序，按顺序排列
    pub const ALL: [StageName; 5] = [
        StageName::Melting,
        StageName::Rolling,
        StageName::Press,
        StageName::Finishing,
        StageName::Packing,
    ];

    /// 第一道工序
    pub const FIRST: StageName = StageName::Melting;

    /// 最后一道工序（完工即工单完成）
    pub const LAST: StageName = StageName::Packing;

    /// 工序序号 (1..=5)
    pub fn order(&self) -> i32 {
        *self as i32
    }

    /// 按序号查找工序
    pub fn from_order(order: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.order() == order)
    }

    /// 下一道工序（最后一道返回 None）
    pub fn next(&self) -> Option<Self> {
        Self::from_order(self.order() + 1)
    }

    pub fn is_last(&self) -> bool {
        *self == Self::LAST
    }

    /// 从字符串解析（兼容历史数据中的 "TPP"）
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "melting" => Some(StageName::Melting),
            "rolling" => Some(StageName::Rolling),
            "press" => Some(StageName::Press),
            "finishing" | "tpp" => Some(StageName::Finishing),
            "packing" => Some(StageName::Packing),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            StageName::Melting => "melting",
            StageName::Rolling => "rolling",
            StageName::Press => "press",
            StageName::Finishing => "finishing",
            StageName::Packing => "packing",
        }
    }
}
