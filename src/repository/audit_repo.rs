// ==========================================
// 贵金属工单流转系统 - 审计日志数据仓储
// ==========================================
// 依据: 工单流转核心 - 3. 数据模型 Audit Entry
// 依据: audit_log 表
// 红线: 只追加，不提供更新/删除
// ==========================================

mod core;
mod queries;


pub use core::AuditLogRepository;
