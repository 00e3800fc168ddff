// ==========================================
// 贵金属工单流转系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口，供外部调用层使用
// ==========================================

pub mod error;
pub mod jobsheet_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use jobsheet_api::JobSheetApi;
