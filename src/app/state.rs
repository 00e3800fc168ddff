// ==========================================
// 贵金属工单流转系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::JobSheetApi;
use crate::config::config_manager::ConfigManager;
use crate::db::open_and_init;
use crate::engine::workflow::WorkflowEngine;
use crate::repository::{
    audit_repo::AuditLogRepository, job_sheet_repo::JobSheetRepository,
    worker_repo::WorkerRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源（单一共享连接）
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 工单API
    pub jobsheet_api: Arc<JobSheetApi<ConfigManager>>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 工人仓储（名录维护）
    pub worker_repo: Arc<WorkerRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并初始化表结构
    /// 2. 初始化所有Repository
    /// 3. 初始化流转引擎并创建API实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_and_init(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let job_repo = Arc::new(JobSheetRepository::new(conn.clone()));
        let audit_repo = Arc::new(AuditLogRepository::new(conn.clone()));
        let worker_repo = Arc::new(WorkerRepository::new(conn.clone()));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let workflow_engine = Arc::new(WorkflowEngine::new(
            job_repo.clone(),
            worker_repo.clone(),
            config_manager.clone(),
        ));

        // ==========================================
        // 创建API实例
        // ==========================================
        let jobsheet_api = Arc::new(JobSheetApi::new(job_repo, audit_repo, workflow_engine));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            jobsheet_api,
            config_manager,
            worker_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 METAL_JOBSHEET_DB > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("METAL_JOBSHEET_DB") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./metal_jobsheet.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("metal-jobsheet");
        // best-effort: 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("metal_jobsheet.db");
        }
    }

    path.to_string_lossy().to_string()
}
