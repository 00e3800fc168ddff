// ==========================================
// 贵金属工单流转系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::workflow_config_trait::WorkflowConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::types::Purity;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path).map_err(|e| {
            RepositoryError::DatabaseConnectionError(format!("{}: {}", db_path, e))
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;

        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 返回
    /// - Ok(String): 配置快照的JSON字符串（按 key 排序）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key"
        )?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }
}

// ==========================================
// WorkflowConfigReader Trait 实现
// ==========================================
impl WorkflowConfigReader for ConfigManager {
    fn get_job_no_prefix(&self) -> RepositoryResult<String> {
        let value = self.get_config_or_default(config_keys::JOB_NO_PREFIX, "JOB-")?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Ok("JOB-".to_string())
        } else {
            Ok(trimmed.to_string())
        }
    }

    fn get_job_no_start(&self) -> RepositoryResult<i64> {
        let value = self.get_config_or_default(config_keys::JOB_NO_START, "1001")?;
        match value.trim().parse::<i64>() {
            Ok(v) if v >= 0 => Ok(v),
            _ => {
                tracing::warn!(
                    config_key = config_keys::JOB_NO_START,
                    raw_value = %value,
                    "起始工单号配置格式错误，使用默认值1001"
                );
                Ok(1001)
            }
        }
    }

    fn get_default_purity(&self) -> RepositoryResult<Purity> {
        let value = self.get_config_or_default(config_keys::DEFAULT_PURITY, "22K")?;
        Ok(Purity::from_str(&value).unwrap_or_else(|| {
            tracing::warn!(
                config_key = config_keys::DEFAULT_PURITY,
                raw_value = %value,
                "默认成色配置格式错误，使用22K"
            );
            Purity::K22
        }))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 工单号
    pub const JOB_NO_PREFIX: &str = "job_no_prefix";
    pub const JOB_NO_START: &str = "job_no_start";

    // 发料默认值
    pub const DEFAULT_PURITY: &str = "default_purity";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_missing() {
        let config = setup_manager();
        assert_eq!(config.get_job_no_prefix().unwrap(), "JOB-");
        assert_eq!(config.get_job_no_start().unwrap(), 1001);
        assert_eq!(config.get_default_purity().unwrap(), Purity::K22);
    }

    #[test]
    fn test_override_and_snapshot() {
        let config = setup_manager();
        config.set_global_config_value(config_keys::JOB_NO_PREFIX, "SJ-").unwrap();
        config.set_global_config_value(config_keys::DEFAULT_PURITY, "24K").unwrap();

        assert_eq!(config.get_job_no_prefix().unwrap(), "SJ-");
        assert_eq!(config.get_default_purity().unwrap(), Purity::K24);

        let snapshot: BTreeMap<String, String> =
            serde_json::from_str(&config.get_config_snapshot().unwrap()).unwrap();
        assert_eq!(snapshot.get("job_no_prefix").map(String::as_str), Some("SJ-"));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_open_failure_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("missing").join("config.db");

        match ConfigManager::new(db_path.to_str().unwrap()) {
            Err(RepositoryError::DatabaseConnectionError(msg)) => {
                assert!(msg.contains("config.db"));
            }
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("expected connection error"),
        }
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = setup_manager();
        config.set_global_config_value(config_keys::JOB_NO_START, "abc").unwrap();
        config.set_global_config_value(config_keys::DEFAULT_PURITY, "18K").unwrap();

        assert_eq!(config.get_job_no_start().unwrap(), 1001);
        assert_eq!(config.get_default_purity().unwrap(), Purity::K22);
    }
}
