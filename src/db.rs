// ==========================================
// 贵金属工单流转系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分连接外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 统一建表（幂等），工单/工序/审计三张核心表
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间写入格式（毫秒精度）
pub const DATETIME_WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 时间读取格式（小数秒可选，兼容旧数据）
pub const DATETIME_READ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 格式化时间用于存储
pub fn format_datetime(ts: &NaiveDateTime) -> String {
    ts.format(DATETIME_WRITE_FORMAT).to_string()
}

/// 从数据库行读取时间列
pub fn parse_datetime_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_READ_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// 从数据库行读取可空时间列
pub fn parse_optional_datetime_column(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<NaiveDateTime>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => NaiveDateTime::parse_from_str(&raw, DATETIME_READ_FORMAT)
            .map(Some)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
            }),
        None => Ok(None),
    }
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等）
///
/// 说明：
/// - audit_log 通过触发器禁止 UPDATE/DELETE，保证只追加
/// - job_sheet_step 以 (job_id, stage_order) 唯一，保证每张工单每道工序只有一条
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS worker (
            worker_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            rate REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS job_sheet (
            job_id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_no TEXT NOT NULL UNIQUE,
            metal_type TEXT NOT NULL CHECK (metal_type IN ('GOLD', 'SILVER')),
            purity TEXT NOT NULL CHECK (purity IN ('22K', '24K')),
            size TEXT,
            worker_id INTEGER REFERENCES worker(worker_id),
            issue_weight REAL NOT NULL CHECK (issue_weight > 0),
            issue_date TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('In-Progress', 'Completed')),
            current_step TEXT NOT NULL,
            total_loss REAL NOT NULL DEFAULT 0,
            scrap_weight REAL NOT NULL DEFAULT 0,
            dust_weight REAL NOT NULL DEFAULT 0,
            return_weight REAL,
            return_pieces INTEGER,
            completed_date TEXT,
            last_return_weight REAL,
            revision INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_job_sheet_status ON job_sheet(status);
        CREATE INDEX IF NOT EXISTS idx_job_sheet_worker ON job_sheet(worker_id);

        CREATE TABLE IF NOT EXISTS job_sheet_step (
            step_id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES job_sheet(job_id),
            stage_name TEXT NOT NULL,
            stage_order INTEGER NOT NULL CHECK (stage_order BETWEEN 1 AND 5),
            status TEXT NOT NULL CHECK (status IN ('pending', 'in-progress', 'completed')),
            issue_weight REAL NOT NULL DEFAULT 0,
            return_weight REAL,
            scrap_weight REAL NOT NULL DEFAULT 0,
            dust_weight REAL NOT NULL DEFAULT 0,
            loss REAL NOT NULL DEFAULT 0,
            pieces INTEGER NOT NULL DEFAULT 0,
            return_pieces INTEGER NOT NULL DEFAULT 0,
            start_date TEXT,
            completed_date TEXT,
            notes TEXT,
            worker_id INTEGER REFERENCES worker(worker_id),
            UNIQUE(job_id, stage_order)
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            audit_id TEXT PRIMARY KEY,
            job_id INTEGER NOT NULL REFERENCES job_sheet(job_id),
            action TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            actor INTEGER,
            recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_job ON audit_log(job_id);

        CREATE TRIGGER IF NOT EXISTS trg_audit_log_no_update
        BEFORE UPDATE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_audit_log_no_delete
        BEFORE DELETE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only');
        END;
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 打开连接并确保 schema 就绪
pub fn open_and_init(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;

    match read_schema_version(&conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                db_version = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema 版本高于当前程序，可能存在不兼容字段"
            );
        }
        _ => {}
    }

    Ok(conn)
}
