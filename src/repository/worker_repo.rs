// ==========================================
// 贵金属工单流转系统 - 工人名录仓储
// ==========================================
// 说明: 工人名录是外部协作方，核心只依赖存在性校验
// 依据: worker 表
// ==========================================

use crate::db::{format_datetime, parse_datetime_column};
use crate::domain::worker::Worker;
use crate::engine::collaborators::WorkerDirectory;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// WorkerRepository - 工人仓储
// ==========================================
pub struct WorkerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkerRepository {
    /// 创建新的工人仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入工人，返回分配的 worker_id
    pub fn insert(&self, worker: &Worker) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        conn.execute(
            "INSERT INTO worker (name, rate, created_at) VALUES (?, ?, ?)",
            params![worker.name, worker.rate, format_datetime(&worker.created_at)],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// 按ID查询
    pub fn find_by_id(&self, worker_id: i64) -> RepositoryResult<Option<Worker>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            "SELECT worker_id, name, rate, created_at FROM worker WHERE worker_id = ?",
            params![worker_id],
            |row| Self::map_row(row),
        ) {
            Ok(worker) => Ok(Some(worker)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询全部工人（按姓名）
    pub fn list_all(&self) -> RepositoryResult<Vec<Worker>> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare("SELECT worker_id, name, rate, created_at FROM worker ORDER BY name ASC")?;
        let workers = stmt
            .query_map([], |row| Self::map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(workers)
    }

    fn map_row(row: &Row) -> SqliteResult<Worker> {
        Ok(Worker {
            worker_id: row.get(0)?,
            name: row.get(1)?,
            rate: row.get(2)?,
            created_at: parse_datetime_column(row, 3)?,
        })
    }
}

impl WorkerDirectory for WorkerRepository {
    fn worker_exists(&self, worker_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM worker WHERE worker_id = ?",
            params![worker_id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_repo() -> WorkerRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        WorkerRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_insert_and_exists() {
        let repo = setup_repo();
        let id = repo.insert(&Worker::new("Ramesh", 12.5)).unwrap();

        assert!(repo.worker_exists(id).unwrap());
        assert!(!repo.worker_exists(id + 100).unwrap());

        let found = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(found.name, "Ramesh");
        assert_eq!(found.rate, 12.5);
    }

    #[test]
    fn test_list_all_sorted_by_name() {
        let repo = setup_repo();
        repo.insert(&Worker::new("Suresh", 0.0)).unwrap();
        repo.insert(&Worker::new("Amit", 0.0)).unwrap();

        let names: Vec<String> = repo.list_all().unwrap().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["Amit".to_string(), "Suresh".to_string()]);
    }
}
