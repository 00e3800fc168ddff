// ==========================================
// 贵金属工单流转系统 - 工单级互斥锁
// ==========================================
// 职责: 同一工单的"读取 -> 校验 -> 写入 -> 审计"串行执行
// 说明: 不同工单互不阻塞；跨进程并发由 revision 乐观锁兜底
// 注册表只保存弱引用，操作结束、句柄释放后条目即被清理
// ==========================================

use crate::engine::error::{WorkflowError, WorkflowResult};
use crate::repository::error::RepositoryError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Default)]
pub struct JobLockRegistry {
    locks: Mutex<HashMap<i64, Weak<Mutex<()>>>>,
}

impl JobLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> WorkflowResult<MutexGuard<'_, HashMap<i64, Weak<Mutex<()>>>>> {
        self.locks.lock().map_err(|e| {
            WorkflowError::Repository(RepositoryError::LockError(format!(
                "工单锁注册表不可用: {}",
                e
            )))
        })
    }

    /// 获取某张工单的锁句柄
    ///
    /// 仍有持有者时复用同一把锁；否则新建。顺带清理已无持有者的条目。
    pub fn lock_for(&self, job_id: i64) -> WorkflowResult<Arc<Mutex<()>>> {
        let mut locks = self.registry()?;

        if let Some(lock) = locks.get(&job_id).and_then(Weak::upgrade) {
            return Ok(lock);
        }

        locks.retain(|_, weak| weak.strong_count() > 0);

        let lock = Arc::new(Mutex::new(()));
        locks.insert(job_id, Arc::downgrade(&lock));
        Ok(lock)
    }

    /// 当前被持有的工单锁数量
    pub fn len(&self) -> usize {
        match self.registry() {
            Ok(mut locks) => {
                locks.retain(|_, weak| weak.strong_count() > 0);
                locks.len()
            }
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
