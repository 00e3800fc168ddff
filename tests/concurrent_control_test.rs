// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证同一工单的并发流转不会重复生效
//   - 同一引擎: 工单级互斥锁串行化
//   - 不同连接: revision 乐观锁检测冲突
// ==========================================


#[cfg(test)]
mod concurrent_control_test {
    use metal_jobsheet::config::ConfigManager;
    use metal_jobsheet::domain::{AuditAction, JobStatus, StageCompletionInput, StageName};
    use metal_jobsheet::engine::{WorkflowErrorKind, WorkflowOutcome};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use crate::test_helpers::{
        assert_invariants, build_components, build_env, count_rows, gold_job,
    };

    /// 汇总并发结果: (成功次数, 失败种类)
    fn tally(
        results: Vec<Result<WorkflowOutcome, metal_jobsheet::engine::WorkflowError>>,
    ) -> (usize, Vec<WorkflowErrorKind>) {
        let mut applied = 0;
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(outcome) if outcome.is_applied() => applied += 1,
                Ok(outcome) => panic!("unexpected outcome: {:?}", outcome),
                Err(e) => failures.push(e.kind()),
            }
        }
        (applied, failures)
    }

    // ==========================================
    // 测试1: 同一引擎，多线程完成同一工序
    // ==========================================
    #[test]
    fn test_concurrent_complete_same_stage_applies_once() {
        let env = build_env();
        let job_id = env.engine.create_job(gold_job(100.0)).unwrap().job.job_id;

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let engine = env.engine.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    engine.complete_current_stage(
                        job_id,
                        StageCompletionInput::weights(90.0, 5.0, 3.0),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let (applied, failures) = tally(results);

        assert_eq!(applied, 1);
        assert_eq!(failures.len(), threads - 1);
        assert!(failures.iter().all(|k| *k == WorkflowErrorKind::Workflow));

        let detail = env.api.get_job_detail(job_id).unwrap();
        assert_invariants(&detail);
        assert!((detail.job.total_loss - 2.0).abs() < 1e-9);
        assert_eq!(detail.job.revision, 2);
        assert_eq!(
            env.audit_repo
                .find_by_job_and_action(job_id, AuditAction::StepCompleted)
                .unwrap()
                .len(),
            1
        );
    }

    // ==========================================
    // 测试2: 同一引擎，多线程开工下一道工序
    // ==========================================
    #[test]
    fn test_concurrent_start_next_applies_once() {
        let env = build_env();
        let job_id = env.engine.create_job(gold_job(100.0)).unwrap().job.job_id;
        env.engine
            .complete_current_stage(job_id, StageCompletionInput::weights(90.0, 5.0, 3.0))
            .unwrap();

        let threads = 6;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let engine = env.engine.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    engine.start_next_stage(job_id)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let (applied, failures) = tally(results);

        assert_eq!(applied, 1);
        assert!(failures.iter().all(|k| *k == WorkflowErrorKind::Workflow));

        let detail = env.api.get_job_detail(job_id).unwrap();
        assert_invariants(&detail);
        assert_eq!(detail.job.current_step, StageName::Rolling);
        assert_eq!(
            env.audit_repo
                .find_by_job_and_action(job_id, AuditAction::StepStarted)
                .unwrap()
                .len(),
            1
        );
    }

    // ==========================================
    // 测试3: 不同连接（模拟多进程），revision 检测冲突
    // ==========================================
    #[test]
    fn test_concurrent_complete_across_connections() {
        let env = build_env();
        let job_id = env.engine.create_job(gold_job(100.0)).unwrap().job.job_id;

        let threads = 4;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let db_path = env.db_path.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let config = Arc::new(ConfigManager::new(&db_path).unwrap());
                    let (_conn, _api, engine, _job_repo, _audit_repo, _worker_repo) =
                        build_components(&db_path, config);
                    barrier.wait();
                    engine.complete_current_stage(
                        job_id,
                        StageCompletionInput::weights(90.0, 5.0, 3.0),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let (applied, failures) = tally(results);

        assert_eq!(applied, 1);
        assert!(failures
            .iter()
            .all(|k| matches!(k, WorkflowErrorKind::Workflow | WorkflowErrorKind::Conflict)));

        let detail = env.api.get_job_detail(job_id).unwrap();
        assert_invariants(&detail);
        assert_eq!(detail.job.revision, 2);
        assert_eq!(count_rows(&env.conn, "audit_log"), 2);
    }

    // ==========================================
    // 测试4: 不同工单并行流转互不影响
    // ==========================================
    #[test]
    fn test_parallel_jobs_progress_independently() {
        let env = build_env();
        let job_ids: Vec<i64> = (0..5)
            .map(|_| env.engine.create_job(gold_job(100.0)).unwrap().job.job_id)
            .collect();

        let handles: Vec<_> = job_ids
            .iter()
            .map(|&job_id| {
                let engine = env.engine.clone();
                thread::spawn(move || {
                    for stage in StageName::ALL {
                        engine
                            .complete_current_stage(
                                job_id,
                                StageCompletionInput::weights(100.0 - stage.order() as f64 * 2.0, 1.0, 0.5),
                            )
                            .unwrap();
                        if !stage.is_last() {
                            engine.start_next_stage(job_id).unwrap();
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        for job_id in job_ids {
            let detail = env.api.get_job_detail(job_id).unwrap();
            assert_eq!(detail.job.status, JobStatus::Completed);
            assert_eq!(detail.job.return_weight, Some(90.0));
            assert_invariants(&detail);
            assert_eq!(env.api.list_audit_entries(job_id).unwrap().len(), 10);
        }
    }
}
