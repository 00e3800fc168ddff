// ==========================================
// JobSheetApi 集成测试
// ==========================================
// 职责: API 错误码、查询接口、配置覆写、AppState 组装
// ==========================================


#[cfg(test)]
mod jobsheet_api_test {
    use chrono::{Duration, Utc};
    use metal_jobsheet::api::ApiError;
    use metal_jobsheet::app::AppState;
    use metal_jobsheet::config::config_keys;
    use metal_jobsheet::domain::{
        AuditAction, JobStatus, MetalType, NewJobSheet, StageCompletionInput, StageName,
    };
    use metal_jobsheet::repository::JobSheetFilter;

    use crate::test_helpers::{add_worker, build_api, build_env, create_test_db, gold_job};

    // ==========================================
    // 错误码映射
    // ==========================================

    #[test]
    fn test_error_codes() {
        let (_temp_file, api) = build_api();
        let job_id = api.create_job(gold_job(100.0)).unwrap().job.job_id;

        let err = api
            .complete_current_stage(job_id, StageCompletionInput::weights(95.0, 5.0, 3.0))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("103.000"));

        let err = api.get_job_detail(job_id + 100).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let err = api.start_next_stage(job_id).unwrap_err();
        assert_eq!(err.code(), "WORKFLOW_ERROR");

        let err = api
            .complete_current_stage(job_id + 100, StageCompletionInput::weights(1.0, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let response: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();
        assert_eq!(response["code"], "NOT_FOUND");
    }

    // ==========================================
    // 查询接口
    // ==========================================

    #[test]
    fn test_find_by_job_no() {
        let (_temp_file, api) = build_api();
        let created = api.create_job(gold_job(100.0)).unwrap();

        let found = api.find_by_job_no(" JOB-1001 ").unwrap();
        assert_eq!(found, created);

        assert_eq!(api.find_by_job_no("JOB-9999").unwrap_err().code(), "NOT_FOUND");
        assert_eq!(api.find_by_job_no("").unwrap_err().code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_list_jobs_filters() {
        let env = build_env();
        let worker_id = add_worker(&env.worker_repo, "Amit");

        let a = env.api.create_job(gold_job(100.0)).unwrap().job.job_id;
        let b = env
            .api
            .create_job(NewJobSheet {
                worker_id: Some(worker_id),
                metal_type: MetalType::Silver,
                ..gold_job(20.0)
            })
            .unwrap()
            .job
            .job_id;

        for stage in StageName::ALL {
            env.api
                .complete_current_stage(b, StageCompletionInput::weights(20.0, 0.0, 0.0))
                .unwrap();
            if !stage.is_last() {
                env.api.start_next_stage(b).unwrap();
            }
        }

        let all = env.api.list_jobs(&JobSheetFilter::default()).unwrap();
        assert_eq!(all.iter().map(|j| j.job_id).collect::<Vec<_>>(), vec![b, a]);

        let by_worker = env
            .api
            .list_jobs(&JobSheetFilter {
                worker_id: Some(worker_id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_worker.len(), 1);
        assert_eq!(by_worker[0].metal_type, MetalType::Silver);

        let in_progress = env
            .api
            .list_jobs(&JobSheetFilter {
                status: Some(JobStatus::InProgress),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].job_id, a);

        let future = env
            .api
            .list_jobs(&JobSheetFilter {
                issued_from: Some(Utc::now().naive_utc() + Duration::days(1)),
                ..Default::default()
            })
            .unwrap();
        assert!(future.is_empty());
    }

    #[test]
    fn test_list_audit_entries() {
        let (_temp_file, api) = build_api();
        let job_id = api.create_job(gold_job(100.0)).unwrap().job.job_id;
        api.complete_current_stage(job_id, StageCompletionInput::weights(90.0, 5.0, 3.0))
            .unwrap();
        api.start_next_stage(job_id).unwrap();

        let actions: Vec<AuditAction> = api
            .list_audit_entries(job_id)
            .unwrap()
            .iter()
            .map(|e| e.action())
            .collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Created,
                AuditAction::StepCompleted,
                AuditAction::StepStarted
            ]
        );

        assert_eq!(api.list_audit_entries(999).unwrap_err().code(), "NOT_FOUND");
    }

    // ==========================================
    // 配置覆写
    // ==========================================

    #[test]
    fn test_config_overrides_job_no() {
        let env = build_env();
        env.config
            .set_global_config_value(config_keys::JOB_NO_PREFIX, "GJ-")
            .unwrap();
        env.config
            .set_global_config_value(config_keys::JOB_NO_START, "500")
            .unwrap();

        assert_eq!(env.api.next_job_no().unwrap(), "GJ-500");
        assert_eq!(env.api.create_job(gold_job(1.0)).unwrap().job.job_no, "GJ-500");
        assert_eq!(env.api.next_job_no().unwrap(), "GJ-501");
    }

    // ==========================================
    // AppState 组装
    // ==========================================

    #[test]
    fn test_app_state_end_to_end() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let state = AppState::new(db_path.clone()).unwrap();

        let worker_id = add_worker(&state.worker_repo, "Ravi");
        let detail = state
            .jobsheet_api
            .create_job(NewJobSheet {
                worker_id: Some(worker_id),
                ..gold_job(100.0)
            })
            .unwrap();
        assert_eq!(detail.job.job_no, "JOB-1001");

        // 重新打开同一数据库，数据仍在
        drop(state);
        let reopened = AppState::new(db_path).unwrap();
        let found = reopened.jobsheet_api.find_by_job_no("JOB-1001").unwrap();
        assert_eq!(found.job.worker_id, Some(worker_id));
        assert_eq!(reopened.jobsheet_api.next_job_no().unwrap(), "JOB-1002");
    }
}
