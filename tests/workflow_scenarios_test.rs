// ==========================================
// 工单流转场景测试
// ==========================================
// 职责: 覆盖标准场景 A-E 与全流程不变量
//   A: 首道工序完工，损耗/废料/粉尘累计
//   B: 产出超过投入被拒绝，状态不变
//   C: 开工第二道工序，投入重量取上一道回料
//   D: 走完5道工序，工单完成，审计记录共10条
//   E: 已完成工单再次完工，返回"已完成"结果
// ==========================================


#[cfg(test)]
mod workflow_scenarios_test {
    use metal_jobsheet::domain::{
        AuditAction, AuditPayload, JobStatus, StageCompletionInput, StageName, StepStatus,
    };
    use metal_jobsheet::engine::{WorkflowErrorKind, WorkflowOutcome};

    use crate::test_helpers::{assert_invariants, build_env, count_rows, gold_job};

    fn applied(outcome: WorkflowOutcome) -> metal_jobsheet::domain::JobSheetDetail {
        assert!(outcome.is_applied(), "expected Applied, got {:?}", outcome);
        outcome.into_detail()
    }

    // ==========================================
    // 场景A: 首道工序完工
    // ==========================================
    #[test]
    fn test_scenario_a_complete_first_stage() {
        let env = build_env();

        let created = env.engine.create_job(gold_job(100.0)).unwrap();
        let melting = created.step(StageName::Melting).unwrap();
        assert_eq!(melting.status, StepStatus::InProgress);
        assert_eq!(melting.issue_weight, 100.0);
        assert!(melting.start_date.is_some());
        assert_eq!(created.job.current_step, StageName::Melting);
        assert_invariants(&created);

        let detail = applied(
            env.engine
                .complete_current_stage(
                    created.job.job_id,
                    StageCompletionInput::weights(90.0, 5.0, 3.0),
                )
                .unwrap(),
        );

        let melting = detail.step(StageName::Melting).unwrap();
        assert_eq!(melting.status, StepStatus::Completed);
        assert!((melting.loss() - 2.0).abs() < 1e-9);
        assert!(melting.completed_date.is_some());

        assert!((detail.job.total_loss - 2.0).abs() < 1e-9);
        assert!((detail.job.scrap_weight - 5.0).abs() < 1e-9);
        assert!((detail.job.dust_weight - 3.0).abs() < 1e-9);
        assert_eq!(detail.job.status, JobStatus::InProgress);
        assert_eq!(detail.job.last_return_weight, Some(90.0));
        // 下一道工序不会自动开工
        assert_eq!(detail.job.current_step, StageName::Melting);
        assert!(detail.active_step().is_none());
        assert_eq!(
            detail.step(StageName::Rolling).unwrap().status,
            StepStatus::Pending
        );
        assert_invariants(&detail);
    }

    // ==========================================
    // 场景B: 产出超过投入
    // ==========================================
    #[test]
    fn test_scenario_b_output_exceeds_input_is_rejected() {
        let env = build_env();
        let created = env.engine.create_job(gold_job(100.0)).unwrap();
        let audits_before = count_rows(&env.conn, "audit_log");

        let err = env
            .engine
            .complete_current_stage(
                created.job.job_id,
                StageCompletionInput::weights(95.0, 5.0, 3.0),
            )
            .unwrap_err();

        assert_eq!(err.kind(), WorkflowErrorKind::Validation);
        let msg = err.to_string();
        assert!(msg.contains("103.000"), "message: {}", msg);
        assert!(msg.contains("100.000"), "message: {}", msg);

        let after = env.api.get_job_detail(created.job.job_id).unwrap();
        assert_eq!(after, created);
        assert_eq!(count_rows(&env.conn, "audit_log"), audits_before);
    }

    // ==========================================
    // 场景C: 开工第二道工序
    // ==========================================
    #[test]
    fn test_scenario_c_start_second_stage_carries_weight() {
        let env = build_env();
        let job_id = env.engine.create_job(gold_job(100.0)).unwrap().job.job_id;
        env.engine
            .complete_current_stage(job_id, StageCompletionInput::weights(90.0, 5.0, 3.0))
            .unwrap();

        let detail = applied(env.engine.start_next_stage(job_id).unwrap());

        let rolling = detail.step(StageName::Rolling).unwrap();
        assert_eq!(rolling.status, StepStatus::InProgress);
        assert_eq!(rolling.issue_weight, 90.0);
        assert!(rolling.start_date.is_some());
        assert_eq!(detail.job.current_step, StageName::Rolling);
        assert_invariants(&detail);

        let started = env
            .audit_repo
            .find_by_job_and_action(job_id, AuditAction::StepStarted)
            .unwrap();
        assert_eq!(started.len(), 1);
        match &started[0].payload {
            AuditPayload::StepStarted(p) => {
                assert_eq!(p.stage, StageName::Rolling);
                assert_eq!(p.stage_order, 2);
                assert_eq!(p.issue_weight, 90.0);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    // ==========================================
    // 场景D: 全流程
    // ==========================================
    #[test]
    fn test_scenario_d_full_pipeline() {
        let env = build_env();
        let job_id = env.engine.create_job(gold_job(100.0)).unwrap().job.job_id;

        // (回料, 废料, 粉尘)
        let outputs = [
            (90.0, 5.0, 3.0),
            (88.0, 1.0, 0.5),
            (85.0, 2.0, 0.5),
            (82.0, 1.5, 1.0),
        ];
        for (r, s, d) in outputs {
            let detail = applied(
                env.engine
                    .complete_current_stage(job_id, StageCompletionInput::weights(r, s, d))
                    .unwrap(),
            );
            assert_invariants(&detail);
            let detail = applied(env.engine.start_next_stage(job_id).unwrap());
            assert_invariants(&detail);
        }

        let final_input = StageCompletionInput {
            return_pieces: 12,
            pieces: 12,
            notes: Some("packed".to_string()),
            ..StageCompletionInput::weights(80.0, 1.0, 0.5)
        };
        let detail = applied(
            env.engine
                .complete_current_stage(job_id, final_input)
                .unwrap(),
        );
        assert_invariants(&detail);

        assert_eq!(detail.job.status, JobStatus::Completed);
        assert_eq!(detail.job.return_weight, Some(80.0));
        assert_eq!(detail.job.return_pieces, Some(12));
        assert!(detail.job.completed_date.is_some());
        assert!(detail.steps.iter().all(|s| s.is_completed()));
        assert_eq!(detail.job.current_step, StageName::Packing);

        // 累计损耗 = 100 - 80 - 废料合计 - 粉尘合计
        let expected_scrap = 5.0 + 1.0 + 2.0 + 1.5 + 1.0;
        let expected_dust = 3.0 + 0.5 + 0.5 + 1.0 + 0.5;
        assert!((detail.job.scrap_weight - expected_scrap).abs() < 1e-9);
        assert!((detail.job.dust_weight - expected_dust).abs() < 1e-9);
        assert!(
            (detail.job.total_loss - (100.0 - 80.0 - expected_scrap - expected_dust)).abs() < 1e-9
        );

        let entries = env.api.list_audit_entries(job_id).unwrap();
        assert_eq!(entries.len(), 10);
        let count = |action: AuditAction| entries.iter().filter(|e| e.action() == action).count();
        assert_eq!(count(AuditAction::Created), 1);
        assert_eq!(count(AuditAction::StepStarted), 4);
        assert_eq!(count(AuditAction::StepCompleted), 4);
        assert_eq!(count(AuditAction::JobCompleted), 1);

        // 写入顺序: created, (completed, started) x4, job_completed
        assert_eq!(entries[0].action(), AuditAction::Created);
        assert_eq!(entries[9].action(), AuditAction::JobCompleted);
        match &entries[9].payload {
            AuditPayload::JobCompleted(delta) => {
                assert_eq!(delta.stage, StageName::Packing);
                assert_eq!(delta.return_pieces, 12);
                assert_eq!(delta.final_status, JobStatus::Completed);
                assert_eq!(delta.notes.as_deref(), Some("packed"));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    // ==========================================
    // 场景E: 已完成工单重复完工
    // ==========================================
    #[test]
    fn test_scenario_e_completed_job_reports_already_completed() {
        let env = build_env();
        let job_id = env.engine.create_job(gold_job(50.0)).unwrap().job.job_id;

        for stage in StageName::ALL {
            env.engine
                .complete_current_stage(job_id, StageCompletionInput::weights(50.0, 0.0, 0.0))
                .unwrap();
            if !stage.is_last() {
                env.engine.start_next_stage(job_id).unwrap();
            }
        }

        let before = env.api.get_job_detail(job_id).unwrap();
        assert_eq!(before.job.status, JobStatus::Completed);
        let audits_before = count_rows(&env.conn, "audit_log");

        let outcome = env
            .engine
            .complete_current_stage(job_id, StageCompletionInput::weights(10.0, 0.0, 0.0))
            .unwrap();
        assert!(outcome.is_already_completed());
        assert_eq!(outcome.detail(), &before);

        let outcome = env.engine.start_next_stage(job_id).unwrap();
        assert!(outcome.is_already_completed());

        // 输入非法也不影响已完成判定
        let outcome = env
            .engine
            .complete_current_stage(job_id, StageCompletionInput::weights(-1.0, 0.0, 0.0))
            .unwrap();
        assert!(outcome.is_already_completed());

        assert_eq!(env.api.get_job_detail(job_id).unwrap(), before);
        assert_eq!(count_rows(&env.conn, "audit_log"), audits_before);
    }

    // ==========================================
    // 零损耗与容差内的舍入
    // ==========================================
    #[test]
    fn test_zero_loss_stage_and_exact_balance() {
        let env = build_env();
        let job_id = env.engine.create_job(gold_job(10.0)).unwrap().job.job_id;

        let detail = applied(
            env.engine
                .complete_current_stage(job_id, StageCompletionInput::weights(9.7, 0.2, 0.1))
                .unwrap(),
        );
        let melting = detail.step(StageName::Melting).unwrap();
        assert!(melting.loss() >= 0.0);
        assert!(melting.loss() < 1e-6);
        assert_invariants(&detail);
    }
}
