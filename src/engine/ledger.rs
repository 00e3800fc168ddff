// ==========================================
// 贵金属工单流转系统 - 工序台账
// ==========================================
// 职责: 对一张工单的5道工序做只读判定
//   - 唯一进行中工序
//   - 前序工序是否全部完工
//   - 最近完工工序 / 下一道待开工工序
//   - 累计重量汇总与不变量校验
// 红线: 工序顺序只由 stage_order 决定
// ==========================================

use crate::domain::job_sheet::{JobSheet, JobStep};
use crate::domain::types::StageName;
use crate::engine::error::{WorkflowError, WorkflowResult};

/// 不变量校验使用的浮点容差 (g)
pub const INVARIANT_EPSILON: f64 = 1e-6;

/// 完工守恒判定的浮点舍入余量 (g)，固定值，不可配置
pub const WEIGHT_EPSILON_G: f64 = 1e-9;

// ==========================================
// StepTotals - 已完工工序累计
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepTotals {
    pub loss: f64,
    pub scrap_weight: f64,
    pub dust_weight: f64,
}

// ==========================================
// StepLedger - 工序台账视图
// ==========================================
pub struct StepLedger<'a> {
    steps: &'a [JobStep],
}

impl<'a> StepLedger<'a> {
    pub fn new(steps: &'a [JobStep]) -> Self {
        Self { steps }
    }

    pub fn step(&self, stage: StageName) -> Option<&'a JobStep> {
        self.steps.iter().find(|s| s.stage == stage)
    }

    pub fn in_progress_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_in_progress()).count()
    }

    /// 唯一进行中的工序
    ///
    /// # 返回
    /// - `Err(Workflow)`: 没有进行中的工序，或存在多道进行中的工序（数据损坏）
    pub fn active_step(&self) -> WorkflowResult<&'a JobStep> {
        let mut active = self.steps.iter().filter(|s| s.is_in_progress());
        match (active.next(), active.next()) {
            (Some(step), None) => Ok(step),
            (None, _) => Err(WorkflowError::Workflow("没有进行中的工序".to_string())),
            (Some(first), Some(second)) => Err(WorkflowError::Workflow(format!(
                "存在多道进行中的工序: {} 与 {}",
                first.stage, second.stage
            ))),
        }
    }

    /// 第一道未完工的前序工序（按序号升序）
    pub fn first_incomplete_predecessor(&self, stage: StageName) -> Option<&'a JobStep> {
        let mut predecessors: Vec<&JobStep> = self
            .steps
            .iter()
            .filter(|s| s.stage_order() < stage.order() && !s.is_completed())
            .collect();
        predecessors.sort_by_key(|s| s.stage_order());
        predecessors.into_iter().next()
    }

    /// 序号最大的已完工工序
    pub fn last_completed(&self) -> Option<&'a JobStep> {
        self.steps
            .iter()
            .filter(|s| s.is_completed())
            .max_by_key(|s| s.stage_order())
    }

    /// 最近完工工序的下一道工序（仅当其为待开工状态）
    pub fn next_pending_after(&self, completed: &JobStep) -> Option<&'a JobStep> {
        let next_stage = completed.stage.next()?;
        self.step(next_stage).filter(|s| s.is_pending())
    }

    /// 已完工工序的累计损耗/废料/粉尘（按序号累加）
    pub fn completed_totals(&self) -> StepTotals {
        let mut completed: Vec<&JobStep> = self.steps.iter().filter(|s| s.is_completed()).collect();
        completed.sort_by_key(|s| s.stage_order());

        completed.into_iter().fold(StepTotals::default(), |acc, s| StepTotals {
            loss: acc.loss + s.loss(),
            scrap_weight: acc.scrap_weight + s.scrap_weight,
            dust_weight: acc.dust_weight + s.dust_weight,
        })
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= INVARIANT_EPSILON
}

// ==========================================
// 不变量校验
// ==========================================

/// 校验工单与工序的全部不变量
///
/// # 返回
/// - `Ok(())`: 全部满足
/// - `Err(violations)`: 每条违规一行说明
pub fn verify_invariants(job: &JobSheet, steps: &[JobStep]) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();
    let ledger = StepLedger::new(steps);

    // 工序结构: 固定5道，序号 1..=5 各一条，归属本工单
    let orders: Vec<i32> = {
        let mut v: Vec<i32> = steps.iter().map(|s| s.stage_order()).collect();
        v.sort_unstable();
        v
    };
    if orders != vec![1, 2, 3, 4, 5] {
        violations.push(format!("工序结构错误: 序号为 {:?}", orders));
    }
    for step in steps.iter().filter(|s| s.job_id != job.job_id) {
        violations.push(format!("工序{}不属于工单{}", step.stage, job.job_id));
    }

    // 进行中工序数量
    let active = ledger.in_progress_count();
    if job.is_completed() && active != 0 {
        violations.push(format!("工单已完成但仍有{}道进行中工序", active));
    }
    if active > 1 {
        violations.push(format!("存在{}道进行中工序", active));
    }

    // 完工顺序: 非待开工工序的所有前序必须已完工
    for step in steps.iter().filter(|s| !s.is_pending()) {
        if let Some(pred) = ledger.first_incomplete_predecessor(step.stage) {
            violations.push(format!(
                "工序{}已开工但前序工序{}未完工",
                step.stage, pred.stage
            ));
        }
    }

    // 质量守恒
    for step in steps.iter().filter(|s| s.is_completed()) {
        if step.return_weight.is_none() {
            violations.push(format!("工序{}已完工但缺少回料重量", step.stage));
        }
        if step.total_output() > step.issue_weight + INVARIANT_EPSILON {
            violations.push(format!(
                "工序{}总产出 ({:.3}g) 超过投入重量 ({:.3}g)",
                step.stage,
                step.total_output(),
                step.issue_weight
            ));
        }
        if step.loss() < 0.0 {
            violations.push(format!("工序{}损耗为负", step.stage));
        }
    }

    // 累计字段
    let totals = ledger.completed_totals();
    if !approx_eq(job.total_loss, totals.loss) {
        violations.push(format!(
            "累计损耗不一致: 工单={:.6}, 工序合计={:.6}",
            job.total_loss, totals.loss
        ));
    }
    if !approx_eq(job.scrap_weight, totals.scrap_weight) {
        violations.push(format!(
            "累计废料不一致: 工单={:.6}, 工序合计={:.6}",
            job.scrap_weight, totals.scrap_weight
        ));
    }
    if !approx_eq(job.dust_weight, totals.dust_weight) {
        violations.push(format!(
            "累计粉尘不一致: 工单={:.6}, 工序合计={:.6}",
            job.dust_weight, totals.dust_weight
        ));
    }

    // 交接链: 首道投入 = 工单发料；后续投入 = 上一道回料
    for step in steps.iter().filter(|s| !s.is_pending()) {
        let expected = if step.stage == StageName::FIRST {
            Some(job.issue_weight)
        } else {
            step.stage
                .order()
                .checked_sub(1)
                .and_then(StageName::from_order)
                .and_then(|prev| ledger.step(prev))
                .and_then(|prev| prev.return_weight)
        };
        match expected {
            Some(w) if approx_eq(step.issue_weight, w) => {}
            Some(w) => violations.push(format!(
                "工序{}投入重量 ({:.3}g) 与交接重量 ({:.3}g) 不一致",
                step.stage, step.issue_weight, w
            )),
            None => violations.push(format!("工序{}缺少交接来源", step.stage)),
        }
    }

    // 完工状态
    let last_done = ledger
        .step(StageName::LAST)
        .map(|s| s.is_completed())
        .unwrap_or(false);
    if job.is_completed() != last_done {
        violations.push(format!(
            "工单状态{}与最后一道工序完工状态({})不一致",
            job.status, last_done
        ));
    }
    if job.is_completed() {
        if let Some(last) = ledger.step(StageName::LAST) {
            if job.return_weight != last.return_weight {
                violations.push("工单回料重量与包装工序不一致".to_string());
            }
            if job.return_pieces != Some(last.return_pieces) {
                violations.push("工单回料件数与包装工序不一致".to_string());
            }
        }
        if job.completed_date.is_none() {
            violations.push("工单已完成但缺少完工时间".to_string());
        }
    } else if job.return_weight.is_some() || job.return_pieces.is_some() || job.completed_date.is_some() {
        violations.push("未完成工单不应写入终态字段".to_string());
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
