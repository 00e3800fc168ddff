// ==========================================
// 贵金属工单流转系统 - 命令行入口
// ==========================================
// 用法:
//   metal-jobsheet [--db <path>] <command> [args]
//
// 命令:
//   create <GOLD|SILVER> <issue_weight> [--purity 22K] [--job-no JOB-1] [--worker 1] [--size S]
//   complete <job_id> <return> <scrap> <dust> [--pieces N] [--return-pieces N] [--worker 1] [--notes T]
//   start <job_id>
//   show <job_id|job_no>
//   audit <job_id>
//   list [--status In-Progress|Completed] [--worker 1] [--from YYYY-MM-DD]
//   next-no
//   worker-add <name> [rate]
//
// 输出: stdout 为 JSON；错误以 ErrorResponse JSON 写到 stderr
// ==========================================

use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use metal_jobsheet::api::{ApiError, ApiResult};
use metal_jobsheet::app::{get_default_db_path, AppState};
use metal_jobsheet::domain::{
    JobStatus, MetalType, NewJobSheet, Purity, StageCompletionInput, Worker,
};
use metal_jobsheet::repository::JobSheetFilter;
use serde::Serialize;
use std::collections::HashMap;

fn main() -> anyhow::Result<()> {
    metal_jobsheet::logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = take_flag(&mut args, "--db").unwrap_or_else(get_default_db_path);

    if args.is_empty() {
        bail!("缺少命令（create/complete/start/show/audit/list/next-no/worker-add）");
    }
    let command = args.remove(0);

    tracing::debug!(
        app = metal_jobsheet::APP_NAME,
        version = metal_jobsheet::VERSION,
        db_path = %db_path,
        command = %command,
        "启动"
    );

    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;

    match run(&state, &command, args)? {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err.to_json());
            std::process::exit(1);
        }
    }
}

/// 执行命令
///
/// 外层 Err 为参数错误，内层 Err 为业务错误
fn run(state: &AppState, command: &str, mut args: Vec<String>) -> anyhow::Result<ApiResult<String>> {
    let api = &state.jobsheet_api;
    let flags = split_flags(&mut args)?;

    let result = match command {
        "create" => {
            let metal_raw = positional(&args, 0, "metal_type")?;
            let metal_type = MetalType::from_str(metal_raw)
                .ok_or_else(|| anyhow!("金属类型非法: {}", metal_raw))?;
            let issue_weight: f64 = parse_positional(&args, 1, "issue_weight")?;
            let purity = match flags.get("purity") {
                Some(raw) => {
                    Some(Purity::from_str(raw).ok_or_else(|| anyhow!("成色非法: {}", raw))?)
                }
                None => None,
            };

            let input = NewJobSheet {
                job_no: flags.get("job-no").cloned(),
                metal_type,
                purity,
                issue_weight,
                size: flags.get("size").cloned(),
                worker_id: parse_flag(&flags, "worker")?,
            };
            api.create_job(input).and_then(to_json)
        }
        "complete" => {
            let job_id: i64 = parse_positional(&args, 0, "job_id")?;
            let input = StageCompletionInput {
                return_weight: parse_positional(&args, 1, "return_weight")?,
                scrap_weight: parse_positional(&args, 2, "scrap_weight")?,
                dust_weight: parse_positional(&args, 3, "dust_weight")?,
                pieces: parse_flag(&flags, "pieces")?.unwrap_or(0),
                return_pieces: parse_flag(&flags, "return-pieces")?.unwrap_or(0),
                worker_id: parse_flag(&flags, "worker")?,
                notes: flags.get("notes").cloned(),
            };
            api.complete_current_stage(job_id, input).and_then(to_json)
        }
        "start" => {
            let job_id: i64 = parse_positional(&args, 0, "job_id")?;
            api.start_next_stage(job_id).and_then(to_json)
        }
        "show" => {
            let key = positional(&args, 0, "job_id|job_no")?;
            let detail = match key.parse::<i64>() {
                Ok(job_id) => api.get_job_detail(job_id),
                Err(_) => api.find_by_job_no(key),
            };
            detail.and_then(to_json)
        }
        "audit" => {
            let job_id: i64 = parse_positional(&args, 0, "job_id")?;
            api.list_audit_entries(job_id).and_then(to_json)
        }
        "list" => {
            let status = match flags.get("status") {
                Some(raw) => {
                    Some(JobStatus::from_str(raw).ok_or_else(|| anyhow!("状态非法: {}", raw))?)
                }
                None => None,
            };
            let issued_from = match flags.get("from") {
                Some(raw) => Some(
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .with_context(|| format!("日期格式错误（应为YYYY-MM-DD）: {}", raw))?
                        .and_hms_opt(0, 0, 0)
                        .ok_or_else(|| anyhow!("日期非法: {}", raw))?,
                ),
                None => None,
            };
            let filter = JobSheetFilter {
                issued_from,
                worker_id: parse_flag(&flags, "worker")?,
                status,
            };
            api.list_jobs(&filter).and_then(to_json)
        }
        "next-no" => api.next_job_no().and_then(to_json),
        "worker-add" => {
            let name = positional(&args, 0, "name")?;
            let rate: f64 = match args.get(1) {
                Some(raw) => raw.parse().with_context(|| format!("rate非法: {}", raw))?,
                None => 0.0,
            };
            state
                .worker_repo
                .insert(&Worker::new(name, rate))
                .map_err(ApiError::from)
                .and_then(|worker_id| to_json(serde_json::json!({ "worker_id": worker_id })))
        }
        other => bail!("未知命令: {}", other),
    };

    Ok(result)
}

fn to_json<T: Serialize>(value: T) -> ApiResult<String> {
    serde_json::to_string_pretty(&value)
        .map_err(|e| ApiError::InternalError(format!("JSON序列化失败: {}", e)))
}

/// 取出并移除 `--name value`
fn take_flag(args: &mut Vec<String>, name: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == name)?;
    if pos + 1 >= args.len() {
        return None;
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Some(value)
}

/// 拆出全部 `--key value`，剩余为位置参数
fn split_flags(args: &mut Vec<String>) -> anyhow::Result<HashMap<String, String>> {
    let mut flags = HashMap::new();
    let mut positional = Vec::new();
    let mut iter = std::mem::take(args).into_iter();

    while let Some(arg) = iter.next() {
        if let Some(key) = arg.strip_prefix("--") {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("参数 --{} 缺少取值", key))?;
            flags.insert(key.to_string(), value);
        } else {
            positional.push(arg);
        }
    }

    *args = positional;
    Ok(flags)
}

fn positional<'a>(args: &'a [String], idx: usize, name: &str) -> anyhow::Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("缺少参数: {}", name))
}

fn parse_positional<T>(args: &[String], idx: usize, name: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = positional(args, idx, name)?;
    raw.parse::<T>()
        .map_err(|e| anyhow!("参数{}非法 ({}): {}", name, raw, e))
}

fn parse_flag<T>(flags: &HashMap<String, String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    flags
        .get(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow!("参数 --{} 非法 ({}): {}", name, raw, e))
        })
        .transpose()
}
