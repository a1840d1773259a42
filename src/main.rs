// ==========================================
// 排课引擎 - 命令行入口
// ==========================================
// 用法: timetable-engine [db_path] <command> <department> <period> [args]
// 输出: 结果以 JSON 打印到标准输出, 日志走 tracing
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::time::Duration;
use timetable_engine::db::get_default_db_path;
use timetable_engine::domain::InstanceFilter;
use timetable_engine::engine::SolveOptions;
use timetable_engine::{logging, TimetableApi};

const COMMANDS: &[&str] = &[
    "pre-analyze",
    "solve",
    "validate",
    "list",
    "promote",
    "swap",
    "delete",
    "delete-unused",
    "duplicate",
];

const USAGE: &str = "用法: timetable-engine [db_path] <command> <department> <period> [args]

命令:
  pre-analyze                 可行性预分析
  solve [secs] [backend]      求解并生成新 major
  validate <major> [minor]    校验版本
  list                        列出版本
  promote <major>             发布 major
  swap <a> <b>                交换两个 major
  delete <major>              删除未发布 major
  delete-unused               删除全部未发布 major
  duplicate <major>           复制 major";

fn main() -> Result<()> {
    logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = match args.first() {
        Some(first) if !COMMANDS.contains(&first.as_str()) => args.remove(0),
        _ => get_default_db_path(),
    };

    if args.len() < 3 {
        bail!("{}", USAGE);
    }
    let command = args[0].as_str();
    let department = args[1].as_str();
    let period = args[2].as_str();
    let rest = &args[3..];

    tracing::info!("{} v{}，数据库: {}", timetable_engine::APP_NAME, timetable_engine::VERSION, db_path);
    let api = TimetableApi::open(&db_path).context("初始化排课引擎失败")?;

    match command {
        "pre-analyze" => print_json(&api.pre_analyze(department, period)?),
        "solve" => {
            let options = SolveOptions {
                time_limit: rest
                    .first()
                    .map(|s| parse_arg::<u64>(s, "secs"))
                    .transpose()?
                    .map(Duration::from_secs),
                backend: rest.get(1).cloned(),
                reassign_rooms: None,
            };
            print_json(&api.solve(department, period, options)?)
        }
        "validate" => {
            let major = parse_arg::<i32>(required(rest, 0, "major")?, "major")?;
            let minor = rest.get(1).map(|s| parse_arg::<i32>(s, "minor")).transpose()?;
            print_json(&api.validate(department, period, major, minor, InstanceFilter::default())?)
        }
        "list" => print_json(&api.list_versions(department, period)?),
        "promote" => {
            let major = parse_arg::<i32>(required(rest, 0, "major")?, "major")?;
            print_json(&api.promote(department, period, major)?)
        }
        "swap" => {
            let a = parse_arg::<i32>(required(rest, 0, "a")?, "a")?;
            let b = parse_arg::<i32>(required(rest, 1, "b")?, "b")?;
            print_json(&api.swap(department, period, a, b)?)
        }
        "delete" => {
            let major = parse_arg::<i32>(required(rest, 0, "major")?, "major")?;
            api.delete(department, period, major)?;
            print_json(&major)
        }
        "delete-unused" => print_json(&api.delete_all_unused(department, period)?),
        "duplicate" => {
            let major = parse_arg::<i32>(required(rest, 0, "major")?, "major")?;
            print_json(&api.duplicate(department, period, major)?)
        }
        other => bail!("未知命令: {}\n\n{}", other, USAGE),
    }
}

fn required<'a>(rest: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
    rest.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("缺少参数 <{}>\n\n{}", name, USAGE))
}

fn parse_arg<T: std::str::FromStr>(value: &str, name: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| anyhow!("参数 {} 无法解析: {}", name, value))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
