use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gebom_config::AppConfig;
use gebom_engine::catalog::Catalog;
use gebom_engine::command::{CommandBus, CommandContext, CommandRequest};
use gebom_engine::pipeline::Pipeline;
use gebom_engine::session::{DEFAULT_MATERIAL_LIMIT, Session};
use gebom_io::{JsonFacade, RecordLoader, ReportSaver};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

mod report;

/// 从图元记录生成排水管物料清单。
#[derive(Debug, Parser)]
#[command(name = "gebom", version)]
struct Args {
    /// 图元记录文件（JSON 数组或 `{"entities": [...]}`）
    records: PathBuf,
    /// 配置文件路径，缺省时读取 `GEBOM_CONFIG` 或 `./config/default.toml`
    #[arg(long)]
    config: Option<PathBuf>,
    /// 写出物料清单 JSON
    #[arg(long)]
    output: Option<PathBuf>,
    /// 只列出指定竖井的物料
    #[arg(long)]
    shaft: Option<String>,
    /// 覆盖配置中的敷设方式（`Sunken` / `Under Slung`）
    #[arg(long = "pipe-type")]
    pipe_type: Option<String>,
    /// 物料列表的最大行数
    #[arg(long, default_value_t = DEFAULT_MATERIAL_LIMIT)]
    limit: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("错误: {err:#}");
            return ExitCode::from(2);
        }
    };
    if let Some(pipe_type) = &args.pipe_type {
        config.pipe_sheet.pipe_type = Some(pipe_type.clone());
    }
    init_logging(&config);
    info!("启动 GEBOM 物料清单生成");

    match run(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "生成物料清单失败");
            eprintln!("错误: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: &AppConfig) -> Result<()> {
    let catalog = match &config.catalog.path {
        Some(path) => Catalog::from_file(path)
            .with_context(|| format!("无法加载零件目录 {}", path.display()))?,
        None => Catalog::builtin().context("内建零件目录不一致")?,
    };
    let pipeline = Pipeline::from_config(config, Arc::new(catalog))?;

    let facade = JsonFacade::new();
    let records = facade
        .load(&args.records)
        .with_context(|| format!("无法读取图元记录 {}", args.records.display()))?;
    let run_report = pipeline.run(&records)?;

    if let Some(output) = &args.output {
        facade
            .save(&run_report, output)
            .with_context(|| format!("无法写出物料清单 {}", output.display()))?;
        info!(path = %output.display(), "物料清单已写出");
    }

    let mut session = Session::new();
    session.load(run_report);
    let bus = CommandBus::new();
    let mut context = CommandContext {
        session: &mut session,
    };

    match &args.shaft {
        Some(shaft) => {
            let request = CommandRequest::new(
                "materials",
                [format!("shaft={shaft}"), format!("limit={}", args.limit)],
            );
            report::print_command(&bus, &request, &mut context)?;
        }
        None => {
            if let Some(run_report) = context.session.report() {
                report::print_summary(run_report, args.limit);
            }
            let request = CommandRequest::new("list_shafts", Vec::<String>::new());
            report::print_command(&bus, &request, &mut context)?;
        }
    }
    Ok(())
}

fn load_configuration(override_path: Option<&Path>) -> Result<AppConfig> {
    match override_path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("加载指定配置 {} 失败", path.display())),
        None => AppConfig::discover().context("加载默认配置失败"),
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
