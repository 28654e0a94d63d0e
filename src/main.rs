use anyhow::{bail, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::info;

use portal_extract::models::{load_account_registry, DateRange, RunStatus};
use portal_extract::utils::logging;
use portal_extract::{App, Config};

/// 美团商家门户报表批量抓取
#[derive(Parser, Debug)]
#[command(name = "portal_extract", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 执行新批次
    Run {
        /// 品牌或 Profile，逗号分隔；不填则全部账号
        #[arg(long, value_delimiter = ',')]
        brands: Vec<String>,
        /// 日期范围 YYYY-MM-DD,YYYY-MM-DD 或单日；不填按默认窗口
        #[arg(long, value_parser = parse_range)]
        range: Option<DateRange>,
    },
    /// 续跑批次
    Resume {
        /// 批次 ID；与 --latest 二选一
        run_id: Option<String>,
        /// 续跑最近的批次
        #[arg(long, conflicts_with = "run_id")]
        latest: bool,
    },
    /// 列出账号表
    Accounts,
    /// 显示默认日期窗口
    Window {
        /// 以指定日期为"今天"计算
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

fn parse_range(s: &str) -> std::result::Result<DateRange, String> {
    s.parse::<DateRange>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::from_env();

    match cli.command {
        Command::Window { today } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            println!("{}", DateRange::default_window(today));
            return Ok(());
        }
        Command::Accounts => {
            let registry = load_account_registry(&config.accounts_file).await?;
            for account in registry.accounts() {
                println!(
                    "{}\t{}\tcpc={}\toperation={}",
                    account.profile, account.brand, account.cpc, account.operation
                );
            }
            return Ok(());
        }
        _ => {}
    }

    // 初始化日志
    logging::init(config.verbose_logging, Some(&config.output_log_file))?;

    let app = App::initialize(config).await?;
    let run = match cli.command {
        Command::Run { brands, range } => {
            let range = range.unwrap_or_else(DateRange::yesterday_or_weekend);
            app.start(&brands, range).await?
        }
        Command::Resume { run_id, latest } => {
            if !latest && run_id.is_none() {
                info!("未指定批次，续跑最近的批次");
            }
            app.resume(run_id.as_deref()).await?
        }
        Command::Accounts | Command::Window { .. } => return Ok(()),
    };

    match run.status {
        RunStatus::Succeeded => Ok(()),
        status => bail!(
            "批次 {} 未完成 ({:?})，可执行 `resume {}` 继续",
            run.run_id,
            status,
            run.run_id
        ),
    }
}
