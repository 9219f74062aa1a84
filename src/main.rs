use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scu_urp_assistant::{
    business::convert_semester_number_to_text,
    config::load_config,
    textbook::{
        Analytics, BatchAction, Destination, FormReader, Navigator, Notifier, Severity, TextbookForm, TextbookSelection,
    },
    utils::{current_time, init_tracing},
    Gateway,
};
use serde::Serialize;
use std::{path::PathBuf, time::Duration};
use tracing::{error, info, warn};

#[derive(Parser)]
#[clap(name = "sua", version, about = "四川大学教务处助手", long_about = None)]
struct Args {
    /// 配置文件(TOML), 不指定则只读取默认值与 SUA_* 环境变量
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 可查询的学期号列表
    Semesters,
    /// 某学期的课表
    Courses {
        #[clap(short, long)]
        semester: String,
    },
    /// 学籍信息
    Profile,
    /// 本学期学业信息
    Academic,
    /// 成绩
    Scores {
        #[clap(value_enum, default_value_t = ScoreScope::All)]
        scope: ScoreScope,
    },
    /// 课程开课信息
    Schedule {
        #[clap(short, long)]
        semester: String,
        #[clap(short, long, default_value = "")]
        name: String,
        #[clap(short = 'k', long, default_value = "")]
        number: String,
    },
    /// 培养方案详情
    Scheme {
        #[clap(short, long)]
        num: u64,
    },
    /// 全部培养方案列表
    SchemeList,
    /// 学士学位信息
    Bachelor {
        #[clap(short, long)]
        query: String,
    },
    /// 大创项目信息
    Uietp {
        #[clap(short, long)]
        query: String,
    },
    /// 登录版本化 API
    Login,
    /// 教材一键全选 / 全不选
    Textbook {
        #[clap(value_enum)]
        action: TextbookAction,
        /// 页面上的 tokenValue
        #[clap(short, long)]
        token: String,
        /// 教材编号, 以逗号分隔
        #[clap(short, long, value_delimiter = ',')]
        items: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScoreScope {
    All,
    ThisTerm,
}

#[derive(Clone, Copy, ValueEnum)]
enum TextbookAction {
    SelectAll,
    UnselectAll,
}

impl From<TextbookAction> for BatchAction {
    fn from(action: TextbookAction) -> Self {
        match action {
            TextbookAction::SelectAll => BatchAction::SelectAll,
            TextbookAction::UnselectAll => BatchAction::UnselectAll,
        }
    }
}

// 命令行下的宿主: 表单来自参数, 提示与跳转只写日志
struct Console {
    form: TextbookForm,
}

impl FormReader for Console {
    fn read(&self) -> TextbookForm {
        self.form.clone()
    }
}

impl Notifier for Console {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Success => info!("{}", message),
            Severity::Error => warn!("{}", message),
        }
    }
}

impl Navigator for Console {
    fn navigate(&self, delay: Duration, destination: Destination) {
        match destination {
            Destination::Reload => info!("{:?} 后刷新页面", delay),
            Destination::Redirect(path) => info!("{:?} 后跳转到 {}", delay, path),
        }
    }
}

impl Analytics for Console {
    fn track(&self, category: &str, label: &str) {
        info!(category, label, "统计事件");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("序列化输出失败")?);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let gateway = Gateway::new(&config).context("初始化客户端失败")?;

    match args.command {
        Command::Semesters => {
            let list = gateway.portal.request_student_semester_number_list().await?;
            for number in &list {
                println!("{}\t{}", number, convert_semester_number_to_text(number));
            }
        }
        Command::Courses { semester } => {
            print_json(&gateway.portal.request_course_info_list_by_semester(&semester).await?)?;
        }
        Command::Profile => {
            let profile = gateway.portal.request_student_info().await?;
            for (label, value) in &profile.fields {
                println!("{}: {}", label, value);
            }
        }
        Command::Academic => {
            print_json(&gateway.portal.request_current_semester_student_academic_info().await?)?;
        }
        Command::Scores { scope } => {
            let list = match scope {
                ScoreScope::All => gateway.portal.request_all_terms_course_score_info_list().await?,
                ScoreScope::ThisTerm => gateway.portal.request_this_term_course_score_info_list().await?,
            };
            print_json(&list)?;
        }
        Command::Schedule { semester, name, number } => {
            print_json(&gateway.schedule.request_course_schedule(&semester, &name, &number).await)?;
        }
        Command::Scheme { num } => {
            print_json(&gateway.portal.request_training_scheme(num).await?)?;
        }
        Command::SchemeList => {
            print_json(&gateway.api.request_training_scheme_list().await?)?;
        }
        Command::Bachelor { query } => {
            print_json(&gateway.api.request_bachelor_degree(&query).await?)?;
        }
        Command::Uietp { query } => {
            print_json(&gateway.api.request_scu_uietp_list(&query).await?)?;
        }
        Command::Login => {
            gateway.api.login().await?;
            info!("登录成功, accessToken 已保存到本次会话");
        }
        Command::Textbook { action, token, items } => {
            let console = Console {
                form: TextbookForm {
                    token_value: token,
                    items: items.into_iter().map(|item| (item, false)).collect(),
                },
            };
            let selection = TextbookSelection {
                config: config.textbook.clone(),
                form: &console,
                submitter: gateway.portal.as_ref(),
                notifier: &console,
                navigator: &console,
                analytics: &console,
            };
            let outcome = selection.run(action.into()).await?;
            info!("教材批量操作结束: {:?}", outcome);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("[{}] sua 启动", current_time());

    let args = Args::parse();
    let result = run(args).await;

    if let Err(err) = &result {
        error!("执行失败: {}", err);
        for cause in err.chain().skip(1) {
            error!("原因: {}", cause);
        }
    }

    result
}
