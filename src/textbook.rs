// 教材批量选择: 一键全选 / 全不选
use crate::{
    config::TextbookConfig,
    models::{GatewayError, SaveTextbookResponse},
};

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub const SAVE_TEXTBOOK_PATH: &str = "/student/courseSelect/books/dealBooks/saveJc";
pub const ANALYTICS_CATEGORY_PREFIX: &str = "textbook-selection";

// 接口返回的两个特殊结果
pub const RESULT_OK: &str = "ok";
pub const RESULT_LOGOUT: &str = "/logout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    SelectAll,
    UnselectAll,
}

impl BatchAction {
    pub fn name(self) -> &'static str {
        match self {
            BatchAction::SelectAll => "select-all",
            BatchAction::UnselectAll => "unselect-all",
        }
    }

    fn flag(self) -> bool {
        matches!(self, BatchAction::SelectAll)
    }

    fn success_message(self) -> &'static str {
        match self {
            BatchAction::SelectAll => "全选所有教材成功！正在刷新页面……",
            BatchAction::UnselectAll => "全不选所有教材成功！正在刷新页面……",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Reload,
    Redirect(String),
}

// 宿主页面当前的表单状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextbookForm {
    pub token_value: String,
    pub items: Vec<(String, bool)>,
}

pub trait FormReader: Send + Sync {
    fn read(&self) -> TextbookForm;
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, delay: Duration, destination: Destination);
}

pub trait Analytics: Send + Sync {
    fn track(&self, category: &str, label: &str);
}

#[async_trait]
pub trait TextbookSubmitter: Send + Sync {
    async fn save_textbooks(&self, token_value: &str, param: &str) -> Result<SaveTextbookResponse, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Saved { token: Option<String> },
    SessionExpired,
    Failed { result: String },
}

/// "<value>,<1|0>" 以 "|" 连接
pub fn encode_batch_param<'a>(items: impl IntoIterator<Item = (&'a str, bool)>) -> String {
    items
        .into_iter()
        .map(|(value, selected)| format!("{},{}", value, if selected { 1 } else { 0 }))
        .collect::<Vec<_>>()
        .join("|")
}

pub struct TextbookSelection<'a> {
    pub config: TextbookConfig,
    pub form: &'a dyn FormReader,
    pub submitter: &'a dyn TextbookSubmitter,
    pub notifier: &'a dyn Notifier,
    pub navigator: &'a dyn Navigator,
    pub analytics: &'a dyn Analytics,
}

impl TextbookSelection<'_> {
    /// 提交失败(网络层)不在这里处理, 直接返回给调用者
    pub async fn run(&self, action: BatchAction) -> Result<BatchOutcome, GatewayError> {
        let form = self.form.read();
        let param = encode_batch_param(form.items.iter().map(|(value, _)| (value.as_str(), action.flag())));

        let response = self.submitter.save_textbooks(&form.token_value, &param).await?;
        info!("教材{}提交结果: result={}, token={:?}", action.name(), response.result, response.token);

        let category = format!("{}/{}", ANALYTICS_CATEGORY_PREFIX, action.name());
        let delay = Duration::from_millis(self.config.navigation_delay_ms);

        let outcome = match response.result.as_str() {
            RESULT_OK => {
                self.analytics.track(&category, "success");
                self.notifier.notify(action.success_message(), Severity::Success);
                self.navigator.navigate(delay, Destination::Reload);
                BatchOutcome::Saved { token: response.token }
            }
            RESULT_LOGOUT => {
                self.analytics.track(&category, "failure");
                self.notifier.notify("登录状态已失效，即将跳转到登录页面……", Severity::Error);
                self.navigator
                    .navigate(delay, Destination::Redirect(self.config.login_path.clone()));
                BatchOutcome::SessionExpired
            }
            _ => {
                self.analytics.track(&category, "error");
                self.notifier.notify("操作失败，请刷新页面后重试", Severity::Error);
                BatchOutcome::Failed { result: response.result }
            }
        };

        Ok(outcome)
    }
}
