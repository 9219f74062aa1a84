// 配置: 环境变量 SUA_* 与可选的 TOML 文件
use anyhow::Context;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    /// 教务处会话 Cookie, 如 `JSESSIONID=...`
    pub cookie: Option<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://zhjw.scu.edu.cn".to_string(),
            cookie: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub root: String,
    pub access_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            root: "http://127.0.0.1:3000/api/v2".to_string(),
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub version: String,
    pub client_type: String,
    pub user_id: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            client_type: "cli".to_string(),
            user_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub query_interval_ms: u64,
    pub initial_backoff_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            query_interval_ms: 5000,
            initial_backoff_ms: 1000,
        }
    }
}

impl ScheduleConfig {
    pub fn query_interval(&self) -> Duration {
        Duration::from_millis(self.query_interval_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextbookConfig {
    pub navigation_delay_ms: u64,
    pub login_path: String,
}

impl Default for TextbookConfig {
    fn default() -> Self {
        Self {
            navigation_delay_ms: 3000,
            login_path: "/login".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub portal: PortalConfig,
    pub api: ApiConfig,
    pub client: ClientConfig,
    pub schedule: ScheduleConfig,
    pub textbook: TextbookConfig,
}

/// 加载配置: 默认值 < 环境变量 < TOML 文件
///
/// 环境变量以 `SUA_` 开头, 嵌套字段用 `__` 分隔, 如 `SUA_PORTAL__BASE_URL`.
pub fn load_config(config_file: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!("加载配置: {:?}", config_file);

    let figment = Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Env::prefixed("SUA_").split("__"));

    let figment = match config_file {
        Some(path) => figment.merge(Toml::file(path)),
        None => figment,
    };

    let context_msg = match config_file {
        Some(path) => format!("无法解析配置文件 '{}' 或环境变量 SUA_*", path.display()),
        None => "无法解析环境变量 SUA_*".to_string(),
    };

    figment.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.schedule.query_interval(), Duration::from_millis(5000));
        assert_eq!(config.schedule.initial_backoff(), Duration::from_millis(1000));
        assert_eq!(config.textbook.navigation_delay_ms, 3000);
        assert_eq!(config.textbook.login_path, "/login");
    }

    #[test]
    fn toml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [portal]
            base_url = "http://portal.test"
            cookie = "JSESSIONID=abc"

            [schedule]
            initial_backoff_ms = 250
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.portal.base_url, "http://portal.test");
        assert_eq!(config.portal.cookie.as_deref(), Some("JSESSIONID=abc"));
        assert_eq!(config.schedule.initial_backoff_ms, 250);
        assert_eq!(config.schedule.query_interval_ms, 5000);
    }
}
