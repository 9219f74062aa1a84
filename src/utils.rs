// 小工具库
use chrono::Local;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;
use tracing_subscriber::{fmt::time::ChronoLocal, EnvFilter};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// 提供当前时间
pub fn current_time() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

/// 初始化日志, 默认 info 级别, 可由 RUST_LOG 覆盖
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // 已初始化过(例如测试中)则忽略
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .try_init();
}

/// 按路径取值, 如 `["id", "coureNumber"]`
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// 文本字段: 缺失或 null 为空串, 数字转为文本
pub fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// 数字字段: 缺失、null 或无法解析的都为 0
pub fn number_of(value: Option<&Value>) -> Decimal {
    let parsed = match value {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };
    parsed.unwrap_or(Decimal::ZERO)
}

/// 整数字段, 规则同 number_of
pub fn integer_of(value: Option<&Value>) -> i64 {
    use rust_decimal::prelude::ToPrimitive;
    number_of(value).trunc().to_i64().unwrap_or(0)
}

pub fn text_field(value: &Value, path: &[&str]) -> String {
    text_of(lookup(value, path))
}

pub fn number_field(value: &Value, path: &[&str]) -> Decimal {
    number_of(lookup(value, path))
}

pub fn integer_field(value: &Value, path: &[&str]) -> i64 {
    integer_of(lookup(value, path))
}

/// 接受字符串、数字或 null 的文本字段, null 读作空串
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(text_of(value.as_ref()))
}
