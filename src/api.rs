// 版本化 API: 登录、学士学位、大创项目与培养方案列表
use crate::{
    config::{ApiConfig, ClientConfig},
    models::{BachelorDegreeInfo, GatewayError, LoginResultData, ScuUietpInfo, TrainingScheme},
};

use reqwest::{Client, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

// 当前用户的会话状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user_id: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
}

// 登录接口的返回: 成功与否看 error 字段, 不看 HTTP 状态
#[derive(Debug, Deserialize)]
struct LoginEnvelope {
    #[serde(default)]
    data: Option<LoginResultData>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

pub struct ApiClient {
    client: Client,
    root: String,
    client_config: ClientConfig,
    session: RwLock<SessionState>,
    training_scheme_list: OnceCell<Vec<TrainingScheme>>,
}

// 失败响应体里的 message, 取不到时为空
fn body_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

fn status_error(status: StatusCode, message: String) -> GatewayError {
    GatewayError::Server {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        message,
    }
}

/// 把失败的响应转成 `[status] statusText: message`
async fn server_error(response: Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    status_error(status, body_message(&body))
}

impl ApiClient {
    pub fn new(client: Client, api: &ApiConfig, client_config: ClientConfig) -> Self {
        Self {
            client,
            root: api.root.trim_end_matches('/').to_string(),
            session: RwLock::new(SessionState {
                user_id: client_config.user_id.clone(),
                access_token: api.access_token.clone(),
            }),
            client_config,
            training_scheme_list: OnceCell::new(),
        }
    }

    pub async fn session(&self) -> SessionState {
        self.session.read().await.clone()
    }

    pub async fn set_access_token(&self, token: impl Into<String>) {
        self.session.write().await.access_token = Some(token.into());
    }

    async fn bearer(&self) -> Result<String, GatewayError> {
        self.session
            .read()
            .await
            .access_token
            .clone()
            .map(|token| format!("Bearer {token}"))
            .ok_or(GatewayError::MissingAccessToken)
    }

    /// 以路径段拼接地址, 每段单独转义
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.root).map_err(|e| GatewayError::ParseError(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::ParseError(format!("无效的 API 地址: {}", self.root)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_authorized<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, GatewayError> {
        let url = self.endpoint(segments)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?)
            .send()
            .await?;

        // 失败时把响应体交给 server_error 取出 message
        if !response.status().is_success() {
            return Err(server_error(response).await);
        }

        // 反序列化失败同样算解析异常
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::ParseError(e.to_string()))
    }

    /// 登录并把 accessToken 存入会话
    pub async fn login(&self) -> Result<LoginResultData, GatewayError> {
        let url = self.endpoint(&["user", "login"])?;
        let user_id = self.session.read().await.user_id.clone();
        info!("用户 {} 登录中", user_id);

        // 表单键名沿用 jQuery 对嵌套对象的编码方式
        let form = [
            ("id", user_id.as_str()),
            ("client[version]", self.client_config.version.as_str()),
            ("client[type]", self.client_config.client_type.as_str()),
        ];
        let response = self.client.post(url).form(&form).send().await?;
        // 先读出文本, 状态码与响应体都要用到
        let status = response.status();
        let body = response.text().await?;

        let envelope: LoginEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(status_error(status, body_message(&body))),
            Err(e) => return Err(GatewayError::ParseError(e.to_string())),
        };

        // error 字段优先, code 可能是数字也可能是字符串
        if let Some(error) = envelope.error {
            let code = match error.code {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            return Err(GatewayError::ServerLogic {
                code,
                title: error.title,
                message: error.message,
            });
        }

        // 没有 error 字段但状态码失败, 按普通接口错误处理
        if !status.is_success() {
            return Err(status_error(status, body_message(&body)));
        }

        let data = envelope
            .data
            .ok_or_else(|| GatewayError::ParseError("登录响应中缺少 data".to_string()))?;
        self.set_access_token(data.access_token.clone()).await;
        info!("用户 {} 登录成功", user_id);

        Ok(data)
    }

    /// 培养方案列表在首次成功获取后缓存
    pub async fn request_training_scheme_list(&self) -> Result<Vec<TrainingScheme>, GatewayError> {
        self.training_scheme_list
            .get_or_try_init(|| self.get_authorized(&["student", "training_scheme"]))
            .await
            .cloned()
    }

    pub async fn request_bachelor_degree(&self, query: &str) -> Result<Vec<BachelorDegreeInfo>, GatewayError> {
        self.get_authorized(&["info", "bachelor_degree", query]).await
    }

    pub async fn request_scu_uietp_list(&self, query: &str) -> Result<ScuUietpInfo, GatewayError> {
        self.get_authorized(&["info", "scu_uietp", query]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(root: &str) -> ApiClient {
        ApiClient::new(
            Client::new(),
            &ApiConfig {
                root: root.to_string(),
                access_token: None,
            },
            ClientConfig::default(),
        )
    }

    #[test]
    fn query_is_escaped_as_one_segment() {
        let url = api("http://127.0.0.1:3000/api/v2/")
            .endpoint(&["info", "scu_uietp", "a b/c"])
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3000/api/v2/info/scu_uietp/a%20b%2Fc");
    }

    #[test]
    fn message_is_read_from_failure_body() {
        assert_eq!(body_message(r#"{"message": "token invalid"}"#), "token invalid");
        assert_eq!(body_message("Bad Gateway"), "");
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, "token invalid".into()).to_string(),
            "[401] Unauthorized: token invalid"
        );
    }

    #[tokio::test]
    async fn missing_token_is_rejected_without_request() {
        let err = api("http://127.0.0.1:9").request_bachelor_degree("2018141461000").await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingAccessToken));
    }
}
