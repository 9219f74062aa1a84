// 获取数据层 - 教务处页面与接口
use crate::{
    business::filter_course_score_info_list,
    config::PortalConfig,
    extract::{
        academic_info_from_response, all_term_scores_from_response, all_term_total_count,
        course_info_list_from_response, parse_error_page, parse_semester_number_list, parse_student_profile,
        this_term_scores_from_response,
    },
    models::{
        CourseInfoList, CourseScoreInfo, CurrentSemesterStudentAcademicInfo, GatewayError, SaveTextbookResponse,
        StudentProfile, TrainingSchemeDetail,
    },
    schedule::{ScheduleEndpoint, ScheduleQuery},
    textbook::{TextbookSubmitter, SAVE_TEXTBOOK_PATH},
    training_scheme::{build_training_scheme, InstructionalTeachingPlanDto, TrainingSchemeDto},
};

use async_trait::async_trait;
use fake_user_agent::get_rua;
use lazy_static::lazy_static;
use reqwest::{
    cookie::Jar,
    header::{HeaderMap, HeaderValue},
    Client, Url,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

// 每次程序启动都随机加载一个 UA
lazy_static! {
    pub static ref USER_AGENT: &'static str = get_rua();
}

pub const SEMESTER_LIST_PATH: &str = "/student/courseSelect/calendarSemesterCurriculum/index";
pub const COURSE_INFO_LIST_PATH: &str = "/student/courseSelect/thisSemesterCurriculum/ajaxStudentSchedule/past/callback";
pub const STUDENT_INFO_PATH: &str = "/student/rollManagement/rollInfo/index";
pub const ACADEMIC_INFO_PATH: &str = "/main/academicInfo";
pub const ALL_TERM_SCORES_PATH: &str = "/student/integratedQuery/scoreQuery/allTermScores/data";
pub const THIS_TERM_SCORES_PATH: &str = "/student/integratedQuery/scoreQuery/thisTermScores/data";
// 教务处系统把 Schedule 打成了 Schdule
pub const COURSE_SCHEDULE_PATH: &str = "/student/integratedQuery/course/courseSchdule/courseInfo";

// 教务处网站客户端
pub struct PortalClient {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl PortalClient {
    pub fn new(config: &PortalConfig) -> Result<Self, GatewayError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        // 已有的会话 Cookie 放进 Cookie 存储, 之后由 reqwest 自动管理
        let jar = Jar::default();
        if let Some(cookie) = &config.cookie {
            let url = Url::parse(&base_url).map_err(|e| GatewayError::ParseError(e.to_string()))?;
            for pair in cookie.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                jar.add_cookie_str(pair, &url);
            }
        }

        // 同一进程内的请求共用这个 UA
        let client = Client::builder()
            .user_agent(*USER_AGENT)
            .cookie_provider(Arc::new(jar))
            .build()?;

        debug!("客户端实例初始化完成: {}", base_url);

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        // 接口请求按 jQuery 的习惯带上 X-Requested-With
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("*/*"));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        Self {
            client,
            base_url: base_url.into(),
            headers,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 获取整页 HTML, X-Requested-With 置空, 否则教务处返回的是片段
    pub async fn get_page_html(&self, path: &str) -> Result<String, GatewayError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let mut headers = self.headers.clone();
        headers.insert("X-Requested-With", HeaderValue::from_static(""));

        let response = self.client.get(&url).headers(headers).send().await?;
        let status_code = response.status();
        if !status_code.is_success() {
            return Err(GatewayError::HttpRequest(format!("无法访问{}: {}", url, status_code)));
        }

        Ok(response.text().await?)
    }

    async fn send_for_json(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Value, GatewayError> {
        let response = request.headers(self.headers.clone()).send().await?;
        let status_code = response.status();
        if !status_code.is_success() {
            return Err(GatewayError::HttpRequest(format!("无法访问{}: {}", url, status_code)));
        }

        // 先取文本再解析, 出错时能在信息里带上地址
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::ParseError(format!("{}: {}", url, e)))
    }

    async fn post_form_json<F: serde::Serialize + ?Sized>(&self, path: &str, form: &F) -> Result<Value, GatewayError> {
        let url = self.url(path);
        debug!("POST {}", url);
        self.send_for_json(self.client.post(&url).form(form), &url).await
    }

    async fn get_json(&self, path: &str) -> Result<Value, GatewayError> {
        let url = self.url(path);
        debug!("GET {}", url);
        self.send_for_json(self.client.get(&url), &url).await
    }

    async fn get_typed<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let value = self.get_json(path).await?;
        serde_json::from_value(value).map_err(|e| GatewayError::ParseError(format!("{}: {}", path, e)))
    }

    /// 请求失败时重新以页面形式打开, 取出标题与提示信息
    pub async fn load_html_to_deal_with_error(&self, path: &str) -> Result<(String, String, String), GatewayError> {
        let html = self.get_page_html(path).await?;
        let (title, message) = parse_error_page(&html)?;
        Ok((title, message, html))
    }

    async fn diagnose_failure(&self, path: &str, cause: GatewayError) -> GatewayError {
        match self.load_html_to_deal_with_error(path).await {
            Ok((title, message, html)) => {
                error!(%cause, %title, %message, %html, "请求 {} 失败", path);
                GatewayError::Page { title, message }
            }
            Err(e) => e,
        }
    }

    pub async fn request_student_semester_number_list(&self) -> Result<Vec<String>, GatewayError> {
        let html = self.get_page_html(SEMESTER_LIST_PATH).await?;
        parse_semester_number_list(&html)
    }

    pub async fn request_course_info_list_by_semester(&self, semester: &str) -> Result<Vec<CourseInfoList>, GatewayError> {
        let body = self
            .post_form_json(COURSE_INFO_LIST_PATH, &[("planCode", semester)])
            .await?;
        course_info_list_from_response(&body)
    }

    pub async fn request_student_info(&self) -> Result<StudentProfile, GatewayError> {
        let html = self.get_page_html(STUDENT_INFO_PATH).await?;
        parse_student_profile(&html)
    }

    pub async fn request_current_semester_student_academic_info(
        &self,
    ) -> Result<CurrentSemesterStudentAcademicInfo, GatewayError> {
        let body = self.post_form_json(ACADEMIC_INFO_PATH, &[] as &[(&str, &str)]).await?;
        // 该接口有时把 JSON 再包成字符串
        let body = match body {
            Value::String(text) => serde_json::from_str(&text).map_err(|e| GatewayError::ParseError(e.to_string()))?,
            other => other,
        };
        academic_info_from_response(&body)
    }

    async fn fetch_all_terms_scores(&self) -> Result<Vec<CourseScoreInfo>, GatewayError> {
        // 先查一条拿到总数, 再一次取完
        let first_page = self
            .post_form_json(
                ALL_TERM_SCORES_PATH,
                &[("zxjxjhh", ""), ("kch", ""), ("kcm", ""), ("pageNum", "1"), ("pageSize", "1")],
            )
            .await?;
        // pageSize 以文本形式提交
        let total_count = all_term_total_count(&first_page)?.to_string();

        let body = self
            .post_form_json(
                ALL_TERM_SCORES_PATH,
                &[
                    ("zxjxjhh", ""),
                    ("kch", ""),
                    ("kcm", ""),
                    ("pageNum", "1"),
                    ("pageSize", total_count.as_str()),
                ],
            )
            .await?;
        all_term_scores_from_response(&body)
    }

    pub async fn request_all_terms_course_score_info_list(&self) -> Result<Vec<CourseScoreInfo>, GatewayError> {
        match self.fetch_all_terms_scores().await {
            Ok(list) => {
                let list = filter_course_score_info_list(list);
                info!("全部学期成绩获取成功, 共 {} 门课程", list.len());
                Ok(list)
            }
            Err(e) => Err(self.diagnose_failure(ALL_TERM_SCORES_PATH, e).await),
        }
    }

    pub async fn request_this_term_course_score_info_list(&self) -> Result<Vec<CourseScoreInfo>, GatewayError> {
        let result = match self.get_json(THIS_TERM_SCORES_PATH).await {
            Ok(body) => this_term_scores_from_response(&body),
            Err(e) => Err(e),
        };

        match result {
            Ok(list) => {
                let list = filter_course_score_info_list(list);
                info!("本学期成绩获取成功, 共 {} 门课程", list.len());
                Ok(list)
            }
            Err(e) => Err(self.diagnose_failure(THIS_TERM_SCORES_PATH, e).await),
        }
    }

    /// 两个 detail 接口并发获取后合并
    pub async fn request_training_scheme(&self, num: u64) -> Result<TrainingSchemeDetail, GatewayError> {
        let plan_path = format!("/student/rollManagement/project/{}/2/detail", num);
        let scheme_path = format!("/student/rollManagement/project/{}/1/detail", num);

        let (plan, scheme) = tokio::try_join!(
            self.get_typed::<InstructionalTeachingPlanDto>(&plan_path),
            self.get_typed::<TrainingSchemeDto>(&scheme_path),
        )?;

        build_training_scheme(plan, scheme)
    }
}

#[async_trait]
impl ScheduleEndpoint for PortalClient {
    async fn fetch_course_schedule(&self, query: &ScheduleQuery) -> Result<Option<Vec<Value>>, GatewayError> {
        let body = self
            .post_form_json(
                COURSE_SCHEDULE_PATH,
                &[
                    ("zxjxjhh", query.semester.as_str()),
                    ("kch", query.course_number.as_str()),
                    ("kcm", query.course_name.as_str()),
                    ("pageNum", "1"),
                    ("pageSize", "1000"),
                ],
            )
            .await?;

        // 没有 list 说明被判定为频繁查询
        let list = match body.get("list") {
            Some(list) if !list.is_null() => list,
            _ => return Ok(None),
        };

        Ok(Some(
            list.get("records")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

#[async_trait]
impl TextbookSubmitter for PortalClient {
    async fn save_textbooks(&self, token_value: &str, param: &str) -> Result<SaveTextbookResponse, GatewayError> {
        let body = self
            .post_form_json(SAVE_TEXTBOOK_PATH, &[("tokenValue", token_value), ("param", param)])
            .await?;
        serde_json::from_value(body).map_err(|e| GatewayError::ParseError(e.to_string()))
    }
}
