// 结构体与自定义异常
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// 教师信息, 来自 dgFlag 字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseTeacher {
    pub teacher_number: String,
    pub teacher_name: String,
}

// 上课时间地点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeAndPlace {
    pub campus_name: String,
    pub class_day: i64,
    pub class_sessions: i64,
    pub class_week: String,
    pub classroom_name: String,
    pub continuing_session: i64,
    pub teaching_building_name: String,
    pub week_description: String,
}

// 某学期已选课程
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseInfoList {
    pub course_category_code: String,
    pub course_category_name: String,
    pub course_name: String,
    pub course_properties_code: String,
    pub course_properties_name: String,
    pub course_teacher_list: Vec<CourseTeacher>,
    pub exam_type_code: String,
    pub exam_type_name: String,
    pub course_number: String,
    pub course_sequence_number: String,
    pub executive_education_plan_number: String,
    pub restricted_condition: String,
    pub time_and_place_list: Vec<TimeAndPlace>,
}

// 成绩信息, 全部学期与本学期共用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseScoreInfo {
    pub executive_education_plan_number: String,
    pub executive_education_plan_name: String,
    pub course_number: String,
    pub course_sequence_number: String,
    pub exam_time: String,
    pub input_status_code: String,
    pub course_property_code: String,
    pub course_property_name: String,
    pub exam_type_code: String,
    pub exam_type_name: String,
    pub input_method_code: String,
    pub course_score: Decimal,  // 0 表示无成绩
    pub level_code: String,
    pub level_name: String,
    pub unpassed_reason_code: String,   // 缓考是 '00'
    pub unpassed_reason_explain: String,
    pub course_name: String,
    pub english_course_name: String,
    pub credit: Decimal,
    pub study_hour: Decimal,
    pub max_score: Decimal,
    pub avg_score: Decimal,
    pub min_score: Decimal,
    pub rank: i64,
    pub grade_point: Option<Decimal>,
}

// 课程开课信息, 合并时任意字段都可能被拼接, 因此全部为文本
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseScheduleInfo {
    pub course_name: String,
    pub course_number: String,
    pub course_sequence_number: String,
    pub course_dept_number: String,
    pub course_dept_name: String,
    pub credit: String,
    pub course_category_code: String,
    pub course_category_name: String,
    pub exam_type_code: String,
    pub exam_type_name: String,
    pub course_teacher: String,
    pub course_time: String,
    pub campus_name: String,
    pub class_capacity_remaining: String,
    pub course_reg_note: String,
}

// 课程开课查询结果, 限流与网络异常不抛错
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "response", content = "sequence", rename_all = "snake_case")]
pub enum ScheduleQueryResponse {
    Sequence(Vec<CourseScheduleInfo>),
    NetworkError,
    Superseded,
}

// 本学期学业概况
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSemesterStudentAcademicInfo {
    pub course_number: i64,
    pub current_semester: String,
    pub gpa: Decimal,
    pub current_semester_course_number: i64,
    pub failed_course_number: i64,
}

// 学籍信息, 保持页面中的字段顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub fields: Vec<(String, String)>,
}

impl StudentProfile {
    /// 同名字段以后出现的值为准, 位置保持首次出现处
    pub fn insert(&mut self, label: String, value: String) {
        match self.fields.iter_mut().find(|(l, _)| *l == label) {
            Some(existing) => existing.1 = value,
            None => self.fields.push((label, value)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// 培养方案基本信息, 只依赖专业名称与年级名称
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSchemeBaseInfo {
    #[serde(default, deserialize_with = "crate::utils::lenient_string")]
    pub zym: String,    // 专业名称
    #[serde(default, deserialize_with = "crate::utils::lenient_string")]
    pub njmc: String,   // 年级名称
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// 培养方案中的课程
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSchemeCourseInfo {
    pub course_name: String,
    pub course_number: String,
    pub course_property_name: String,
    pub course_attributes: Vec<String>,
    pub course_major: String,
}

// 学期节点(春/秋)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSchemeSemesterInfo {
    pub name: String,
    pub children: Vec<TrainingSchemeCourseInfo>,
}

// 学年节点
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSchemeYearInfo {
    pub name: String,
    pub children: Vec<TrainingSchemeSemesterInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSchemeDetail {
    pub info: TrainingSchemeBaseInfo,
    pub list: Vec<TrainingSchemeYearInfo>,
}

// 扁平树节点, 两个 detail 接口共用
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTreeNode {
    #[serde(default, deserialize_with = "crate::utils::lenient_string")]
    pub id: String,
    #[serde(default, rename = "pId", deserialize_with = "crate::utils::lenient_string")]
    pub p_id: String,
    #[serde(default, deserialize_with = "crate::utils::lenient_string")]
    pub name: String,
    // 学年、学期与目录节点的 urlPath 常为 null
    #[serde(default, deserialize_with = "crate::utils::lenient_string")]
    pub url_path: String,
}

// 版本化 API 的记录没有文档, 原样保留
pub type TrainingScheme = Map<String, Value>;
pub type BachelorDegreeInfo = Map<String, Value>;
pub type ScuUietpInfo = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResultData {
    pub access_token: String,
}

// 教材批量选择接口的返回
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SaveTextbookResponse {
    // null 与其他未知结果一样按失败处理
    #[serde(default, deserialize_with = "crate::utils::lenient_string")]
    pub result: String,
    #[serde(default)]
    pub token: Option<String>,
}

// 数据获取异常
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP 请求失败: {0}")]
    HttpRequest(String),

    #[error("解析异常: {0}")]
    ParseError(String),

    #[error("[{status}] {status_text}: {message}")]
    Server {
        status: u16,
        status_text: String,
        message: String,
    },

    #[error("[{code}] {title}: {message}")]
    ServerLogic {
        code: String,
        title: String,
        message: String,
    },

    #[error("{title}: {message}")]
    Page { title: String, message: String },

    #[error("未登录或登录凭证缺失")]
    MissingAccessToken,
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::HttpRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_insert_keeps_first_position() {
        let mut profile = StudentProfile::default();
        profile.insert("姓名".into(), "张三".into());
        profile.insert("学号".into(), "2018141".into());
        profile.insert("姓名".into(), "李四".into());

        assert_eq!(profile.len(), 2);
        assert_eq!(profile.fields[0], ("姓名".to_string(), "李四".to_string()));
        assert_eq!(profile.get("学号"), Some("2018141"));
        assert_eq!(profile.get("年级"), None);
    }

    #[test]
    fn gateway_error_messages() {
        let e = GatewayError::Server {
            status: 401,
            status_text: "Unauthorized".into(),
            message: "token expired".into(),
        };
        assert_eq!(e.to_string(), "[401] Unauthorized: token expired");

        let e = GatewayError::ServerLogic {
            code: "40001".into(),
            title: "登录失败".into(),
            message: "用户不存在".into(),
        };
        assert_eq!(e.to_string(), "[40001] 登录失败: 用户不存在");
    }

    #[test]
    fn null_textbook_result_reads_as_empty() {
        let response: SaveTextbookResponse = serde_json::from_str(r#"{"result": null}"#).unwrap();
        assert_eq!(response.result, "");
        assert_eq!(response.token, None);
    }

    #[test]
    fn tree_node_accepts_null_url_path() {
        let node: RawTreeNode = serde_json::from_str(r#"{"id": 3, "pId": null, "name": "春", "urlPath": null}"#).unwrap();
        assert_eq!(node.id, "3");
        assert_eq!(node.p_id, "");
        assert_eq!(node.name, "春");
        assert_eq!(node.url_path, "");
    }

    #[test]
    fn schedule_response_serializes_with_tag() {
        let json = serde_json::to_value(ScheduleQueryResponse::Superseded).unwrap();
        assert_eq!(json, serde_json::json!({"response": "superseded"}));
    }
}
