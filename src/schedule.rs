// 课程开课信息查询: 字段映射、按课序号合并与限流
use crate::{
    business::get_chinese_number,
    models::{CourseScheduleInfo, GatewayError, ScheduleQueryResponse},
    throttle::{Admission, QueryIdentity, ScheduleThrottle},
    utils::{number_field, text_field},
};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

// 合并时不同取值之间的分隔符
pub const MERGE_SEPARATOR: &str = "，";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleQuery {
    pub semester: String,
    pub course_name: String,
    pub course_number: String,
}

/// 受限流的课程开课接口
///
/// `Ok(None)` 表示响应中没有 `list` 字段, 教务处以此表示查询被拒绝.
#[async_trait]
pub trait ScheduleEndpoint: Send + Sync {
    async fn fetch_course_schedule(&self, query: &ScheduleQuery) -> Result<Option<Vec<Value>>, GatewayError>;
}

#[async_trait]
impl<T: ScheduleEndpoint + ?Sized> ScheduleEndpoint for Arc<T> {
    async fn fetch_course_schedule(&self, query: &ScheduleQuery) -> Result<Option<Vec<Value>>, GatewayError> {
        (**self).fetch_course_schedule(query).await
    }
}

/// 原始记录到 CourseScheduleInfo 的映射
///
/// | 原始字段 | 输出字段 |
/// |---|---|
/// | kcm / kch / kxh | courseName / courseNumber / courseSequenceNumber |
/// | kkxsh / kkxsjc | courseDeptNumber / courseDeptName |
/// | xf | credit (缺省 0) |
/// | kclbdm / kclbmc | courseCategoryCode / courseCategoryName |
/// | kslxdm / kslxmc | examTypeCode / examTypeName |
/// | skjs | courseTeacher |
/// | zcsm + skxq + skjc | courseTime |
/// | xqm + jxlm + jasm | campusName |
/// | bkskyl / bkskrl | classCapacityRemaining |
/// | xkxzsm | courseRegNote (";" 视为空) |
pub fn course_schedule_from_raw(raw: &Value) -> CourseScheduleInfo {
    let t = |key: &str| text_field(raw, &[key]);

    let reg_note = t("xkxzsm");
    CourseScheduleInfo {
        course_name: t("kcm"),
        course_number: t("kch"),
        course_sequence_number: t("kxh"),
        course_dept_number: t("kkxsh"),
        course_dept_name: t("kkxsjc"),
        credit: number_field(raw, &["xf"]).normalize().to_string(),
        course_category_code: t("kclbdm"),
        course_category_name: t("kclbmc"),
        exam_type_code: t("kslxdm"),
        exam_type_name: t("kslxmc"),
        course_teacher: t("skjs"),
        course_time: format!("{}星期{}{}节", t("zcsm"), get_chinese_number(&t("skxq")), t("skjc")),
        campus_name: format!("{}校区{}{}", t("xqm"), t("jxlm"), t("jasm")),
        class_capacity_remaining: format!("{} / {}", t("bkskyl"), t("bkskrl")),
        course_reg_note: if reg_note == ";" { String::new() } else { reg_note },
    }
}

fn merge_text(a: &str, b: &str) -> String {
    if a == b {
        a.to_string()
    } else {
        format!("{a}{MERGE_SEPARATOR}{b}")
    }
}

/// 逐字段合并: 相同取值保留, 不同取值以"，"拼接
pub fn merge_course_schedule(a: &CourseScheduleInfo, b: &CourseScheduleInfo) -> CourseScheduleInfo {
    CourseScheduleInfo {
        course_name: merge_text(&a.course_name, &b.course_name),
        course_number: merge_text(&a.course_number, &b.course_number),
        course_sequence_number: merge_text(&a.course_sequence_number, &b.course_sequence_number),
        course_dept_number: merge_text(&a.course_dept_number, &b.course_dept_number),
        course_dept_name: merge_text(&a.course_dept_name, &b.course_dept_name),
        credit: merge_text(&a.credit, &b.credit),
        course_category_code: merge_text(&a.course_category_code, &b.course_category_code),
        course_category_name: merge_text(&a.course_category_name, &b.course_category_name),
        exam_type_code: merge_text(&a.exam_type_code, &b.exam_type_code),
        exam_type_name: merge_text(&a.exam_type_name, &b.exam_type_name),
        course_teacher: merge_text(&a.course_teacher, &b.course_teacher),
        course_time: merge_text(&a.course_time, &b.course_time),
        campus_name: merge_text(&a.campus_name, &b.campus_name),
        class_capacity_remaining: merge_text(&a.class_capacity_remaining, &b.class_capacity_remaining),
        course_reg_note: merge_text(&a.course_reg_note, &b.course_reg_note),
    }
}

/// 按课序号去重合并, 结果按课序号数值升序, 非数字课序号排在最后
pub fn merge_by_sequence_number(records: Vec<CourseScheduleInfo>) -> Vec<CourseScheduleInfo> {
    let mut merged: Vec<CourseScheduleInfo> = Vec::new();

    for record in records {
        match merged
            .iter_mut()
            .find(|m| m.course_sequence_number == record.course_sequence_number)
        {
            Some(existing) => *existing = merge_course_schedule(existing, &record),
            None => merged.push(record),
        }
    }

    merged.sort_by_key(|m| m.course_sequence_number.trim().parse::<u64>().unwrap_or(u64::MAX));
    merged
}

/// 课程开课查询服务, 持有整个进程共用的限流时钟
pub struct CourseScheduleService<E> {
    endpoint: E,
    throttle: ScheduleThrottle,
}

impl<E: ScheduleEndpoint> CourseScheduleService<E> {
    pub fn new(endpoint: E, throttle: ScheduleThrottle) -> Self {
        Self { endpoint, throttle }
    }

    pub fn throttle(&self) -> &ScheduleThrottle {
        &self.throttle
    }

    pub async fn request_course_schedule(
        &self,
        semester: &str,
        course_name: &str,
        course_number: &str,
    ) -> ScheduleQueryResponse {
        let identity = QueryIdentity {
            course_name: course_name.to_string(),
            course_number: course_number.to_string(),
        };

        let ticket = match self.throttle.acquire(identity).await {
            Admission::Proceed(ticket) => ticket,
            Admission::Superseded => return ScheduleQueryResponse::Superseded,
        };

        let query = ScheduleQuery {
            semester: semester.to_string(),
            course_name: course_name.to_string(),
            course_number: course_number.to_string(),
        };

        let records = match self.endpoint.fetch_course_schedule(&query).await {
            Ok(Some(records)) => records,
            Ok(None) => {
                self.throttle.record_failure(ticket).await;
                return ScheduleQueryResponse::NetworkError;
            }
            Err(e) => {
                warn!("课程开课查询失败: {}", e);
                self.throttle.record_failure(ticket).await;
                return ScheduleQueryResponse::NetworkError;
            }
        };
        self.throttle.finish(ticket).await;

        debug!("课程 {} ({}) 共 {} 条开课记录", course_name, course_number, records.len());

        let sequence = merge_by_sequence_number(records.iter().map(course_schedule_from_raw).collect());

        info!("课程 {} 查询完成, 合并后共 {} 个课序号", course_name, sequence.len());

        ScheduleQueryResponse::Sequence(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    // 可控的接口替身, 记录真实发出的查询
    #[derive(Default)]
    struct FakeEndpoint {
        calls: AtomicUsize,
        queries: std::sync::Mutex<Vec<ScheduleQuery>>,
        reject: bool,
    }

    #[async_trait]
    impl ScheduleEndpoint for FakeEndpoint {
        async fn fetch_course_schedule(&self, query: &ScheduleQuery) -> Result<Option<Vec<Value>>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            if self.reject {
                return Ok(None);
            }
            Ok(Some(vec![
                raw_row("02", "王老师", "2"),
                raw_row("01", "李老师", "1"),
                raw_row("01", "张老师", "1"),
            ]))
        }
    }

    fn raw_row(kxh: &str, skjs: &str, skxq: &str) -> Value {
        json!({
            "kcm": "数据结构",
            "kch": "304001020",
            "kxh": kxh,
            "kkxsh": "304",
            "kkxsjc": "计算机学院",
            "xf": 4,
            "kclbdm": "001",
            "kclbmc": "专业课",
            "kslxdm": "01",
            "kslxmc": "考试",
            "skjs": skjs,
            "zcsm": "1-16周",
            "skxq": skxq,
            "skjc": "1-2",
            "xqm": "江安",
            "jxlm": "一教A座",
            "jasm": "A101",
            "bkskrl": 120,
            "bkskyl": 3,
            "xkxzsm": ";"
        })
    }

    fn service(reject: bool) -> CourseScheduleService<Arc<FakeEndpoint>> {
        let endpoint = Arc::new(FakeEndpoint { reject, ..Default::default() });
        CourseScheduleService::new(
            endpoint,
            ScheduleThrottle::new(Duration::from_millis(5000), Duration::from_millis(1000)),
        )
    }

    #[test]
    fn maps_garbled_keys() {
        let info = course_schedule_from_raw(&raw_row("01", "李老师", "3"));
        assert_eq!(info.course_name, "数据结构");
        assert_eq!(info.course_sequence_number, "01");
        assert_eq!(info.credit, "4");
        assert_eq!(info.course_time, "1-16周星期三1-2节");
        assert_eq!(info.campus_name, "江安校区一教A座A101");
        assert_eq!(info.class_capacity_remaining, "3 / 120");
        assert_eq!(info.course_reg_note, "");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let info = course_schedule_from_raw(&json!({"kcm": null, "xf": null}));
        assert_eq!(info.course_name, "");
        assert_eq!(info.credit, "0");
        assert_eq!(info.course_dept_name, "");
    }

    #[test]
    fn merging_with_itself_is_identity() {
        let info = course_schedule_from_raw(&raw_row("01", "李老师", "1"));
        assert_eq!(merge_course_schedule(&info, &info), info);
    }

    #[test]
    fn merging_different_teachers_joins_them() {
        let a = course_schedule_from_raw(&raw_row("01", "李老师", "1"));
        let b = course_schedule_from_raw(&raw_row("01", "张老师", "1"));
        let merged = merge_course_schedule(&a, &b);

        assert_eq!(merged.course_teacher, "李老师，张老师");
        assert_eq!(CourseScheduleInfo { course_teacher: a.course_teacher.clone(), ..merged }, a);
    }

    #[test]
    fn dedup_and_sort_by_sequence_number() {
        let rows = vec![
            course_schedule_from_raw(&raw_row("10", "赵老师", "1")),
            course_schedule_from_raw(&raw_row("2", "王老师", "2")),
            course_schedule_from_raw(&raw_row("10", "钱老师", "4")),
            course_schedule_from_raw(&raw_row("x", "孙老师", "5")),
        ];
        let merged = merge_by_sequence_number(rows);

        let seqs: Vec<_> = merged.iter().map(|m| m.course_sequence_number.as_str()).collect();
        assert_eq!(seqs, vec!["2", "10", "x"]);
        assert_eq!(merged[1].course_teacher, "赵老师，钱老师");
        assert_eq!(merged[1].course_time, "1-16周星期一1-2节，1-16周星期四1-2节");
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_queries_only_run_the_latest() {
        let service = service(false);

        let (first, second) = tokio::join!(
            service.request_course_schedule("2020-2021-1-1", "操作系统", "304002030"),
            service.request_course_schedule("2020-2021-1-1", "数据结构", "304001020"),
        );

        assert_eq!(first, ScheduleQueryResponse::Superseded);
        match second {
            ScheduleQueryResponse::Sequence(seq) => {
                assert_eq!(seq.len(), 2);
                assert_eq!(seq[0].course_sequence_number, "01");
                assert_eq!(seq[0].course_teacher, "李老师，张老师");
            }
            other => panic!("unexpected response {other:?}"),
        }
        assert_eq!(service.endpoint.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.endpoint.queries.lock().unwrap()[0].course_name, "数据结构");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_query_doubles_backoff() {
        let service = service(true);

        let response = service.request_course_schedule("2020-2021-1-1", "数据结构", "304001020").await;
        assert_eq!(response, ScheduleQueryResponse::NetworkError);
        assert_eq!(service.throttle().backoff().await, Duration::from_millis(2000));

        let response = service.request_course_schedule("2020-2021-1-1", "数据结构", "304001020").await;
        assert_eq!(response, ScheduleQueryResponse::NetworkError);
        assert_eq!(service.throttle().backoff().await, Duration::from_millis(4000));
        assert_eq!(service.endpoint.calls.load(Ordering::SeqCst), 2);
    }
}
