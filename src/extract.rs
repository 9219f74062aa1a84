// 页面与接口数据的提取
//
// 这里只做纯转换, 网络请求在 scraping 模块.
use crate::{
    business::{convert_semester_number_to_text, get_point_by_score},
    models::{
        CourseInfoList, CourseScoreInfo, CourseTeacher, CurrentSemesterStudentAcademicInfo, GatewayError,
        StudentProfile, TimeAndPlace,
    },
    utils::{integer_field, integer_of, lookup, number_field, number_of, text_field, text_of},
};

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

pub const PROGRAM_PLAN_NAME_LABEL: &str = "培养方案名称";
pub const PROGRAM_PLAN_CODE_LABEL: &str = "培养方案代码";

lazy_static! {
    static ref TEACHER_NAME_SUFFIX: Regex = Regex::new(r"[（(].+[）)]").unwrap();
}

fn selector(css: &str) -> Result<Selector, GatewayError> {
    Selector::parse(css).map_err(|e| GatewayError::ParseError(e.to_string()))
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn has_class(element: &ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// 选课日历页面中的学期代码列表
pub fn parse_semester_number_list(html: &str) -> Result<Vec<String>, GatewayError> {
    let document = Html::parse_document(html);
    let option_selector = selector("#planCode option")?;

    Ok(document
        .select(&option_selector)
        .map(|option| {
            option
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| element_text(&option))
        })
        .collect())
}

/// 学籍信息页面
///
/// 每个 `.profile-info-row` 可能有一组或两组 名称/值, 其余行丢弃.
pub fn parse_student_profile(html: &str) -> Result<StudentProfile, GatewayError> {
    let document = Html::parse_document(html);
    let row_selector = selector(".profile-info-row")?;
    let plan_selector = selector("#zx")?;

    let mut profile = StudentProfile::default();

    // 按页面顺序逐行读取, 同名字段以后出现的为准

    for row in document.select(&row_selector) {
        let children: Vec<ElementRef> = row.children().filter_map(ElementRef::wrap).collect();
        let names: Vec<String> = children
            .iter()
            .filter(|c| has_class(c, "profile-info-name"))
            .map(element_text)
            .collect();
        let values: Vec<String> = children
            .iter()
            .filter(|c| has_class(c, "profile-info-value"))
            .map(element_text)
            .collect();

        if names.len() != 1 && names.len() != 2 {
            continue;
        }

        for (i, label) in names.into_iter().enumerate() {
            if label.is_empty() {
                continue;
            }
            profile.insert(label, values.get(i).cloned().unwrap_or_default());
        }
    }

    // 培养方案不在 profile-info-row 里, 单独从 #zx 取
    let plan = document.select(&plan_selector).next();
    let program_plan_number = plan
        .and_then(|el| el.value().attr("value"))
        .unwrap_or_default()
        .to_string();
    let program_plan_name = plan
        .and_then(|el| el.parent())
        .and_then(ElementRef::wrap)
        .map(|parent| element_text(&parent))
        .unwrap_or_default();

    profile.insert(PROGRAM_PLAN_NAME_LABEL.to_string(), program_plan_name);
    profile.insert(PROGRAM_PLAN_CODE_LABEL.to_string(), program_plan_number);

    Ok(profile)
}

/// 出错页面的标题与提示信息
pub fn parse_error_page(html: &str) -> Result<(String, String), GatewayError> {
    let document = Html::parse_document(html);
    let title_selector = selector("title")?;
    let message_selector = selector(".main-content .page-content")?;

    let title = document
        .select(&title_selector)
        .map(|t| t.text().collect::<String>())
        .collect::<String>();
    let message = document
        .select(&message_selector)
        .map(|m| m.text().collect::<String>())
        .collect::<String>()
        .replace('×', "")
        .trim()
        .to_string();

    Ok((title, message))
}

/// dgFlag 形如 "10001,张三(教授)|10002,李四（讲师）"
pub fn parse_teacher_list(dg_flag: &str) -> Vec<CourseTeacher> {
    dg_flag
        .split('|')
        .filter(|segment| !segment.trim().is_empty())
        .map(|segment| {
            // 逗号前是工号, 后面是姓名, 姓名后可能带全角或半角括号的职称
            let mut parts = segment.split(',');
            let teacher_number = parts.next().unwrap_or_default().to_string();
            let teacher_name = TEACHER_NAME_SUFFIX
                .replace(parts.next().unwrap_or_default(), "")
                .into_owned();
            CourseTeacher {
                teacher_number,
                teacher_name,
            }
        })
        .collect()
}

fn time_and_place_from_raw(raw: &Value) -> TimeAndPlace {
    TimeAndPlace {
        campus_name: text_field(raw, &["campusName"]),
        class_day: integer_field(raw, &["classDay"]),
        class_sessions: integer_field(raw, &["classSessions"]),
        class_week: text_field(raw, &["classWeek"]),
        classroom_name: text_field(raw, &["classroomName"]),
        continuing_session: integer_field(raw, &["continuingSession"]),
        teaching_building_name: text_field(raw, &["teachingBuildingName"]),
        week_description: text_field(raw, &["weekDescription"]),
    }
}

/// 已选课程, 注意 id 里的 coureNumber/coureSequenceNumber 是接口原有的拼写
pub fn course_info_from_raw(raw: &Value) -> CourseInfoList {
    let t = |path: &[&str]| text_field(raw, path);

    CourseInfoList {
        course_category_code: t(&["courseCategoryCode"]),
        course_category_name: t(&["courseCategoryName"]),
        course_name: t(&["courseName"]),
        course_properties_code: t(&["coursePropertiesCode"]),
        course_properties_name: t(&["coursePropertiesName"]),
        course_teacher_list: parse_teacher_list(&t(&["dgFlag"])),
        exam_type_code: t(&["examTypeCode"]),
        exam_type_name: t(&["examTypeName"]),
        course_number: t(&["id", "coureNumber"]),
        course_sequence_number: t(&["id", "coureSequenceNumber"]),
        executive_education_plan_number: t(&["id", "executiveEducationPlanNumber"]),
        restricted_condition: t(&["restrictedCondition"]),
        time_and_place_list: raw
            .get("timeAndPlaceList")
            .and_then(Value::as_array)
            .map(|list| list.iter().map(time_and_place_from_raw).collect())
            .unwrap_or_default(),
    }
}

/// `{xkxx: [{<key>: course, ...}]}` 中第一个对象的全部取值
pub fn course_info_list_from_response(body: &Value) -> Result<Vec<CourseInfoList>, GatewayError> {
    // xkxx 是数组, 但课程都在第一个对象里, 键是 "课程号_课序号"
    let courses = body
        .get("xkxx")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_object)
        .ok_or_else(|| GatewayError::ParseError("响应中缺少 xkxx".to_string()))?;

    Ok(courses.values().map(course_info_from_raw).collect())
}

/// 本学期成绩, 几个字段名是接口原有的错别字: coureSequenceNumber, levlePoint
pub fn this_term_score_from_raw(raw: &Value) -> CourseScoreInfo {
    let t = |path: &[&str]| text_field(raw, path);
    let n = |key: &str| number_field(raw, &[key]);
    let plan_number = t(&["id", "executiveEducationPlanNumber"]);

    CourseScoreInfo {
        executive_education_plan_name: convert_semester_number_to_text(&plan_number),
        executive_education_plan_number: plan_number,
        course_number: t(&["id", "courseNumber"]),
        course_sequence_number: t(&["coureSequenceNumber"]),
        exam_time: t(&["id", "examtime"]),
        input_status_code: t(&["inputStatusCode"]),
        course_property_code: t(&["coursePropertyCode"]),
        course_property_name: t(&["coursePropertyName"]),
        exam_type_code: String::new(),
        exam_type_name: t(&["examTypeName"]),
        input_method_code: t(&["inputMethodCode"]),
        course_score: n("courseScore"),
        level_code: t(&["levlePoint"]),
        level_name: t(&["levelName"]),
        unpassed_reason_code: t(&["unpassedReasonCode"]),
        unpassed_reason_explain: t(&["unpassedReasonExplain"]),
        course_name: t(&["courseName"]),
        english_course_name: t(&["englishCourseName"]),
        credit: n("credit"),
        study_hour: n("studyHour"),
        max_score: n("maxcj"),
        avg_score: n("avgcj"),
        min_score: n("mincj"),
        rank: integer_field(raw, &["rank"]),
        grade_point: Some(n("gradePoint")),
    }
}

/// `[{list: [...]}]`
pub fn this_term_scores_from_response(body: &Value) -> Result<Vec<CourseScoreInfo>, GatewayError> {
    let list = body
        .get(0)
        .and_then(|first| first.get("list"))
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::ParseError("本学期成绩响应中缺少 list".to_string()))?;

    Ok(list.iter().map(this_term_score_from_raw).collect())
}

/// 全部学期成绩的记录是按位置排列的数组
pub fn all_term_score_from_record(record: &Value) -> Result<CourseScoreInfo, GatewayError> {
    let fields = record
        .as_array()
        .ok_or_else(|| GatewayError::ParseError(format!("成绩记录不是数组: {record}")))?;
    let t = |i: usize| text_of(fields.get(i));
    let n = |i: usize| number_of(fields.get(i));

    // 0 学期号, 1 课程号, 2 课序号, 8 成绩, 11 课程名, 13 学分, 其余见下方
    let plan_number = t(0);
    let course_score = n(8);

    Ok(CourseScoreInfo {
        executive_education_plan_name: convert_semester_number_to_text(&plan_number),
        grade_point: get_point_by_score(Some(course_score), &plan_number),
        executive_education_plan_number: plan_number,
        course_number: t(1),
        course_sequence_number: t(2),
        exam_time: t(3),
        input_status_code: t(4),
        course_property_code: t(5),
        exam_type_code: t(6),
        input_method_code: t(7),
        course_score,
        level_code: t(9),
        unpassed_reason_code: t(10),
        course_name: t(11),
        english_course_name: t(12),
        credit: n(13),
        study_hour: n(14),
        course_property_name: t(15),
        exam_type_name: t(16),
        level_name: t(17),
        unpassed_reason_explain: t(18),
        ..Default::default()
    })
}

pub fn all_term_total_count(body: &Value) -> Result<i64, GatewayError> {
    lookup(body, &["list", "pageContext", "totalCount"])
        .map(|v| integer_of(Some(v)))
        .ok_or_else(|| GatewayError::ParseError("响应中缺少 totalCount".to_string()))
}

pub fn all_term_scores_from_response(body: &Value) -> Result<Vec<CourseScoreInfo>, GatewayError> {
    lookup(body, &["list", "records"])
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::ParseError("响应中缺少 records".to_string()))?
        .iter()
        .map(all_term_score_from_record)
        .collect()
}

/// `/main/academicInfo` 返回的是 JSON 文本, 取第一项
pub fn academic_info_from_response(body: &Value) -> Result<CurrentSemesterStudentAcademicInfo, GatewayError> {
    let first = body
        .get(0)
        .ok_or_else(|| GatewayError::ParseError("学业信息为空".to_string()))?;

    Ok(CurrentSemesterStudentAcademicInfo {
        course_number: integer_field(first, &["courseNum"]),
        current_semester: text_field(first, &["zxjxjhh"]),
        gpa: number_field(first, &["gpa"]),
        current_semester_course_number: integer_field(first, &["courseNum_bxqyxd"]),
        failed_course_number: integer_field(first, &["coursePas"]),
    })
}
