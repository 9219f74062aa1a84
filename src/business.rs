// 业务逻辑层 - 绩点、成绩过滤与学期文本
use crate::models::CourseScoreInfo;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// 教师「已提交」的成绩状态码, 「暂存」的成绩学生不应看到
pub const SUBMITTED_INPUT_STATUS: &str = "05";

// 2017-2018 秋季学期起使用新的绩点标准
pub const NEW_POLICY_START_YEAR: u32 = 2017;

lazy_static! {
    static ref LEADING_YEAR: Regex = Regex::new(r"^\d+").unwrap();
    static ref SEMESTER_NUMBER: Regex = Regex::new(r"(\d+)-(\d+)-(.+)").unwrap();
}

/// 根据分数与学期返回对应的绩点
///
/// 分数缺失或为 0 时返回 `None`, 学期号不以年份开头时返回 0.
pub fn get_point_by_score(score: Option<Decimal>, semester: &str) -> Option<Decimal> {
    let score = match score {
        Some(s) if !s.is_zero() => s,
        _ => return None,
    };

    let enrollment_year = match LEADING_YEAR
        .find(semester)
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        Some(year) => year,
        None => return Some(Decimal::ZERO),
    };

    let point = if enrollment_year >= NEW_POLICY_START_YEAR {
        match score {
            s if s >= dec!(90) => dec!(4),
            s if s >= dec!(85) => dec!(3.7),
            s if s >= dec!(80) => dec!(3.3),
            s if s >= dec!(76) => dec!(3),
            s if s >= dec!(73) => dec!(2.7),
            s if s >= dec!(70) => dec!(2.3),
            s if s >= dec!(66) => dec!(2),
            s if s >= dec!(63) => dec!(1.7),
            s if s >= dec!(61) => dec!(1.3),
            s if s >= dec!(60) => dec!(1),
            _ => Decimal::ZERO,
        }
    } else {
        match score {
            s if s >= dec!(95) => dec!(4),
            s if s >= dec!(90) => dec!(3.8),
            s if s >= dec!(85) => dec!(3.6),
            s if s >= dec!(80) => dec!(3.2),
            s if s >= dec!(75) => dec!(2.7),
            s if s >= dec!(70) => dec!(2.2),
            s if s >= dec!(65) => dec!(1.7),
            s if s >= dec!(60) => dec!(1),
            _ => Decimal::ZERO,
        }
    };

    Some(point)
}

/// 只保留已提交且有分数的成绩, 与教务处的显示保持一致
pub fn filter_course_score_info_list(list: Vec<CourseScoreInfo>) -> Vec<CourseScoreInfo> {
    list.into_iter()
        .filter(|c| c.input_status_code == SUBMITTED_INPUT_STATUS)
        .filter(|c| !c.course_score.is_zero())
        .collect()
}

/// "2018-2019-1-1" -> "2018-2019学年 秋季学期", 无法识别时原样返回
pub fn convert_semester_number_to_text(number: &str) -> String {
    match SEMESTER_NUMBER.captures(number) {
        Some(caps) => {
            let season = if &caps[3] == "1-1" { "秋" } else { "春" };
            format!("{}-{}学年 {}季学期", &caps[1], &caps[2], season)
        }
        None => number.to_string(),
    }
}

/// 星期几的中文写法, 7 为"日"
pub fn get_chinese_number(day: &str) -> String {
    match day.trim() {
        "1" => "一",
        "2" => "二",
        "3" => "三",
        "4" => "四",
        "5" => "五",
        "6" => "六",
        "7" | "0" => "日",
        other => other,
    }
    .to_string()
}
