// 培养方案: 学年树折叠、课程属性树重建与排序
use crate::models::{
    GatewayError, RawTreeNode, TrainingSchemeBaseInfo, TrainingSchemeCourseInfo, TrainingSchemeDetail,
    TrainingSchemeSemesterInfo, TrainingSchemeYearInfo,
};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::{cmp::Reverse, collections::HashMap};
use tracing::debug;

// 这两个课程性质名称不计入课程属性
pub const COURSE_PROPERTY_NAMES: [&str; 2] = ["必修", "选修"];

lazy_static! {
    static ref YEAR_NAME: Regex = Regex::new(r"^(\d{4})-(\d{4})学年$").unwrap();
    static ref PLAN_COURSE_NUMBER: Regex = Regex::new(r"project/.+/(\d+)$").unwrap();
    static ref NODE_COURSE_NAME: Regex = Regex::new(r"</i>(.+)$").unwrap();
    static ref NODE_COURSE_NUMBER: Regex = Regex::new(r"@(.+)$").unwrap();
}

// /project/{num}/2/detail 的返回
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstructionalTeachingPlanDto {
    #[serde(rename = "jhFajhb", default)]
    pub info: TrainingSchemeBaseInfo,
    #[serde(rename = "treeList", default)]
    pub tree_list: Vec<RawTreeNode>,
}

// /project/{num}/1/detail 的返回
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainingSchemeDto {
    #[serde(rename = "treeList", default)]
    pub tree_list: Vec<RawTreeNode>,
}

fn property_weight(name: &str) -> u32 {
    match name {
        "必修" => 100,
        "中华文化（春）" | "中华文化（秋）" => 75,
        "选修" => 50,
        _ => 0,
    }
}

fn attribute_weight(name: &str) -> u32 {
    match name {
        "公共基础课" | "公共课" => 10,
        "中华文化（春）_kz" | "中华文化（秋）_kz" => 9,
        "学科基础课" | "专业基础课" => 8,
        "专业课" => 6,
        "实践环节" => 4,
        _ => 0,
    }
}

pub fn course_weight(course: &TrainingSchemeCourseInfo) -> u32 {
    property_weight(&course.course_property_name)
        + course.course_attributes.iter().map(|a| attribute_weight(a)).sum::<u32>()
}

fn year_order(name: &str) -> u32 {
    YEAR_NAME
        .captures(name)
        .map(|caps| caps[1].parse::<u32>().unwrap_or(0) + caps[2].parse::<u32>().unwrap_or(0))
        .unwrap_or(0)
}

/// 将有序的扁平节点折叠为 学年 -> 学期 -> 课程 三层结构
///
/// 学期节点必须出现在学年节点之后, 课程节点属于最近出现的学期.
pub fn build_year_tree(nodes: &[RawTreeNode]) -> Result<Vec<TrainingSchemeYearInfo>, GatewayError> {
    let mut years: Vec<TrainingSchemeYearInfo> = Vec::new();

    for node in nodes {
        if YEAR_NAME.is_match(&node.name) {
            years.push(TrainingSchemeYearInfo {
                name: node.name.clone(),
                children: Vec::new(),
            });
        } else if node.name == "春" || node.name == "秋" {
            let year = years
                .last_mut()
                .ok_or_else(|| GatewayError::ParseError(format!("学期节点 {} 之前没有学年节点", node.name)))?;
            year.children.push(TrainingSchemeSemesterInfo {
                name: node.name.clone(),
                children: Vec::new(),
            });
        } else {
            let semester = years
                .last_mut()
                .and_then(|y| y.children.last_mut())
                .ok_or_else(|| GatewayError::ParseError(format!("课程节点 {} 之前没有学期节点", node.name)))?;
            let course_number = PLAN_COURSE_NUMBER
                .captures(&node.url_path)
                .map(|caps| caps[1].to_string())
                .unwrap_or_default();
            semester.children.push(TrainingSchemeCourseInfo {
                course_name: node.name.clone(),
                course_number,
                ..Default::default()
            });
        }
    }

    years.sort_by_key(|y| year_order(&y.name));
    Ok(years)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemeNode {
    pub id: String,
    pub name: String,
    pub url_path: String,
    pub parent: Option<usize>,
    pub is_dir: bool,
    pub course_property_name: String,
    pub course_name: String,
    pub placeholder: bool,
}

impl SchemeNode {
    fn from_raw(raw: &RawTreeNode) -> Self {
        let course_property_name = if raw.name.contains("必修") {
            "必修"
        } else if raw.name.contains("选修") {
            "选修"
        } else {
            ""
        };
        let course_name = NODE_COURSE_NAME
            .captures(&raw.name)
            .map(|caps| caps[1].replacen(" 必修", "", 1).replacen(" 选修", "", 1))
            .unwrap_or_default();

        Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            url_path: raw.url_path.clone(),
            parent: None,
            is_dir: raw.name.contains("fa-kz"),
            course_property_name: course_property_name.to_string(),
            course_name,
            placeholder: false,
        }
    }

    fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            placeholder: true,
            ..Default::default()
        }
    }
}

/// 由 {id, pId} 对重建的节点表, 父节点以下标引用
#[derive(Debug, Clone, Default)]
pub struct SchemeNodeArena {
    nodes: Vec<SchemeNode>,
    index: HashMap<String, usize>,
}

impl SchemeNodeArena {
    pub fn from_raw(raw_nodes: &[RawTreeNode]) -> Self {
        let mut arena = SchemeNodeArena::default();

        // 同一 id 重复出现时以后者为准
        for raw in raw_nodes {
            let node = SchemeNode::from_raw(raw);
            match arena.index.get(&raw.id) {
                Some(&i) => arena.nodes[i] = node,
                None => {
                    arena.index.insert(raw.id.clone(), arena.nodes.len());
                    arena.nodes.push(node);
                }
            }
        }

        // 引用了但没有声明的父节点补一个占位节点
        for raw in raw_nodes {
            let parent = match arena.index.get(&raw.p_id) {
                Some(&p) => p,
                None => {
                    let p = arena.nodes.len();
                    arena.index.insert(raw.p_id.clone(), p);
                    arena.nodes.push(SchemeNode::placeholder(&raw.p_id));
                    p
                }
            };
            let child = arena.index[&raw.id];
            arena.nodes[child].parent = Some(parent);
        }

        arena
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SchemeNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// 按节点 id 收集课程属性, 未知 id 返回 None
    pub fn course_attributes(&self, id: &str) -> Option<Vec<String>> {
        self.index.get(id).map(|&i| self.attributes_at(i))
    }

    // 沿父链向上收集祖先名称, 遇到无名节点即停止, 结果从根到叶排列
    fn attributes_at(&self, index: usize) -> Vec<String> {
        let mut attributes = Vec::new();
        let mut cursor = self.nodes[index].parent;
        let mut steps = 0;

        while let Some(p) = cursor {
            let parent = &self.nodes[p];
            // 数据成环时最多走完整张表
            if parent.course_name.is_empty() || steps > self.nodes.len() {
                break;
            }
            if !COURSE_PROPERTY_NAMES.contains(&parent.course_name.as_str()) {
                attributes.insert(0, parent.course_name.clone());
            }
            cursor = parent.parent;
            steps += 1;
        }

        attributes
    }

    /// 课程号 -> 课程信息, 只收录带链接的非目录节点
    pub fn course_table(&self) -> HashMap<String, TrainingSchemeCourseInfo> {
        let mut table = HashMap::new();

        for (i, node) in self.nodes.iter().enumerate() {
            if node.url_path.is_empty() || node.is_dir {
                continue;
            }
            let course_number = NODE_COURSE_NUMBER
                .captures(&node.url_path)
                .map(|caps| caps[1].to_string())
                .unwrap_or_default();

            table.insert(
                course_number.clone(),
                TrainingSchemeCourseInfo {
                    course_name: node.course_name.clone(),
                    course_number,
                    course_property_name: node.course_property_name.clone(),
                    course_attributes: self.attributes_at(i),
                    course_major: String::new(),
                },
            );
        }

        table
    }
}

/// 按课程号合并两棵树, 每个学期内按权重降序排列, 权重相同保持原顺序
pub fn join_course_attributes(
    info: &TrainingSchemeBaseInfo,
    years: Vec<TrainingSchemeYearInfo>,
    table: &HashMap<String, TrainingSchemeCourseInfo>,
) -> Vec<TrainingSchemeYearInfo> {
    let course_major = format!("{}（{}）", info.zym, info.njmc);

    years
        .into_iter()
        .map(|year| TrainingSchemeYearInfo {
            name: year.name,
            children: year
                .children
                .into_iter()
                .map(|semester| {
                    let mut courses: Vec<_> = semester
                        .children
                        .into_iter()
                        .map(|course| {
                            let mut course = table.get(&course.course_number).cloned().unwrap_or(course);
                            course.course_major = course_major.clone();
                            course
                        })
                        .collect();
                    courses.sort_by_key(|c| Reverse(course_weight(c)));
                    TrainingSchemeSemesterInfo {
                        name: semester.name,
                        children: courses,
                    }
                })
                .collect(),
        })
        .collect()
}

pub fn build_training_scheme(
    plan: InstructionalTeachingPlanDto,
    scheme: TrainingSchemeDto,
) -> Result<TrainingSchemeDetail, GatewayError> {
    let years = build_year_tree(&plan.tree_list)?;
    let arena = SchemeNodeArena::from_raw(&scheme.tree_list);
    let table = arena.course_table();

    debug!("培养方案共 {} 个学年, 属性树 {} 个节点, {} 门课程", years.len(), arena.len(), table.len());

    let list = join_course_attributes(&plan.info, years, &table);
    Ok(TrainingSchemeDetail { info: plan.info, list })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, url_path: &str) -> RawTreeNode {
        RawTreeNode {
            name: name.to_string(),
            url_path: url_path.to_string(),
            ..Default::default()
        }
    }

    fn tree_node(id: &str, p_id: &str, name: &str, url_path: &str) -> RawTreeNode {
        RawTreeNode {
            id: id.to_string(),
            p_id: p_id.to_string(),
            name: name.to_string(),
            url_path: url_path.to_string(),
        }
    }

    #[test]
    fn folds_year_season_course() {
        let nodes = vec![
            node("2020-2021学年", ""),
            node("春", ""),
            node("高等数学", "/student/rollManagement/project/123/201138050"),
            node("大学英语", "/student/rollManagement/project/123/105366020"),
            node("秋", ""),
            node("线性代数", "/student/rollManagement/project/123/201018030"),
        ];
        let years = build_year_tree(&nodes).unwrap();

        assert_eq!(years.len(), 1);
        assert_eq!(years[0].children.len(), 2);
        assert_eq!(years[0].children[0].name, "春");
        assert_eq!(years[0].children[0].children.len(), 2);
        assert_eq!(years[0].children[1].name, "秋");
        assert_eq!(years[0].children[1].children.len(), 1);
        assert_eq!(years[0].children[0].children[0].course_number, "201138050");
    }

    #[test]
    fn years_sorted_by_span() {
        let nodes = vec![
            node("2021-2022学年", ""),
            node("2019-2020学年", ""),
            node("2020-2021学年", ""),
        ];
        let names: Vec<_> = build_year_tree(&nodes).unwrap().into_iter().map(|y| y.name).collect();
        assert_eq!(names, vec!["2019-2020学年", "2020-2021学年", "2021-2022学年"]);
    }

    #[test]
    fn season_without_year_is_rejected() {
        let err = build_year_tree(&[node("春", "")]).unwrap_err();
        assert!(matches!(err, GatewayError::ParseError(_)));

        let err = build_year_tree(&[node("2020-2021学年", ""), node("高等数学", "")]).unwrap_err();
        assert!(matches!(err, GatewayError::ParseError(_)));
    }

    #[test]
    fn derives_node_fields() {
        let raw = tree_node("5", "1", "<i class='fa fa-kz'></i>专业课 必修", "");
        let n = SchemeNode::from_raw(&raw);
        assert!(n.is_dir);
        assert_eq!(n.course_property_name, "必修");
        assert_eq!(n.course_name, "专业课");

        let n = SchemeNode::from_raw(&tree_node("6", "5", "无图标", ""));
        assert!(!n.is_dir);
        assert_eq!(n.course_name, "");
        assert_eq!(n.course_property_name, "");
    }

    #[test]
    fn attributes_follow_parent_chain() {
        let raw = vec![
            tree_node("1", "0", "<i class='fa fa-kz'></i>必修", ""),
            tree_node("2", "1", "<i class='fa fa-kz'></i>公共基础课", ""),
            tree_node("3", "2", "<i class='fa fa-kz'></i>数学类", ""),
            tree_node("4", "3", "<i class='fa fa-kc'></i>高等数学 必修", "/course@201138050"),
        ];
        let arena = SchemeNodeArena::from_raw(&raw);

        // 0 号父节点未声明, 以占位节点补齐
        assert_eq!(arena.len(), 5);
        assert!(arena.get("0").unwrap().placeholder);

        let table = arena.course_table();
        let course = &table["201138050"];
        assert_eq!(course.course_name, "高等数学");
        assert_eq!(course.course_property_name, "必修");
        assert_eq!(course.course_attributes, vec!["公共基础课", "数学类"]);

        assert_eq!(arena.course_attributes("3"), Some(vec!["公共基础课".to_string()]));
        assert_eq!(arena.course_attributes("404"), None);
    }

    #[test]
    fn child_declared_before_parent_still_links() {
        let raw = vec![
            tree_node("4", "2", "<i></i>大学物理 选修", "/course@202073040"),
            tree_node("2", "0", "<i class='fa fa-kz'></i>学科基础课", ""),
        ];
        let table = SchemeNodeArena::from_raw(&raw).course_table();
        assert_eq!(table["202073040"].course_attributes, vec!["学科基础课"]);
        assert_eq!(table["202073040"].course_property_name, "选修");
    }

    #[test]
    fn directory_nodes_are_not_courses() {
        let raw = vec![tree_node("1", "0", "<i class='fa fa-kz'></i>专业课", "/dir@1")];
        assert!(SchemeNodeArena::from_raw(&raw).course_table().is_empty());
    }

    #[test]
    fn cyclic_parents_terminate() {
        let raw = vec![
            tree_node("1", "2", "<i></i>甲", ""),
            tree_node("2", "1", "<i></i>乙", ""),
            tree_node("3", "1", "<i></i>课程", "/c@9"),
        ];
        let table = SchemeNodeArena::from_raw(&raw).course_table();
        assert!(!table["9"].course_attributes.is_empty());
    }

    #[test]
    fn null_url_paths_in_tree_list_still_build() {
        let plan: InstructionalTeachingPlanDto = serde_json::from_str(
            r#"{
                "jhFajhb": {"zym": "软件工程", "njmc": null},
                "treeList": [
                    {"id": "y1", "pId": null, "name": "2020-2021学年", "urlPath": null},
                    {"id": "s1", "pId": "y1", "name": "秋", "urlPath": null},
                    {"id": "c1", "pId": "s1", "name": "高等数学", "urlPath": "/student/rollManagement/project/1/201138050"}
                ]
            }"#,
        )
        .unwrap();
        let scheme: TrainingSchemeDto = serde_json::from_str(
            r#"{
                "treeList": [
                    {"id": 10, "pId": 0, "name": "<i class='fa fa-kz'></i>公共基础课", "urlPath": null},
                    {"id": 1, "pId": 10, "name": "<i></i>高等数学 必修", "urlPath": "/c@201138050"}
                ]
            }"#,
        )
        .unwrap();

        let detail = build_training_scheme(plan, scheme).unwrap();
        let course = &detail.list[0].children[0].children[0];
        assert_eq!(course.course_number, "201138050");
        assert_eq!(course.course_attributes, vec!["公共基础课"]);
        assert_eq!(course.course_major, "软件工程（）");
    }

    #[test]
    fn joins_and_sorts_by_weight() {
        let plan = InstructionalTeachingPlanDto {
            info: TrainingSchemeBaseInfo {
                zym: "软件工程".into(),
                njmc: "2020级".into(),
                ..Default::default()
            },
            tree_list: vec![
                node("2020-2021学年", ""),
                node("秋", ""),
                node("实践课", "/project/1/3"),
                node("选修课", "/project/1/2"),
                node("未收录", "/project/1/9"),
                node("必修课", "/project/1/1"),
                node("另一门未收录", "/project/1/8"),
            ],
        };
        let scheme = TrainingSchemeDto {
            tree_list: vec![
                tree_node("10", "0", "<i class='fa fa-kz'></i>公共基础课", ""),
                tree_node("11", "0", "<i class='fa fa-kz'></i>实践环节", ""),
                tree_node("1", "10", "<i></i>必修课 必修", "/c@1"),
                tree_node("2", "10", "<i></i>选修课 选修", "/c@2"),
                tree_node("3", "11", "<i></i>实践课", "/c@3"),
            ],
        };

        let detail = build_training_scheme(plan, scheme).unwrap();
        let courses = &detail.list[0].children[0].children;
        let names: Vec<_> = courses.iter().map(|c| c.course_name.as_str()).collect();

        // 110, 60, 4, 0, 0
        assert_eq!(names, vec!["必修课", "选修课", "实践课", "未收录", "另一门未收录"]);
        assert!(courses.iter().all(|c| c.course_major == "软件工程（2020级）"));
        assert_eq!(courses[3].course_number, "9");
    }
}
