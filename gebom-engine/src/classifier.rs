use gebom_core::drawing::{Entity, EntityKind, EntityRecord};
use gebom_core::material::{Category, ShaftId};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace, warn};

static SHAFT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)SH-\d+").expect("shaft id pattern is valid"));

/// 图层名分词后按顺序匹配，首条命中的规则生效。
const CATEGORY_RULES: &[(&[&str], Category)] = &[
    (&["WB", "WASHBASIN", "BASIN", "SINK"], Category::WashBasin),
    (&["UR", "URINAL"], Category::Urinal),
    (
        &["SHOWER", "FD", "FLOORDRAIN", "DRAIN"],
        Category::ShowerFloorDrain,
    ),
    (&["BT", "BATH", "BATHTUB"], Category::BathTub),
    (&["WC"], Category::WaterCloset),
    (&["VS", "SHAFT", "STACK", "RISER"], Category::VerticalShaft),
    (&["VENT"], Category::Vent),
];

/// 从图层名中提取首个竖井编号（`SH-<数字>`，忽略大小写），统一为大写。
pub fn extract_shaft_id(layer: &str) -> Option<ShaftId> {
    SHAFT_ID
        .find(layer)
        .map(|m| ShaftId::new(m.as_str()))
}

/// 按图层名中的词元推断卫生洁具类别。
pub fn category_from_layer(layer: &str) -> Option<Category> {
    let tokens: Vec<String> = layer
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_uppercase)
        .collect();
    CATEGORY_RULES
        .iter()
        .find(|(keywords, _)| {
            tokens
                .iter()
                .any(|token| keywords.contains(&token.as_str()))
        })
        .map(|(_, category)| *category)
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("(?i)^");
    for c in pattern.trim().chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

/// 通过分类、可进入估算阶段的实体。
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEntity {
    /// 在输入序列中的位置。
    pub index: usize,
    pub entity: Entity,
    pub category: Category,
    pub shaft: Option<ShaftId>,
}

/// 分类阶段各类丢弃原因的计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationCounts {
    pub outside_convention: usize,
    pub unrecognized_kind: usize,
    pub malformed: usize,
    pub unrecognized_category: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub entities: Vec<ClassifiedEntity>,
    pub counts: ClassificationCounts,
}

/// 图层命名约定过滤与实体分类。
#[derive(Debug, Clone)]
pub struct LayerClassifier {
    patterns: Vec<Regex>,
}

impl LayerClassifier {
    /// 由通配模式构建（`*` 任意串，`?` 单字符，整名匹配，忽略大小写）。
    /// 空白条目跳过，是否为空由 `ExtractionConfig::violations` 检查；
    /// 无法编译的模式逐条列入违规项。
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, Vec<String>> {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut violations = Vec::new();
        for (index, pattern) in patterns.iter().enumerate() {
            let pattern = pattern.as_ref();
            if pattern.trim().is_empty() {
                continue;
            }
            match Regex::new(&glob_to_regex(pattern)) {
                Ok(regex) => compiled.push(regex),
                Err(err) => violations.push(format!(
                    "extraction.layer_patterns[{index}] `{pattern}` is invalid: {err}"
                )),
            }
        }
        if violations.is_empty() {
            Ok(Self { patterns: compiled })
        } else {
            Err(violations)
        }
    }

    pub fn matches_naming_convention(&self, layer: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(layer))
    }

    #[inline]
    pub fn classify(&self, record: &EntityRecord) -> EntityKind {
        record.kind()
    }

    /// 显式类别字段优先；字段存在但无法识别时不再回退到图层名。
    pub fn category_for(&self, record: &EntityRecord) -> Option<Category> {
        match record.category.as_deref() {
            Some(raw) => Category::parse(raw),
            None => category_from_layer(&record.layer),
        }
    }

    /// 按输入顺序处理全部记录，不符合条件的记录只计数不报错。
    pub fn classify_all(&self, records: &[EntityRecord]) -> Classification {
        let mut classification = Classification::default();
        for (index, record) in records.iter().enumerate() {
            if !self.matches_naming_convention(&record.layer) {
                trace!(index, layer = %record.layer, "图层不符合命名约定");
                classification.counts.outside_convention += 1;
                continue;
            }
            if self.classify(record) == EntityKind::Unrecognized {
                debug!(index, kind = %record.kind, "未识别的图元类型");
                classification.counts.unrecognized_kind += 1;
                continue;
            }
            let entity = match record.to_entity() {
                Ok(entity) => entity,
                Err(defect) => {
                    warn!(
                        index,
                        layer = %record.layer,
                        %defect,
                        "图元几何数据不完整，已跳过"
                    );
                    classification.counts.malformed += 1;
                    continue;
                }
            };
            let Some(category) = self.category_for(record) else {
                debug!(index, layer = %record.layer, "无法确定洁具类别");
                classification.counts.unrecognized_category += 1;
                continue;
            };
            classification.entities.push(ClassifiedEntity {
                index,
                entity,
                category,
                shaft: extract_shaft_id(&record.layer),
            });
        }
        classification
    }
}
