//! 管径与子类型估算。
//!
//! 三类几何各有一套规则：管段按长度分档，圆形标记按半径分档，
//! 块参照按块名关键字。输出管径一律落在公称集合内。

use gebom_config::{DiameterBand, EstimationConfig, SubtypeBand};
use gebom_core::drawing::{BlockInsert, Entity, LinearRun, PointMarker};
use gebom_core::geometry::has_angle_near;
use gebom_core::material::{NominalDiameter, Subtype};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static DIAMETER_CUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^A-Z])D(\d+)").expect("diameter cue pattern is valid"));

const CORNER_ANGLE: f64 = 45.0;
const CORNER_TOLERANCE: f64 = 5.0;

/// 单个实体的估算结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub diameter: NominalDiameter,
    pub subtype: Subtype,
    /// 管段为图纸长度，其余为 `None`。
    pub length: Option<f64>,
    /// 管段中存在约 45° 的转角。
    pub has_angled_corner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstimateRejection {
    #[error("block `{name}` does not name a known fitting")]
    UnknownBlock { name: String },
}

/// 估算策略接口，便于替换为其他规则集。
pub trait FeatureEstimator: Send + Sync {
    fn estimate(&self, entity: &Entity) -> Result<Estimate, EstimateRejection>;
}

/// 解析子类型名称，另接受 `elbow`、`tee` 两个别名。
pub fn parse_subtype(raw: &str) -> Option<Subtype> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "bend" | "elbow" => Some(Subtype::Bend),
        "branch" | "tee" => Some(Subtype::Branch),
        "coupling" => Some(Subtype::Coupling),
        "reducer" => Some(Subtype::Reducer),
        "straight-run" | "straight_run" => Some(Subtype::StraightRun),
        _ => None,
    }
}

/// 按阈值降序排列的分档表，取第一个严格大于阈值的档位。
#[derive(Debug, Clone, PartialEq)]
pub struct Bands<T> {
    bands: Vec<(f64, T)>,
    fallback: T,
}

impl<T: Copy> Bands<T> {
    pub fn new(mut bands: Vec<(f64, T)>, fallback: T) -> Self {
        bands.sort_by(|a, b| b.0.total_cmp(&a.0));
        Self { bands, fallback }
    }

    pub fn lookup(&self, value: f64) -> T {
        self.bands
            .iter()
            .find(|(above, _)| value > *above)
            .map(|(_, result)| *result)
            .unwrap_or(self.fallback)
    }
}

/// 有序关键字表，按子串匹配，第一条命中的规则决定子类型。
/// 前六条为主关键字，其后是较弱的线索。
const BLOCK_KEYWORDS: &[(&str, Subtype)] = &[
    ("BEND", Subtype::Bend),
    ("BRANCH", Subtype::Branch),
    ("COUPLING", Subtype::Coupling),
    ("REDUCER", Subtype::Reducer),
    ("TEE", Subtype::Branch),
    ("ELBOW", Subtype::Bend),
    ("45", Subtype::Bend),
    ("ANGLE", Subtype::Bend),
    ("Y", Subtype::Branch),
    ("COUPLE", Subtype::Coupling),
    ("JOINT", Subtype::Coupling),
];

/// 块名中的管径线索：先找 `D<数字>`，再找 50/75/110 子串。
const DIAMETER_KEYWORDS: &[(&str, NominalDiameter)] = &[
    ("DN50", NominalDiameter::Dn50),
    ("50", NominalDiameter::Dn50),
    ("75", NominalDiameter::Dn75),
    ("110", NominalDiameter::Dn110),
];

pub fn block_subtype(name: &str) -> Option<Subtype> {
    let upper = name.to_ascii_uppercase();
    BLOCK_KEYWORDS
        .iter()
        .find(|(keyword, _)| upper.contains(keyword))
        .map(|(_, subtype)| *subtype)
}

pub fn block_diameter(name: &str, fallback: NominalDiameter) -> NominalDiameter {
    let upper = name.to_ascii_uppercase();
    if let Some(value) = DIAMETER_CUE
        .captures(&upper)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return NominalDiameter::nearest(value);
    }
    DIAMETER_KEYWORDS
        .iter()
        .find(|(keyword, _)| upper.contains(keyword))
        .map(|(_, diameter)| *diameter)
        .unwrap_or(fallback)
}

/// 默认规则估算器，所有阈值来自 `[estimation]` 配置。
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEstimator {
    run_bands: Bands<NominalDiameter>,
    marker_bands: Bands<Subtype>,
    block_fallback: NominalDiameter,
}

impl Default for RuleEstimator {
    fn default() -> Self {
        Self {
            run_bands: Bands::new(
                vec![
                    (50.0, NominalDiameter::Dn110),
                    (20.0, NominalDiameter::Dn75),
                ],
                NominalDiameter::Dn50,
            ),
            marker_bands: Bands::new(
                vec![(50.0, Subtype::Bend), (25.0, Subtype::Branch)],
                Subtype::Coupling,
            ),
            block_fallback: NominalDiameter::Dn50,
        }
    }
}

impl RuleEstimator {
    /// 由配置构建，收集全部违规项后一并返回。
    pub fn from_config(config: &EstimationConfig) -> Result<Self, Vec<String>> {
        let mut violations = Vec::new();

        let run_bands = diameter_bands(
            "estimation.run_length_bands",
            &config.run_length_bands,
            &mut violations,
        );
        let run_fallback = canonical(
            "estimation.run_fallback_diameter",
            config.run_fallback_diameter,
            &mut violations,
        );
        let marker_bands = subtype_bands(
            "estimation.marker_radius_bands",
            &config.marker_radius_bands,
            &mut violations,
        );
        let marker_fallback = fitting_subtype(
            "estimation.marker_fallback_subtype",
            &config.marker_fallback_subtype,
            &mut violations,
        );
        let block_fallback = canonical(
            "estimation.default_block_diameter",
            config.default_block_diameter,
            &mut violations,
        );

        if !violations.is_empty() {
            return Err(violations);
        }
        Ok(Self {
            run_bands: Bands::new(run_bands, run_fallback),
            marker_bands: Bands::new(marker_bands, marker_fallback),
            block_fallback,
        })
    }

    fn estimate_run(&self, run: &LinearRun) -> Estimate {
        let length = run.length();
        Estimate {
            diameter: self.run_bands.lookup(length),
            subtype: Subtype::StraightRun,
            length: Some(length),
            has_angled_corner: has_angle_near(&run.vertices, CORNER_ANGLE, CORNER_TOLERANCE),
        }
    }

    fn estimate_marker(&self, marker: &PointMarker) -> Estimate {
        Estimate {
            diameter: NominalDiameter::nearest(marker.radius * 2.0),
            subtype: self.marker_bands.lookup(marker.radius),
            length: None,
            has_angled_corner: false,
        }
    }

    fn estimate_block(&self, insert: &BlockInsert) -> Result<Estimate, EstimateRejection> {
        let subtype = block_subtype(&insert.name).ok_or_else(|| EstimateRejection::UnknownBlock {
            name: insert.name.clone(),
        })?;
        Ok(Estimate {
            diameter: block_diameter(&insert.name, self.block_fallback),
            subtype,
            length: None,
            has_angled_corner: false,
        })
    }
}

impl FeatureEstimator for RuleEstimator {
    fn estimate(&self, entity: &Entity) -> Result<Estimate, EstimateRejection> {
        match entity {
            Entity::LinearRun(run) => Ok(self.estimate_run(run)),
            Entity::PointMarker(marker) => Ok(self.estimate_marker(marker)),
            Entity::BlockInsert(insert) => self.estimate_block(insert),
        }
    }
}

fn canonical(field: &str, value: u32, violations: &mut Vec<String>) -> NominalDiameter {
    NominalDiameter::try_from(value).unwrap_or_else(|err| {
        violations.push(format!("{field}: {err}"));
        NominalDiameter::Dn50
    })
}

fn threshold(field: &str, value: f64, violations: &mut Vec<String>) {
    if !value.is_finite() || value < 0.0 {
        violations.push(format!("{field}.above must be a non-negative number, got {value}"));
    }
}

fn diameter_bands(
    field: &str,
    bands: &[DiameterBand],
    violations: &mut Vec<String>,
) -> Vec<(f64, NominalDiameter)> {
    bands
        .iter()
        .enumerate()
        .map(|(index, band)| {
            let at = format!("{field}[{index}]");
            threshold(&at, band.above, violations);
            let diameter = canonical(&format!("{at}.diameter"), band.diameter, violations);
            (band.above, diameter)
        })
        .collect()
}

fn subtype_bands(
    field: &str,
    bands: &[SubtypeBand],
    violations: &mut Vec<String>,
) -> Vec<(f64, Subtype)> {
    bands
        .iter()
        .enumerate()
        .map(|(index, band)| {
            let at = format!("{field}[{index}]");
            threshold(&at, band.above, violations);
            let subtype = fitting_subtype(&format!("{at}.subtype"), &band.subtype, violations);
            (band.above, subtype)
        })
        .collect()
}

fn fitting_subtype(field: &str, raw: &str, violations: &mut Vec<String>) -> Subtype {
    match parse_subtype(raw) {
        Some(Subtype::StraightRun) | None => {
            violations.push(format!("{field}: `{raw}` is not a fitting subtype"));
            Subtype::Coupling
        }
        Some(subtype) => subtype,
    }
}
