use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use gebom_config::{AppConfig, PipeSheet};
use gebom_core::drawing::{Entity, EntityRecord};
use gebom_core::geometry::{Bounds2D, Point3, point_near_polyline, polylines_intersect};
use gebom_core::material::{CatalogKey, Category, LineItem, Quantity, ShaftId, Unit};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregator::{Bom, UnresolvedItem, aggregate_by_shaft, total_by_article};
use crate::catalog::Catalog;
use crate::classifier::{ClassifiedEntity, LayerClassifier};
use crate::errors::EngineError;
use crate::estimator::{Estimate, FeatureEstimator, RuleEstimator};

/// 一次运行的统计信息。计数均按实体计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub total_records: usize,
    pub outside_convention: usize,
    pub unrecognized_kind: usize,
    pub malformed: usize,
    pub unrecognized_category: usize,
    pub unclassified_blocks: usize,
    pub catalog_misses: usize,
    pub diameter_mismatches: usize,
    pub unconnected_fittings: usize,
    pub crossing_runs: usize,
    pub angled_runs: usize,
    pub line_items: usize,
}

/// 流水线输出：物料清单及其诊断信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub bom: Bom,
    pub diagnostics: Diagnostics,
    /// 至少有一行清单落入的竖井编号，升序去重，与会话的竖井列表一致。
    pub shafts: Vec<ShaftId>,
    /// 没有任何实体通过分类时为空。
    pub extents: Option<Bounds2D>,
}

/// 图元记录 → 物料清单的完整流程。两次调用之间不保留状态。
pub struct Pipeline {
    classifier: LayerClassifier,
    estimator: Box<dyn FeatureEstimator>,
    catalog: Arc<Catalog>,
    pipe_sheet: PipeSheet,
    tolerance: f64,
    quantity_scale: f64,
}

impl Pipeline {
    /// 校验全部配置项，任一违规都会拒绝构建，并一次性列出所有问题。
    pub fn from_config(config: &AppConfig, catalog: Arc<Catalog>) -> Result<Self, EngineError> {
        let mut violations = config.extraction.violations();

        let classifier = LayerClassifier::from_patterns(&config.extraction.layer_patterns)
            .map_err(|found| absorb(&mut violations, found))
            .ok();
        let estimator = RuleEstimator::from_config(&config.estimation)
            .map_err(|found| absorb(&mut violations, found))
            .ok();
        let pipe_sheet = config
            .pipe_sheet
            .validate()
            .map_err(|found| absorb(&mut violations, found))
            .ok();

        match (classifier, estimator, pipe_sheet) {
            (Some(classifier), Some(estimator), Some(pipe_sheet)) if violations.is_empty() => {
                Ok(Self {
                    classifier,
                    estimator: Box::new(estimator),
                    catalog,
                    pipe_sheet,
                    tolerance: config.extraction.tolerance,
                    quantity_scale: config.extraction.quantity_scale,
                })
            }
            _ => Err(EngineError::InvalidConfiguration { violations }),
        }
    }

    /// 替换估算策略。
    pub fn with_estimator(mut self, estimator: Box<dyn FeatureEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    #[inline]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[inline]
    pub fn pipe_sheet(&self) -> PipeSheet {
        self.pipe_sheet
    }

    pub fn run(&self, records: &[EntityRecord]) -> Result<RunReport, EngineError> {
        let classification = self.classifier.classify_all(records);
        let counts = classification.counts;
        let mut diagnostics = Diagnostics {
            total_records: records.len(),
            outside_convention: counts.outside_convention,
            unrecognized_kind: counts.unrecognized_kind,
            malformed: counts.malformed,
            unrecognized_category: counts.unrecognized_category,
            ..Diagnostics::default()
        };
        debug!(
            records = records.len(),
            classified = classification.entities.len(),
            "分类完成"
        );

        let mut items = Vec::new();
        let mut unresolved: BTreeMap<CatalogKey, usize> = BTreeMap::new();
        let mut shafts = BTreeSet::new();
        let mut extents = Bounds2D::empty();

        for classified in &classification.entities {
            extents.include_bounds(&classified.entity.bounds());

            let estimate = match self.estimator.estimate(&classified.entity) {
                Ok(estimate) => estimate,
                Err(rejection) => {
                    debug!(index = classified.index, %rejection, "块参照无法归类");
                    diagnostics.unclassified_blocks += 1;
                    continue;
                }
            };
            if estimate.has_angled_corner {
                diagnostics.angled_runs += 1;
            }
            if self.conflicts_with_pipe_sheet(classified.category, &estimate) {
                debug!(
                    index = classified.index,
                    category = %classified.category,
                    diameter = %estimate.diameter,
                    "估算管径与管道参数表不一致"
                );
                diagnostics.diameter_mismatches += 1;
            }

            let key = CatalogKey::new(classified.category, estimate.diameter, estimate.subtype);
            match self.catalog.resolve(key) {
                Ok(entry) => {
                    if let Some(shaft) = &classified.shaft {
                        shafts.insert(shaft.clone());
                    }
                    items.push(LineItem {
                        article_no: entry.article_no.clone(),
                        description: entry.description.clone(),
                        unit: entry.unit,
                        quantity: self.quantity_for(entry.unit, &estimate),
                        shaft_id: classified.shaft.clone(),
                        category: classified.category,
                    });
                }
                Err(miss) => {
                    debug!(index = classified.index, key = %miss.key, "目录未收录");
                    diagnostics.catalog_misses += 1;
                    *unresolved.entry(miss.key).or_default() += 1;
                }
            }
        }

        self.inspect_connectivity(&classification.entities, &mut diagnostics);

        let aggregation = aggregate_by_shaft(&items)?;
        let bom = Bom {
            pipe_type: self.pipe_sheet.pipe_type,
            by_shaft: aggregation.by_shaft,
            totals_by_article: total_by_article(&items)?,
            unresolved: unresolved
                .into_iter()
                .map(|(key, occurrences)| UnresolvedItem {
                    category: key.category,
                    diameter: key.diameter,
                    subtype: key.subtype,
                    occurrences,
                })
                .collect(),
            unassigned: aggregation.unassigned,
        };
        bom.verify_totals()?;
        diagnostics.line_items = items.len();

        info!(
            pipe_type = %bom.pipe_type,
            shafts = bom.by_shaft.len(),
            articles = bom.totals_by_article.len(),
            unresolved = bom.unresolved.len(),
            skipped = diagnostics.malformed + diagnostics.unrecognized_kind,
            "物料清单生成完成"
        );

        Ok(RunReport {
            bom,
            diagnostics,
            shafts: shafts.into_iter().collect(),
            extents: (!extents.is_empty()).then_some(extents),
        })
    }

    fn quantity_for(&self, unit: Unit, estimate: &Estimate) -> Quantity {
        match unit {
            Unit::Piece => Quantity::Count(1),
            Unit::Metre => Quantity::Length(estimate.length.unwrap_or(0.0) * self.quantity_scale),
        }
    }

    fn conflicts_with_pipe_sheet(&self, category: Category, estimate: &Estimate) -> bool {
        let configured = match category {
            Category::WaterCloset => self.pipe_sheet.water_closet,
            Category::WashBasin => self.pipe_sheet.wash_basin,
            _ => return false,
        };
        estimate.diameter.millimetres() != configured
    }

    /// 管件是否落在某条管段上，以及管段之间是否交叉。
    fn inspect_connectivity(&self, entities: &[ClassifiedEntity], diagnostics: &mut Diagnostics) {
        let runs: Vec<&[Point3]> = entities
            .iter()
            .filter_map(|classified| match &classified.entity {
                Entity::LinearRun(run) => Some(run.vertices.as_slice()),
                _ => None,
            })
            .collect();

        for classified in entities {
            let Some(anchor) = classified.entity.anchor() else {
                continue;
            };
            let connected = runs
                .iter()
                .any(|vertices| point_near_polyline(anchor, vertices, self.tolerance));
            if !connected {
                warn!(
                    index = classified.index,
                    layer = classified.entity.layer_name(),
                    x = anchor.x(),
                    y = anchor.y(),
                    "管件未连接到任何管段"
                );
                diagnostics.unconnected_fittings += 1;
            }
        }

        for (i, first) in runs.iter().enumerate() {
            for second in &runs[i + 1..] {
                if polylines_intersect(first, second) {
                    diagnostics.crossing_runs += 1;
                }
            }
        }
    }
}

fn absorb(violations: &mut Vec<String>, found: Vec<String>) {
    violations.extend(found);
}

#[cfg(test)]
mod tests {
    use super::*;
    use gebom_config::PipeSheetConfig;
    use gebom_core::material::{NominalDiameter, Subtype};

    fn config() -> AppConfig {
        AppConfig {
            pipe_sheet: PipeSheetConfig {
                pipe_type: Some("Sunken".to_string()),
                water_closet: Some(110),
                wash_basin: Some(50),
                manhole: Some(110),
                collector: Some(110),
            },
            ..AppConfig::default()
        }
    }

    fn pipeline() -> Pipeline {
        let catalog = Arc::new(Catalog::builtin().expect("builtin catalog"));
        Pipeline::from_config(&config(), catalog).expect("valid config")
    }

    #[test]
    fn missing_pipe_sheet_rejects_configuration() {
        let catalog = Arc::new(Catalog::builtin().unwrap());
        let err = Pipeline::from_config(&AppConfig::default(), catalog)
            .err()
            .expect("pipe sheet is required");
        match err {
            EngineError::InvalidConfiguration { violations } => assert_eq!(violations.len(), 5),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn all_configuration_problems_are_reported_together() {
        let mut config = config();
        config.extraction.tolerance = 0.0;
        config.extraction.layer_patterns = vec!["GEB*".to_string(), String::new()];
        config.estimation.default_block_diameter = 63;
        config.pipe_sheet.pipe_type = Some("Buried".to_string());
        let catalog = Arc::new(Catalog::builtin().unwrap());
        match Pipeline::from_config(&config, catalog) {
            Err(EngineError::InvalidConfiguration { violations }) => {
                assert_eq!(violations.len(), 4, "{violations:?}")
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("configuration should be rejected"),
        }
    }

    #[test]
    fn empty_layer_patterns_are_reported_once() {
        let mut config = config();
        config.extraction.layer_patterns = vec![" ".to_string()];
        let catalog = Arc::new(Catalog::builtin().unwrap());
        match Pipeline::from_config(&config, catalog) {
            Err(EngineError::InvalidConfiguration { violations }) => assert_eq!(
                violations,
                vec!["extraction.layer_patterns must contain at least one pattern".to_string()]
            ),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("configuration should be rejected"),
        }
    }

    #[test]
    fn water_closet_run_resolves_with_shaft() {
        let records = vec![EntityRecord::linear_run(
            "GEB-SH-01-WC",
            [(0.0, 0.0), (60.0, 0.0)],
        )];
        let report = pipeline().run(&records).expect("run");
        let items = &report.bom.by_shaft[&ShaftId::new("SH-01")];
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].article_no, "367.000.16.0");
        assert_eq!(items[0].quantity, Quantity::Length(60.0));
        assert_eq!(report.shafts, vec![ShaftId::new("SH-01")]);
        assert_eq!(report.diagnostics.line_items, 1);
        assert_eq!(report.diagnostics.diameter_mismatches, 0);
    }

    #[test]
    fn quantity_scale_applies_to_runs_only() {
        let mut config = config();
        config.extraction.quantity_scale = 0.001;
        let catalog = Arc::new(Catalog::builtin().unwrap());
        let pipeline = Pipeline::from_config(&config, catalog).unwrap();
        let records = vec![
            EntityRecord::linear_run("GEB-WC", [(0.0, 0.0), (60.0, 0.0)]),
            EntityRecord::point_marker("GEB-WC", (0.0, 0.0), 60.0),
        ];
        let report = pipeline.run(&records).unwrap();
        let pipe = report.bom.totals_by_article["367.000.16.0"];
        assert!((pipe.as_f64() - 0.06).abs() < 1e-12);
        assert_eq!(report.bom.totals_by_article["367.045.16.1"], Quantity::Count(1));
    }

    #[test]
    fn diagnostics_cover_geometry_checks() {
        let records = vec![
            // 两条交叉管段，其中一条带 45° 转角
            EntityRecord::linear_run("GEB-SH-01-WC", [(0.0, 0.0), (100.0, 0.0), (0.0, 100.0)]),
            EntityRecord::linear_run("GEB-SH-01-WC", [(50.0, -10.0), (50.0, 10.0)]),
            // 在管段上的弯头与远离管段的弯头
            EntityRecord::point_marker("GEB-SH-01-WC", (20.0, 0.3), 60.0),
            EntityRecord::point_marker("GEB-SH-01-WC", (500.0, 500.0), 60.0),
            // 小半径标记与长度 20 的短管段都推断出 50，与 WC 配置的 110 不符
            EntityRecord::point_marker("GEB-SH-01-WC", (30.0, 0.0), 10.0),
            EntityRecord::block_insert("GEB-SH-01-WC", "VALVE-D50", (10.0, 0.0)),
        ];
        let report = pipeline().run(&records).unwrap();
        let diagnostics = report.diagnostics;
        assert_eq!(diagnostics.crossing_runs, 1);
        assert_eq!(diagnostics.angled_runs, 1);
        assert_eq!(diagnostics.unconnected_fittings, 1);
        assert_eq!(diagnostics.unclassified_blocks, 1);
        assert_eq!(diagnostics.diameter_mismatches, 2);
        let extents = report.extents.expect("entities have extents");
        assert!((extents.max().x - 560.0).abs() < 1e-9);
    }

    #[test]
    fn report_serializes_with_camel_case_keys() {
        let records = vec![EntityRecord::linear_run(
            "GEB-SH-01-WC",
            [(0.0, 0.0), (60.0, 0.0)],
        )];
        let report = pipeline().run(&records).unwrap();
        let value = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(value["bom"]["pipeType"], "Sunken");
        assert_eq!(value["bom"]["totalsByArticle"]["367.000.16.0"], 60.0);
        assert_eq!(value["diagnostics"]["totalRecords"], 1);
        assert_eq!(value["shafts"][0], "SH-01");

        let back: RunReport = serde_json::from_value(value).expect("deserialize report");
        assert_eq!(back, report);
    }

    #[test]
    fn shafts_without_line_items_are_not_listed() {
        let records = vec![
            EntityRecord::linear_run("GEB-SH-01-WC", [(0.0, 0.0), (60.0, 0.0)]),
            // 目录未收录的 WB/110 直管
            EntityRecord::linear_run("GEB-SH-07-WB", [(0.0, 10.0), (80.0, 10.0)]),
            // 无法归类的块
            EntityRecord::block_insert("GEB-SH-08-WC", "VALVE-D110", (10.0, 0.0)),
        ];
        let report = pipeline().run(&records).unwrap();
        assert_eq!(report.shafts, vec![ShaftId::new("SH-01")]);
        let listed: Vec<&ShaftId> = report.bom.by_shaft.keys().collect();
        assert_eq!(listed, vec![&ShaftId::new("SH-01")]);
    }

    #[test]
    fn unresolved_keys_are_counted() {
        let records = vec![
            EntityRecord::linear_run("GEB-WB", [(0.0, 0.0), (70.0, 0.0)]),
            EntityRecord::linear_run("GEB-WB", [(0.0, 5.0), (80.0, 5.0)]),
        ];
        let report = pipeline().run(&records).unwrap();
        assert!(report.bom.totals_by_article.is_empty());
        assert_eq!(report.diagnostics.catalog_misses, 2);
        assert_eq!(
            report.bom.unresolved,
            vec![UnresolvedItem {
                category: Category::WashBasin,
                diameter: NominalDiameter::Dn110,
                subtype: Subtype::StraightRun,
                occurrences: 2,
            }]
        );
    }
}
