use std::collections::BTreeMap;

use gebom_config::PipeType;
use gebom_core::material::{
    CatalogKey, Category, LineItem, NominalDiameter, Quantity, ShaftId, Subtype, Unit,
};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// 总量校验的相对容差。
pub const TOTALS_TOLERANCE: f64 = 1e-9;

/// 按竖井合并后的清单。没有竖井编号的行单独存放。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaftAggregation {
    pub by_shaft: BTreeMap<ShaftId, Vec<LineItem>>,
    pub unassigned: Vec<LineItem>,
}

/// 目录中找不到的查找键及其出现次数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedItem {
    pub category: Category,
    pub diameter: NominalDiameter,
    pub subtype: Subtype,
    pub occurrences: usize,
}

impl UnresolvedItem {
    #[inline]
    pub fn key(&self) -> CatalogKey {
        CatalogKey::new(self.category, self.diameter, self.subtype)
    }
}

/// 最终物料清单。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bom {
    pub pipe_type: PipeType,
    pub by_shaft: BTreeMap<ShaftId, Vec<LineItem>>,
    pub totals_by_article: BTreeMap<String, Quantity>,
    pub unresolved: Vec<UnresolvedItem>,
    pub unassigned: Vec<LineItem>,
}

impl Bom {
    /// 每个货号的总量必须等于各竖井（含未分配）数量之和。
    pub fn verify_totals(&self) -> Result<(), EngineError> {
        let mut expected: BTreeMap<&str, f64> = BTreeMap::new();
        for item in self.by_shaft.values().flatten().chain(&self.unassigned) {
            *expected.entry(item.article_no.as_str()).or_default() += item.quantity.as_f64();
        }

        for (article_no, sum) in &expected {
            let total = self
                .totals_by_article
                .get(*article_no)
                .map(|quantity| quantity.as_f64())
                .unwrap_or(0.0);
            check_total(article_no, total, *sum)?;
        }
        for (article_no, total) in &self.totals_by_article {
            if !expected.contains_key(article_no.as_str()) {
                check_total(article_no, total.as_f64(), 0.0)?;
            }
        }
        Ok(())
    }

    pub fn line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.by_shaft.values().flatten().chain(&self.unassigned)
    }
}

fn check_total(article_no: &str, total: f64, expected: f64) -> Result<(), EngineError> {
    let allowed = TOTALS_TOLERANCE * expected.abs().max(1.0);
    if (total - expected).abs() > allowed {
        return Err(EngineError::TotalsMismatch {
            article_no: article_no.to_string(),
            total,
            expected,
        });
    }
    Ok(())
}

/// 按 `(竖井, 货号)` 合并数量。输出与输入顺序无关。
pub fn aggregate_by_shaft(items: &[LineItem]) -> Result<ShaftAggregation, EngineError> {
    let mut groups: BTreeMap<(Option<&ShaftId>, &str), Vec<&LineItem>> = BTreeMap::new();
    for item in items {
        groups
            .entry((item.shaft_id.as_ref(), item.article_no.as_str()))
            .or_default()
            .push(item);
    }

    let mut aggregation = ShaftAggregation::default();
    for ((shaft, _), group) in groups {
        // 每个分组至少有一行
        let merged = merge_group(group[0], &group)?;
        match shaft {
            Some(shaft) => aggregation
                .by_shaft
                .entry(shaft.clone())
                .or_default()
                .push(merged),
            None => aggregation.unassigned.push(merged),
        }
    }
    Ok(aggregation)
}

/// 跨竖井按货号求总量。
pub fn total_by_article(items: &[LineItem]) -> Result<BTreeMap<String, Quantity>, EngineError> {
    let mut groups: BTreeMap<&str, Vec<&LineItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.article_no.as_str()).or_default().push(item);
    }
    groups
        .into_iter()
        .map(|(article_no, group)| {
            let quantity = sum_quantities(article_no, group[0].unit, &group)?;
            Ok((article_no.to_string(), quantity))
        })
        .collect()
}

fn merge_group(first: &LineItem, group: &[&LineItem]) -> Result<LineItem, EngineError> {
    let representative = group.iter().copied().fold(first, |best, item| {
        if (item.category, &item.description) < (best.category, &best.description) {
            item
        } else {
            best
        }
    });
    let quantity = sum_quantities(&first.article_no, first.unit, group)?;
    Ok(LineItem {
        article_no: representative.article_no.clone(),
        description: representative.description.clone(),
        unit: representative.unit,
        quantity,
        shaft_id: representative.shaft_id.clone(),
        category: representative.category,
    })
}

/// 计数直接相加；长度先排序再求和，保证结果不受输入顺序影响。
fn sum_quantities(
    article_no: &str,
    unit: Unit,
    group: &[&LineItem],
) -> Result<Quantity, EngineError> {
    for item in group {
        for found in [item.unit, item.quantity.unit()] {
            if found != unit {
                return Err(EngineError::UnitConflict {
                    article_no: article_no.to_string(),
                    first: unit,
                    second: found,
                });
            }
        }
    }

    Ok(match unit {
        Unit::Piece => Quantity::Count(
            group
                .iter()
                .map(|item| match item.quantity {
                    Quantity::Count(count) => count,
                    Quantity::Length(_) => 0,
                })
                .sum(),
        ),
        Unit::Metre => {
            let mut lengths: Vec<f64> = group.iter().map(|item| item.quantity.as_f64()).collect();
            lengths.sort_by(f64::total_cmp);
            Quantity::Length(lengths.into_iter().sum())
        }
    })
}
