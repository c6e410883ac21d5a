use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use gebom_core::material::{Category, CatalogKey, NominalDiameter, Subtype, Unit};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// 目录条目：货号、单位与描述。描述只能来自目录，估算逻辑不得自行拼写。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub article_no: String,
    pub unit: Unit,
    pub description: String,
}

/// 目录文件中的一行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub category: Category,
    pub diameter: NominalDiameter,
    pub subtype: Subtype,
    pub article_no: String,
    pub unit: Unit,
    pub description: String,
}

impl CatalogRow {
    #[inline]
    pub fn key(&self) -> CatalogKey {
        CatalogKey::new(self.category, self.diameter, self.subtype)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "entry")]
    entries: Vec<CatalogRow>,
}

/// 精确匹配失败时携带尝试过的查找键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no catalog entry for {key}")]
pub struct Unresolved {
    pub key: CatalogKey,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "failed to parse catalog{}: {source}",
        path.as_ref().map(|p| format!(" {p:?}")).unwrap_or_default()
    )]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml::de::Error,
    },
    #[error("catalog key {key} is listed more than once")]
    DuplicateKey { key: CatalogKey },
    #[error("catalog row {key} has an empty article number")]
    EmptyArticle { key: CatalogKey },
    #[error("catalog row {key} uses unit {unit}, straight runs must be M and fittings PC")]
    UnitMismatch { key: CatalogKey, unit: Unit },
    #[error("article {article_no} is listed with conflicting unit or description")]
    InconsistentArticle { article_no: String },
}

/// 只读零件目录，按 `(类别, 公称管径, 子类型)` 精确查找。
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<CatalogKey, CatalogEntry>,
    articles: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// 由行数据构建目录，并在加载时完成一致性校验。
    pub fn from_rows<I>(rows: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = CatalogRow>,
    {
        let mut catalog = Catalog::default();
        for row in rows {
            let key = row.key();
            let article_no = row.article_no.trim().to_string();
            if article_no.is_empty() {
                return Err(CatalogError::EmptyArticle { key });
            }
            let expected_unit = if row.subtype == Subtype::StraightRun {
                Unit::Metre
            } else {
                Unit::Piece
            };
            if row.unit != expected_unit {
                return Err(CatalogError::UnitMismatch {
                    key,
                    unit: row.unit,
                });
            }
            let entry = CatalogEntry {
                article_no: article_no.clone(),
                unit: row.unit,
                description: row.description.trim().to_string(),
            };
            if let Some(known) = catalog.articles.get(&article_no) {
                if known != &entry {
                    return Err(CatalogError::InconsistentArticle { article_no });
                }
            }
            if catalog.entries.contains_key(&key) {
                return Err(CatalogError::DuplicateKey { key });
            }
            catalog.articles.insert(article_no, entry.clone());
            catalog.entries.insert(key, entry);
        }
        debug!(
            keys = catalog.entries.len(),
            articles = catalog.articles.len(),
            "目录加载完成"
        );
        Ok(catalog)
    }

    /// 内建目录，来源于各洁具类别的 PE-HD 排水管材清单。
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_rows(BUILTIN_ROWS.iter().map(
            |&(category, diameter, subtype, article_no, unit, description)| CatalogRow {
                category,
                diameter,
                subtype,
                article_no: article_no.to_string(),
                unit,
                description: description.to_string(),
            },
        ))
    }

    /// 解析 `[[entry]]` 形式的 TOML 目录。
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(source).map_err(|source| CatalogError::Parse { path: None, source })?;
        Self::from_rows(file.entries)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CatalogFile = toml::from_str(&content).map_err(|source| CatalogError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        Self::from_rows(file.entries)
    }

    pub fn resolve(&self, key: CatalogKey) -> Result<&CatalogEntry, Unresolved> {
        self.entries.get(&key).ok_or(Unresolved { key })
    }

    pub fn entry_by_article(&self, article_no: &str) -> Option<&CatalogEntry> {
        self.articles.get(article_no)
    }

    pub fn describe(&self, article_no: &str) -> Option<&str> {
        self.entry_by_article(article_no)
            .map(|entry| entry.description.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按键排序返回全部条目。
    pub fn entries(&self) -> Vec<(CatalogKey, &CatalogEntry)> {
        let mut all: Vec<_> = self.entries.iter().map(|(k, v)| (*k, v)).collect();
        all.sort_by_key(|(key, _)| *key);
        all
    }
}

use Category::{BathTub, ShowerFloorDrain, Urinal, Vent, VerticalShaft, WashBasin, WaterCloset};
use NominalDiameter::{Dn50, Dn75, Dn110};
use Subtype::{Bend, Branch, Coupling, Reducer, StraightRun};
use Unit::{Metre, Piece};

type BuiltinRow = (
    Category,
    NominalDiameter,
    Subtype,
    &'static str,
    Unit,
    &'static str,
);

// 小便器 d56 归入 50，浴缸 d63 归入 75（与公称管径吸附规则一致）。
#[rustfmt::skip]
const BUILTIN_ROWS: &[BuiltinRow] = &[
    (WashBasin, Dn50, StraightRun, "361.000.16.0", Metre, "pipe PE-HD d50x3 L5000"),
    (WashBasin, Dn50, Bend, "361.045.16.1", Piece, "bend PE-HD 45G d50 L4.5"),
    (WashBasin, Dn50, Branch, "361.112.16.1", Piece,
        "Geberit HDPE Y-branch fitting 45°, dia.50/50"),
    (WashBasin, Dn50, Coupling, "361.771.16.1", Piece, "electrofusion sleeve coupling PE-HD d50"),
    (WashBasin, Dn50, Reducer, "367.560.16.1", Piece, "reducer PE-HD d110/50 concentric"),
    (Urinal, Dn50, StraightRun, "363.000.16.0", Metre, "pipe PE-HD d56x3 L500"),
    (Urinal, Dn50, Bend, "363.045.16.1", Piece, "bend PE-HD 45G d56 L4.5"),
    (Urinal, Dn50, Branch, "363.115.16.1", Piece, "branch fitting PE-HD 45G d56/56"),
    (Urinal, Dn50, Coupling, "363.771.16.1", Piece, "electrofusion sleeve coupling PE-HD d56"),
    (ShowerFloorDrain, Dn75, StraightRun, "365.000.16.0", Metre, "pipe PE-HD d75x3 L500"),
    (ShowerFloorDrain, Dn75, Bend, "365.045.16.1", Piece, "bend PE-HD 45G d75 L5"),
    (ShowerFloorDrain, Dn75, Branch, "365.125.16.1", Piece, "branch fitting PE-HD 45G d75/75"),
    (ShowerFloorDrain, Dn75, Coupling, "365.771.16.1", Piece,
        "electrofusion sleeve coupling PE-HD d75"),
    (ShowerFloorDrain, Dn110, StraightRun, "367.000.16.0", Metre, "pipe PE-HD d110x4.3 L500"),
    (BathTub, Dn75, StraightRun, "364.000.16.0", Metre, "pipe PE-HD d63x3 L500"),
    (BathTub, Dn75, Bend, "364.045.16.1", Piece, "bend PE-HD 45G d63 L5"),
    (BathTub, Dn75, Branch, "365.120.16.1", Piece, "branch fitting PE-HD 45G d75/63"),
    (BathTub, Dn75, Reducer, "365.571.16.1", Piece, "reducer PE-HD d75/63 L8 eccentric"),
    (BathTub, Dn75, Coupling, "364.771.16.1", Piece, "electrofusion sleeve coupling PE-HD d63"),
    (WaterCloset, Dn110, StraightRun, "367.000.16.0", Metre, "pipe PE-HD d110x4.3 L500"),
    (WaterCloset, Dn110, Bend, "367.045.16.1", Piece, "bend PE-HD 45G d110 L6"),
    (WaterCloset, Dn110, Branch, "367.115.16.1", Piece, "branch fitting PE-HD 45G d110/110"),
    (WaterCloset, Dn110, Reducer, "367.576.16.1", Piece, "reducer PE-HD d110/75 L8 eccentric"),
    (WaterCloset, Dn110, Coupling, "367.771.16.1", Piece,
        "electrofusion sleeve coupling PE-HD d110"),
    (VerticalShaft, Dn110, StraightRun, "367.000.16.0", Metre, "pipe PE-HD d110x4.3 L500"),
    (VerticalShaft, Dn110, Bend, "367.045.16.1", Piece, "bend PE-HD 45G d110 L6"),
    (VerticalShaft, Dn110, Coupling, "367.771.16.1", Piece,
        "electrofusion sleeve coupling PE-HD d110"),
    (Vent, Dn110, StraightRun, "367.000.16.0", Metre, "pipe PE-HD d110x4.3 L500"),
    (Vent, Dn110, Bend, "367.045.16.1", Piece, "bend PE-HD 45G d110 L6"),
    (Vent, Dn110, Coupling, "367.771.16.1", Piece, "electrofusion sleeve coupling PE-HD d110"),
];
