use std::fs;
use std::path::{Path, PathBuf};

use gebom_core::drawing::EntityRecord;
use gebom_engine::aggregator::Bom;
use gebom_engine::pipeline::{Diagnostics, RunReport};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid entity records in {origin}: {source}")]
    ParseError {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize report: {0}")]
    SerializeError(#[source] serde_json::Error),
}

/// 读取外部 CAD 读取器导出的图元记录。
pub trait RecordLoader {
    fn load(&self, path: &Path) -> Result<Vec<EntityRecord>, IoError>;
}

/// 输出物料清单。
pub trait ReportSaver {
    fn save(&self, report: &RunReport, path: &Path) -> Result<(), IoError>;
}

/// 记录文件可以是裸数组，也可以是 `{ "entities": [...] }`。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordFile {
    List(Vec<EntityRecord>),
    Wrapped { entities: Vec<EntityRecord> },
}

impl RecordFile {
    fn into_records(self) -> Vec<EntityRecord> {
        match self {
            RecordFile::List(records) => records,
            RecordFile::Wrapped { entities } => entities,
        }
    }
}

/// 输出文档：清单字段平铺，诊断信息附在 `diagnostics` 下。
#[derive(Debug, Serialize)]
struct BomDocument<'a> {
    #[serde(flatten)]
    bom: &'a Bom,
    diagnostics: &'a Diagnostics,
}

/// JSON 读写入口。
#[derive(Debug, Clone, Copy)]
pub struct JsonFacade {
    pretty: bool,
}

impl JsonFacade {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// 单行输出，便于管道传递。
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn parse_records(&self, source: &str) -> Result<Vec<EntityRecord>, IoError> {
        self.parse_from(source, "<input>")
    }

    fn parse_from(&self, source: &str, origin: &str) -> Result<Vec<EntityRecord>, IoError> {
        serde_json::from_str::<RecordFile>(source)
            .map(RecordFile::into_records)
            .map_err(|source| IoError::ParseError {
                origin: origin.to_string(),
                source,
            })
    }

    pub fn to_json(&self, report: &RunReport) -> Result<String, IoError> {
        let document = BomDocument {
            bom: &report.bom,
            diagnostics: &report.diagnostics,
        };
        let encoded = if self.pretty {
            serde_json::to_string_pretty(&document)
        } else {
            serde_json::to_string(&document)
        };
        encoded.map_err(IoError::SerializeError)
    }
}

impl Default for JsonFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordLoader for JsonFacade {
    fn load(&self, path: &Path) -> Result<Vec<EntityRecord>, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_from(&data, &path.display().to_string())
    }
}

impl ReportSaver for JsonFacade {
    fn save(&self, report: &RunReport, path: &Path) -> Result<(), IoError> {
        let mut encoded = self.to_json(report)?;
        encoded.push('\n');
        fs::write(path, encoded).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}
