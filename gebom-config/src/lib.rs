use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub pipe_sheet: PipeSheetConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `GEBOM_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("GEBOM_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 图元筛选与计量相关设置。
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// 图层命名约定（glob，忽略大小写）。
    #[serde(default = "ExtractionConfig::default_layer_patterns")]
    pub layer_patterns: Vec<String>,
    /// 管件与管段的连接容差（图纸单位）。
    #[serde(default = "ExtractionConfig::default_tolerance")]
    pub tolerance: f64,
    /// 管段长度到清单数量（M）的换算系数。
    #[serde(default = "ExtractionConfig::default_quantity_scale")]
    pub quantity_scale: f64,
}

impl ExtractionConfig {
    fn default_layer_patterns() -> Vec<String> {
        vec!["GEB*".to_string()]
    }

    fn default_tolerance() -> f64 {
        0.5
    }

    fn default_quantity_scale() -> f64 {
        1.0
    }

    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.layer_patterns.iter().all(|p| p.trim().is_empty()) {
            violations
                .push("extraction.layer_patterns must contain at least one pattern".to_string());
        } else {
            for (index, pattern) in self.layer_patterns.iter().enumerate() {
                if pattern.trim().is_empty() {
                    violations.push(format!("extraction.layer_patterns[{index}] is empty"));
                }
            }
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            violations.push(format!(
                "extraction.tolerance must be a positive number, got {}",
                self.tolerance
            ));
        }
        if !(self.quantity_scale.is_finite() && self.quantity_scale > 0.0) {
            violations.push(format!(
                "extraction.quantity_scale must be a positive number, got {}",
                self.quantity_scale
            ));
        }
        violations
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            layer_patterns: Self::default_layer_patterns(),
            tolerance: Self::default_tolerance(),
            quantity_scale: Self::default_quantity_scale(),
        }
    }
}

/// 长度阈值 → 公称管径。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiameterBand {
    pub above: f64,
    pub diameter: u32,
}

/// 半径阈值 → 管件子类型。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubtypeBand {
    pub above: f64,
    pub subtype: String,
}

/// 启发式估算参数。默认值沿用现场图纸的经验阈值，尚待标定。
#[derive(Debug, Clone, Deserialize)]
pub struct EstimationConfig {
    #[serde(default = "EstimationConfig::default_run_length_bands")]
    pub run_length_bands: Vec<DiameterBand>,
    #[serde(default = "EstimationConfig::default_run_fallback_diameter")]
    pub run_fallback_diameter: u32,
    #[serde(default = "EstimationConfig::default_marker_radius_bands")]
    pub marker_radius_bands: Vec<SubtypeBand>,
    #[serde(default = "EstimationConfig::default_marker_fallback_subtype")]
    pub marker_fallback_subtype: String,
    #[serde(default = "EstimationConfig::default_block_diameter")]
    pub default_block_diameter: u32,
}

impl EstimationConfig {
    fn default_run_length_bands() -> Vec<DiameterBand> {
        vec![
            DiameterBand {
                above: 50.0,
                diameter: 110,
            },
            DiameterBand {
                above: 20.0,
                diameter: 75,
            },
        ]
    }

    fn default_run_fallback_diameter() -> u32 {
        50
    }

    fn default_marker_radius_bands() -> Vec<SubtypeBand> {
        vec![
            SubtypeBand {
                above: 50.0,
                subtype: "bend".to_string(),
            },
            SubtypeBand {
                above: 25.0,
                subtype: "branch".to_string(),
            },
        ]
    }

    fn default_marker_fallback_subtype() -> String {
        "coupling".to_string()
    }

    fn default_block_diameter() -> u32 {
        50
    }
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            run_length_bands: Self::default_run_length_bands(),
            run_fallback_diameter: Self::default_run_fallback_diameter(),
            marker_radius_bands: Self::default_marker_radius_bands(),
            marker_fallback_subtype: Self::default_marker_fallback_subtype(),
            default_block_diameter: Self::default_block_diameter(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// 外部目录文件（TOML）；缺省使用内建目录。
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// 敷设方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipeType {
    Sunken,
    #[serde(rename = "Under Slung")]
    UnderSlung,
}

impl PipeType {
    /// 忽略大小写与分隔符，`Under Slung` / `under-slung` / `UNDERSLUNG` 等价。
    pub fn parse(raw: &str) -> Option<Self> {
        let squashed: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match squashed.as_str() {
            "sunken" => Some(PipeType::Sunken),
            "underslung" => Some(PipeType::UnderSlung),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipeType::Sunken => "Sunken",
            PipeType::UnderSlung => "Under Slung",
        }
    }
}

impl fmt::Display for PipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 调用方提交的管道参数表，字段全部可缺省以便集中校验。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipeSheetConfig {
    #[serde(default)]
    pub pipe_type: Option<String>,
    #[serde(default)]
    pub water_closet: Option<u32>,
    #[serde(default)]
    pub wash_basin: Option<u32>,
    #[serde(default)]
    pub manhole: Option<u32>,
    #[serde(default)]
    pub collector: Option<u32>,
}

/// 校验通过的管道参数表。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipeSheet {
    pub pipe_type: PipeType,
    pub water_closet: u32,
    pub wash_basin: u32,
    pub manhole: u32,
    pub collector: u32,
}

impl PipeSheetConfig {
    /// 一次性收集全部问题，而不是遇到第一个错误即返回。
    pub fn validate(&self) -> Result<PipeSheet, Vec<String>> {
        let mut violations = Vec::new();

        let pipe_type = match self.pipe_type.as_deref().map(str::trim) {
            None | Some("") => {
                violations.push("pipe_sheet.pipe_type is required".to_string());
                None
            }
            Some(raw) => {
                let parsed = PipeType::parse(raw);
                if parsed.is_none() {
                    violations.push(format!(
                        "pipe_sheet.pipe_type `{raw}` is invalid, \
                         must be \"Sunken\" or \"Under Slung\""
                    ));
                }
                parsed
            }
        };

        let mut required = |name: &str, value: Option<u32>| -> u32 {
            match value {
                Some(v) if v > 0 => v,
                Some(_) => {
                    violations.push(format!("pipe_sheet.{name} must be greater than 0"));
                    0
                }
                None => {
                    violations.push(format!("pipe_sheet.{name} is required"));
                    0
                }
            }
        };
        let water_closet = required("water_closet", self.water_closet);
        let wash_basin = required("wash_basin", self.wash_basin);
        let manhole = required("manhole", self.manhole);
        let collector = required("collector", self.collector);

        match pipe_type {
            Some(pipe_type) if violations.is_empty() => Ok(PipeSheet {
                pipe_type,
                water_closet,
                wash_basin,
                manhole,
                collector,
            }),
            _ => Err(violations),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
