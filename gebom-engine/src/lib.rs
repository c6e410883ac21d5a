pub mod aggregator;
pub mod catalog;
pub mod classifier;
pub mod command;
pub mod estimator;
pub mod pipeline;

pub mod errors {
    use gebom_core::material::Unit;
    use thiserror::Error;

    use crate::catalog::CatalogError;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("invalid configuration: {}", violations.join("; "))]
        InvalidConfiguration { violations: Vec<String> },
        #[error(transparent)]
        Catalog(#[from] CatalogError),
        #[error("article {article_no} mixes units {first} and {second}")]
        UnitConflict {
            article_no: String,
            first: Unit,
            second: Unit,
        },
        #[error("total for article {article_no} is {total}, per-shaft sum is {expected}")]
        TotalsMismatch {
            article_no: String,
            total: f64,
            expected: f64,
        },
        #[error("no extraction run has been loaded")]
        NoRunLoaded,
    }
}

pub mod session {
    use std::collections::BTreeSet;

    use gebom_core::material::{LineItem, ShaftId};
    use tracing::debug;

    use crate::errors::EngineError;
    use crate::pipeline::RunReport;

    /// 物料查询默认返回的最大行数。
    pub const DEFAULT_MATERIAL_LIMIT: usize = 100;

    /// 物料查询条件。
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MaterialQuery {
        pub shaft: Option<ShaftId>,
        pub limit: usize,
    }

    impl Default for MaterialQuery {
        fn default() -> Self {
            Self {
                shaft: None,
                limit: DEFAULT_MATERIAL_LIMIT,
            }
        }
    }

    /// 保存最近一次运行结果，由调用方持有。新结果整体替换旧结果。
    #[derive(Debug, Default)]
    pub struct Session {
        last: Option<RunReport>,
        runs_loaded: u64,
    }

    impl Session {
        pub fn new() -> Self {
            Self::default()
        }

        /// 替换当前结果。
        pub fn load(&mut self, report: RunReport) {
            self.runs_loaded += 1;
            debug!(
                run = self.runs_loaded,
                shafts = report.shafts.len(),
                "会话已载入新的运行结果"
            );
            self.last = Some(report);
        }

        /// 清空当前结果，返回之前是否存在结果。
        pub fn clear(&mut self) -> bool {
            self.last.take().is_some()
        }

        #[inline]
        pub fn report(&self) -> Option<&RunReport> {
            self.last.as_ref()
        }

        pub fn require_report(&self) -> Result<&RunReport, EngineError> {
            self.report().ok_or(EngineError::NoRunLoaded)
        }

        #[inline]
        pub fn runs_loaded(&self) -> u64 {
            self.runs_loaded
        }

        /// 清单中出现的竖井编号，升序去重。
        pub fn shafts(&self) -> Result<Vec<ShaftId>, EngineError> {
            let report = self.require_report()?;
            let unique: BTreeSet<&ShaftId> = report
                .bom
                .line_items()
                .filter_map(|item| item.shaft_id.as_ref())
                .collect();
            Ok(unique.into_iter().cloned().collect())
        }

        /// 按竖井过滤清单行，未分配行只在不指定竖井时出现。
        pub fn materials(&self, query: &MaterialQuery) -> Result<Vec<&LineItem>, EngineError> {
            let report = self.require_report()?;
            Ok(report
                .bom
                .line_items()
                .filter(|item| match &query.shaft {
                    Some(shaft) => item.shaft_id.as_ref() == Some(shaft),
                    None => true,
                })
                .take(query.limit)
                .collect())
        }
    }

}
