//! Query plan analysis and optimization reporting

pub mod analyzer;
pub mod optimizer;
pub mod plan;

pub use analyzer::{
    QueryAnalysisResult, QueryAnalyzer, collect_index_suggestions, has_limit, inefficiency_score,
    param_from_json, strip_literals,
};
pub use optimizer::{OptimizationReport, OptimizationService, ReportThresholds, SlowQuery};
pub use plan::{
    AccessKind, ClassifiedStep, PlanStep, PlanSummary, StepClass, TableAccess, classify_plan,
    classify_step, summarize,
};
