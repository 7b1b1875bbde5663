//! 追踪风险分析
//!
//! 历史数据源 → [`TrackingAnalyzer`] → [`PrivacyReportGenerator`]。

pub mod analyzer;
pub mod heuristics;
pub mod report;
pub mod types;

pub use analyzer::TrackingAnalyzer;
pub use heuristics::{
    AnalyzerSettings, CrossChainReuseHeuristic, DirectLinkHeuristic, ExchangeFundingHeuristic,
    RepeatingPatternHeuristic, TrackingHeuristic,
};
pub use report::{build_report, recommendations, PrivacyReportGenerator};
pub use types::{
    Detection, HistorySnapshot, RiskLevel, TrackingAnalysis, TrackingSignal, WalletPrivacyReport,
};
