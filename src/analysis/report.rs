//! 钱包隐私报告

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use super::analyzer::TrackingAnalyzer;
use super::types::{RiskLevel, TrackingAnalysis, WalletPrivacyReport};
use crate::error::{PrivacyError, Result};
use crate::storage::Repository;

/// 根据分析结果生成建议
pub fn recommendations(analysis: &TrackingAnalysis) -> Vec<String> {
    let mut advice = Vec::new();

    if analysis.has_direct_link {
        advice.push("与对手方存在直接往来，转账时使用至少 3 跳中间账户".to_string());
    }
    if analysis.suspicious_pattern {
        advice.push("金额或时间存在规律，开启随机路径并提高拆分数".to_string());
    }
    if analysis.exchange_funding {
        advice.push("交易所提现先经过中间账户再使用".to_string());
    }
    if analysis.detected_chains.len() > 1 {
        advice.push("不同链使用不同地址，避免跨链关联".to_string());
    }
    if analysis.risk_score >= 60 {
        advice.push("使用 EXTREME 隐私级别并经常轮换中间账户".to_string());
    }
    if analysis.partial_data {
        advice.push("部分历史数据不可用，数据恢复后重新分析".to_string());
    }
    if advice.is_empty() {
        advice.push("当前使用习惯的隐私保护已足够".to_string());
    }

    advice
}

/// 由分析结果生成报告（纯函数）
pub fn build_report(
    wallet_id: &str,
    analysis: TrackingAnalysis,
    now: DateTime<Utc>,
) -> WalletPrivacyReport {
    let risk_level = RiskLevel::from_score(analysis.risk_score);
    WalletPrivacyReport {
        wallet_id: wallet_id.to_string(),
        privacy_score: 100 - analysis.risk_score.min(100),
        risk_level,
        recommendations: recommendations(&analysis),
        recommended_level: risk_level.recommended_level(),
        tracking_analysis: analysis,
        last_analyzed: now,
    }
}

/// 报告生成器，每次都重新分析
#[derive(Clone)]
pub struct PrivacyReportGenerator {
    repository: Arc<dyn Repository>,
    analyzer: TrackingAnalyzer,
}

impl PrivacyReportGenerator {
    pub fn new(repository: Arc<dyn Repository>, analyzer: TrackingAnalyzer) -> Self {
        Self {
            repository,
            analyzer,
        }
    }

    pub fn analyzer(&self) -> &TrackingAnalyzer {
        &self.analyzer
    }

    pub async fn report(&self, wallet_id: &str) -> Result<WalletPrivacyReport> {
        let account = self
            .repository
            .get_source_account(wallet_id)
            .await
            .map_err(PrivacyError::storage)?
            .ok_or_else(|| PrivacyError::NotFound(format!("wallet {}", wallet_id)))?;

        let analysis = self.analyzer.analyze(&account.address, account.chain).await;
        let report = build_report(wallet_id, analysis, Utc::now());
        info!(
            "钱包 {} 隐私报告: 风险 {} ({}), 推荐级别 {}",
            wallet_id,
            report.risk_level,
            report.tracking_analysis.risk_score,
            report.recommended_level
        );
        Ok(report)
    }
}
