//! 追踪风险分析器
//!
//! 拉取地址历史后依次运行启发式。历史查询失败只降级为部分数据，分析本身不会失败。

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::heuristics::{AnalyzerSettings, TrackingHeuristic};
use super::types::{HistorySnapshot, TrackingAnalysis, TrackingSignal};
use crate::chain::HistoryProvider;
use crate::error::ValidationError;
use crate::types::Chain;

/// 追踪风险分析器
#[derive(Clone)]
pub struct TrackingAnalyzer {
    history: Arc<dyn HistoryProvider>,
    heuristics: Arc<Vec<Box<dyn TrackingHeuristic>>>,
}

impl TrackingAnalyzer {
    /// 使用默认启发式集合
    pub fn new(history: Arc<dyn HistoryProvider>) -> Self {
        Self::with_heuristics(history, AnalyzerSettings::default().build_heuristics().unwrap_or_default())
    }

    pub fn with_heuristics(
        history: Arc<dyn HistoryProvider>,
        heuristics: Vec<Box<dyn TrackingHeuristic>>,
    ) -> Self {
        Self {
            history,
            heuristics: Arc::new(heuristics),
        }
    }

    pub fn from_settings(
        history: Arc<dyn HistoryProvider>,
        settings: &AnalyzerSettings,
    ) -> Result<Self, ValidationError> {
        Ok(Self::with_heuristics(history, settings.build_heuristics()?))
    }

    pub fn heuristic_names(&self) -> Vec<&'static str> {
        self.heuristics.iter().map(|h| h.name()).collect()
    }

    /// 分析地址在链上的可追踪性
    pub async fn analyze(&self, address: &str, chain: Chain) -> TrackingAnalysis {
        let mut analysis = TrackingAnalysis::default();

        let primary = match self.history.get_transfer_history(address, chain).await {
            Ok(records) => records,
            Err(e) => {
                warn!("{} 在 {} 的历史获取失败: {}", address, chain, e);
                analysis.partial_data = true;
                analysis.warnings.push(format!("{} 历史数据不可用，分析结果不完整", chain));
                Vec::new()
            }
        };
        if !primary.is_empty() {
            analysis.detected_chains.insert(chain);
        }

        let mut siblings = BTreeMap::new();
        for sibling in chain.address_siblings() {
            match self.history.get_transfer_history(address, sibling).await {
                Ok(records) => {
                    siblings.insert(sibling, records);
                }
                Err(e) => {
                    warn!("{} 在 {} 的历史获取失败: {}", address, sibling, e);
                    analysis.partial_data = true;
                    analysis.warnings.push(format!("{} 历史数据不可用，分析结果不完整", sibling));
                }
            }
        }

        let snapshot = HistorySnapshot {
            address: address.to_string(),
            chain,
            primary,
            siblings,
        };

        let mut score: u32 = 0;
        for heuristic in self.heuristics.iter() {
            let Some(detection) = heuristic.evaluate(&snapshot) else {
                continue;
            };
            debug!("启发式 {} 命中: {}", heuristic.name(), detection.warning);

            score += heuristic.weight() as u32;
            match detection.signal {
                TrackingSignal::DirectLink => analysis.has_direct_link = true,
                TrackingSignal::SuspiciousPattern => analysis.suspicious_pattern = true,
                TrackingSignal::ExchangeFunding => analysis.exchange_funding = true,
                TrackingSignal::CrossChainReuse => {}
            }
            analysis.detected_chains.extend(detection.chains);
            analysis.warnings.push(detection.warning);
            analysis.triggered_heuristics.push(heuristic.name().to_string());
        }
        analysis.risk_score = score.min(100) as u8;

        analysis
    }
}
