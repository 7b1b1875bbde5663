//! 追踪分析数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::chain::TransferRecord;
use crate::privacy::PrivacyLevel;
use crate::types::Chain;

/// 启发式检测到的信号类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingSignal {
    DirectLink,
    SuspiciousPattern,
    ExchangeFunding,
    CrossChainReuse,
}

/// 单个启发式的检测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub signal: TrackingSignal,
    pub warning: String,
    /// 发现活动的链
    pub chains: BTreeSet<Chain>,
}

impl Detection {
    pub fn new(signal: TrackingSignal, warning: impl Into<String>) -> Self {
        Self {
            signal,
            warning: warning.into(),
            chains: BTreeSet::new(),
        }
    }
}

/// 启发式的输入: 主链历史以及同地址格式的其他链上已取得的历史
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub address: String,
    pub chain: Chain,
    pub primary: Vec<TransferRecord>,
    pub siblings: BTreeMap<Chain, Vec<TransferRecord>>,
}

impl HistorySnapshot {
    pub fn outgoing(&self) -> impl Iterator<Item = &TransferRecord> {
        self.primary.iter().filter(|r| r.is_outgoing(&self.address))
    }

    pub fn incoming(&self) -> impl Iterator<Item = &TransferRecord> {
        self.primary
            .iter()
            .filter(|r| r.is_incoming(&self.address))
    }
}

/// 追踪风险分析结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingAnalysis {
    pub has_direct_link: bool,
    pub suspicious_pattern: bool,
    pub exchange_funding: bool,
    /// 0–100
    pub risk_score: u8,
    pub detected_chains: BTreeSet<Chain>,
    pub warnings: Vec<String>,
    pub triggered_heuristics: Vec<String>,
    /// 至少一次历史查询失败
    pub partial_data: bool,
}

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(risk_score: u8) -> Self {
        match risk_score {
            80.. => RiskLevel::Critical,
            60..=79 => RiskLevel::High,
            40..=59 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    /// 对应的推荐隐私级别
    pub fn recommended_level(&self) -> PrivacyLevel {
        match self {
            RiskLevel::Critical => PrivacyLevel::Extreme,
            RiskLevel::High => PrivacyLevel::High,
            RiskLevel::Medium => PrivacyLevel::Medium,
            RiskLevel::Low => PrivacyLevel::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// 钱包隐私报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPrivacyReport {
    pub wallet_id: String,
    /// 100 - riskScore
    pub privacy_score: u8,
    pub risk_level: RiskLevel,
    pub tracking_analysis: TrackingAnalysis,
    pub recommendations: Vec<String>,
    pub recommended_level: PrivacyLevel,
    pub last_analyzed: DateTime<Utc>,
}
