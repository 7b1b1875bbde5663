//! 追踪启发式
//!
//! 每个启发式独立评估历史快照，命中时贡献固定权重。新增启发式只需实现 [`TrackingHeuristic`]。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::types::{Detection, HistorySnapshot, TrackingSignal};
use crate::chain::CounterpartyTag;
use crate::crypto::normalize_address;
use crate::error::ValidationError;
use crate::types::Amount;

pub const DIRECT_LINK: &str = "direct_link";
pub const REPEATING_PATTERN: &str = "repeating_pattern";
pub const EXCHANGE_FUNDING: &str = "exchange_funding";
pub const CROSS_CHAIN_REUSE: &str = "cross_chain_reuse";

/// 追踪启发式
pub trait TrackingHeuristic: Send + Sync {
    fn name(&self) -> &'static str;

    /// 命中时计入风险分的权重
    fn weight(&self) -> u8;

    fn evaluate(&self, snapshot: &HistorySnapshot) -> Option<Detection>;
}

/// 分析器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// 已知交易所地址
    pub known_exchange_addresses: Vec<String>,
    /// 判定重复模式所需的最少次数
    pub repeat_threshold: usize,
    /// 时间间隔相近的容差（百分比）
    pub interval_tolerance_percent: u32,
    pub enabled_heuristics: Vec<String>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            known_exchange_addresses: Vec::new(),
            repeat_threshold: 3,
            interval_tolerance_percent: 10,
            enabled_heuristics: vec![
                DIRECT_LINK.to_string(),
                REPEATING_PATTERN.to_string(),
                EXCHANGE_FUNDING.to_string(),
                CROSS_CHAIN_REUSE.to_string(),
            ],
        }
    }
}

impl AnalyzerSettings {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.repeat_threshold < 2 {
            errors.push(format!("重复阈值过小: {}", self.repeat_threshold));
        }
        if self.interval_tolerance_percent > 100 {
            errors.push(format!("间隔容差超过100%: {}", self.interval_tolerance_percent));
        }
        for name in &self.enabled_heuristics {
            if !matches!(
                name.as_str(),
                DIRECT_LINK | REPEATING_PATTERN | EXCHANGE_FUNDING | CROSS_CHAIN_REUSE
            ) {
                errors.push(format!("未知启发式: {}", name));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 按配置构建启发式集合，顺序与配置一致
    pub fn build_heuristics(&self) -> Result<Vec<Box<dyn TrackingHeuristic>>, ValidationError> {
        self.validate().map_err(ValidationError::InvalidConfig)?;

        Ok(self
            .enabled_heuristics
            .iter()
            .filter_map(|name| -> Option<Box<dyn TrackingHeuristic>> {
                match name.as_str() {
                    DIRECT_LINK => Some(Box::new(DirectLinkHeuristic)),
                    REPEATING_PATTERN => Some(Box::new(RepeatingPatternHeuristic {
                        threshold: self.repeat_threshold,
                        tolerance_percent: self.interval_tolerance_percent,
                    })),
                    EXCHANGE_FUNDING => Some(Box::new(ExchangeFundingHeuristic::new(
                        self.known_exchange_addresses.iter().cloned(),
                    ))),
                    CROSS_CHAIN_REUSE => Some(Box::new(CrossChainReuseHeuristic)),
                    _ => None,
                }
            })
            .collect())
    }
}

/// 与同一对手方存在双向资金往来
pub struct DirectLinkHeuristic;

impl TrackingHeuristic for DirectLinkHeuristic {
    fn name(&self) -> &'static str {
        DIRECT_LINK
    }

    fn weight(&self) -> u8 {
        30
    }

    fn evaluate(&self, snapshot: &HistorySnapshot) -> Option<Detection> {
        let sent_to: HashSet<String> = snapshot
            .outgoing()
            .map(|r| normalize_address(snapshot.chain, &r.to))
            .collect();
        let mut linked: Vec<String> = snapshot
            .incoming()
            .map(|r| normalize_address(snapshot.chain, &r.from))
            .filter(|from| sent_to.contains(from))
            .collect();
        linked.sort_unstable();
        linked.dedup();

        let first = linked.first()?;
        Some(Detection::new(
            TrackingSignal::DirectLink,
            format!("与 {} 存在双向资金往来（共 {} 个对手方）", first, linked.len()),
        ))
    }
}

/// 金额或时间间隔重复
pub struct RepeatingPatternHeuristic {
    pub threshold: usize,
    pub tolerance_percent: u32,
}

impl RepeatingPatternHeuristic {
    fn repeated_amount(&self, snapshot: &HistorySnapshot) -> Option<(Amount, usize)> {
        let mut counts: HashMap<Amount, usize> = HashMap::new();
        for record in snapshot.outgoing() {
            *counts.entry(record.amount).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count >= self.threshold)
            .max_by_key(|(amount, count)| (*count, *amount))
    }

    /// 最长的相邻近似等间隔序列长度（以间隔数计）
    fn regular_interval_run(&self, snapshot: &HistorySnapshot) -> usize {
        let mut times: Vec<i64> = snapshot
            .outgoing()
            .map(|r| r.timestamp.timestamp_millis())
            .collect();
        times.sort_unstable();

        let intervals: Vec<i64> = times.windows(2).map(|w| w[1] - w[0]).collect();
        if intervals.is_empty() {
            return 0;
        }

        let tolerance = self.tolerance_percent as i64;
        let mut longest = 1;
        let mut run = 1;
        for pair in intervals.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if (next - prev).abs() * 100 <= prev * tolerance {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 1;
            }
        }
        longest
    }
}

impl TrackingHeuristic for RepeatingPatternHeuristic {
    fn name(&self) -> &'static str {
        REPEATING_PATTERN
    }

    fn weight(&self) -> u8 {
        40
    }

    fn evaluate(&self, snapshot: &HistorySnapshot) -> Option<Detection> {
        if let Some((amount, count)) = self.repeated_amount(snapshot) {
            return Some(Detection::new(
                TrackingSignal::SuspiciousPattern,
                format!("{} 笔转出金额相同 ({})", count, amount),
            ));
        }

        let run = self.regular_interval_run(snapshot);
        if run >= self.threshold {
            return Some(Detection::new(
                TrackingSignal::SuspiciousPattern,
                format!("连续 {} 个转出间隔近似相等", run),
            ));
        }
        None
    }
}

/// 资金来自交易所
pub struct ExchangeFundingHeuristic {
    known_exchanges: HashSet<String>,
}

impl ExchangeFundingHeuristic {
    pub fn new(known_exchanges: impl IntoIterator<Item = String>) -> Self {
        Self {
            known_exchanges: known_exchanges
                .into_iter()
                .map(|a| a.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_exchange(&self, address: &str) -> bool {
        self.known_exchanges.contains(&address.trim().to_ascii_lowercase())
    }
}

impl TrackingHeuristic for ExchangeFundingHeuristic {
    fn name(&self) -> &'static str {
        EXCHANGE_FUNDING
    }

    fn weight(&self) -> u8 {
        20
    }

    fn evaluate(&self, snapshot: &HistorySnapshot) -> Option<Detection> {
        let funded = snapshot.incoming().find(|r| {
            r.counterparty_tag == Some(CounterpartyTag::Exchange)
                || self.is_exchange(&normalize_address(snapshot.chain, &r.from))
        })?;
        Some(Detection::new(
            TrackingSignal::ExchangeFunding,
            format!("资金来自交易所地址 {}", funded.from),
        ))
    }
}

/// 同一地址在其他链上也有活动
pub struct CrossChainReuseHeuristic;

impl TrackingHeuristic for CrossChainReuseHeuristic {
    fn name(&self) -> &'static str {
        CROSS_CHAIN_REUSE
    }

    fn weight(&self) -> u8 {
        25
    }

    fn evaluate(&self, snapshot: &HistorySnapshot) -> Option<Detection> {
        let active: BTreeSet<_> = snapshot
            .siblings
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(chain, _)| *chain)
            .collect();
        if active.is_empty() {
            return None;
        }

        let names: Vec<&str> = active.iter().map(|c| c.as_str()).collect();
        let mut detection = Detection::new(
            TrackingSignal::CrossChainReuse,
            format!("地址同时在 {} 上活跃", names.join(", ")),
        );
        detection.chains = active;
        detection.chains.insert(snapshot.chain);
        Some(detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TransferRecord;
    use crate::types::Chain;
    use chrono::DateTime;
    use std::collections::BTreeMap;

    const ME: &str = "0x1111111111111111111111111111111111111111";

    fn record(from: &str, to: &str, amount: &str, secs: i64) -> TransferRecord {
        TransferRecord {
            tx_hash: format!("{}-{}-{}", from, to, secs),
            chain: Chain::Ethereum,
            from: from.to_string(),
            to: to.to_string(),
            amount: amount.parse().unwrap(),
            timestamp: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
            counterparty_tag: None,
        }
    }

    fn snapshot(primary: Vec<TransferRecord>) -> HistorySnapshot {
        HistorySnapshot {
            address: ME.to_string(),
            chain: Chain::Ethereum,
            primary,
            siblings: BTreeMap::new(),
        }
    }

    fn pattern() -> RepeatingPatternHeuristic {
        RepeatingPatternHeuristic {
            threshold: 3,
            tolerance_percent: 10,
        }
    }

    #[test]
    fn test_direct_link_needs_both_directions() {
        let one_way = snapshot(vec![record(ME, "0xbob", "1", 0), record(ME, "0xbob", "2", 10)]);
        assert!(DirectLinkHeuristic.evaluate(&one_way).is_none());

        let both = snapshot(vec![record(ME, "0xbob", "1", 0), record("0xbob", ME, "1", 10)]);
        let detection = DirectLinkHeuristic.evaluate(&both).unwrap();
        assert_eq!(detection.signal, TrackingSignal::DirectLink);
        assert!(detection.warning.contains("0xbob"));
    }

    #[test]
    fn test_repeated_amounts() {
        let history = snapshot(vec![
            record(ME, "0xa", "5", 0),
            record(ME, "0xb", "5", 100),
            record(ME, "0xc", "5", 1000),
        ]);
        assert!(pattern().evaluate(&history).is_some());

        let varied = snapshot(vec![
            record(ME, "0xa", "5", 0),
            record(ME, "0xb", "6", 100),
            record(ME, "0xc", "5", 1000),
        ]);
        assert!(pattern().evaluate(&varied).is_none());
    }

    #[test]
    fn test_regular_intervals() {
        // 间隔 100, 105, 98
        let regular = snapshot(vec![
            record(ME, "0xa", "1", 0),
            record(ME, "0xb", "2", 100),
            record(ME, "0xc", "3", 205),
            record(ME, "0xd", "4", 303),
        ]);
        assert!(pattern().evaluate(&regular).is_some());

        // 间隔 100, 150, 100
        let irregular = snapshot(vec![
            record(ME, "0xa", "1", 0),
            record(ME, "0xb", "2", 100),
            record(ME, "0xc", "3", 250),
            record(ME, "0xd", "4", 350),
        ]);
        assert!(pattern().evaluate(&irregular).is_none());
    }

    #[test]
    fn test_exchange_funding_by_tag_or_list() {
        let mut tagged = record("0xcex", ME, "1", 0);
        tagged.counterparty_tag = Some(CounterpartyTag::Exchange);
        let heuristic = ExchangeFundingHeuristic::new(Vec::new());
        assert!(heuristic.evaluate(&snapshot(vec![tagged])).is_some());

        let listed = ExchangeFundingHeuristic::new(vec!["0xABCD".to_string()]);
        assert!(listed.evaluate(&snapshot(vec![record("0xabcd", ME, "1", 0)])).is_some());
        // 转出给交易所不算
        assert!(listed.evaluate(&snapshot(vec![record(ME, "0xabcd", "1", 0)])).is_none());
    }

    #[test]
    fn test_cross_chain_reuse_lists_chains() {
        let mut snap = snapshot(vec![record(ME, "0xa", "1", 0)]);
        snap.siblings.insert(Chain::Base, vec![record(ME, "0xa", "1", 0)]);
        snap.siblings.insert(Chain::Polygon, Vec::new());

        let detection = CrossChainReuseHeuristic.evaluate(&snap).unwrap();
        assert_eq!(
            detection.chains.into_iter().collect::<Vec<_>>(),
            vec![Chain::Ethereum, Chain::Base]
        );
    }

    #[test]
    fn test_settings_validation() {
        assert!(AnalyzerSettings::default().validate().is_ok());
        assert_eq!(AnalyzerSettings::default().build_heuristics().unwrap().len(), 4);

        let bad = AnalyzerSettings {
            enabled_heuristics: vec!["astrology".to_string()],
            ..AnalyzerSettings::default()
        };
        assert!(bad.build_heuristics().is_err());
    }
}
