//! 转账历史来源
//!
//! 追踪风险分析只通过 [`HistoryProvider`] 读取链上历史。

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::crypto::{normalize_address, same_address};
use crate::types::{Amount, Chain};

/// 对手方标签（由历史数据源提供）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CounterpartyTag {
    Exchange,
    Mixer,
    Contract,
    Bridge,
}

/// 历史转账记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub tx_hash: String,
    pub chain: Chain,
    pub from: String,
    pub to: String,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub counterparty_tag: Option<CounterpartyTag>,
}

impl TransferRecord {
    /// 相对 address 的对手方地址
    pub fn counterparty(&self, address: &str) -> &str {
        if self.is_outgoing(address) {
            &self.to
        } else {
            &self.from
        }
    }

    /// 地址按链的规范形式比较（EVM 校验和地址大小写不敏感）
    pub fn is_outgoing(&self, address: &str) -> bool {
        same_address(self.chain, &self.from, address)
    }

    pub fn is_incoming(&self, address: &str) -> bool {
        same_address(self.chain, &self.to, address) && !self.is_outgoing(address)
    }
}

/// 历史数据源
#[async_trait::async_trait]
pub trait HistoryProvider: Send + Sync {
    /// 按时间顺序返回地址在链上的历史转账
    async fn get_transfer_history(&self, address: &str, chain: Chain) -> Result<Vec<TransferRecord>>;
}

/// 静态历史数据源（用于测试和命令行演示）
#[derive(Default)]
pub struct StaticHistoryProvider {
    records: RwLock<HashMap<(Chain, String), Vec<TransferRecord>>>,
    unavailable: RwLock<HashSet<Chain>>,
}

impl StaticHistoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加记录，同时登记到收发双方
    pub fn insert(&self, record: TransferRecord) {
        let mut records = self.records.write();
        for address in [&record.from, &record.to] {
            let key = (record.chain, normalize_address(record.chain, address));
            let history = records.entry(key).or_default();
            history.push(record.clone());
            history.sort_by_key(|r| r.timestamp);
        }
    }

    /// 模拟某条链的历史服务不可用
    pub fn set_unavailable(&self, chain: Chain, unavailable: bool) {
        let mut set = self.unavailable.write();
        if unavailable {
            set.insert(chain);
        } else {
            set.remove(&chain);
        }
    }
}

#[async_trait::async_trait]
impl HistoryProvider for StaticHistoryProvider {
    async fn get_transfer_history(&self, address: &str, chain: Chain) -> Result<Vec<TransferRecord>> {
        if self.unavailable.read().contains(&chain) {
            return Err(anyhow!("{} history service unavailable", chain));
        }
        Ok(self
            .records
            .read()
            .get(&(chain, normalize_address(chain, address)))
            .cloned()
            .unwrap_or_default())
    }
}
