//! 隐私转账数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::crypto::EncryptedSecret;
use crate::error::{ExecutionError, ValidationError};
use crate::types::{duration_ms, Amount, Chain};

/// 单个配置允许的最大跳数
pub const MAX_HOPS: u8 = 10;
/// 单个配置允许的最大拆分数
pub const MAX_SPLITS: u8 = 16;

/// 隐私级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivacyLevel {
    /// 直接转账
    Low,
    /// 平衡模式
    Medium,
    /// 多跳 + 拆分
    High,
    /// 最大隐私
    Extreme,
}

impl PrivacyLevel {
    /// 级别对应的 (跳数, 拆分数)
    pub fn parameters(&self) -> (u8, u8) {
        match self {
            PrivacyLevel::Low => (0, 1),
            PrivacyLevel::Medium => (2, 2),
            PrivacyLevel::High => (4, 4),
            PrivacyLevel::Extreme => (6, 8),
        }
    }
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrivacyLevel::Low => "LOW",
            PrivacyLevel::Medium => "MEDIUM",
            PrivacyLevel::High => "HIGH",
            PrivacyLevel::Extreme => "EXTREME",
        };
        f.write_str(name)
    }
}

impl FromStr for PrivacyLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(PrivacyLevel::Low),
            "MEDIUM" => Ok(PrivacyLevel::Medium),
            "HIGH" => Ok(PrivacyLevel::High),
            "EXTREME" => Ok(PrivacyLevel::Extreme),
            other => Err(ValidationError::InvalidConfig(vec![format!("未知隐私级别: {}", other)])),
        }
    }
}

/// 账户隐私配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyConfig {
    pub privacy_level: PrivacyLevel,
    /// 未指定级别时按追踪风险自动提升级别
    pub enable_auto_privacy: bool,
    pub max_hops: u8,
    pub split_count: u8,
    #[serde(with = "duration_ms")]
    pub min_delay: Duration,
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// 关闭时每跳固定使用 min_delay
    pub use_random_path: bool,
    /// 拒绝向曾经使用过的中间账户转账
    pub avoid_known_tracking: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        let (max_hops, split_count) = PrivacyLevel::Medium.parameters();
        Self {
            privacy_level: PrivacyLevel::Medium,
            enable_auto_privacy: false,
            max_hops,
            split_count,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            use_random_path: true,
            avoid_known_tracking: true,
        }
    }
}

impl PrivacyConfig {
    /// 验证配置的合理性
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.split_count == 0 {
            errors.push("拆分数必须大于0".to_string());
        }
        if self.split_count > MAX_SPLITS {
            errors.push(format!("拆分数过大: {}，不能超过{}", self.split_count, MAX_SPLITS));
        }
        if self.max_hops > MAX_HOPS {
            errors.push(format!("跳数过大: {}，不能超过{}", self.max_hops, MAX_HOPS));
        }
        if self.min_delay > self.max_delay {
            errors.push(format!(
                "最小延迟 {}ms 大于最大延迟 {}ms",
                self.min_delay.as_millis(),
                self.max_delay.as_millis()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 隐私配置的部分覆盖，只替换提供的字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyConfigOverride {
    #[serde(default)]
    pub privacy_level: Option<PrivacyLevel>,
    #[serde(default)]
    pub enable_auto_privacy: Option<bool>,
    #[serde(default)]
    pub max_hops: Option<u8>,
    #[serde(default)]
    pub split_count: Option<u8>,
    #[serde(default)]
    pub min_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    #[serde(default)]
    pub use_random_path: Option<bool>,
    #[serde(default)]
    pub avoid_known_tracking: Option<bool>,
}

impl PrivacyConfigOverride {
    pub fn is_empty(&self) -> bool {
        *self == PrivacyConfigOverride::default()
    }
}

/// 源账户（由外部钱包层维护，引擎只读）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAccount {
    pub account_id: String,
    pub chain: Chain,
    pub address: String,
}

/// 临时中间账户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralAccount {
    pub address: String,
    pub encrypted_secret: EncryptedSecret,
    pub chain: Chain,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_temporary: bool,
}

impl EphemeralAccount {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// 转账中的一跳
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferHop {
    pub index: usize,
    pub from_address: String,
    pub to_address: String,
    /// 本跳从 from_address 扣除的总额（含手续费）
    pub amount: Amount,
    /// 到账金额拆分成的子转账
    pub parts: Vec<Amount>,
    pub asset: String,
    pub estimated_fee: Amount,
    #[serde(with = "duration_ms")]
    pub delay: Duration,
}

impl TransferHop {
    /// to_address 实际收到的金额
    pub fn delivered_amount(&self) -> Amount {
        self.amount.checked_sub(self.estimated_fee).unwrap_or(Amount::ZERO)
    }
}

/// 转账计划（纯计算结果，没有身份）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPlan {
    pub chain: Chain,
    pub asset: String,
    pub hops: Vec<TransferHop>,
    pub hop_count: u8,
    pub split_count: u8,
    pub total_estimated_fee: Amount,
    #[serde(with = "duration_ms")]
    pub total_estimated_time: Duration,
    pub privacy_score: u8,
    pub delivered_amount: Amount,
}

impl TransferPlan {
    /// 计划中使用的中间账户地址
    pub fn intermediaries(&self) -> Vec<&str> {
        self.hops
            .iter()
            .skip(1)
            .map(|hop| hop.from_address.as_str())
            .collect()
    }
}

/// 转账状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }

    /// 唯一合法的迁移: PENDING → IN_PROGRESS → {COMPLETED | FAILED}
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::InProgress)
                | (TransferStatus::InProgress, TransferStatus::Completed)
                | (TransferStatus::InProgress, TransferStatus::Failed)
        )
    }
}

/// 已执行的一跳
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedHop {
    pub hop_index: usize,
    pub tx_hashes: Vec<String>,
    pub executed_at: DateTime<Utc>,
}

/// 隐私转账执行记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyTransfer {
    pub transfer_id: String,
    pub source_account_id: String,
    pub destination_address: String,
    pub amount: Amount,
    pub asset: String,
    pub chain: Chain,
    pub status: TransferStatus,
    pub privacy_score: u8,
    pub planned_hops: Vec<TransferHop>,
    pub executed_hops: Vec<ExecutedHop>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub completed_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub failed_hop_index: Option<usize>,
}

impl PrivacyTransfer {
    /// 状态迁移，非法迁移返回错误且不修改记录
    pub fn transition(&mut self, next: TransferStatus) -> Result<(), ExecutionError> {
        if !self.status.can_transition_to(next) {
            return Err(ExecutionError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// 追加一跳的执行结果
    pub fn record_hop(&mut self, outcome: ExecutedHop) -> Result<(), ExecutionError> {
        if self.status != TransferStatus::InProgress
            || self.executed_hops.len() >= self.planned_hops.len()
            || outcome.hop_index != self.executed_hops.len()
        {
            return Err(ExecutionError::HopFailed {
                hop_index: outcome.hop_index,
                last_successful_hop: self.last_successful_hop(),
                reason: "执行记录与计划不一致".to_string(),
            });
        }
        self.executed_hops.push(outcome);
        Ok(())
    }

    pub fn last_successful_hop(&self) -> Option<usize> {
        self.executed_hops.last().map(|hop| hop.hop_index)
    }

    /// 转账引用的全部地址（用于临时账户回收判断）
    pub fn referenced_addresses(&self) -> impl Iterator<Item = &str> {
        self.planned_hops
            .iter()
            .flat_map(|hop| [hop.from_address.as_str(), hop.to_address.as_str()])
    }
}

/// 失败后资金滞留提示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepNotice {
    pub chain: Chain,
    /// 可能滞留资金的地址
    pub addresses: Vec<String>,
    pub last_successful_hop: Option<usize>,
    pub reason: String,
}

/// 执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyTransferResult {
    pub transfer: PrivacyTransfer,
    #[serde(default)]
    pub sweep: Option<SweepNotice>,
}

impl PrivacyTransferResult {
    pub fn requires_manual_sweep(&self) -> bool {
        self.sweep.is_some()
    }
}

/// 中间账户轮换日志条目（只追加）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationEntry {
    pub address: String,
    pub chain: Chain,
    pub source_account_id: String,
    pub recorded_at: DateTime<Utc>,
}
