//! 临时账户工厂
//!
//! 用新的随机熵生成一次性中间账户，私钥加密后落盘再返回。
//! 明文私钥只存在于 [`zeroize::Zeroizing`] 缓冲区中，不写日志。

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{EphemeralAccount, TransferStatus};
use crate::crypto::{self, Keystore};
use crate::error::{PlanningError, PrivacyError, Result, ValidationError};
use crate::storage::Repository;
use crate::types::Chain;

/// 默认有效期 24 小时
pub const DEFAULT_EPHEMERAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 临时账户工厂
#[derive(Clone)]
pub struct EphemeralAccountFactory {
    repository: Arc<dyn Repository>,
    keystore: Arc<dyn Keystore>,
    default_ttl: Duration,
    parallelism: usize,
}

impl EphemeralAccountFactory {
    pub fn new(repository: Arc<dyn Repository>, keystore: Arc<dyn Keystore>) -> Self {
        Self {
            repository,
            keystore,
            default_ttl: DEFAULT_EPHEMERAL_TTL,
            parallelism: 4,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// 批量创建时的并发上限（至少为 1）
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// 创建单个临时账户
    pub async fn create(&self, chain: Chain, ttl: Option<Duration>) -> Result<EphemeralAccount> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let lifetime = chrono::Duration::from_std(ttl).map_err(|_| {
            ValidationError::InvalidConfig(vec![format!("临时账户有效期过长: {}s", ttl.as_secs())])
        })?;

        let key = crypto::generate(chain)
            .map_err(|e| PlanningError::KeyGeneration(e.to_string()))?;
        let encrypted_secret = self
            .keystore
            .encrypt(&key.secret)
            .map_err(|e| PlanningError::KeyGeneration(format!("加密私钥失败: {}", e)))?;

        let created_at = Utc::now();
        let account = EphemeralAccount {
            address: key.address.clone(),
            encrypted_secret,
            chain,
            created_at,
            expires_at: created_at + lifetime,
            is_temporary: true,
        };

        self.repository
            .save_ephemeral_account(&account)
            .await
            .map_err(PrivacyError::storage)?;

        debug!("创建临时账户 {} ({})", account.address, chain);
        Ok(account)
    }

    /// 按顺序批量创建
    ///
    /// 第 i 个失败时，前 i 个账户已经落盘且有效，错误中报告已创建的数量。
    pub async fn create_many(
        &self,
        count: usize,
        chain: Chain,
        ttl: Option<Duration>,
    ) -> Result<Vec<EphemeralAccount>> {
        let mut results = stream::iter(0..count)
            .map(|_| self.create(chain, ttl))
            .buffered(self.parallelism);

        let mut accounts = Vec::with_capacity(count);
        while let Some(result) = results.next().await {
            match result {
                Ok(account) => accounts.push(account),
                Err(e) => {
                    warn!("临时账户创建中断: {}/{} - {}", accounts.len(), count, e);
                    return Err(PlanningError::PartialAccountCreation {
                        produced: accounts.len(),
                        requested: count,
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(accounts)
    }

    /// 回收过期且不再被未完成转账引用的临时账户，返回被删除的地址
    ///
    /// FAILED 转账的中间账户可能滞留资金，同样保留。
    pub async fn collect_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let transfers = self
            .repository
            .list_transfers()
            .await
            .map_err(PrivacyError::storage)?;
        let referenced: HashSet<String> = transfers
            .iter()
            .filter(|t| t.status != TransferStatus::Completed)
            .flat_map(|t| t.referenced_addresses().map(str::to_string))
            .collect();

        let accounts = self
            .repository
            .list_ephemeral_accounts()
            .await
            .map_err(PrivacyError::storage)?;

        let mut removed = Vec::new();
        for account in accounts {
            if !account.is_expired(now) || referenced.contains(&account.address) {
                continue;
            }
            self.repository
                .delete_ephemeral_account(&account.address)
                .await
                .map_err(PrivacyError::storage)?;
            removed.push(account.address);
        }

        if !removed.is_empty() {
            info!("回收 {} 个过期临时账户", removed.len());
        }
        Ok(removed)
    }
}
