//! 内存存储实现
//!
//! 记录以 JSON 序列化后按带前缀的键保存，与真实 KV 存储的行为保持一致。

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::Repository;
use crate::privacy::{EphemeralAccount, PrivacyConfig, PrivacyTransfer, RotationEntry, SourceAccount};
use crate::types::Chain;

const SOURCE_PREFIX: &str = "source:";
const CONFIG_PREFIX: &str = "config:";
const EPHEMERAL_PREFIX: &str = "ephemeral:";
const TRANSFER_PREFIX: &str = "transfer:";

/// 执行租约
struct Lease {
    holder: String,
    expires_at: Instant,
}

/// 内存存储（用于测试和命令行演示）
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    /// 内部存储
    storage: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// 转账租约
    leases: Arc<RwLock<HashMap<String, Lease>>>,
    /// 轮换日志（只追加）
    rotation_log: Arc<RwLock<Vec<RotationEntry>>>,
}

impl InMemoryRepository {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入源账户（源账户由钱包层维护，这里仅用于初始化）
    pub fn insert_source_account(&self, account: SourceAccount) -> Result<()> {
        self.put(&format!("{}{}", SOURCE_PREFIX, account.account_id), &account)
    }

    /// 轮换日志快照
    pub fn rotation_entries(&self) -> Vec<RotationEntry> {
        self.rotation_log.read().clone()
    }

    /// 获取存储大小
    pub fn size(&self) -> usize {
        self.storage.read().len()
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| anyhow!("序列化失败 {}: {}", key, e))?;
        self.storage.write().insert(key.to_string(), bytes);
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let storage = self.storage.read();
        match storage.get(key) {
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| anyhow!("反序列化失败 {}: {}", key, e)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let storage = self.storage.read();
        storage
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, bytes)| {
                serde_json::from_slice(bytes).map_err(|e| anyhow!("反序列化失败 {}: {}", key, e))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Repository for InMemoryRepository {
    async fn get_source_account(&self, account_id: &str) -> Result<Option<SourceAccount>> {
        self.fetch(&format!("{}{}", SOURCE_PREFIX, account_id))
    }

    async fn get_privacy_config(&self, account_id: &str) -> Result<Option<PrivacyConfig>> {
        self.fetch(&format!("{}{}", CONFIG_PREFIX, account_id))
    }

    async fn save_privacy_config(&self, account_id: &str, config: &PrivacyConfig) -> Result<()> {
        self.put(&format!("{}{}", CONFIG_PREFIX, account_id), config)
    }

    async fn save_ephemeral_account(&self, account: &EphemeralAccount) -> Result<()> {
        self.put(&format!("{}{}", EPHEMERAL_PREFIX, account.address), account)
    }

    async fn get_ephemeral_account(&self, address: &str) -> Result<Option<EphemeralAccount>> {
        self.fetch(&format!("{}{}", EPHEMERAL_PREFIX, address))
    }

    async fn list_ephemeral_accounts(&self) -> Result<Vec<EphemeralAccount>> {
        self.scan(EPHEMERAL_PREFIX)
    }

    async fn delete_ephemeral_account(&self, address: &str) -> Result<()> {
        self.storage
            .write()
            .remove(&format!("{}{}", EPHEMERAL_PREFIX, address));
        Ok(())
    }

    async fn save_transfer(&self, transfer: &PrivacyTransfer) -> Result<()> {
        self.put(&format!("{}{}", TRANSFER_PREFIX, transfer.transfer_id), transfer)
    }

    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<PrivacyTransfer>> {
        self.fetch(&format!("{}{}", TRANSFER_PREFIX, transfer_id))
    }

    async fn list_transfers(&self) -> Result<Vec<PrivacyTransfer>> {
        self.scan(TRANSFER_PREFIX)
    }

    async fn try_acquire_lease(&self, transfer_id: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut leases = self.leases.write();
        let now = Instant::now();

        if leases.get(transfer_id).is_some_and(|lease| lease.expires_at > now) {
            return Ok(false);
        }

        leases.insert(
            transfer_id.to_string(),
            Lease {
                holder: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn renew_lease(&self, transfer_id: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut leases = self.leases.write();
        match leases.get_mut(transfer_id) {
            Some(lease) if lease.holder == holder => {
                lease.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lease(&self, transfer_id: &str, holder: &str) -> Result<()> {
        let mut leases = self.leases.write();
        if leases.get(transfer_id).map(|l| l.holder == holder).unwrap_or(false) {
            leases.remove(transfer_id);
        }
        Ok(())
    }

    async fn append_rotation(&self, entry: &RotationEntry) -> Result<()> {
        self.rotation_log.write().push(entry.clone());
        Ok(())
    }

    async fn rotation_contains(&self, chain: Chain, address: &str) -> Result<bool> {
        Ok(self
            .rotation_log
            .read()
            .iter()
            .any(|entry| entry.chain == chain && entry.address == address))
    }
}
