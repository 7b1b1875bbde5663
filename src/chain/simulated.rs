//! 模拟链
//!
//! 单链、内存账本的 [`ChainAdapter`] 实现，用于测试和命令行演示。
//! 手续费为固定值，每笔子转账从发送方额外扣除一次手续费。

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{ChainAdapter, SecretRef, TxReceipt};
use crate::crypto::{address_from_secret, Keystore};
use crate::types::{Amount, Chain};

/// 已上链的子转账
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransfer {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub amount: Amount,
    pub asset: String,
    pub fee: Amount,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Default)]
struct Ledger {
    /// (地址, 资产) → 余额
    balances: HashMap<(String, String), Amount>,
    /// 源账户 ID → 地址
    sources: HashMap<String, String>,
    submissions: Vec<SubmittedTransfer>,
    /// 已尝试的提交次数（含失败）
    attempts: usize,
    fail_at: Option<usize>,
    fee_unavailable: bool,
}

/// 模拟链适配器
pub struct SimulatedChain {
    chain: Chain,
    fee: Amount,
    latency: Duration,
    keystore: Arc<dyn Keystore>,
    ledger: Mutex<Ledger>,
}

impl SimulatedChain {
    pub fn new(chain: Chain, fee: Amount, keystore: Arc<dyn Keystore>) -> Self {
        Self {
            chain,
            fee,
            latency: Duration::ZERO,
            keystore,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// 设置每笔提交的确认耗时
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 登记源账户地址
    pub fn register_source(&self, account_id: &str, address: &str) {
        self.ledger
            .lock()
            .sources
            .insert(account_id.to_string(), address.to_string());
    }

    /// 给地址充值
    pub fn fund(&self, address: &str, asset: &str, amount: Amount) {
        let mut ledger = self.ledger.lock();
        let balance = ledger
            .balances
            .entry((address.to_string(), asset.to_string()))
            .or_default();
        *balance = balance.checked_add(amount).unwrap_or(*balance);
    }

    pub fn balance(&self, address: &str, asset: &str) -> Amount {
        self.ledger
            .lock()
            .balances
            .get(&(address.to_string(), asset.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// 第 n 次提交（从 0 计）失败
    pub fn fail_submission_at(&self, attempt: usize) {
        self.ledger.lock().fail_at = Some(attempt);
    }

    pub fn set_fee_unavailable(&self, unavailable: bool) {
        self.ledger.lock().fee_unavailable = unavailable;
    }

    pub fn submissions(&self) -> Vec<SubmittedTransfer> {
        self.ledger.lock().submissions.clone()
    }

    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// 解析签名方地址，临时账户需要确认密文确实对应声明的地址
    fn resolve_sender(&self, from: &SecretRef) -> Result<String> {
        match from {
            SecretRef::SourceAccount { account_id } => self
                .ledger
                .lock()
                .sources
                .get(account_id)
                .cloned()
                .ok_or_else(|| anyhow!("unknown source account {}", account_id)),
            SecretRef::Ephemeral { address, secret } => {
                let plaintext = self.keystore.decrypt(secret)?;
                let derived = address_from_secret(self.chain, &plaintext)?;
                if &derived != address {
                    bail!("secret does not control {}", address);
                }
                Ok(derived)
            }
        }
    }
}

#[async_trait::async_trait]
impl ChainAdapter for SimulatedChain {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn submit_transfer(
        &self,
        from: &SecretRef,
        to_address: &str,
        amount: Amount,
        asset: &str,
    ) -> Result<TxReceipt> {
        let sender = self.resolve_sender(from)?;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut ledger = self.ledger.lock();
        let attempt = ledger.attempts;
        ledger.attempts += 1;
        if ledger.fail_at == Some(attempt) {
            bail!("{} rejected submission #{}", self.chain, attempt);
        }

        let debit = amount
            .checked_add(self.fee)
            .ok_or_else(|| anyhow!("amount overflow"))?;
        let sender_key = (sender.clone(), asset.to_string());
        let available = ledger.balances.get(&sender_key).copied().unwrap_or_default();
        let left = available.checked_sub(debit).ok_or_else(|| {
            anyhow!(
                "insufficient {} balance at {}: have {}, need {}",
                asset,
                sender,
                available,
                debit
            )
        })?;
        ledger.balances.insert(sender_key, left);

        let receiver = ledger
            .balances
            .entry((to_address.to_string(), asset.to_string()))
            .or_default();
        *receiver = receiver
            .checked_add(amount)
            .ok_or_else(|| anyhow!("balance overflow at {}", to_address))?;

        let mut hasher = Keccak256::new();
        hasher.update(self.chain.as_str().as_bytes());
        hasher.update(sender.as_bytes());
        hasher.update(to_address.as_bytes());
        hasher.update(amount.units().to_be_bytes());
        hasher.update((attempt as u64).to_be_bytes());
        let tx_hash = format!("0x{}", hex::encode(hasher.finalize()));

        ledger.submissions.push(SubmittedTransfer {
            tx_hash: tx_hash.clone(),
            from: sender,
            to: to_address.to_string(),
            amount,
            asset: asset.to_string(),
            fee: self.fee,
            submitted_at: Utc::now(),
        });

        Ok(TxReceipt {
            tx_hash,
            fee: self.fee,
        })
    }

    async fn estimate_fee(&self, chain: Chain, _amount: Amount) -> Result<Amount> {
        if chain != self.chain {
            bail!("adapter for {} cannot estimate {} fees", self.chain, chain);
        }
        if self.ledger.lock().fee_unavailable {
            bail!("{} fee oracle unavailable", self.chain);
        }
        Ok(self.fee)
    }
}
