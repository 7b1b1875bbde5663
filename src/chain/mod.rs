//! 链适配层
//!
//! 规划器和执行器只依赖这里的窄接口，不直接依赖任何链 SDK。
//! 签名与广播由各链的 [`ChainAdapter`] 实现负责。

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::EncryptedSecret;
use crate::error::ValidationError;
use crate::types::{Amount, Chain};

pub mod history;
pub mod simulated;

pub use history::{CounterpartyTag, HistoryProvider, StaticHistoryProvider, TransferRecord};
pub use simulated::{SimulatedChain, SubmittedTransfer};

/// 签名密钥引用
///
/// 引擎只传递引用或密文，解密只发生在适配器签名的那一刻。
#[derive(Debug, Clone)]
pub enum SecretRef {
    /// 外部钱包管理的源账户
    SourceAccount { account_id: String },
    /// 引擎创建的临时账户
    Ephemeral {
        address: String,
        secret: EncryptedSecret,
    },
}

/// 上链回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub fee: Amount,
}

/// 链适配器 trait（用于抽象不同的区块链实现）
#[async_trait::async_trait]
pub trait ChainAdapter: Send + Sync {
    /// 适配器负责的链
    fn chain(&self) -> Chain;

    /// 提交转账并等待确认
    async fn submit_transfer(
        &self,
        from: &SecretRef,
        to_address: &str,
        amount: Amount,
        asset: &str,
    ) -> Result<TxReceipt>;

    /// 估算单笔转账手续费
    async fn estimate_fee(&self, chain: Chain, amount: Amount) -> Result<Amount>;
}

/// 按链查找适配器
#[derive(Clone, Default)]
pub struct ChainRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册适配器，同一条链后注册的覆盖先注册的
    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, chain: Chain) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain).cloned()
    }

    /// 获取适配器，未注册视为不支持的链
    pub fn require(&self, chain: Chain) -> Result<Arc<dyn ChainAdapter>, ValidationError> {
        self.get(chain)
            .ok_or_else(|| ValidationError::UnsupportedChain(chain.to_string()))
    }

    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.adapters.keys().copied().collect();
        chains.sort();
        chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ChaChaKeystore;

    #[test]
    fn test_registry_lookup() {
        let keystore = Arc::new(ChaChaKeystore::ephemeral());
        let registry = ChainRegistry::new()
            .with(Arc::new(SimulatedChain::new(Chain::Solana, Amount::ZERO, keystore)));

        assert!(registry.get(Chain::Solana).is_some());
        assert_eq!(
            registry.require(Chain::Ethereum).err(),
            Some(ValidationError::UnsupportedChain("ethereum".to_string()))
        );
        assert_eq!(registry.chains(), vec![Chain::Solana]);
    }
}
