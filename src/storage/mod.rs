//! 持久化接口
//!
//! 引擎通过 [`Repository`] 读写配置、临时账户、转账记录、执行租约和中间账户轮换日志。
//! 这里不包含业务逻辑。

use anyhow::Result;
use std::time::Duration;

use crate::privacy::{EphemeralAccount, PrivacyConfig, PrivacyTransfer, RotationEntry, SourceAccount};
use crate::types::Chain;

pub mod memory;

pub use memory::InMemoryRepository;

/// 统一存储接口
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// 查询源账户
    async fn get_source_account(&self, account_id: &str) -> Result<Option<SourceAccount>>;

    /// 查询账户隐私配置
    async fn get_privacy_config(&self, account_id: &str) -> Result<Option<PrivacyConfig>>;

    /// 保存账户隐私配置
    async fn save_privacy_config(&self, account_id: &str, config: &PrivacyConfig) -> Result<()>;

    /// 保存临时账户
    async fn save_ephemeral_account(&self, account: &EphemeralAccount) -> Result<()>;

    /// 按地址查询临时账户
    async fn get_ephemeral_account(&self, address: &str) -> Result<Option<EphemeralAccount>>;

    /// 列出全部临时账户
    async fn list_ephemeral_accounts(&self) -> Result<Vec<EphemeralAccount>>;

    /// 删除临时账户
    async fn delete_ephemeral_account(&self, address: &str) -> Result<()>;

    /// 保存转账记录
    async fn save_transfer(&self, transfer: &PrivacyTransfer) -> Result<()>;

    /// 查询转账记录
    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<PrivacyTransfer>>;

    /// 列出全部转账记录
    async fn list_transfers(&self) -> Result<Vec<PrivacyTransfer>>;

    /// 尝试获取转账的独占租约，租约在 ttl 后自动失效
    ///
    /// 只要存在未过期的租约就拒绝，持有者本人再次获取也会被拒绝。
    async fn try_acquire_lease(&self, transfer_id: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// 续期租约，租约已被他人取得时返回 false
    async fn renew_lease(&self, transfer_id: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// 释放租约（仅持有者可释放）
    async fn release_lease(&self, transfer_id: &str, holder: &str) -> Result<()>;

    /// 追加中间账户轮换记录
    async fn append_rotation(&self, entry: &RotationEntry) -> Result<()>;

    /// 地址是否出现在轮换日志中
    async fn rotation_contains(&self, chain: Chain, address: &str) -> Result<bool>;
}
