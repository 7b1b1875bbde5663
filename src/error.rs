//! 错误分类
//!
//! - 校验错误：在创建任何账户或移动资金之前拒绝，修正输入后可重试
//! - 规划错误：尚未移动资金，可安全地重试整个规划调用
//! - 执行错误：资金可能停留在中间账户，需要人工清扫，绝不自动重试

use crate::privacy::TransferStatus;

/// 引擎统一结果类型
pub type Result<T, E = PrivacyError> = std::result::Result<T, E>;

/// 引擎错误
#[derive(Debug, thiserror::Error)]
pub enum PrivacyError {
    #[error("请求校验失败: {0}")]
    Validation(#[from] ValidationError),

    #[error("路径规划失败: {0}")]
    Planning(#[from] PlanningError),

    #[error("转账执行失败: {0}")]
    Execution(#[from] ExecutionError),

    #[error("记录未找到: {0}")]
    NotFound(String),

    #[error("存储访问失败: {0}")]
    Storage(#[source] anyhow::Error),
}

impl PrivacyError {
    pub fn storage(err: anyhow::Error) -> Self {
        PrivacyError::Storage(err)
    }

    /// 是否可以原样重试（仅规划阶段的错误，此时资金尚未移动）
    pub fn safe_to_retry(&self) -> bool {
        matches!(self, PrivacyError::Planning(_))
    }
}

/// 请求校验错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("金额无效: {0}")]
    InvalidAmount(String),

    #[error("资产标识无效: {0}")]
    InvalidAsset(String),

    #[error("不支持的链: {0}")]
    UnsupportedChain(String),

    #[error("地址格式无效 ({chain}): {address}")]
    InvalidAddress { chain: String, address: String },

    #[error("源账户 {account_id} 属于 {account_chain}，请求的链为 {requested}")]
    ChainMismatch {
        account_id: String,
        account_chain: String,
        requested: String,
    },

    #[error("目标地址与源地址相同")]
    SelfTransfer,

    #[error("目标地址曾作为中间账户使用: {0}")]
    KnownIntermediary(String),

    #[error("金额不足以覆盖 {hop_count} 跳的手续费")]
    InsufficientAmount { hop_count: usize },

    #[error("隐私配置无效: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
}

/// 规划错误（资金尚未移动）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanningError {
    #[error("{chain} 手续费估算不可用: {reason}")]
    FeeUnavailable { chain: String, reason: String },

    #[error("临时账户创建中断: 已创建 {produced}/{requested}，原因: {reason}")]
    PartialAccountCreation {
        produced: usize,
        requested: usize,
        reason: String,
    },

    #[error("密钥生成失败: {0}")]
    KeyGeneration(String),
}

/// 执行错误（资金可能已停留在中间账户）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("第 {hop_index} 跳提交失败 (最后成功跳: {last_successful_hop:?}): {reason}")]
    HopFailed {
        hop_index: usize,
        last_successful_hop: Option<usize>,
        reason: String,
    },

    #[error("第 {hop_index} 跳确认超时 ({timeout_ms}ms)")]
    Timeout { hop_index: usize, timeout_ms: u64 },

    #[error("转账已取消")]
    Cancelled,

    #[error("转账 {transfer_id} 已处于终态 {status:?}")]
    TransferFinished {
        transfer_id: String,
        status: TransferStatus,
    },

    #[error("转账 {transfer_id} 在执行中断，需要人工核对链上状态")]
    TransferInterrupted { transfer_id: String },

    #[error("转账 {transfer_id} 正由其他执行者持有")]
    LeaseUnavailable { transfer_id: String },

    #[error("转账 {transfer_id} 的租约已被其他执行者取得")]
    LeaseLost { transfer_id: String },

    #[error("非法状态迁移: {from:?} -> {to:?}")]
    IllegalTransition {
        from: TransferStatus,
        to: TransferStatus,
    },
}
