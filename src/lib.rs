//! veilhop 库模块
//!
//! 多跳隐私转账引擎: 通过一次性中间账户、随机延迟和金额拆分执行转账，
//! 并对地址的历史转账做可追踪性分析。

pub mod analysis;
pub mod args;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod privacy;
pub mod storage;
pub mod types;

// 重新导出常用类型
pub use analysis::{RiskLevel, TrackingAnalysis, TrackingAnalyzer, WalletPrivacyReport};
pub use chain::{ChainAdapter, ChainRegistry, HistoryProvider, SecretRef, SimulatedChain, TxReceipt};
pub use config::{AppConfig, ConfigManager};
pub use engine::{PrivacyEngine, PrivacyEngineBuilder};
pub use error::{ExecutionError, PlanningError, PrivacyError, Result, ValidationError};
pub use privacy::{
    PrivacyConfig, PrivacyConfigOverride, PrivacyLevel, PrivacyTransfer, PrivacyTransferResult,
    TransferPlan, TransferRequest, TransferStatus,
};
pub use storage::{InMemoryRepository, Repository};
pub use types::{Amount, Chain};
