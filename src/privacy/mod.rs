//! 隐私转账模块
//!
//! 策略解析、临时账户工厂、路径规划与转账执行。
//! 数据流: 请求 → [`PolicyResolver`] → [`PathPlanner`]（使用 [`EphemeralAccountFactory`]）
//! → [`TransferExecutor`] → 结果。

pub mod ephemeral;
pub mod executor;
pub mod planner;
pub mod policy;
pub mod types;

pub use ephemeral::EphemeralAccountFactory;
pub use executor::{CancelFlag, ExecutorSettings, TransferExecutor};
pub use planner::{privacy_score, split_parts, PathPlanner, PlannerSettings, TransferRequest};
pub use policy::{apply_override, PolicyResolver};
pub use types::*;
