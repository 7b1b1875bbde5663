//! 转账执行器
//!
//! 按计划逐跳执行并驱动状态机 PENDING → IN_PROGRESS → {COMPLETED | FAILED}。
//! 执行器是 `status` 和 `executed_hops` 的唯一写入者；同一转账由仓库租约保证单写。
//! 失败后不做补偿，也不自动重试，返回的 [`SweepNotice`] 指出可能滞留资金的地址。

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::planner::TransferRequest;
use super::types::{
    ExecutedHop, PrivacyTransfer, PrivacyTransferResult, SweepNotice, TransferHop, TransferPlan,
    TransferStatus,
};
use crate::chain::{ChainAdapter, ChainRegistry, SecretRef};
use crate::error::{ExecutionError, PrivacyError, Result};
use crate::storage::Repository;

/// 取消标志（可跨任务共享）
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 执行参数
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// 单笔子转账的确认超时
    pub confirmation_timeout: Duration,
    /// 执行租约有效期，进程崩溃后租约自动过期
    pub lease_ttl: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(60),
            lease_ttl: Duration::from_secs(600),
        }
    }
}

/// 一跳执行失败
struct HopFailure {
    error: ExecutionError,
    /// 本跳已经（或可能已经）到账的子转账数
    parts_sent: usize,
}

/// 转账执行器
#[derive(Clone)]
pub struct TransferExecutor {
    repository: Arc<dyn Repository>,
    chains: ChainRegistry,
    settings: ExecutorSettings,
    /// 执行器标识，作为租约令牌前缀
    holder_id: String,
}

impl TransferExecutor {
    pub fn new(repository: Arc<dyn Repository>, chains: ChainRegistry, settings: ExecutorSettings) -> Self {
        Self {
            repository,
            chains,
            settings,
            holder_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// 创建 PENDING 转账记录
    pub async fn start(&self, plan: &TransferPlan, request: &TransferRequest) -> Result<PrivacyTransfer> {
        let transfer = PrivacyTransfer {
            transfer_id: uuid::Uuid::new_v4().to_string(),
            source_account_id: request.source_account_id.clone(),
            destination_address: plan
                .hops
                .last()
                .map(|hop| hop.to_address.clone())
                .unwrap_or_else(|| request.destination.clone()),
            amount: request.amount,
            asset: request.asset.clone(),
            chain: request.chain,
            status: TransferStatus::Pending,
            privacy_score: plan.privacy_score,
            planned_hops: plan.hops.clone(),
            executed_hops: Vec::new(),
            start_time: Utc::now(),
            completed_time: None,
            error_message: None,
            failed_hop_index: None,
        };

        self.repository
            .save_transfer(&transfer)
            .await
            .map_err(PrivacyError::storage)?;
        info!(
            "转账 {} 已创建: {} 跳, 评分 {}",
            transfer.transfer_id,
            transfer.planned_hops.len(),
            transfer.privacy_score
        );
        Ok(transfer)
    }

    /// 创建并立即执行
    pub async fn execute(
        &self,
        plan: &TransferPlan,
        request: &TransferRequest,
        cancel: &CancelFlag,
    ) -> Result<PrivacyTransferResult> {
        let transfer = self.start(plan, request).await?;
        self.run(&transfer.transfer_id, cancel).await
    }

    /// 执行已创建的转账
    ///
    /// 每次调用使用独立的租约令牌，同一执行器上的并发调用也互斥。
    pub async fn run(&self, transfer_id: &str, cancel: &CancelFlag) -> Result<PrivacyTransferResult> {
        let lease = format!("{}/{}", self.holder_id, uuid::Uuid::new_v4());
        let acquired = self
            .repository
            .try_acquire_lease(transfer_id, &lease, self.settings.lease_ttl)
            .await
            .map_err(PrivacyError::storage)?;
        if !acquired {
            return Err(ExecutionError::LeaseUnavailable {
                transfer_id: transfer_id.to_string(),
            }
            .into());
        }

        let result = self.run_leased(transfer_id, &lease, cancel).await;

        if let Err(e) = self.repository.release_lease(transfer_id, &lease).await {
            warn!("释放转账 {} 租约失败: {}", transfer_id, e);
        }
        result
    }

    async fn run_leased(
        &self,
        transfer_id: &str,
        lease: &str,
        cancel: &CancelFlag,
    ) -> Result<PrivacyTransferResult> {
        let mut transfer = self
            .repository
            .get_transfer(transfer_id)
            .await
            .map_err(PrivacyError::storage)?
            .ok_or_else(|| PrivacyError::NotFound(format!("transfer {}", transfer_id)))?;

        match transfer.status {
            TransferStatus::Pending => {}
            TransferStatus::InProgress => {
                return Err(ExecutionError::TransferInterrupted {
                    transfer_id: transfer_id.to_string(),
                }
                .into())
            }
            status => {
                return Err(ExecutionError::TransferFinished {
                    transfer_id: transfer_id.to_string(),
                    status,
                }
                .into())
            }
        }

        let adapter = self.chains.require(transfer.chain)?;
        let hops = transfer.planned_hops.clone();

        for hop in &hops {
            if let Some(reason) = self.interruption(transfer_id, lease, cancel).await? {
                return self.abort(transfer, hop, reason).await;
            }
            if !hop.delay.is_zero() {
                debug!("转账 {} 第 {} 跳等待 {:?}", transfer_id, hop.index, hop.delay);
                tokio::time::sleep(hop.delay).await;
            }
            if let Some(reason) = self.interruption(transfer_id, lease, cancel).await? {
                return self.abort(transfer, hop, reason).await;
            }

            // 第一笔提交之前才进入 IN_PROGRESS
            if transfer.status == TransferStatus::Pending {
                transfer.transition(TransferStatus::InProgress)?;
                self.persist(&transfer).await?;
                info!("转账 {} 开始执行", transfer_id);
            }

            let outcome = match self.secret_for(&transfer, hop).await {
                Ok(from) => self.submit_hop(adapter.as_ref(), &from, hop, &transfer).await,
                Err(error) => Err(HopFailure { error, parts_sent: 0 }),
            };

            match outcome {
                Ok(tx_hashes) => {
                    transfer.record_hop(ExecutedHop {
                        hop_index: hop.index,
                        tx_hashes,
                        executed_at: Utc::now(),
                    })?;
                    self.persist(&transfer).await?;
                    debug!("转账 {} 第 {} 跳完成", transfer_id, hop.index);
                }
                Err(failure) => return self.fail(transfer, hop, failure).await,
            }
        }

        transfer.transition(TransferStatus::Completed)?;
        transfer.completed_time = Some(Utc::now());
        self.persist(&transfer).await?;
        info!("转账 {} 完成, 共 {} 跳", transfer_id, transfer.executed_hops.len());

        Ok(PrivacyTransferResult { transfer, sweep: None })
    }

    /// 检查取消标志并续期租约，需要停止时返回原因
    async fn interruption(
        &self,
        transfer_id: &str,
        lease: &str,
        cancel: &CancelFlag,
    ) -> Result<Option<ExecutionError>> {
        if cancel.is_cancelled() {
            return Ok(Some(ExecutionError::Cancelled));
        }
        let renewed = self
            .repository
            .renew_lease(transfer_id, lease, self.settings.lease_ttl)
            .await
            .map_err(PrivacyError::storage)?;
        if !renewed {
            warn!("转账 {} 租约续期被拒绝", transfer_id);
            return Ok(Some(ExecutionError::LeaseLost {
                transfer_id: transfer_id.to_string(),
            }));
        }
        Ok(None)
    }

    /// 解析本跳的签名密钥
    async fn secret_for(&self, transfer: &PrivacyTransfer, hop: &TransferHop) -> Result<SecretRef, ExecutionError> {
        if hop.index == 0 {
            return Ok(SecretRef::SourceAccount {
                account_id: transfer.source_account_id.clone(),
            });
        }

        let hop_failed = |reason: String| ExecutionError::HopFailed {
            hop_index: hop.index,
            last_successful_hop: transfer.last_successful_hop(),
            reason,
        };
        let account = self
            .repository
            .get_ephemeral_account(&hop.from_address)
            .await
            .map_err(|e| hop_failed(format!("读取临时账户失败: {}", e)))?
            .ok_or_else(|| hop_failed(format!("临时账户 {} 不存在", hop.from_address)))?;

        Ok(SecretRef::Ephemeral {
            address: account.address,
            secret: account.encrypted_secret,
        })
    }

    /// 依次提交本跳的全部子转账
    async fn submit_hop(
        &self,
        adapter: &dyn ChainAdapter,
        from: &SecretRef,
        hop: &TransferHop,
        transfer: &PrivacyTransfer,
    ) -> std::result::Result<Vec<String>, HopFailure> {
        let timeout = self.settings.confirmation_timeout;
        let mut tx_hashes = Vec::with_capacity(hop.parts.len());

        for part in &hop.parts {
            let submission = adapter.submit_transfer(from, &hop.to_address, *part, &hop.asset);
            let error = match tokio::time::timeout(timeout, submission).await {
                Ok(Ok(receipt)) => {
                    tx_hashes.push(receipt.tx_hash);
                    continue;
                }
                Ok(Err(e)) => ExecutionError::HopFailed {
                    hop_index: hop.index,
                    last_successful_hop: transfer.last_successful_hop(),
                    reason: format!("{:#}", e),
                },
                Err(_) => {
                    // 超时的子转账可能已经上链，按已到账处理
                    return Err(HopFailure {
                        error: ExecutionError::Timeout {
                            hop_index: hop.index,
                            timeout_ms: timeout.as_millis() as u64,
                        },
                        parts_sent: tx_hashes.len() + 1,
                    });
                }
            };
            return Err(HopFailure {
                error,
                parts_sent: tx_hashes.len(),
            });
        }
        Ok(tx_hashes)
    }

    /// 中止: 尚未开始则保持 PENDING 并返回错误，已开始则视为失败
    async fn abort(
        &self,
        transfer: PrivacyTransfer,
        hop: &TransferHop,
        reason: ExecutionError,
    ) -> Result<PrivacyTransferResult> {
        if transfer.status == TransferStatus::Pending {
            info!("转账 {} 在第一跳前中止: {}", transfer.transfer_id, reason);
            return Err(reason.into());
        }
        let failure = HopFailure {
            error: reason,
            parts_sent: 0,
        };
        self.fail(transfer, hop, failure).await
    }

    async fn fail(
        &self,
        mut transfer: PrivacyTransfer,
        hop: &TransferHop,
        failure: HopFailure,
    ) -> Result<PrivacyTransferResult> {
        transfer.transition(TransferStatus::Failed)?;
        transfer.error_message = Some(failure.error.to_string());
        transfer.failed_hop_index = Some(hop.index);
        self.persist(&transfer).await?;

        warn!(
            "转账 {} 在第 {} 跳失败: {}",
            transfer.transfer_id, hop.index, failure.error
        );

        let last_hop = transfer.planned_hops.len().saturating_sub(1);
        let mut addresses = Vec::new();
        if hop.index > 0 {
            addresses.push(hop.from_address.clone());
        }
        if failure.parts_sent > 0 && hop.index < last_hop {
            addresses.push(hop.to_address.clone());
        }

        let sweep = (!addresses.is_empty()).then(|| SweepNotice {
            chain: transfer.chain,
            addresses,
            last_successful_hop: transfer.last_successful_hop(),
            reason: failure.error.to_string(),
        });

        Ok(PrivacyTransferResult { transfer, sweep })
    }

    async fn persist(&self, transfer: &PrivacyTransfer) -> Result<()> {
        self.repository
            .save_transfer(transfer)
            .await
            .map_err(PrivacyError::storage)
    }
}
