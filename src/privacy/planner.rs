//! 路径规划
//!
//! 把转账请求展开成有序的多跳计划: 源账户 → 临时账户… → 目标地址。
//! 所有校验和手续费计算都在创建临时账户之前完成，失败时不会留下任何账户。

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::ephemeral::EphemeralAccountFactory;
use super::policy::PolicyResolver;
use super::types::{
    PrivacyConfig, PrivacyConfigOverride, PrivacyLevel, RotationEntry, SourceAccount, TransferHop,
    TransferPlan,
};
use crate::chain::ChainRegistry;
use crate::crypto::{normalize_address, validate_address};
use crate::error::{PlanningError, PrivacyError, Result, ValidationError};
use crate::storage::Repository;
use crate::types::{Amount, Chain};

/// 转账请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub source_account_id: String,
    pub destination: String,
    pub amount: Amount,
    pub asset: String,
    pub chain: Chain,
    #[serde(default)]
    pub privacy_level: Option<PrivacyLevel>,
    #[serde(default)]
    pub hop_count: Option<u8>,
    #[serde(default)]
    pub split_count: Option<u8>,
}

impl TransferRequest {
    pub fn new(
        source_account_id: impl Into<String>,
        destination: impl Into<String>,
        amount: Amount,
        asset: impl Into<String>,
        chain: Chain,
    ) -> Self {
        Self {
            source_account_id: source_account_id.into(),
            destination: destination.into(),
            amount,
            asset: asset.into(),
            chain,
            privacy_level: None,
            hop_count: None,
            split_count: None,
        }
    }

    pub fn with_level(mut self, level: PrivacyLevel) -> Self {
        self.privacy_level = Some(level);
        self
    }

    pub fn with_hops(mut self, hops: u8) -> Self {
        self.hop_count = Some(hops);
        self
    }

    pub fn with_splits(mut self, splits: u8) -> Self {
        self.split_count = Some(splits);
        self
    }

    /// 请求中显式给出的策略参数
    pub fn config_override(&self) -> PrivacyConfigOverride {
        PrivacyConfigOverride {
            privacy_level: self.privacy_level,
            max_hops: self.hop_count,
            split_count: self.split_count,
            ..Default::default()
        }
    }
}

/// 规划参数
#[derive(Debug, Clone)]
pub struct PlannerSettings {
    /// 单跳预计确认时间
    pub estimated_confirmation: Duration,
    pub ephemeral_ttl: Option<Duration>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            estimated_confirmation: Duration::from_secs(2),
            ephemeral_ttl: None,
        }
    }
}

/// 隐私评分: 基础 50，跳数最多加 30，拆分最多加 20
///
/// 跳数不超过 1 时没有中间账户，与直接转账同分。
pub fn privacy_score(hop_count: u8, split_count: u8) -> u8 {
    let hop_count = if hop_count <= 1 { 0 } else { hop_count };
    let hops = (10 * hop_count as u32).min(30);
    let splits = (5 * split_count as u32).min(20);
    (50 + hops + splits).min(100) as u8
}

/// 把金额拆成 count 份，前 count-1 份取截断后的均值，最后一份取余下部分
pub fn split_parts(total: Amount, count: u8) -> Option<Vec<Amount>> {
    let count = count.max(1);
    let each = total.checked_div(count as u64)?;
    let head = each.checked_mul(count as u64 - 1)?;
    let last = total.checked_sub(head)?;

    let mut parts = vec![each; count as usize - 1];
    parts.push(last);
    Some(parts)
}

/// 一跳的金额分配（尚未分配地址）
struct Leg {
    gross: Amount,
    fee: Amount,
    parts: Vec<Amount>,
}

/// 路径规划器
#[derive(Clone)]
pub struct PathPlanner {
    repository: Arc<dyn Repository>,
    chains: ChainRegistry,
    policy: PolicyResolver,
    factory: EphemeralAccountFactory,
    settings: PlannerSettings,
}

impl PathPlanner {
    pub fn new(
        repository: Arc<dyn Repository>,
        chains: ChainRegistry,
        factory: EphemeralAccountFactory,
        settings: PlannerSettings,
    ) -> Self {
        Self {
            policy: PolicyResolver::new(repository.clone()),
            repository,
            chains,
            factory,
            settings,
        }
    }

    /// 解析策略并规划
    pub async fn plan(&self, request: &TransferRequest) -> Result<TransferPlan> {
        let overrides = request.config_override();
        let config = self
            .policy
            .resolve(&request.source_account_id, Some(&overrides))
            .await?;
        self.plan_with_config(request, &config).await
    }

    /// 使用已解析的配置规划
    pub async fn plan_with_config(
        &self,
        request: &TransferRequest,
        config: &PrivacyConfig,
    ) -> Result<TransferPlan> {
        let source = self.load_source(&request.source_account_id).await?;
        let destination = self.validate(request, &source, config).await?;

        let legs = config.max_hops.max(1) as usize;
        let allocation = self.allocate(request, config, legs).await?;

        let intermediaries = self
            .factory
            .create_many(legs - 1, request.chain, self.settings.ephemeral_ttl)
            .await?;
        for account in &intermediaries {
            self.repository
                .append_rotation(&RotationEntry {
                    address: account.address.clone(),
                    chain: request.chain,
                    source_account_id: source.account_id.clone(),
                    recorded_at: Utc::now(),
                })
                .await
                .map_err(PrivacyError::storage)?;
        }

        let mut path = Vec::with_capacity(legs + 1);
        path.push(source.address.clone());
        path.extend(intermediaries.iter().map(|a| a.address.clone()));
        path.push(destination);

        let mut rng = rand::rng();
        let hops: Vec<TransferHop> = allocation
            .into_iter()
            .enumerate()
            .map(|(index, leg)| {
                // 最后一跳不延迟
                let delay = if index + 1 == legs {
                    Duration::ZERO
                } else {
                    pick_delay(&mut rng, config)
                };
                TransferHop {
                    index,
                    from_address: path[index].clone(),
                    to_address: path[index + 1].clone(),
                    amount: leg.gross,
                    parts: leg.parts,
                    asset: request.asset.clone(),
                    estimated_fee: leg.fee,
                    delay,
                }
            })
            .collect();

        let total_estimated_fee = Amount::checked_sum(hops.iter().map(|h| h.estimated_fee))
            .ok_or_else(|| ValidationError::InvalidAmount(request.amount.to_string()))?;
        let delivered_amount = hops
            .last()
            .map(|h| h.delivered_amount())
            .unwrap_or_default();
        let total_estimated_time = hops.iter().map(|h| h.delay).sum::<Duration>()
            + self.settings.estimated_confirmation * legs as u32;

        let plan = TransferPlan {
            chain: request.chain,
            asset: request.asset.clone(),
            hop_count: config.max_hops,
            split_count: config.split_count,
            total_estimated_fee,
            total_estimated_time,
            privacy_score: privacy_score(config.max_hops, config.split_count),
            delivered_amount,
            hops,
        };

        info!(
            "规划完成: {} → {} 共 {} 跳, 手续费 {}, 评分 {}",
            source.account_id,
            request.destination,
            plan.hops.len(),
            plan.total_estimated_fee,
            plan.privacy_score
        );
        Ok(plan)
    }

    async fn load_source(&self, account_id: &str) -> Result<SourceAccount> {
        self.repository
            .get_source_account(account_id)
            .await
            .map_err(PrivacyError::storage)?
            .ok_or_else(|| PrivacyError::NotFound(format!("source account {}", account_id)))
    }

    /// 请求校验，返回规范化后的目标地址
    async fn validate(
        &self,
        request: &TransferRequest,
        source: &SourceAccount,
        config: &PrivacyConfig,
    ) -> Result<String> {
        let chain = request.chain;

        if request.amount.is_zero() {
            return Err(ValidationError::InvalidAmount(request.amount.to_string()).into());
        }
        if request.asset.trim().is_empty() {
            return Err(ValidationError::InvalidAsset(request.asset.clone()).into());
        }
        self.chains.require(chain)?;
        if source.chain != chain {
            return Err(ValidationError::ChainMismatch {
                account_id: source.account_id.clone(),
                account_chain: source.chain.to_string(),
                requested: chain.to_string(),
            }
            .into());
        }
        if !validate_address(chain, request.destination.trim()) {
            return Err(ValidationError::InvalidAddress {
                chain: chain.to_string(),
                address: request.destination.clone(),
            }
            .into());
        }

        let destination = normalize_address(chain, &request.destination);
        if destination == normalize_address(chain, &source.address) {
            return Err(ValidationError::SelfTransfer.into());
        }
        if config.avoid_known_tracking
            && self
                .repository
                .rotation_contains(chain, &destination)
                .await
                .map_err(PrivacyError::storage)?
        {
            return Err(ValidationError::KnownIntermediary(destination).into());
        }

        Ok(destination)
    }

    /// 手续费与金额分配
    async fn allocate(
        &self,
        request: &TransferRequest,
        config: &PrivacyConfig,
        legs: usize,
    ) -> Result<Vec<Leg>> {
        let chain = request.chain;
        let adapter = self.chains.require(chain)?;
        let splits = config.split_count.max(1);
        let insufficient = || ValidationError::InsufficientAmount { hop_count: legs };

        let mut remaining = request.amount;
        let mut allocation = Vec::with_capacity(legs);
        for index in 0..legs {
            let probe = remaining.checked_div(splits as u64).unwrap_or_default();
            let per_part = adapter.estimate_fee(chain, probe).await.map_err(|e| {
                PlanningError::FeeUnavailable {
                    chain: chain.to_string(),
                    reason: e.to_string(),
                }
            })?;
            let fee = per_part.checked_mul(splits as u64).ok_or_else(insufficient)?;

            let delivered = remaining
                .checked_sub(fee)
                .filter(|d| !d.is_zero())
                .ok_or_else(insufficient)?;
            let parts = split_parts(delivered, splits).ok_or_else(insufficient)?;
            if parts.iter().any(Amount::is_zero) {
                return Err(insufficient().into());
            }

            debug!("第 {} 跳: 总额 {} 手续费 {} 到账 {}", index, remaining, fee, delivered);
            allocation.push(Leg {
                gross: remaining,
                fee,
                parts,
            });
            remaining = delivered;
        }
        Ok(allocation)
    }
}

fn pick_delay(rng: &mut impl Rng, config: &PrivacyConfig) -> Duration {
    let min = config.min_delay.as_millis() as u64;
    let max = config.max_delay.as_millis() as u64;
    if !config.use_random_path || max <= min {
        return config.min_delay;
    }
    Duration::from_millis(rng.random_range(min..=max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SimulatedChain;
    use crate::crypto::{generate, ChaChaKeystore};
    use crate::storage::InMemoryRepository;

    struct Fixture {
        planner: PathPlanner,
        repo: InMemoryRepository,
        sim: Arc<SimulatedChain>,
        source_address: String,
    }

    fn fixture(fee: &str) -> Fixture {
        let repo = InMemoryRepository::new();
        let keystore = Arc::new(ChaChaKeystore::ephemeral());
        let sim = Arc::new(SimulatedChain::new(
            Chain::Solana,
            fee.parse().unwrap(),
            keystore.clone(),
        ));
        let source_address = generate(Chain::Solana).unwrap().address;
        repo.insert_source_account(SourceAccount {
            account_id: "alice".to_string(),
            chain: Chain::Solana,
            address: source_address.clone(),
        })
        .unwrap();

        let shared: Arc<dyn Repository> = Arc::new(repo.clone());
        let factory = EphemeralAccountFactory::new(shared.clone(), keystore);
        let planner = PathPlanner::new(
            shared,
            ChainRegistry::new().with(sim.clone()),
            factory,
            PlannerSettings::default(),
        );
        Fixture {
            planner,
            repo,
            sim,
            source_address,
        }
    }

    fn request(amount: &str) -> TransferRequest {
        TransferRequest::new(
            "alice",
            generate(Chain::Solana).unwrap().address,
            amount.parse().unwrap(),
            "SOL",
            Chain::Solana,
        )
    }

    #[test]
    fn test_privacy_score_bounds() {
        assert_eq!(privacy_score(0, 1), 55);
        assert_eq!(privacy_score(1, 1), 55);
        assert_eq!(privacy_score(2, 2), 80);
        assert_eq!(privacy_score(4, 4), 100);
        assert_eq!(privacy_score(10, 16), 100);

        let mut last = 0;
        for hops in 0..=10 {
            let score = privacy_score(hops, 1);
            assert!(score >= last);
            last = score;
        }
    }

    #[test]
    fn test_split_parts_sum_exactly() {
        let total: Amount = "10".parse().unwrap();
        let parts = split_parts(total, 3).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], parts[1]);
        assert_eq!(Amount::checked_sum(parts), Some(total));
    }

    #[tokio::test]
    async fn test_two_hop_plan_conserves_value() {
        let fx = fixture("0.1");
        let req = request("10").with_hops(2).with_splits(1);
        let plan = fx.planner.plan(&req).await.unwrap();

        assert_eq!(plan.hops.len(), 2);
        assert_eq!(plan.hops[0].from_address, fx.source_address);
        assert_eq!(plan.hops[1].to_address, req.destination);
        assert_eq!(plan.hops[0].to_address, plan.hops[1].from_address);
        assert_eq!(plan.delivered_amount.to_string(), "9.8");
        assert_eq!(plan.total_estimated_fee.to_string(), "0.2");
        assert_eq!(
            plan.delivered_amount.checked_add(plan.total_estimated_fee),
            Some(req.amount)
        );
        assert_eq!(plan.hops[1].delay, Duration::ZERO);
        assert_eq!(fx.repo.rotation_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_low_level_is_single_direct_hop() {
        let fx = fixture("0.1");
        let req = request("10").with_level(PrivacyLevel::Low);
        let plan = fx.planner.plan(&req).await.unwrap();

        assert_eq!(plan.hops.len(), 1);
        assert_eq!(plan.privacy_score, 55);
        assert_eq!(plan.hops[0].to_address, req.destination);
        assert!(fx.repo.list_ephemeral_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_hop_scores_as_direct() {
        let fx = fixture("0.1");
        let req = request("10").with_hops(1).with_splits(1);
        let plan = fx.planner.plan(&req).await.unwrap();

        assert_eq!(plan.hops.len(), 1);
        assert!(plan.intermediaries().is_empty());
        assert_eq!(plan.privacy_score, 55);
    }

    #[tokio::test]
    async fn test_split_fees_scale_with_parts() {
        let fx = fixture("0.01");
        let req = request("3").with_hops(3).with_splits(4);
        let plan = fx.planner.plan(&req).await.unwrap();

        for hop in &plan.hops {
            assert_eq!(hop.parts.len(), 4);
            assert_eq!(hop.estimated_fee.to_string(), "0.04");
            assert_eq!(Amount::checked_sum(hop.parts.clone()), Some(hop.delivered_amount()));
        }
        assert_eq!(plan.delivered_amount.to_string(), "2.88");
    }

    #[tokio::test]
    async fn test_insufficient_amount_creates_no_accounts() {
        let fx = fixture("0.1");
        let req = request("0.3").with_hops(3).with_splits(1);
        let err = fx.planner.plan(&req).await.unwrap_err();

        assert!(matches!(
            err,
            PrivacyError::Validation(ValidationError::InsufficientAmount { hop_count: 3 })
        ));
        assert!(fx.repo.list_ephemeral_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_validation() {
        let fx = fixture("0.1");

        let zero = request("0");
        assert!(matches!(
            fx.planner.plan(&zero).await,
            Err(PrivacyError::Validation(ValidationError::InvalidAmount(_)))
        ));

        let mut bad_address = request("1");
        bad_address.destination = "0xnot-a-solana-address".to_string();
        assert!(matches!(
            fx.planner.plan(&bad_address).await,
            Err(PrivacyError::Validation(ValidationError::InvalidAddress { .. }))
        ));

        let mut to_self = request("1");
        to_self.destination = fx.source_address.clone();
        assert!(matches!(
            fx.planner.plan(&to_self).await,
            Err(PrivacyError::Validation(ValidationError::SelfTransfer))
        ));

        let mut no_asset = request("1");
        no_asset.asset = " ".to_string();
        assert!(matches!(
            fx.planner.plan(&no_asset).await,
            Err(PrivacyError::Validation(ValidationError::InvalidAsset(_)))
        ));

        let mut other_chain = request("1");
        other_chain.chain = Chain::Ethereum;
        assert!(matches!(
            fx.planner.plan(&other_chain).await,
            Err(PrivacyError::Validation(ValidationError::UnsupportedChain(_)))
        ));
    }

    #[tokio::test]
    async fn test_known_intermediary_rejected() {
        let fx = fixture("0.1");
        let plan = fx.planner.plan(&request("10").with_hops(2)).await.unwrap();
        let used = plan.intermediaries()[0].to_string();

        let mut reuse = request("1");
        reuse.destination = used.clone();
        assert!(matches!(
            fx.planner.plan(&reuse).await,
            Err(PrivacyError::Validation(ValidationError::KnownIntermediary(addr))) if addr == used
        ));

        // 关闭检查后允许
        let config = PrivacyConfig {
            avoid_known_tracking: false,
            ..PrivacyConfig::default()
        };
        assert!(fx.planner.plan_with_config(&reuse, &config).await.is_ok());
    }

    #[tokio::test]
    async fn test_fee_unavailable_is_planning_error() {
        let fx = fixture("0.1");
        fx.sim.set_fee_unavailable(true);
        let err = fx.planner.plan(&request("1")).await.unwrap_err();
        assert!(err.safe_to_retry());
        assert!(matches!(err, PrivacyError::Planning(PlanningError::FeeUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_fixed_delay_without_random_path() {
        let fx = fixture("0.1");
        let config = PrivacyConfig {
            max_hops: 3,
            use_random_path: false,
            min_delay: Duration::from_millis(1500),
            max_delay: Duration::from_millis(4000),
            ..PrivacyConfig::default()
        };
        let plan = fx.planner.plan_with_config(&request("10"), &config).await.unwrap();
        let delays: Vec<_> = plan.hops.iter().map(|h| h.delay).collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(1500), Duration::from_millis(1500), Duration::ZERO]
        );
        assert_eq!(plan.total_estimated_time, Duration::from_millis(3000 + 3 * 2000));
    }
}
