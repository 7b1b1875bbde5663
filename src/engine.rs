//! 隐私转账引擎
//!
//! 对外暴露的统一入口，组合策略解析、路径规划、转账执行和追踪风险分析。
//! 引擎可以 `Clone` 后在多个任务间共享，不同源账户的转账完全并行。

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::analysis::{
    AnalyzerSettings, PrivacyReportGenerator, TrackingAnalysis, TrackingAnalyzer, WalletPrivacyReport,
};
use crate::chain::{ChainAdapter, ChainRegistry, HistoryProvider, StaticHistoryProvider};
use crate::config::{AppConfig, EngineConfig};
use crate::crypto::{ChaChaKeystore, Keystore};
use crate::error::{ExecutionError, PrivacyError, Result, ValidationError};
use crate::privacy::{
    apply_override, CancelFlag, EphemeralAccountFactory, PathPlanner, PolicyResolver, PrivacyConfig,
    PrivacyConfigOverride, PrivacyTransfer, PrivacyTransferResult, TransferExecutor, TransferPlan,
    TransferRequest,
};
use crate::storage::{InMemoryRepository, Repository};
use crate::types::Chain;

/// 引擎构建器
pub struct PrivacyEngineBuilder {
    repository: Option<Arc<dyn Repository>>,
    keystore: Option<Arc<dyn Keystore>>,
    history: Option<Arc<dyn HistoryProvider>>,
    chains: ChainRegistry,
    engine: EngineConfig,
    analyzer: AnalyzerSettings,
}

impl Default for PrivacyEngineBuilder {
    fn default() -> Self {
        Self {
            repository: None,
            keystore: None,
            history: None,
            chains: ChainRegistry::new(),
            engine: EngineConfig::default(),
            analyzer: AnalyzerSettings::default(),
        }
    }
}

impl PrivacyEngineBuilder {
    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn keystore(mut self, keystore: Arc<dyn Keystore>) -> Self {
        self.keystore = Some(keystore);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryProvider>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn chain(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.chains.register(adapter);
        self
    }

    pub fn engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn analyzer_settings(mut self, analyzer: AnalyzerSettings) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// 使用应用配置中的引擎与分析器段落
    pub fn app_config(self, config: &AppConfig) -> Self {
        self.engine_config(config.engine.clone())
            .analyzer_settings(config.analyzer.clone())
    }

    /// 构建引擎
    ///
    /// 未指定的协作方使用内存实现: 内存存储、随机主密钥的密钥库和空的历史数据源。
    pub fn build(self) -> Result<PrivacyEngine> {
        self.engine.validate().map_err(ValidationError::InvalidConfig)?;

        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryRepository::new()));
        let keystore = self
            .keystore
            .unwrap_or_else(|| Arc::new(ChaChaKeystore::ephemeral()));
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(StaticHistoryProvider::new()));

        let factory = EphemeralAccountFactory::new(repository.clone(), keystore)
            .with_ttl(self.engine.ephemeral_ttl())
            .with_parallelism(self.engine.factory_parallelism);
        let planner = PathPlanner::new(
            repository.clone(),
            self.chains.clone(),
            factory.clone(),
            self.engine.planner_settings(),
        );
        let executor = TransferExecutor::new(
            repository.clone(),
            self.chains,
            self.engine.executor_settings(),
        );
        let analyzer = TrackingAnalyzer::from_settings(history, &self.analyzer)?;

        Ok(PrivacyEngine {
            policy: PolicyResolver::new(repository.clone()),
            reports: PrivacyReportGenerator::new(repository.clone(), analyzer),
            repository,
            factory,
            planner,
            executor,
            active: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

/// 执行中转账的取消标志，离开作用域时注销
struct ActiveTransfer {
    active: Arc<Mutex<HashMap<String, CancelFlag>>>,
    transfer_id: String,
}

impl Drop for ActiveTransfer {
    fn drop(&mut self) {
        self.active.lock().remove(&self.transfer_id);
    }
}

/// 隐私转账引擎
#[derive(Clone)]
pub struct PrivacyEngine {
    repository: Arc<dyn Repository>,
    policy: PolicyResolver,
    factory: EphemeralAccountFactory,
    planner: PathPlanner,
    executor: TransferExecutor,
    reports: PrivacyReportGenerator,
    active: Arc<Mutex<HashMap<String, CancelFlag>>>,
}

impl PrivacyEngine {
    pub fn builder() -> PrivacyEngineBuilder {
        PrivacyEngineBuilder::default()
    }

    /// 解析账户的有效隐私配置（不落盘）
    pub async fn resolve_policy(
        &self,
        account_id: &str,
        overrides: Option<&PrivacyConfigOverride>,
    ) -> Result<PrivacyConfig> {
        self.policy.resolve(account_id, overrides).await
    }

    /// 更新并保存账户隐私配置
    pub async fn update_privacy_config(
        &self,
        account_id: &str,
        overrides: &PrivacyConfigOverride,
    ) -> Result<PrivacyConfig> {
        self.policy.update(account_id, overrides).await
    }

    /// 规划转账
    ///
    /// 开启自动隐私且请求未指定级别和跳数时，按追踪风险报告的推荐级别提升。
    pub async fn plan_transfer(&self, request: &TransferRequest) -> Result<TransferPlan> {
        let overrides = request.config_override();
        let mut config = self
            .policy
            .resolve(&request.source_account_id, Some(&overrides))
            .await?;

        if config.enable_auto_privacy && request.privacy_level.is_none() && request.hop_count.is_none() {
            let report = self.reports.report(&request.source_account_id).await?;
            if report.recommended_level > config.privacy_level {
                info!(
                    "账户 {} 追踪风险 {}，隐私级别 {} → {}",
                    request.source_account_id,
                    report.risk_level,
                    config.privacy_level,
                    report.recommended_level
                );
                let raised = PrivacyConfigOverride {
                    privacy_level: Some(report.recommended_level),
                    split_count: request.split_count,
                    ..Default::default()
                };
                config = apply_override(config, &raised);
                config.validate().map_err(ValidationError::InvalidConfig)?;
            }
        }

        self.planner.plan_with_config(request, &config).await
    }

    /// 规划并创建 PENDING 转账，稍后通过 [`execute_existing`](Self::execute_existing) 执行
    pub async fn start_transfer(&self, request: &TransferRequest) -> Result<PrivacyTransfer> {
        let plan = self.plan_transfer(request).await?;
        self.executor.start(&plan, request).await
    }

    /// 规划并执行转账
    pub async fn execute_transfer(&self, request: &TransferRequest) -> Result<PrivacyTransferResult> {
        let transfer = self.start_transfer(request).await?;
        self.execute_existing(&transfer.transfer_id).await
    }

    /// 执行已创建的转账
    pub async fn execute_existing(&self, transfer_id: &str) -> Result<PrivacyTransferResult> {
        let cancel = CancelFlag::new();
        {
            let mut active = self.active.lock();
            if active.contains_key(transfer_id) {
                return Err(ExecutionError::LeaseUnavailable {
                    transfer_id: transfer_id.to_string(),
                }
                .into());
            }
            active.insert(transfer_id.to_string(), cancel.clone());
        }
        let _registration = ActiveTransfer {
            active: self.active.clone(),
            transfer_id: transfer_id.to_string(),
        };

        self.executor.run(transfer_id, &cancel).await
    }

    /// 请求取消正在本引擎中执行的转账，返回是否找到该转账
    pub fn cancel_transfer(&self, transfer_id: &str) -> bool {
        match self.active.lock().get(transfer_id) {
            Some(flag) => {
                flag.cancel();
                info!("转账 {} 已请求取消", transfer_id);
                true
            }
            None => false,
        }
    }

    pub async fn get_transfer(&self, transfer_id: &str) -> Result<PrivacyTransfer> {
        self.repository
            .get_transfer(transfer_id)
            .await
            .map_err(PrivacyError::storage)?
            .ok_or_else(|| PrivacyError::NotFound(format!("transfer {}", transfer_id)))
    }

    /// 分析任意地址的可追踪性
    pub async fn analyze_tracking(&self, address: &str, chain: Chain) -> TrackingAnalysis {
        self.reports.analyzer().analyze(address, chain).await
    }

    /// 生成钱包隐私报告
    pub async fn generate_privacy_report(&self, wallet_id: &str) -> Result<WalletPrivacyReport> {
        self.reports.report(wallet_id).await
    }

    /// 回收过期的临时账户
    pub async fn collect_expired_accounts(&self) -> Result<Vec<String>> {
        self.collect_expired_accounts_at(Utc::now()).await
    }

    pub async fn collect_expired_accounts_at(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.factory.collect_expired(now).await
    }
}
