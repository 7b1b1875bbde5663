//! 隐私策略解析
//!
//! 把账户保存的配置（或默认配置）与调用方的覆盖项合并成本次规划使用的参数。
//! 解析不落盘，只有 [`PolicyResolver::update`] 会保存配置。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::types::{PrivacyConfig, PrivacyConfigOverride};
use crate::error::{PrivacyError, Result, ValidationError};
use crate::storage::Repository;

/// 合并覆盖项
///
/// 覆盖项改变了隐私级别且没有显式给出跳数/拆分数时，跳数和拆分数跟随级别表。
pub fn apply_override(base: PrivacyConfig, overrides: &PrivacyConfigOverride) -> PrivacyConfig {
    let mut config = base;

    if let Some(level) = overrides.privacy_level {
        if level != config.privacy_level {
            let (hops, splits) = level.parameters();
            config.max_hops = hops;
            config.split_count = splits;
        }
        config.privacy_level = level;
    }
    if let Some(hops) = overrides.max_hops {
        config.max_hops = hops;
    }
    if let Some(splits) = overrides.split_count {
        config.split_count = splits;
    }
    if let Some(enabled) = overrides.enable_auto_privacy {
        config.enable_auto_privacy = enabled;
    }
    if let Some(ms) = overrides.min_delay_ms {
        config.min_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = overrides.max_delay_ms {
        config.max_delay = Duration::from_millis(ms);
    }
    if let Some(random) = overrides.use_random_path {
        config.use_random_path = random;
    }
    if let Some(avoid) = overrides.avoid_known_tracking {
        config.avoid_known_tracking = avoid;
    }

    config
}

/// 隐私策略解析器
#[derive(Clone)]
pub struct PolicyResolver {
    repository: Arc<dyn Repository>,
}

impl PolicyResolver {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// 解析账户的有效配置
    pub async fn resolve(
        &self,
        account_id: &str,
        overrides: Option<&PrivacyConfigOverride>,
    ) -> Result<PrivacyConfig> {
        self.repository
            .get_source_account(account_id)
            .await
            .map_err(PrivacyError::storage)?
            .ok_or_else(|| PrivacyError::NotFound(format!("source account {}", account_id)))?;

        let base = self
            .repository
            .get_privacy_config(account_id)
            .await
            .map_err(PrivacyError::storage)?
            .unwrap_or_default();

        let config = match overrides {
            Some(overrides) if !overrides.is_empty() => apply_override(base, overrides),
            _ => base,
        };
        config.validate().map_err(ValidationError::InvalidConfig)?;

        debug!(
            "账户 {} 隐私策略: {} hops={} splits={}",
            account_id, config.privacy_level, config.max_hops, config.split_count
        );
        Ok(config)
    }

    /// 合并覆盖项并保存
    pub async fn update(
        &self,
        account_id: &str,
        overrides: &PrivacyConfigOverride,
    ) -> Result<PrivacyConfig> {
        let config = self.resolve(account_id, Some(overrides)).await?;
        self.repository
            .save_privacy_config(account_id, &config)
            .await
            .map_err(PrivacyError::storage)?;
        info!("账户 {} 隐私配置已更新: {}", account_id, config.privacy_level);
        Ok(config)
    }
}
