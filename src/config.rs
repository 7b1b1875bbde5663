//! 应用配置
//!
//! TOML 配置文件，所有段落都有默认值，缺省的字段使用默认值。

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::AnalyzerSettings;
use crate::privacy::{ExecutorSettings, PlannerSettings};
use crate::types::{Amount, Chain};

/// 应用配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 引擎配置
    pub engine: EngineConfig,
    /// 每笔子转账的手续费（按链名索引，模拟链使用）
    pub fees: BTreeMap<String, Amount>,
    /// 分析器配置
    pub analyzer: AnalyzerSettings,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 临时账户有效期（秒）
    pub ephemeral_ttl_secs: u64,
    /// 临时账户批量创建并发数
    pub factory_parallelism: usize,
    /// 单笔提交的确认超时（毫秒）
    pub confirmation_timeout_ms: u64,
    /// 单跳预计确认时间（毫秒）
    pub estimated_confirmation_ms: u64,
    /// 执行租约有效期（秒）
    pub lease_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ephemeral_ttl_secs: 24 * 60 * 60,
            factory_parallelism: 4,
            confirmation_timeout_ms: 60_000,
            estimated_confirmation_ms: 2_000,
            lease_ttl_secs: 600,
        }
    }
}

impl EngineConfig {
    pub fn ephemeral_ttl(&self) -> Duration {
        Duration::from_secs(self.ephemeral_ttl_secs)
    }

    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            estimated_confirmation: Duration::from_millis(self.estimated_confirmation_ms),
            ephemeral_ttl: Some(self.ephemeral_ttl()),
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            confirmation_timeout: Duration::from_millis(self.confirmation_timeout_ms),
            lease_ttl: Duration::from_secs(self.lease_ttl_secs),
        }
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.ephemeral_ttl_secs == 0 {
            errors.push("临时账户有效期必须大于0".to_string());
        }
        if self.factory_parallelism == 0 {
            errors.push("并发数必须大于0".to_string());
        }
        if self.confirmation_timeout_ms == 0 {
            errors.push("确认超时必须大于0".to_string());
        }
        if self.lease_ttl_secs == 0 {
            errors.push("租约有效期必须大于0".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 各链默认手续费
pub fn default_fee(chain: Chain) -> Amount {
    let fee = match chain {
        Chain::Solana => "0.000005",
        Chain::Ethereum => "0.0005",
        Chain::Base => "0.00001",
        Chain::Polygon => "0.001",
        Chain::Bsc => "0.0002",
    };
    fee.parse().unwrap_or_default()
}

impl AppConfig {
    /// 链的手续费，未配置时使用默认值
    pub fn fee_for(&self, chain: Chain) -> Amount {
        self.fees
            .get(chain.as_str())
            .copied()
            .unwrap_or_else(|| default_fee(chain))
    }

    /// 验证配置
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(e) = self.engine.validate() {
            errors.extend(e);
        }
        if let Err(e) = self.analyzer.validate() {
            errors.extend(e);
        }
        for name in self.fees.keys() {
            if name.parse::<Chain>().is_err() {
                errors.push(format!("手续费配置了未知的链: {}", name));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
    config_path: Option<String>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
            config_path: None,
        }
    }

    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow!("读取配置文件失败 {}: {}", path.as_ref().display(), e))?;
        self.load_from_str(&content)?;
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        Ok(())
    }

    /// 从字符串加载配置
    pub fn load_from_str(&mut self, content: &str) -> Result<()> {
        let config: AppConfig = toml::from_str(content)?;
        config
            .validate()
            .map_err(|errors| anyhow!("配置无效: {}", errors.join("; ")))?;
        *self.config.write() = config;
        Ok(())
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        let config = self.config.read();
        Ok(toml::to_string_pretty(&*config)?)
    }

    /// 获取当前配置
    pub fn get_config(&self) -> AppConfig {
        self.config.read().clone()
    }

    pub fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    /// 更新配置
    pub fn update_config<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut candidate = self.config.read().clone();
        updater(&mut candidate);
        candidate
            .validate()
            .map_err(|errors| anyhow!("配置无效: {}", errors.join("; ")))?;
        *self.config.write() = candidate;
        Ok(())
    }
}
