use anyhow::{anyhow, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use veilhop::args::{AnalyzeArgs, Cli, Command, TransferArgs};
use veilhop::chain::{CounterpartyTag, StaticHistoryProvider, TransferRecord};
use veilhop::crypto::{generate, ChaChaKeystore};
use veilhop::privacy::{PrivacyConfigOverride, SourceAccount};
use veilhop::{AppConfig, ConfigManager, InMemoryRepository, PrivacyEngine, SimulatedChain};

const DEMO_SOURCE: &str = "demo-source";
const DEMO_WALLET: &str = "demo-wallet";

/// 初始化日志系统，RUST_LOG 优先于配置文件
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 模拟链上的演示环境: 一个已充值的源账户
struct Demo {
    engine: PrivacyEngine,
    chain: Arc<SimulatedChain>,
}

fn demo(config: &AppConfig, args: &TransferArgs) -> Result<Demo> {
    let repository = InMemoryRepository::new();
    let keystore = Arc::new(ChaChaKeystore::ephemeral());
    let chain = Arc::new(SimulatedChain::new(
        args.chain,
        config.fee_for(args.chain),
        keystore.clone(),
    ));

    let source = generate(args.chain)?;
    repository.insert_source_account(SourceAccount {
        account_id: DEMO_SOURCE.to_string(),
        chain: args.chain,
        address: source.address.clone(),
    })?;
    chain.register_source(DEMO_SOURCE, &source.address);
    chain.fund(&source.address, &args.asset, args.amount);
    info!("演示源账户 {} ({})", source.address, args.chain);

    let engine = PrivacyEngine::builder()
        .app_config(config)
        .repository(Arc::new(repository))
        .keystore(keystore)
        .chain(chain.clone())
        .build()?;
    Ok(Demo { engine, chain })
}

fn destination(args: &TransferArgs) -> Result<String> {
    match &args.destination {
        Some(address) => Ok(address.clone()),
        None => Ok(generate(args.chain)?.address),
    }
}

async fn plan(config: &AppConfig, args: &TransferArgs) -> Result<()> {
    let demo = demo(config, args)?;
    let request = args.to_request(DEMO_SOURCE, destination(args)?);
    let plan = demo.engine.plan_transfer(&request).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn simulate(
    config: &AppConfig,
    args: &TransferArgs,
    no_delay: bool,
    fail_at: Option<usize>,
) -> Result<()> {
    let demo = demo(config, args)?;
    if no_delay {
        let overrides = PrivacyConfigOverride {
            min_delay_ms: Some(0),
            max_delay_ms: Some(0),
            ..Default::default()
        };
        demo.engine.update_privacy_config(DEMO_SOURCE, &overrides).await?;
    }
    if let Some(attempt) = fail_at {
        demo.chain.fail_submission_at(attempt);
    }

    let request = args.to_request(DEMO_SOURCE, destination(args)?);
    let result = demo.engine.execute_transfer(&request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    info!(
        "目标地址到账 {} {}",
        demo.chain.balance(&result.transfer.destination_address, &args.asset),
        args.asset
    );

    let removed = demo.engine.collect_expired_accounts().await?;
    info!("回收临时账户 {} 个", removed.len());
    Ok(())
}

/// 按开关构造演示历史
fn demo_history(address: &str, args: &AnalyzeArgs) -> StaticHistoryProvider {
    let provider = StaticHistoryProvider::new();
    let start = Utc::now() - ChronoDuration::days(7);
    let record = |from: &str, to: &str, amount: &str, hours: i64, tag: Option<CounterpartyTag>| TransferRecord {
        tx_hash: format!("0x{:064x}", hours as u64 + 1),
        chain: args.chain,
        from: from.to_string(),
        to: to.to_string(),
        amount: amount.parse().unwrap_or_default(),
        timestamp: start + ChronoDuration::hours(hours),
        counterparty_tag: tag,
    };

    let peer = "0x00000000000000000000000000000000000000aa";
    provider.insert(record(peer, address, "3", 0, None));

    if args.direct_link {
        provider.insert(record(address, peer, "1.5", 5, None));
    }
    if args.repeating {
        for i in 0..4 {
            let to = format!("0x{:040x}", 0xb1 + i);
            provider.insert(record(address, &to, "0.25", 10 + 24 * i as i64, None));
        }
    }
    if args.exchange {
        provider.insert(record("0xexchange-hot-wallet", address, "10", 2, Some(CounterpartyTag::Exchange)));
    }
    if args.cross_chain {
        if let Some(&sibling) = args.chain.address_siblings().first() {
            let mut reused = record(address, peer, "1", 30, None);
            reused.chain = sibling;
            provider.insert(reused);
        }
    }
    provider
}

async fn analyze(config: &AppConfig, args: &AnalyzeArgs) -> Result<()> {
    let wallet = generate(args.chain)?;
    let repository = InMemoryRepository::new();
    repository.insert_source_account(SourceAccount {
        account_id: DEMO_WALLET.to_string(),
        chain: args.chain,
        address: wallet.address.clone(),
    })?;

    let engine = PrivacyEngine::builder()
        .app_config(config)
        .repository(Arc::new(repository))
        .history(Arc::new(demo_history(&wallet.address, args)))
        .build()?;

    let report = engine.generate_privacy_report(DEMO_WALLET).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut manager = ConfigManager::new();
    if let Some(path) = &cli.config {
        manager
            .load_from_file(path)
            .map_err(|e| anyhow!("加载配置失败: {}", e))?;
    }
    let config = manager.get_config();
    init_logging(&config);

    match &cli.command {
        Command::Plan(args) => plan(&config, args).await,
        Command::Simulate {
            transfer,
            no_delay,
            fail_at,
        } => simulate(&config, transfer, *no_delay, *fail_at).await,
        Command::Analyze(args) => analyze(&config, args).await,
        Command::Config => {
            print!("{}", manager.to_toml()?);
            Ok(())
        }
    }
}
