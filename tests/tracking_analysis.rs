//! 追踪风险分析与隐私报告测试

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use veilhop::analysis::{AnalyzerSettings, RiskLevel};
use veilhop::chain::{CounterpartyTag, SimulatedChain, StaticHistoryProvider, TransferRecord};
use veilhop::crypto::{generate, ChaChaKeystore};
use veilhop::privacy::{PrivacyConfigOverride, PrivacyLevel, SourceAccount};
use veilhop::{Amount, Chain, InMemoryRepository, PrivacyEngine, PrivacyError, TransferRequest};

const PEER: &str = "0x00000000000000000000000000000000000000bb";

fn at(hours: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + hours * 3600, 0).unwrap()
}

fn record(chain: Chain, from: &str, to: &str, amount: &str, hours: i64) -> TransferRecord {
    TransferRecord {
        tx_hash: format!("{}:{}:{}:{}", chain, from, to, hours),
        chain,
        from: from.to_string(),
        to: to.to_string(),
        amount: amount.parse().unwrap(),
        timestamp: at(hours),
        counterparty_tag: None,
    }
}

fn wallet_engine(
    chain: Chain,
    history: Arc<StaticHistoryProvider>,
    settings: AnalyzerSettings,
) -> Result<(PrivacyEngine, String)> {
    let address = generate(chain)?.address;
    let repo = InMemoryRepository::new();
    repo.insert_source_account(SourceAccount {
        account_id: "wallet".to_string(),
        chain,
        address: address.clone(),
    })?;
    let engine = PrivacyEngine::builder()
        .repository(Arc::new(repo))
        .history(history)
        .analyzer_settings(settings)
        .build()?;
    Ok((engine, address))
}

/// 直接往来 (+30) 与重复金额 (+40) → 70 → HIGH
#[tokio::test]
async fn test_direct_link_and_pattern_is_high_risk() -> Result<()> {
    let history = Arc::new(StaticHistoryProvider::new());
    let (engine, me) = wallet_engine(Chain::Ethereum, history.clone(), AnalyzerSettings::default())?;

    history.insert(record(Chain::Ethereum, PEER, &me, "10", 0));
    for (i, hours) in [3, 29, 80].iter().enumerate() {
        let to = if i == 0 { PEER.to_string() } else { format!("0x{:040x}", i) };
        history.insert(record(Chain::Ethereum, &me, &to, "1", *hours));
    }

    let report = engine.generate_privacy_report("wallet").await?;
    let analysis = &report.tracking_analysis;
    assert!(analysis.has_direct_link);
    assert!(analysis.suspicious_pattern);
    assert_eq!(analysis.risk_score, 70);
    assert_eq!(report.privacy_score, 30);
    assert_eq!(report.risk_level, RiskLevel::High);
    assert_eq!(report.recommended_level, PrivacyLevel::High);
    assert!(report.recommendations.iter().any(|r| r.contains("EXTREME")));
    Ok(())
}

#[tokio::test]
async fn test_clean_history_is_low_risk() -> Result<()> {
    let history = Arc::new(StaticHistoryProvider::new());
    let (engine, me) = wallet_engine(Chain::Ethereum, history.clone(), AnalyzerSettings::default())?;
    history.insert(record(Chain::Ethereum, PEER, &me, "4", 0));
    history.insert(record(Chain::Ethereum, &me, "0x00000000000000000000000000000000000000cc", "1", 10));

    let report = engine.generate_privacy_report("wallet").await?;
    assert_eq!(report.tracking_analysis.risk_score, 0);
    assert_eq!(report.risk_level, RiskLevel::Low);
    assert_eq!(report.recommendations.len(), 1);
    assert!(report.last_analyzed <= Utc::now());
    Ok(())
}

#[tokio::test]
async fn test_no_heuristics_yields_zero() -> Result<()> {
    let history = Arc::new(StaticHistoryProvider::new());
    let settings = AnalyzerSettings {
        enabled_heuristics: Vec::new(),
        ..AnalyzerSettings::default()
    };
    let (engine, me) = wallet_engine(Chain::Ethereum, history.clone(), settings)?;
    history.insert(record(Chain::Ethereum, PEER, &me, "1", 0));
    history.insert(record(Chain::Ethereum, &me, PEER, "1", 1));

    let report = engine.generate_privacy_report("wallet").await?;
    assert_eq!(report.tracking_analysis.risk_score, 0);
    assert_eq!(report.risk_level, RiskLevel::Low);
    Ok(())
}

#[tokio::test]
async fn test_exchange_funding_and_cross_chain_reuse() -> Result<()> {
    let history = Arc::new(StaticHistoryProvider::new());
    let settings = AnalyzerSettings {
        known_exchange_addresses: vec![PEER.to_uppercase().replace("0X", "0x")],
        ..AnalyzerSettings::default()
    };
    let (engine, me) = wallet_engine(Chain::Polygon, history.clone(), settings)?;
    history.insert(record(Chain::Polygon, PEER, &me, "100", 0));
    history.insert(record(Chain::Bsc, &me, "0x00000000000000000000000000000000000000dd", "1", 5));

    let report = engine.generate_privacy_report("wallet").await?;
    let analysis = &report.tracking_analysis;
    assert!(analysis.exchange_funding);
    assert_eq!(analysis.risk_score, 45);
    assert_eq!(
        analysis.detected_chains.iter().copied().collect::<Vec<_>>(),
        vec![Chain::Polygon, Chain::Bsc]
    );
    assert_eq!(report.risk_level, RiskLevel::Medium);
    assert_eq!(analysis.triggered_heuristics, vec!["exchange_funding", "cross_chain_reuse"]);
    Ok(())
}

#[tokio::test]
async fn test_unavailable_history_degrades_to_partial_data() -> Result<()> {
    let history = Arc::new(StaticHistoryProvider::new());
    let (engine, me) = wallet_engine(Chain::Ethereum, history.clone(), AnalyzerSettings::default())?;
    let mut tagged = record(Chain::Ethereum, PEER, &me, "3", 0);
    tagged.counterparty_tag = Some(CounterpartyTag::Exchange);
    history.insert(tagged);
    history.set_unavailable(Chain::Base, true);

    let report = engine.generate_privacy_report("wallet").await?;
    let analysis = &report.tracking_analysis;
    assert!(analysis.partial_data);
    assert!(analysis.exchange_funding, "可用的历史仍然参与分析");
    assert!(analysis.warnings.iter().any(|w| w.contains("base")));
    assert!(report.recommendations.iter().any(|r| r.contains("重新分析")));
    Ok(())
}

#[tokio::test]
async fn test_report_for_unknown_wallet() -> Result<()> {
    let (engine, _) = wallet_engine(
        Chain::Ethereum,
        Arc::new(StaticHistoryProvider::new()),
        AnalyzerSettings::default(),
    )?;
    assert!(matches!(
        engine.generate_privacy_report("ghost").await,
        Err(PrivacyError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_analyze_arbitrary_address() -> Result<()> {
    let history = Arc::new(StaticHistoryProvider::new());
    let (engine, _) = wallet_engine(Chain::Ethereum, history.clone(), AnalyzerSettings::default())?;
    let other = "0x00000000000000000000000000000000000000ee";
    history.insert(record(Chain::Ethereum, other, PEER, "1", 0));
    history.insert(record(Chain::Ethereum, PEER, other, "1", 2));

    let analysis = engine.analyze_tracking(other, Chain::Ethereum).await;
    assert!(analysis.has_direct_link);
    assert_eq!(analysis.risk_score, 30);
    Ok(())
}

/// 开启自动隐私后，高风险钱包未指定级别的转账被提升到推荐级别
#[tokio::test]
async fn test_auto_privacy_raises_level() -> Result<()> {
    let chain = Chain::Ethereum;
    let keystore = Arc::new(ChaChaKeystore::ephemeral());
    let sim = Arc::new(SimulatedChain::new(chain, "0.001".parse()?, keystore.clone()));
    let history = Arc::new(StaticHistoryProvider::new());

    let me = generate(chain)?.address;
    let repo = InMemoryRepository::new();
    repo.insert_source_account(SourceAccount {
        account_id: "wallet".to_string(),
        chain,
        address: me.clone(),
    })?;
    history.insert(record(chain, PEER, &me, "10", 0));
    for hours in [1, 2, 3] {
        history.insert(record(chain, &me, PEER, "2", hours * 24));
    }

    let engine = PrivacyEngine::builder()
        .repository(Arc::new(repo))
        .keystore(keystore)
        .history(history)
        .chain(sim)
        .build()?;
    engine
        .update_privacy_config(
            "wallet",
            &PrivacyConfigOverride {
                privacy_level: Some(PrivacyLevel::Low),
                enable_auto_privacy: Some(true),
                ..Default::default()
            },
        )
        .await?;

    let destination = generate(chain)?.address;
    let auto = TransferRequest::new("wallet", destination.clone(), Amount::from_whole(1), "ETH", chain);
    let plan = engine.plan_transfer(&auto).await?;
    assert_eq!(plan.hop_count, 4, "风险 70 → HIGH");
    assert_eq!(plan.split_count, 4);

    // 显式指定级别时不自动调整
    let explicit = auto.clone().with_level(PrivacyLevel::Low);
    let plan = engine.plan_transfer(&explicit).await?;
    assert_eq!(plan.hops.len(), 1);
    Ok(())
}
