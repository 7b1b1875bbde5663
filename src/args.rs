//! 命令行参数

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::privacy::{PrivacyLevel, TransferRequest};
use crate::types::{Amount, Chain};

/// 多跳隐私转账引擎（模拟链演示）
#[derive(Parser, Debug)]
#[command(name = "veilhop")]
#[command(about = "多跳隐私转账引擎")]
pub struct Cli {
    /// TOML 配置文件
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 规划转账并输出计划
    Plan(TransferArgs),

    /// 在模拟链上规划并执行转账
    Simulate {
        #[command(flatten)]
        transfer: TransferArgs,

        /// 跳过跳间延迟
        #[arg(long)]
        no_delay: bool,

        /// 第 n 次提交（从 0 计）失败
        #[arg(long)]
        fail_at: Option<usize>,
    },

    /// 对演示历史生成隐私报告
    Analyze(AnalyzeArgs),

    /// 输出当前生效的配置
    Config,
}

/// 转账参数
#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// 链
    #[arg(long, default_value = "solana")]
    pub chain: Chain,

    /// 转账金额（十进制）
    #[arg(short, long)]
    pub amount: Amount,

    /// 资产标识
    #[arg(long, default_value = "SOL")]
    pub asset: String,

    /// 目标地址，缺省时随机生成
    #[arg(short, long)]
    pub destination: Option<String>,

    /// 隐私级别 (LOW/MEDIUM/HIGH/EXTREME)
    #[arg(short, long)]
    pub level: Option<PrivacyLevel>,

    /// 跳数
    #[arg(long)]
    pub hops: Option<u8>,

    /// 拆分数
    #[arg(long)]
    pub splits: Option<u8>,
}

impl TransferArgs {
    pub fn to_request(&self, source_account_id: &str, destination: String) -> TransferRequest {
        TransferRequest {
            source_account_id: source_account_id.to_string(),
            destination,
            amount: self.amount,
            asset: self.asset.clone(),
            chain: self.chain,
            privacy_level: self.level,
            hop_count: self.hops,
            split_count: self.splits,
        }
    }
}

/// 分析参数，开关决定演示历史中包含哪些可追踪行为
#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long, default_value = "ethereum")]
    pub chain: Chain,

    /// 与同一对手方双向往来
    #[arg(long)]
    pub direct_link: bool,

    /// 固定金额、固定间隔的转出
    #[arg(long)]
    pub repeating: bool,

    /// 交易所入金
    #[arg(long)]
    pub exchange: bool,

    /// 在同格式的其他链上复用地址
    #[arg(long)]
    pub cross_chain: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "veilhop", "simulate", "--amount", "10", "--level", "high", "--hops", "3", "--no-delay",
        ])
        .unwrap();
        match cli.command {
            Command::Simulate {
                transfer,
                no_delay,
                fail_at,
            } => {
                assert_eq!(transfer.amount, Amount::from_whole(10));
                assert_eq!(transfer.level, Some(PrivacyLevel::High));
                assert_eq!(transfer.hops, Some(3));
                assert_eq!(transfer.chain, Chain::Solana);
                assert!(no_delay);
                assert_eq!(fail_at, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_amount() {
        assert!(Cli::try_parse_from(["veilhop", "plan", "--amount", "ten"]).is_err());
    }
}
