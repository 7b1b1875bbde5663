//! 基础类型
//!
//! 定点金额、链标识以及序列化辅助函数。金额全程使用整数运算，不经过浮点数。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// 金额小数位数
pub const AMOUNT_DECIMALS: u32 = 18;

const SCALE: u128 = 1_000_000_000_000_000_000;

/// 金额解析错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    #[error("金额为空")]
    Empty,

    #[error("金额包含非法字符: {0}")]
    InvalidCharacter(String),

    #[error("小数位数超过 {max} 位: {0}", max = AMOUNT_DECIMALS)]
    TooPrecise(String),

    #[error("金额溢出: {0}")]
    Overflow(String),
}

/// 定点小数金额（18 位小数，非负）
///
/// 序列化为十进制字符串，例如 `"9.8"`，保证跨语言传输无精度损失。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// 从最小单位创建
    pub const fn from_units(units: u128) -> Self {
        Self(units)
    }

    /// 从整数创建
    pub fn from_whole(whole: u64) -> Self {
        Self(whole as u128 * SCALE)
    }

    /// 获取最小单位数量
    pub fn units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Amount> {
        self.0.checked_mul(factor as u128).map(Amount)
    }

    /// 整数除法，向零截断；除数为 0 时返回 None
    pub fn checked_div(self, divisor: u64) -> Option<Amount> {
        if divisor == 0 {
            return None;
        }
        Some(Amount(self.0 / divisor as u128))
    }

    /// 累加一组金额，溢出时返回 None
    pub fn checked_sum<I: IntoIterator<Item = Amount>>(items: I) -> Option<Amount> {
        items
            .into_iter()
            .try_fold(Amount::ZERO, |acc, item| acc.checked_add(item))
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole, frac) = match s.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (s, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(AmountParseError::InvalidCharacter(s.to_string()));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountParseError::InvalidCharacter(s.to_string()));
        }
        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountParseError::TooPrecise(s.to_string()));
        }

        let whole_units: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| AmountParseError::Overflow(s.to_string()))?
        };

        let mut frac_units: u128 = 0;
        if !frac.is_empty() {
            let padded = format!("{:0<width$}", frac, width = AMOUNT_DECIMALS as usize);
            frac_units = padded
                .parse::<u128>()
                .map_err(|_| AmountParseError::Overflow(s.to_string()))?;
        }

        whole_units
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac_units))
            .map(Amount)
            .ok_or_else(|| AmountParseError::Overflow(s.to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:018}", frac);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 地址格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFormat {
    /// ed25519 公钥的 base58 编码
    Base58Ed25519,
    /// secp256k1 + keccak256 的 0x 十六进制地址
    Evm,
}

/// 支持的链
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Solana,
    Ethereum,
    Base,
    Polygon,
    Bsc,
}

impl Chain {
    pub const ALL: [Chain; 5] = [
        Chain::Solana,
        Chain::Ethereum,
        Chain::Base,
        Chain::Polygon,
        Chain::Bsc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Polygon => "polygon",
            Chain::Bsc => "bsc",
        }
    }

    pub fn address_format(&self) -> AddressFormat {
        match self {
            Chain::Solana => AddressFormat::Base58Ed25519,
            Chain::Ethereum | Chain::Base | Chain::Polygon | Chain::Bsc => AddressFormat::Evm,
        }
    }

    /// 与当前链共享地址格式的其他链（同一地址可在这些链上复用）
    pub fn address_siblings(&self) -> Vec<Chain> {
        Chain::ALL
            .iter()
            .copied()
            .filter(|c| c != self && c.address_format() == self.address_format())
            .collect()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solana" | "sol" => Ok(Chain::Solana),
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "base" => Ok(Chain::Base),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "bsc" | "bnb" => Ok(Chain::Bsc),
            other => Err(ValidationError::UnsupportedChain(other.to_string())),
        }
    }
}

/// `Duration` 以毫秒整数序列化
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
