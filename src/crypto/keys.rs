//! 按链生成密钥与推导地址
//!
//! Solana 使用 ed25519，地址为公钥的 base58 编码；
//! EVM 系列链使用 secp256k1，地址为未压缩公钥 keccak256 的后 20 字节。

use anyhow::{anyhow, Result};
use ed25519_dalek::SigningKey as SolKeypair;
use k256::ecdsa::SigningKey as EvmSigningKey;
use rand::RngCore;
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::types::{AddressFormat, Chain};

/// 新生成的密钥（明文私钥在释放时清零）
pub struct GeneratedKey {
    pub address: String,
    pub secret: Zeroizing<Vec<u8>>,
}

/// 为指定链生成新的密钥
pub fn generate(chain: Chain) -> Result<GeneratedKey> {
    // secp256k1 私钥需小于曲线阶，极小概率需要重新采样
    for _ in 0..8 {
        let secret = random_secret();
        match address_from_secret(chain, &secret) {
            Ok(address) => return Ok(GeneratedKey { address, secret }),
            Err(_) if chain.address_format() == AddressFormat::Evm => continue,
            Err(e) => return Err(e),
        }
    }
    Err(anyhow!("Failed to sample a valid {} key", chain))
}

/// 从私钥推导地址
pub fn address_from_secret(chain: Chain, secret: &[u8]) -> Result<String> {
    match chain.address_format() {
        AddressFormat::Base58Ed25519 => {
            let bytes: [u8; 32] = secret
                .try_into()
                .map_err(|_| anyhow!("Solana secret must be 32 bytes, got {}", secret.len()))?;
            let keypair = SolKeypair::from_bytes(&bytes);
            Ok(bs58::encode(keypair.verifying_key().as_bytes()).into_string())
        }
        AddressFormat::Evm => {
            let signing_key = EvmSigningKey::from_slice(secret)
                .map_err(|e| anyhow!("Invalid secp256k1 secret: {}", e))?;
            let point = signing_key.verifying_key().to_encoded_point(false);
            let digest = Keccak256::digest(&point.as_bytes()[1..]);
            Ok(format!("0x{}", hex::encode(&digest[12..])))
        }
    }
}

/// 检查地址是否符合链的地址格式
pub fn validate_address(chain: Chain, address: &str) -> bool {
    match chain.address_format() {
        AddressFormat::Base58Ed25519 => bs58::decode(address)
            .into_vec()
            .map(|bytes| bytes.len() == 32)
            .unwrap_or(false),
        AddressFormat::Evm => {
            let Some(body) = address.strip_prefix("0x") else {
                return false;
            };
            body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit())
        }
    }
}

/// 地址规范化（EVM 地址统一小写，便于比较）
pub fn normalize_address(chain: Chain, address: &str) -> String {
    match chain.address_format() {
        AddressFormat::Base58Ed25519 => address.trim().to_string(),
        AddressFormat::Evm => address.trim().to_ascii_lowercase(),
    }
}

/// 按链的规范形式比较两个地址
pub fn same_address(chain: Chain, a: &str, b: &str) -> bool {
    normalize_address(chain, a) == normalize_address(chain, b)
}

fn random_secret() -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(vec![0u8; 32]);
    rand::rng().fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evm_address_known_vector() {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let address = address_from_secret(Chain::Ethereum, &secret).unwrap();
        assert_eq!(address, "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    }

    #[test]
    fn test_solana_address_known_vector() {
        // RFC 8032 测试向量 1
        let secret =
            hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60").unwrap();
        let public =
            hex::decode("d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a").unwrap();

        let address = address_from_secret(Chain::Solana, &secret).unwrap();
        assert_eq!(address, bs58::encode(public).into_string());
    }

    #[test]
    fn test_generated_keys_are_valid_and_distinct() {
        for chain in Chain::ALL {
            let a = generate(chain).unwrap();
            let b = generate(chain).unwrap();
            assert!(validate_address(chain, &a.address), "{} address invalid", chain);
            assert_ne!(a.address, b.address);
            assert_eq!(address_from_secret(chain, &a.secret).unwrap(), a.address);
        }
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address(Chain::Base, "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"));
        assert!(!validate_address(Chain::Base, "7e5f4552091a69125d5dfcb7b8c2659029395bdf"));
        assert!(!validate_address(Chain::Base, "0x7e5f"));
        assert!(!validate_address(Chain::Solana, "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"));
        assert!(!validate_address(Chain::Solana, "not-base58!"));
    }
}
