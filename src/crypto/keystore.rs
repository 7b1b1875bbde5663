//! 密钥库
//!
//! 临时账户的私钥只以密文形式落盘。引擎本身从不持有明文，
//! 只有链适配器在签名时通过 [`Keystore::decrypt`] 临时解密。

use anyhow::{anyhow, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// 加密算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    /// ChaCha20-Poly1305 (移动设备友好)
    ChaCha20Poly1305,
}

/// 加密后的私钥
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedSecret {
    pub algorithm: EncryptionAlgorithm,
    /// 十六进制编码的 nonce
    pub nonce: String,
    /// 十六进制编码的密文
    pub ciphertext: String,
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSecret")
            .field("algorithm", &self.algorithm)
            .field("ciphertext", &"<redacted>")
            .finish()
    }
}

/// 密钥库接口
pub trait Keystore: Send + Sync {
    /// 加密明文私钥
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedSecret>;

    /// 解密私钥，返回的缓冲区在释放时清零
    fn decrypt(&self, secret: &EncryptedSecret) -> Result<Zeroizing<Vec<u8>>>;
}

/// 主密钥
#[derive(Clone)]
pub struct MasterKey {
    key: [u8; KEY_SIZE],
}

impl MasterKey {
    /// 生成新的随机主密钥
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    /// 从字节创建主密钥
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(anyhow!("Invalid key size: expected {}, got {}", KEY_SIZE, bytes.len()));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// 从十六进制字符串创建主密钥
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(hex::decode(encoded.trim())?);
        Self::from_bytes(&bytes)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// ChaCha20-Poly1305 密钥库
pub struct ChaChaKeystore {
    master_key: MasterKey,
}

impl ChaChaKeystore {
    pub fn new(master_key: MasterKey) -> Self {
        Self { master_key }
    }

    /// 使用随机主密钥创建（仅进程内有效，用于演示和测试）
    pub fn ephemeral() -> Self {
        Self::new(MasterKey::generate())
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.master_key.as_bytes()))
    }
}

impl Keystore for ChaChaKeystore {
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedSecret> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        Ok(EncryptedSecret {
            algorithm: EncryptionAlgorithm::ChaCha20Poly1305,
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    fn decrypt(&self, secret: &EncryptedSecret) -> Result<Zeroizing<Vec<u8>>> {
        let nonce = hex::decode(&secret.nonce)?;
        if nonce.len() != NONCE_SIZE {
            return Err(anyhow!("Invalid nonce size: expected {}, got {}", NONCE_SIZE, nonce.len()));
        }
        let ciphertext = hex::decode(&secret.ciphertext)?;

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|e| anyhow!("Decryption failed: {}", e))?;

        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let keystore = ChaChaKeystore::ephemeral();
        let secret = b"ephemeral signing key material..";

        let encrypted = keystore.encrypt(secret).unwrap();
        assert_ne!(encrypted.ciphertext, hex::encode(secret));

        let decrypted = keystore.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted.as_slice(), secret);
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let keystore = ChaChaKeystore::ephemeral();
        let mut encrypted = keystore.encrypt(b"secret").unwrap();

        let mut bytes = hex::decode(&encrypted.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        encrypted.ciphertext = hex::encode(bytes);

        assert!(keystore.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_wrong_master_key_rejected() {
        let a = ChaChaKeystore::ephemeral();
        let b = ChaChaKeystore::ephemeral();
        let encrypted = a.encrypt(b"secret").unwrap();
        assert!(b.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_master_key_from_hex() {
        let hex_key = "11".repeat(32);
        let keystore = ChaChaKeystore::new(MasterKey::from_hex(&hex_key).unwrap());
        let encrypted = keystore.encrypt(b"abc").unwrap();

        let same = ChaChaKeystore::new(MasterKey::from_hex(&hex_key).unwrap());
        assert_eq!(same.decrypt(&encrypted).unwrap().as_slice(), b"abc");

        assert!(MasterKey::from_hex("abcd").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_ciphertext() {
        let keystore = ChaChaKeystore::ephemeral();
        let encrypted = keystore.encrypt(b"secret").unwrap();
        let debug = format!("{:?}", encrypted);
        assert!(!debug.contains(&encrypted.ciphertext));
        assert!(debug.contains("redacted"));
    }
}
