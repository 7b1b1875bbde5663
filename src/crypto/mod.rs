//! 密钥材料
//!
//! 提供按链的密钥生成、地址推导与私钥加密存储。

pub mod keys;
pub mod keystore;

pub use keys::{
    address_from_secret, generate, normalize_address, same_address, validate_address, GeneratedKey,
};
pub use keystore::{ChaChaKeystore, EncryptedSecret, EncryptionAlgorithm, Keystore, MasterKey};
