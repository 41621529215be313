//! Reward transaction construction and treasury signing.

use std::fmt;
use std::str::FromStr;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::{ConfigError, DispatchError, DispatchStage};

sol! {
    /// Reward distribution entry point of the rewards contract.
    function sendReward(address player) external returns (bool success);
}

/// Length of a hex-encoded secp256k1 secret without prefix.
const KEY_HEX_LEN: usize = 64;

/// Shape of the configured key, safe to log. Never carries key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMetadata {
    pub present: bool,
    pub has_0x_prefix: bool,
    pub length: usize,
}

impl KeyMetadata {
    pub fn inspect(secret: Option<&SecretString>) -> Self {
        match secret {
            Some(secret) => {
                let raw = secret.expose_secret().trim();
                Self {
                    present: !raw.is_empty(),
                    has_0x_prefix: raw.starts_with("0x"),
                    length: raw.len(),
                }
            }
            None => Self {
                present: false,
                has_0x_prefix: false,
                length: 0,
            },
        }
    }
}

/// Holds the treasury signing key. Debug output is redacted.
pub struct TreasurySigner {
    signer: PrivateKeySigner,
}

impl TreasurySigner {
    /// Accepts 64 hex characters with or without a `0x` prefix.
    pub fn from_secret(secret: Option<&SecretString>) -> Result<Self, ConfigError> {
        let secret = secret.ok_or(ConfigError::MissingSigningKey)?;
        let raw = secret.expose_secret().trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingSigningKey);
        }

        let digits = raw.strip_prefix("0x").unwrap_or(raw);
        if digits.len() != KEY_HEX_LEN {
            return Err(ConfigError::InvalidSigningKey("expected 32 bytes of hex"));
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidSigningKey("contains non-hex characters"));
        }

        let signer = PrivateKeySigner::from_str(digits)
            .map_err(|_| ConfigError::InvalidSigningKey("not a valid secp256k1 scalar"))?;
        Ok(Self { signer })
    }

    /// Treasury account the key controls.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign with EIP-155 replay protection and encode for broadcast.
    pub fn sign(&self, unsigned: &UnsignedTransaction) -> Result<SignedTransaction, DispatchError> {
        let mut tx = unsigned.to_legacy();
        let signature = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx).map_err(|e| {
            DispatchError::rejected(DispatchStage::Building, format!("signing failed: {}", e))
        })?;

        let envelope: TxEnvelope = tx.into_signed(signature).into();
        Ok(SignedTransaction {
            hash: *envelope.tx_hash(),
            raw: Bytes::from(envelope.encoded_2718()),
        })
    }
}

impl fmt::Debug for TreasurySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreasurySigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Legacy-priced contract call carrying the reward, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub to: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub input: Bytes,
    pub chain_id: u64,
}

impl UnsignedTransaction {
    fn to_legacy(&self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(self.to),
            value: U256::ZERO,
            input: self.input.clone(),
        }
    }
}

/// Raw signed bytes plus the locally computed hash.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: B256,
}

impl fmt::Debug for SignedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedTransaction")
            .field("hash", &self.hash)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

/// Builds `sendReward(recipient)` calls against the rewards contract.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    contract: Address,
    chain_id: u64,
    gas_limit: u64,
}

impl TransactionBuilder {
    pub fn new(contract: Address, chain_id: u64, gas_limit: u64) -> Self {
        Self {
            contract,
            chain_id,
            gas_limit,
        }
    }

    pub fn build(&self, recipient: Address, nonce: u64, gas_price: u128) -> UnsignedTransaction {
        UnsignedTransaction {
            to: self.contract,
            nonce,
            gas_limit: self.gas_limit,
            gas_price,
            input: encode_reward_call(recipient),
            chain_id: self.chain_id,
        }
    }
}

/// ABI call data for `sendReward(player)`: selector plus one padded word.
pub fn encode_reward_call(recipient: Address) -> Bytes {
    Bytes::from(sendRewardCall { player: recipient }.abi_encode())
}
