use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;
use std::str::FromStr;

/// Errors that can occur while parsing addresses and hashes
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hash length: expected 32 bytes, got {0}")]
    InvalidHashLength(usize),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Represents an account identifier (an opaque key such as a public address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Derives the identity hash recorded for this address at registration
    pub fn identity_hash(&self) -> Hash256 {
        Hash256::digest(self.0.as_bytes())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CryptoError::InvalidAddress("address must not be empty".to_string()));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(CryptoError::InvalidAddress(format!(
                "address must not contain whitespace: {:?}",
                s
            )));
        }

        Ok(Address(trimmed.to_string()))
    }
}

/// A 256-bit SHA-256 output, serialized as a lowercase hex string.
///
/// Ordering is the big-endian unsigned integer ordering of the bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The genesis tip and the sender marker of minted transactions
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Width of the digest in bits
    pub const BITS: u32 = 256;

    /// SHA-256 of arbitrary bytes
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self::from_digest(&hasher.finalize())
    }

    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        let mut out = [0u8; 32];
        out.copy_from_slice(digest);
        Hash256(out)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Number of leading zero bits when read as a big-endian integer
    pub fn leading_zero_bits(&self) -> u32 {
        let mut total = 0u32;
        for byte in &self.0 {
            if *byte == 0 {
                total += 8;
            } else {
                total += byte.leading_zeros();
                break;
            }
        }
        total
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
        let len = bytes.len();
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidHashLength(len))?;

        Ok(Hash256(array))
    }
}

impl From<Hash256> for String {
    fn from(hash: Hash256) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for Hash256 {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_hash_is_sha256_of_address() {
        let address = Address("alice".to_string());
        let expected = "2bd806c97f0e00af1a1fc3328fa763a9269723c8db8fac4f93af71db186d6e90";

        assert_eq!(address.identity_hash().to_hex(), expected);
        assert_eq!(address.identity_hash(), Address("alice".to_string()).identity_hash());
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!("  bob ".parse::<Address>().unwrap(), Address("bob".to_string()));
        assert!("".parse::<Address>().is_err());
        assert!("two words".parse::<Address>().is_err());
    }

    #[test]
    fn test_hash_hex_conversion() {
        let hash = Hash256::digest(b"quantum");
        let parsed: Hash256 = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);

        let prefixed: Hash256 = format!("0x{}", hash.to_hex()).parse().unwrap();
        assert_eq!(prefixed, hash);

        assert!(matches!(
            "abcd".parse::<Hash256>(),
            Err(CryptoError::InvalidHashLength(2))
        ));
        assert!("zz".parse::<Hash256>().is_err());
    }

    #[test]
    fn test_hash_serializes_as_hex_string() {
        let hash = Hash256::digest(b"tip");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));

        let back: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_leading_zero_bits() {
        let mut bytes = [0u8; 32];
        assert_eq!(Hash256(bytes).leading_zero_bits(), 256);

        bytes[0] = 0x0F;
        assert_eq!(Hash256(bytes).leading_zero_bits(), 4);

        bytes = [0u8; 32];
        bytes[1] = 0x80;
        assert_eq!(Hash256(bytes).leading_zero_bits(), 8);
    }
}
