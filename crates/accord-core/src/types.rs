use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Token quantity in the smallest unit of the token.
pub type Amount = u128;

/// Seconds since the UNIX epoch.
pub type Timestamp = u64;

/// Underwriter risk rating, fixed point with 4 decimal places.
pub type RiskRating = u32;

/// Declares a 32-byte value type with hex display and a null (all-zero) value.
macro_rules! fixed_bytes32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// The all-zero value.
            pub const NULL: Self = Self([0u8; 32]);

            /// Wrap raw bytes.
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Whether this is the all-zero value.
            pub fn is_null(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Encode as a 64-character hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Decode from a 64-character hex string.
            pub fn from_hex(hex_str: &str) -> Result<Self, CoreError> {
                let bytes = hex::decode(hex_str)
                    .map_err(|e| CoreError::InvalidIdentifier(format!("invalid hex: {}", e)))?;
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    CoreError::InvalidIdentifier(format!("expected 32 bytes, got {}", bytes.len()))
                })?;
                Ok(Self(arr))
            }

            /// First six bytes in hex, for compact log lines.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..6])
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NULL
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }
    };
}

fixed_bytes32! {
    /// A participant on the shared ledger: a person (Ed25519 public key bytes)
    /// or a protocol component (label-derived).
    AccountId
}

fixed_bytes32! {
    /// Deterministic identifier of a debt agreement; primary key across components.
    AgreementId
}

fixed_bytes32! {
    /// Hash of a complete debt order, signed by debtor and creditor.
    OrderHash
}

fixed_bytes32! {
    /// Identifier of a fungible token on the shared ledger.
    TokenId
}

fixed_bytes32! {
    /// Opaque packed parameter blob interpreted by a terms contract.
    ///
    /// See [`crate::terms_params::TermsParameters`] for the reference layout.
    TermsContractParameters
}

impl AccountId {
    /// Derive a stable account for a named protocol component (e.g. "kernel").
    ///
    /// Component accounts have no signing key; they only ever act as callers
    /// or custody accounts, never as signers.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"accord.account.label");
        hasher.update(label.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

impl TokenId {
    /// Derive a token identifier from its ticker symbol.
    pub fn from_symbol(symbol: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"accord.token.symbol");
        hasher.update(symbol.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}
