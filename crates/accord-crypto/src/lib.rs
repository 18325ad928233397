pub mod error;
pub mod keys;
pub mod signing;
pub mod hashing;

pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey};
pub use signing::{sign, sign_digest, verify, verify_account, Signature};
pub use hashing::{hash, DomainHasher, Hash};
