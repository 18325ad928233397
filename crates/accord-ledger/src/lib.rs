//! Accord token ledger
//!
//! The token transfer primitive the protocol components settle against, an
//! in-memory reference implementation of it, and the registry that maps the
//! 8-bit token indices used in terms parameters to token identifiers.

pub mod error;
pub mod traits;
pub mod memory;
pub mod token_registry;

pub use error::LedgerError;
pub use traits::{TokenLedger, Transfer};
pub use memory::{EntryKind, InMemoryLedger, JournalEntry};
pub use token_registry::{TokenInfo, TokenRegistry};
