use accord_core::{AccountId, Amount, TokenId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A single movement of `amount` units of `token` from `from` to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub token: TokenId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

impl Transfer {
    pub fn new(token: TokenId, from: AccountId, to: AccountId, amount: Amount) -> Self {
        Self {
            token,
            from,
            to,
            amount,
        }
    }
}

/// Token transfer primitive of the shared ledger.
///
/// Holders approve an allowance per token. Agents holding the `Transfer`
/// capability on the ledger may move funds out of a holder's account up to
/// that allowance; the allowance is consumed as they do.
pub trait TokenLedger: Send + Sync {
    /// Current balance of `owner` in `token`.
    fn balance_of(&self, token: &TokenId, owner: &AccountId) -> Amount;

    /// Amount of `token` that transfer agents may still move out of `owner`'s account.
    fn allowance_of(&self, token: &TokenId, owner: &AccountId) -> Amount;

    /// Set `owner`'s allowance for `token`, replacing any previous value.
    fn approve(&self, owner: &AccountId, token: &TokenId, amount: Amount) -> Result<(), LedgerError>;

    /// Move the caller's own funds.
    fn transfer(
        &self,
        from: &AccountId,
        token: &TokenId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    /// Move funds under the holder's allowance. Requires the `Transfer` capability.
    fn transfer_from(&self, agent: &AccountId, transfer: &Transfer) -> Result<(), LedgerError>;

    /// Apply every transfer or none of them.
    fn transfer_from_batch(&self, agent: &AccountId, transfers: &[Transfer]) -> Result<(), LedgerError>;

    /// Undo a batch previously applied with `transfer_from_batch`, restoring
    /// balances and the consumed allowances. All-or-nothing.
    fn reverse_batch(&self, agent: &AccountId, transfers: &[Transfer]) -> Result<(), LedgerError>;

    /// Create new units. Requires the `Mint` capability.
    fn mint(
        &self,
        agent: &AccountId,
        token: &TokenId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError>;
}
